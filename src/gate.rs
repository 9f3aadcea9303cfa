//! Per-connection TLS/plaintext gate.
//!
//! The control plane serves both HTTPS clients and plain-HTTP browsers on
//! one port. Each accepted connection is classified once by peeking at its
//! first byte: a TLS handshake record gets upgraded through the acceptor,
//! anything else passes through untouched. A failed handshake drops only
//! that connection.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

/// TLS handshake record: content type 0x16 (handshake).
const TLS_HANDSHAKE_RECORD: u8 = 0x16;

/// Returns true when the leading bytes of a stream look like a TLS
/// handshake.
#[must_use]
pub fn looks_like_tls(prefix: &[u8]) -> bool {
    prefix.first() == Some(&TLS_HANDSHAKE_RECORD)
}

/// A connection after classification, either upgraded or passed through.
pub enum GateStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl GateStream {
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

/// Classifies one accepted connection, performing the TLS handshake when the
/// peeked bytes call for it.
///
/// # Errors
///
/// Propagates peek failures and handshake failures; the caller drops the
/// connection either way.
pub async fn classify(stream: TcpStream, acceptor: &TlsAcceptor) -> io::Result<GateStream> {
    let mut prefix = [0_u8; 1];
    let n = stream.peek(&mut prefix).await?;
    if looks_like_tls(prefix.get(..n).unwrap_or_default()) {
        let tls = acceptor.accept(stream).await?;
        Ok(GateStream::Tls(Box::new(tls)))
    } else {
        Ok(GateStream::Plain(stream))
    }
}

impl AsyncRead for GateStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for GateStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    use super::*;
    use crate::tls::{load_or_generate, server_config};

    #[test]
    fn classifies_byte_prefixes() {
        assert!(looks_like_tls(&[0x16, 0x03, 0x01]));
        assert!(!looks_like_tls(b"GET / HTTP/1.1\r\n"));
        assert!(!looks_like_tls(b"POST"));
        assert!(!looks_like_tls(&[]));
    }

    async fn test_acceptor() -> TlsAcceptor {
        let tmp = tempfile::tempdir().unwrap();
        let identity = load_or_generate(&tmp.path().join("c.pem"), &tmp.path().join("k.pem"))
            .await
            .unwrap();
        TlsAcceptor::from(Arc::new(server_config(identity).unwrap()))
    }

    #[tokio::test]
    async fn plaintext_passes_through_unmodified() {
        let acceptor = test_acceptor().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
            stream
        });

        let (accepted, _) = listener.accept().await.unwrap();
        let mut gated = classify(accepted, &acceptor).await.unwrap();
        assert!(!gated.is_tls());

        let mut read = vec![0_u8; 18];
        gated.read_exact(&mut read).await.unwrap();
        assert_eq!(&read, b"GET / HTTP/1.0\r\n\r\n");
        drop(client.await.unwrap());
    }

    #[tokio::test]
    async fn tls_handshake_is_upgraded() {
        let acceptor = test_acceptor().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // A raw client hello prefix is enough to trigger the upgrade path;
        // the handshake itself then fails and the connection is dropped,
        // which is the per-connection error contract.
        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(&[0x16, 0x03, 0x01, 0x00, 0x00]).await.unwrap();
            drop(stream);
        });

        let (accepted, _) = listener.accept().await.unwrap();
        let result = classify(accepted, &acceptor).await;
        assert!(result.is_err() || result.is_ok_and(|s| s.is_tls()));
        client.await.unwrap();
    }
}
