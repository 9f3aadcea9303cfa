//! TLS identity bootstrap and server configuration.
//!
//! Two certificate/key pairs live in the configuration directory: the peer
//! identity (whose certificate digest is the device ID) and the HTTPS
//! identity for the control-plane listener. Both use the same bootstrap: try
//! to load, and when the files are missing or unreadable as PEM, generate a
//! self-signed pair named after the local host and persist it. I/O failures
//! other than "not found" are fatal and abort startup.

use std::path::Path;
use std::sync::Arc;

use eyre::WrapErr as _;
use rustls::CipherSuite;
use rustls::pki_types::pem::PemObject as _;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::fs;
use tracing::info;

/// Subject name used when the host name cannot be determined.
pub const DEFAULT_COMMON_NAME: &str = "syncfuse";

/// Forward-secret AEAD suites only; no legacy stream ciphers.
static ALLOWED_SUITES: &[CipherSuite] = &[
    CipherSuite::TLS13_AES_128_GCM_SHA256,
    CipherSuite::TLS13_AES_256_GCM_SHA384,
    CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
];

/// A loaded or freshly generated certificate/key pair.
#[derive(Debug)]
pub struct TlsIdentity {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    /// The leaf certificate in DER form, used to derive the device ID.
    #[must_use]
    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.cert_chain[0]
    }
}

/// Loads the identity at the given paths, generating and persisting a
/// self-signed one when loading fails because the files are missing or not
/// valid PEM.
///
/// # Errors
///
/// Any other failure (unreadable paths, failed generation, failed write) is
/// returned and should abort startup; this never retries.
pub async fn load_or_generate(cert_path: &Path, key_path: &Path) -> eyre::Result<TlsIdentity> {
    match load(cert_path, key_path) {
        Ok(identity) => Ok(identity),
        Err(LoadError::Unusable(reason)) => {
            info!(
                cert = %cert_path.display(),
                %reason,
                "no usable certificate, generating a new one"
            );
            generate(cert_path, key_path).await
        }
        Err(LoadError::Fatal(report)) => Err(report),
    }
}

enum LoadError {
    /// Missing or malformed files; the caller should generate a fresh pair.
    Unusable(String),
    /// Anything else, e.g. permission problems. Aborts startup.
    Fatal(eyre::Report),
}

fn load(cert_path: &Path, key_path: &Path) -> Result<TlsIdentity, LoadError> {
    use rustls::pki_types::pem;

    let classify = |e: pem::Error, path: &Path| match e {
        pem::Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            LoadError::Unusable(format!("{} not found", path.display()))
        }
        pem::Error::Io(io) => LoadError::Fatal(
            eyre::Report::new(io)
                .wrap_err(format!("failed to read identity file {}", path.display())),
        ),
        other => LoadError::Unusable(format!("{}: {other}", path.display())),
    };

    let cert_chain = CertificateDer::pem_file_iter(cert_path)
        .map_err(|e| classify(e, cert_path))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| classify(e, cert_path))?;
    if cert_chain.is_empty() {
        return Err(LoadError::Unusable(format!(
            "{} contains no certificates",
            cert_path.display()
        )));
    }
    let key = PrivateKeyDer::from_pem_file(key_path).map_err(|e| classify(e, key_path))?;
    Ok(TlsIdentity { cert_chain, key })
}

async fn generate(cert_path: &Path, key_path: &Path) -> eyre::Result<TlsIdentity> {
    let name = local_host_name();
    let rcgen::CertifiedKey { cert, signing_key } =
        rcgen::generate_simple_self_signed(vec![name.clone()])
            .wrap_err("failed to generate self-signed certificate")?;

    fs::write(cert_path, cert.pem())
        .await
        .wrap_err_with(|| format!("failed to write certificate to {}", cert_path.display()))?;
    fs::write(key_path, signing_key.serialize_pem())
        .await
        .wrap_err_with(|| format!("failed to write key to {}", key_path.display()))?;
    info!(subject = %name, cert = %cert_path.display(), "created new certificate");

    Ok(TlsIdentity {
        cert_chain: vec![cert.der().clone()],
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(signing_key.serialize_der())),
    })
}

fn local_host_name() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| DEFAULT_COMMON_NAME.to_string())
}

/// Builds the listener-side TLS configuration: protocol floor TLS 1.2 and
/// the restricted cipher suite allow-list.
///
/// # Errors
///
/// Returns an error when the identity is rejected by rustls.
pub fn server_config(identity: TlsIdentity) -> eyre::Result<rustls::ServerConfig> {
    let mut provider = rustls::crypto::aws_lc_rs::default_provider();
    provider
        .cipher_suites
        .retain(|suite| ALLOWED_SUITES.contains(&suite.suite()));

    let config = rustls::ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
        .wrap_err("failed to restrict TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(identity.cert_chain, identity.key)
        .wrap_err("certificate rejected for the control-plane listener")?;
    Ok(config)
}
