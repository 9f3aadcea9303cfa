//! GUI asset delivery.
//!
//! Assets come from two sources with a fixed priority: an optional override
//! directory read per request (so UI development never needs a rebuild), and
//! the gzip-compressed bundle embedded at build time. The embedded bundle
//! shares one modification timestamp, the build date, which doubles as the
//! cache-validation token.

use std::io::Read as _;
use std::path::PathBuf;

use axum::body::Body;
use axum::http::{HeaderMap, Response, StatusCode, header};
use flate2::read::GzDecoder;
use tracing::warn;

mod generated {
    include!(concat!(env!("OUT_DIR"), "/assets_gen.rs"));
}

/// Serves the web UI from the override directory or the embedded bundle.
#[derive(Debug, Clone, Default)]
pub struct AssetServer {
    override_dir: Option<PathBuf>,
}

impl AssetServer {
    #[must_use]
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    /// Resolves `path` and builds the full response, including negotiated
    /// content encoding and cache headers for embedded assets.
    pub async fn serve(&self, path: &str, request_headers: &HeaderMap) -> Response<Body> {
        let path = path.trim_start_matches('/');
        let path = if path.is_empty() { "index.html" } else { path };

        if let Some(dir) = &self.override_dir {
            match tokio::fs::read(dir.join(path)).await {
                Ok(content) => return file_response(path, content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(%path, error = %e, "failed to read overridden asset");
                    return status_response(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        }

        let Some(compressed) = lookup_embedded(path) else {
            return status_response(StatusCode::NOT_FOUND);
        };

        // The whole embedded bundle shares the build date as its
        // modification time, so an exact match means nothing changed.
        if request_headers
            .get(header::IF_MODIFIED_SINCE)
            .is_some_and(|since| since.as_bytes() == generated::BUILD_DATE.as_bytes())
        {
            return status_response(StatusCode::NOT_MODIFIED);
        }

        let accepts_gzip = request_headers
            .get(header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("gzip"));

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type(path))
            .header(header::LAST_MODIFIED, generated::BUILD_DATE)
            .header(header::CACHE_CONTROL, "public");

        let body = if accepts_gzip {
            builder = builder.header(header::CONTENT_ENCODING, "gzip");
            compressed.to_vec()
        } else {
            let mut plain = Vec::new();
            if GzDecoder::new(compressed).read_to_end(&mut plain).is_err() {
                warn!(%path, "embedded asset failed to decompress");
                return status_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
            plain
        };

        builder
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .expect("static headers are valid")
    }
}

fn lookup_embedded(path: &str) -> Option<&'static [u8]> {
    generated::ASSETS
        .iter()
        .find(|(logical, _)| *logical == path)
        .map(|(_, bytes)| *bytes)
}

fn file_response(path: &str, content: Vec<u8>) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type(path))
        .header(header::CONTENT_LENGTH, content.len())
        .body(Body::from(content))
        .expect("static headers are valid")
}

fn status_response(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .expect("empty response is valid")
}

/// Content type by extension. The fixed table covers everything the bundled
/// UI ships; anything else falls back to a guess by extension.
fn content_type(path: &str) -> String {
    let extension = path.rsplit_once('.').map_or("", |(_, ext)| ext);
    let known = match extension {
        "htm" | "html" => Some("text/html"),
        "css" => Some("text/css"),
        "js" => Some("application/javascript"),
        "json" => Some("application/json"),
        "png" => Some("image/png"),
        "ttf" => Some("application/x-font-ttf"),
        "woff" => Some("application/x-font-woff"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    };
    known.map_or_else(
        || mime_guess::from_path(path).first_or_octet_stream().to_string(),
        ToString::to_string,
    )
}
