//! Control-plane HTTP service.
//!
//! One listener serves the REST API and the web UI, accepting both HTTPS and
//! plain HTTP on the same port through the connection gate. The router nests
//! the API under `/api` and hands everything else to the asset server.

pub mod assets;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, Request, Response};
use axum::middleware;
use axum::routing::{get, post};
use eyre::WrapErr as _;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt as _;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::api::assets::AssetServer;
use crate::config::ConfigHandle;
use crate::gate;
use crate::model::Model;
use crate::supervisor::Service;

/// How long an accept error waits for a pending stop signal before being
/// treated as a real failure.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigHandle>,
    pub model: Arc<dyn Model>,
    pub assets: Arc<AssetServer>,
}

/// Builds the full control-plane router.
#[must_use]
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/system/config",
            get(handlers::get_system_config).post(handlers::post_system_config),
        )
        .route("/system/config/insync", get(handlers::get_config_in_sync))
        .route("/system/connections", get(handlers::get_connections))
        .route("/system/pins/status", get(handlers::get_pin_status))
        .route("/verify/deviceid", get(handlers::get_device_id))
        .route("/db/browse", get(handlers::get_db_browse))
        .route("/verify/humansize", post(handlers::post_verify_human_size))
        // Unknown API paths are looked up as assets, which yields the 404.
        .fallback(serve_asset)
        .layer(middleware::from_fn(handlers::method_guard));

    Router::new()
        .nest("/api", api)
        .fallback(serve_asset)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Asset fallback. Uses the original URI so the path survives nesting.
async fn serve_asset(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response<Body> {
    state.assets.serve(uri.path(), &headers).await
}

/// The supervised HTTP service: owns the listener and the TLS acceptor,
/// classifies each connection, and serves it with hyper.
pub struct ApiService {
    listener: tokio::sync::Mutex<TcpListener>,
    acceptor: TlsAcceptor,
    router: Router,
    stop_tx: std::sync::Mutex<Option<watch::Sender<bool>>>,
    stop_rx: watch::Receiver<bool>,
    local_addr: SocketAddr,
}

impl ApiService {
    /// Binds the listener. A bind failure is fatal at startup, so this is
    /// separate from [`Service::start`].
    ///
    /// # Errors
    ///
    /// Returns an error when the address cannot be bound.
    pub async fn bind(
        address: &str,
        tls: rustls::ServerConfig,
        router: Router,
    ) -> eyre::Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .wrap_err_with(|| format!("failed to bind control-plane listener on {address}"))?;
        let local_addr = listener
            .local_addr()
            .wrap_err("listener has no local address")?;
        let (stop_tx, stop_rx) = watch::channel(false);
        Ok(Self {
            listener: tokio::sync::Mutex::new(listener),
            acceptor: TlsAcceptor::from(Arc::new(tls)),
            router,
            stop_tx: std::sync::Mutex::new(Some(stop_tx)),
            stop_rx,
            local_addr,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Service for ApiService {
    async fn start(&self) -> eyre::Result<()> {
        let listener = self.listener.lock().await;
        let mut stop_rx = self.stop_rx.clone();
        info!(addr = %self.local_addr, "control plane listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let acceptor = self.acceptor.clone();
                        let router = self.router.clone();
                        tokio::spawn(serve_connection(stream, peer, acceptor, router));
                    }
                    Err(e) => {
                        // An accept error racing shutdown is expected noise;
                        // give the stop signal a moment to arrive first.
                        let _ = tokio::time::timeout(STOP_GRACE, stop_rx.changed()).await;
                        if *stop_rx.borrow() {
                            return Ok(());
                        }
                        warn!(error = %e, "accept failed");
                        return Err(eyre::Report::new(e).wrap_err("accept failed"));
                    }
                },
                _ = stop_rx.changed() => return Ok(()),
            }
        }
    }

    fn stop(&self) {
        let tx = self
            .stop_tx
            .lock()
            .expect("stop lock poisoned")
            .take()
            .expect("stop invoked twice");
        let _ = tx.send(true);
    }

    fn describe(&self) -> String {
        format!("api@{}", self.local_addr)
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    router: Router,
) {
    let gated = match gate::classify(stream, &acceptor).await {
        Ok(gated) => gated,
        Err(e) => {
            debug!(%peer, error = %e, "dropping connection after failed classification");
            return;
        }
    };
    debug!(%peer, tls = gated.is_tls(), "serving connection");

    let service = hyper::service::service_fn(move |request: Request<Incoming>| {
        router.clone().oneshot(request.map(Body::new))
    });
    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(gated), service)
        .await
    {
        debug!(%peer, error = %e, "connection closed with an error");
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::{Method, StatusCode, header};

    use super::*;
    use crate::config::{ConfigSnapshot, FolderConfig};
    use crate::model::SharedModel;

    fn test_router(dir: &std::path::Path) -> Router {
        let state = AppState {
            config: Arc::new(ConfigHandle::new(
                dir.join("config.toml"),
                ConfigSnapshot::default(),
            )),
            model: Arc::new(SharedModel::new()),
            assets: Arc::new(AssetServer::new(None)),
        };
        router(state)
    }

    fn request(method: Method, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn unsupported_methods_on_api_paths_are_405() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());

        let response = app
            .oneshot(request(Method::DELETE, "/api/system/config", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unknown_api_path_is_looked_up_as_asset() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());

        let response = app
            .oneshot(request(Method::GET, "/api/no/such/endpoint", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn root_serves_the_ui() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());

        let response = app.oneshot(request(Method::GET, "/", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
    }

    #[tokio::test]
    async fn device_id_lookup_always_returns_200() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());

        let response = app
            .oneshot(request(Method::GET, "/api/verify/deviceid?id=INVALID", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("error"), "unexpected body: {body}");
    }

    #[tokio::test]
    async fn missing_query_parameters_are_treated_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/api/verify/deviceid", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("error"));

        let response = app
            .oneshot(request(Method::GET, "/api/db/browse", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "[]");
    }

    #[tokio::test]
    async fn human_size_verification_reports_both_outcomes() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());

        let ok = app
            .clone()
            .oneshot(request(Method::POST, "/api/verify/humansize", "10 MB"))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let bad = app
            .oneshot(request(Method::POST, "/api/verify/humansize", "bananas"))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn config_replace_flow_updates_document_and_in_sync() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());

        let in_sync = app
            .clone()
            .oneshot(request(Method::GET, "/api/system/config/insync", ""))
            .await
            .unwrap();
        assert_eq!(body_string(in_sync).await, "true");

        let mut document = ConfigSnapshot::default();
        document.mount_point = "/mnt/sync".to_string();
        document.folders.push(FolderConfig {
            id: "photos".to_string(),
            cache_size: "512 MiB".to_string(),
            devices: Vec::new(),
            pinned_files: Vec::new(),
        });
        let posted = serde_json::to_string(&document).unwrap();

        let replace = app
            .clone()
            .oneshot(request(Method::POST, "/api/system/config", &posted))
            .await
            .unwrap();
        assert_eq!(replace.status(), StatusCode::OK);

        let fetched = app
            .clone()
            .oneshot(request(Method::GET, "/api/system/config", ""))
            .await
            .unwrap();
        assert!(body_string(fetched).await.contains("/mnt/sync"));

        let in_sync = app
            .oneshot(request(Method::GET, "/api/system/config/insync", ""))
            .await
            .unwrap();
        assert_eq!(body_string(in_sync).await, "false");
    }

    #[tokio::test]
    async fn invalid_config_document_is_rejected_with_400() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());

        let mut document = ConfigSnapshot::default();
        document.folders.push(FolderConfig {
            id: "photos".to_string(),
            cache_size: "bananas".to_string(),
            devices: Vec::new(),
            pinned_files: Vec::new(),
        });
        let posted = serde_json::to_string(&document).unwrap();

        let response = app
            .oneshot(request(Method::POST, "/api/system/config", &posted))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn undecodable_config_body_is_a_500() {
        let tmp = tempfile::tempdir().unwrap();
        let app = test_router(tmp.path());

        let response = app
            .oneshot(request(Method::POST, "/api/system/config", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
