//! HTTPS mirror server.
//!
//! Terminates TLS locally and hands every `GET` request, whatever its path,
//! to the configured [`RequestProcessor`]. The listener is acquired through
//! [`acquire_listener`], so a busy configured port falls back to an
//! ephemeral one; the port actually bound is only exposed once the server
//! is [`Listening`](MirrorServerState::Listening).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::LauncherSettings;
use crate::mirror::listener::acquire_listener;
use crate::mirror::processor::{MirrorRequest, RequestProcessor, UpstreamProcessor};
use crate::mirror::trust::{load_server_config, relaxed_client};
use crate::mirror::MirrorError;

/// Host name surfaces use to reach the mirror.
pub const MIRROR_HOST: &str = "localhost";

/// Path of the mirrored game root.
pub const MIRROR_ROOT_PATH: &str = "/0/";

/// Origin of a mirror listening on `port`.
pub fn mirror_origin(port: u16) -> String {
    format!("https://{}:{}", MIRROR_HOST, port)
}

/// Lifecycle of the mirror listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorServerState {
    /// Not started.
    Unbound,
    /// Binding the configured port.
    Binding,
    /// The configured port was taken; binding an ephemeral port.
    RebindingOnConflict,
    /// Accepting connections on the given port.
    Listening(u16),
    /// Stopped.
    Closed,
}

impl fmt::Display for MirrorServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorServerState::Unbound => write!(f, "Unbound"),
            MirrorServerState::Binding => write!(f, "Binding"),
            MirrorServerState::RebindingOnConflict => write!(f, "RebindingOnConflict"),
            MirrorServerState::Listening(port) => write!(f, "Listening({})", port),
            MirrorServerState::Closed => write!(f, "Closed"),
        }
    }
}

#[derive(Clone)]
struct MirrorState {
    processor: Arc<dyn RequestProcessor>,
}

/// Builds the mirror router: wildcard `GET` dispatch to `processor`.
pub fn create_router(processor: Arc<dyn RequestProcessor>) -> Router {
    Router::new()
        .route("/", get(dispatch))
        .route("/*path", get(dispatch))
        .with_state(MirrorState { processor })
        .layer(TraceLayer::new_for_http())
}

async fn dispatch(
    State(state): State<MirrorState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let request = MirrorRequest {
        method,
        path_and_query: path_and_query.clone(),
        headers,
    };

    match state.processor.process(request).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            error!("Request processor failed for {}: {:#}", path_and_query, e);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Waits until the server reports `Listening` and returns the bound port.
///
/// Returns `None` if the server closes or is dropped first.
pub async fn wait_listening(rx: &mut watch::Receiver<MirrorServerState>) -> Option<u16> {
    loop {
        match *rx.borrow_and_update() {
            MirrorServerState::Listening(port) => return Some(port),
            MirrorServerState::Closed => return None,
            _ => {}
        }
        if rx.changed().await.is_err() {
            return None;
        }
    }
}

/// Local HTTPS mirror of the remote origin.
pub struct MirrorServer {
    host: String,
    configured_port: u16,
    rebind_limit: Option<u32>,
    tls: Arc<rustls::ServerConfig>,
    processor: Arc<dyn RequestProcessor>,
    state_tx: watch::Sender<MirrorServerState>,
    shutdown_tx: Option<watch::Sender<bool>>,
    server_handle: Option<JoinHandle<()>>,
    listeners_bound: u32,
}

impl MirrorServer {
    /// Creates a server that will bind `host:port` once started.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        tls: Arc<rustls::ServerConfig>,
        processor: Arc<dyn RequestProcessor>,
    ) -> Self {
        let (state_tx, _) = watch::channel(MirrorServerState::Unbound);
        Self {
            host: host.into(),
            configured_port: port,
            rebind_limit: None,
            tls,
            processor,
            state_tx,
            shutdown_tx: None,
            server_handle: None,
            listeners_bound: 0,
        }
    }

    /// Creates a server from settings, forwarding to the remote origin.
    pub fn from_settings(settings: &LauncherSettings) -> Result<Self, MirrorError> {
        let tls = load_server_config(&settings.cert_path, &settings.key_path)?;
        let client = relaxed_client(Duration::from_millis(settings.upstream_timeout_ms))?;
        let processor = Arc::new(UpstreamProcessor::new(client, settings.remote_domain.clone()));

        Ok(
            Self::new(settings.bind_host.clone(), settings.server_port, tls, processor)
                .with_rebind_limit(settings.rebind_limit),
        )
    }

    /// Caps rebind attempts when the configured port is taken.
    pub fn with_rebind_limit(mut self, limit: Option<u32>) -> Self {
        self.rebind_limit = limit;
        self
    }

    /// Port requested in the configuration.
    pub fn configured_port(&self) -> u16 {
        self.configured_port
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MirrorServerState {
        *self.state_tx.borrow()
    }

    /// Subscribes to lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<MirrorServerState> {
        self.state_tx.subscribe()
    }

    /// Port actually bound. `None` unless listening.
    pub fn bound_port(&self) -> Option<u16> {
        match self.state() {
            MirrorServerState::Listening(port) => Some(port),
            _ => None,
        }
    }

    /// Mirror origin, e.g. `https://localhost:8887`. `None` unless listening.
    pub fn origin(&self) -> Option<String> {
        self.bound_port().map(mirror_origin)
    }

    /// URL of the mirrored game root. `None` unless listening.
    pub fn root_url(&self) -> Option<String> {
        self.origin()
            .map(|origin| format!("{}{}", origin, MIRROR_ROOT_PATH))
    }

    /// Number of listeners this server has bound over its lifetime.
    pub fn listeners_bound(&self) -> u32 {
        self.listeners_bound
    }

    /// Returns true while accepting connections.
    pub fn is_listening(&self) -> bool {
        self.bound_port().is_some()
    }

    /// Starts listening and returns the bound port.
    ///
    /// Resolves once the listener is bound. Calling it again while listening
    /// returns the existing port without binding anything.
    pub async fn start(&mut self) -> Result<u16, MirrorError> {
        if let Some(port) = self.bound_port() {
            debug!("Mirror server already listening on port {}", port);
            return Ok(port);
        }

        self.state_tx.send_replace(MirrorServerState::Binding);

        let state_tx = &self.state_tx;
        let acquired = acquire_listener(
            &self.host,
            self.configured_port,
            self.rebind_limit,
            |_| {
                state_tx.send_replace(MirrorServerState::RebindingOnConflict);
            },
        )
        .await;

        let listener = match acquired {
            Ok(listener) => listener,
            Err(e) => {
                self.state_tx.send_replace(MirrorServerState::Unbound);
                return Err(e);
            }
        };

        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(source) => {
                self.state_tx.send_replace(MirrorServerState::Unbound);
                return Err(MirrorError::Bind {
                    addr: format!("{}:{}", self.host, self.configured_port),
                    source,
                });
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let acceptor = TlsAcceptor::from(self.tls.clone());
        let router = create_router(self.processor.clone());
        self.server_handle = Some(tokio::spawn(serve(listener, acceptor, router, shutdown_rx)));

        self.listeners_bound += 1;
        self.state_tx.send_replace(MirrorServerState::Listening(port));
        info!("Mirror server listening on {}", mirror_origin(port));

        Ok(port)
    }

    /// Stops accepting connections.
    pub async fn stop(&mut self) {
        if !self.is_listening() {
            warn!("Mirror server is not running");
            return;
        }

        info!("Stopping mirror server...");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }

        if let Some(handle) = self.server_handle.take() {
            tokio::select! {
                _ = handle => {
                    info!("Mirror server stopped");
                }
                _ = tokio::time::sleep(Duration::from_secs(5)) => {
                    warn!("Mirror server shutdown timed out");
                }
            }
        }

        self.state_tx.send_replace(MirrorServerState::Closed);
    }
}

impl Drop for MirrorServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }
}

async fn serve(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    router: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("Mirror server shutting down");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                let acceptor = acceptor.clone();
                let router = router.clone();
                tokio::spawn(async move {
                    let stream = match acceptor.accept(stream).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            debug!("TLS handshake with {} failed: {}", peer, e);
                            return;
                        }
                    };

                    let service = TowerToHyperService::new(router);
                    if let Err(e) = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!("Connection with {} closed with error: {}", peer, e);
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::processor::MirrorResponse;
    use crate::mirror::trust::load_server_config;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::path::Path;
    use tower::ServiceExt;

    struct EchoProcessor;

    #[async_trait]
    impl RequestProcessor for EchoProcessor {
        async fn process(&self, request: MirrorRequest) -> anyhow::Result<MirrorResponse> {
            if request.path_and_query.starts_with("/fail") {
                return Err(anyhow!("upstream unavailable"));
            }
            Ok(MirrorResponse::ok("text/plain", request.path_and_query))
        }
    }

    fn tls() -> Arc<rustls::ServerConfig> {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("certificate");
        load_server_config(&dir.join("cert.crt"), &dir.join("key.pem")).unwrap()
    }

    async fn get_body(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_router_dispatches_every_path() {
        let router = create_router(Arc::new(EchoProcessor));

        assert_eq!(get_body(router.clone(), "/").await.1, "/");
        assert_eq!(
            get_body(router.clone(), "/0/?lang=en").await.1,
            "/0/?lang=en"
        );
        assert_eq!(
            get_body(router, "/deep/nested/asset.js").await.1,
            "/deep/nested/asset.js"
        );
    }

    #[tokio::test]
    async fn test_router_maps_processor_errors_to_bad_gateway() {
        let router = create_router(Arc::new(EchoProcessor));
        let (status, body) = get_body(router, "/fail").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let mut server = MirrorServer::new("127.0.0.1", 0, tls(), Arc::new(EchoProcessor));
        assert_eq!(server.state(), MirrorServerState::Unbound);
        assert!(server.bound_port().is_none());

        let first = server.start().await.unwrap();
        let second = server.start().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(server.listeners_bound(), 1);
        assert_eq!(server.state(), MirrorServerState::Listening(first));
        assert_eq!(
            server.root_url(),
            Some(format!("https://localhost:{}/0/", first))
        );

        server.stop().await;
        assert_eq!(server.state(), MirrorServerState::Closed);
        assert!(server.origin().is_none());
    }

    #[tokio::test]
    async fn test_wait_listening_sees_bound_port() {
        let mut server = MirrorServer::new("127.0.0.1", 0, tls(), Arc::new(EchoProcessor));
        let mut rx = server.subscribe();

        let waiter = tokio::spawn(async move { wait_listening(&mut rx).await });
        let port = server.start().await.unwrap();

        assert_eq!(waiter.await.unwrap(), Some(port));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(MirrorServerState::Listening(8887).to_string(), "Listening(8887)");
        assert_eq!(MirrorServerState::Unbound.to_string(), "Unbound");
    }
}
