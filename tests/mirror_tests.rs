//! Integration tests for the HTTPS mirror
//!
//! Port fallback, TLS serving with the bundled certificate, and wildcard
//! dispatch to the request processor.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use mirror_launcher::mirror::{
    create_router, load_server_config, relaxed_client, MirrorRequest, MirrorResponse,
    MirrorServer, MirrorServerState, RequestProcessor,
};

/// Processor that echoes the received path and query back as the body
struct EchoProcessor;

#[async_trait]
impl RequestProcessor for EchoProcessor {
    async fn process(&self, request: MirrorRequest) -> Result<MirrorResponse> {
        Ok(MirrorResponse::ok(
            "text/plain",
            format!("{} {}", request.method, request.path_and_query),
        ))
    }
}

fn tls() -> Arc<rustls::ServerConfig> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("certificate");
    load_server_config(&dir.join("cert.crt"), &dir.join("key.pem")).unwrap()
}

fn server(port: u16) -> MirrorServer {
    MirrorServer::new("127.0.0.1", port, tls(), Arc::new(EchoProcessor))
}

// ============================================================================
// Port Acquisition
// ============================================================================

#[tokio::test]
async fn test_occupied_port_falls_back_to_ephemeral() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let taken = occupied.local_addr().unwrap().port();

    let mut server = server(taken);
    let mut states = server.subscribe();
    let port = server.start().await.unwrap();

    assert_ne!(port, taken);
    assert_ne!(port, 0);
    assert_eq!(server.configured_port(), taken);
    assert_eq!(server.bound_port(), Some(port));
    assert_eq!(*states.borrow_and_update(), MirrorServerState::Listening(port));
    assert_eq!(server.listeners_bound(), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_bounded_rebind_gives_up() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let taken = occupied.local_addr().unwrap().port();

    let mut server = server(taken).with_rebind_limit(Some(0));
    assert!(server.start().await.is_err());
    assert_eq!(server.state(), MirrorServerState::Unbound);
    assert!(server.bound_port().is_none());
}

// ============================================================================
// Serving
// ============================================================================

#[tokio::test]
async fn test_serves_https_with_bundled_certificate() {
    let mut server = server(0);
    let port = server.start().await.unwrap();

    let client = relaxed_client(Duration::from_secs(5)).unwrap();
    let response = client
        .get(format!("https://127.0.0.1:{}/0/?lang=en", port))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "GET /0/?lang=en");

    server.stop().await;
    assert_eq!(server.state(), MirrorServerState::Closed);
}

#[tokio::test]
async fn test_plain_http_is_not_served() {
    let mut server = server(0);
    let port = server.start().await.unwrap();

    let result = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/0/", port))
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(result.is_err());

    // The failed handshake does not take the listener down.
    let client = relaxed_client(Duration::from_secs(5)).unwrap();
    let response = client
        .get(format!("https://127.0.0.1:{}/", port))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    server.stop().await;
}

#[tokio::test]
async fn test_router_forwards_any_path_verbatim() {
    let router = create_router(Arc::new(EchoProcessor));

    for uri in ["/", "/0/", "/0/?a=1&b=2", "/v0.5/resource/lang.json"] {
        let response = router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), format!("GET {}", uri));
    }
}

#[tokio::test]
async fn test_router_only_answers_get() {
    let router = create_router(Arc::new(EchoProcessor));
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/0/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
