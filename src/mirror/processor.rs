//! The request processor behind the mirror.
//!
//! The mirror itself has no routing: every request is handed to a
//! [`RequestProcessor`]. Content rewriting lives in processors supplied by
//! the embedding application. [`UpstreamProcessor`] is the default and
//! forwards each request unchanged to the remote origin.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::debug;

/// A request received by the mirror.
#[derive(Debug, Clone)]
pub struct MirrorRequest {
    pub method: Method,
    /// Path and query exactly as received, e.g. `/0/?lang=en`.
    pub path_and_query: String,
    pub headers: HeaderMap,
}

/// A response produced by a processor.
#[derive(Debug, Clone)]
pub struct MirrorResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl MirrorResponse {
    /// A `200 OK` response with the given content type.
    pub fn ok(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: Some(content_type.into()),
            body: body.into(),
        }
    }
}

impl IntoResponse for MirrorResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        if let Some(value) = self
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        response
    }
}

/// Handles every request the mirror receives.
#[async_trait]
pub trait RequestProcessor: Send + Sync + 'static {
    async fn process(&self, request: MirrorRequest) -> Result<MirrorResponse>;
}

/// Forwards requests verbatim to the remote origin.
#[derive(Debug, Clone)]
pub struct UpstreamProcessor {
    client: reqwest::Client,
    remote_origin: String,
}

impl UpstreamProcessor {
    /// Creates a processor forwarding to `remote_origin` through `client`.
    ///
    /// `client` should come from [`relaxed_client`](crate::mirror::trust::relaxed_client).
    pub fn new(client: reqwest::Client, remote_origin: impl Into<String>) -> Self {
        Self {
            client,
            remote_origin: remote_origin.into(),
        }
    }

    /// Upstream URL for a mirrored path and query.
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        format!(
            "{}/{}",
            self.remote_origin.trim_end_matches('/'),
            path_and_query.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl RequestProcessor for UpstreamProcessor {
    async fn process(&self, request: MirrorRequest) -> Result<MirrorResponse> {
        let url = self.upstream_url(&request.path_and_query);
        debug!("Forwarding {} {}", request.method, url);

        let mut upstream = self.client.request(request.method.clone(), &url);
        if let Some(agent) = request.headers.get(header::USER_AGENT) {
            upstream = upstream.header(header::USER_AGENT, agent.clone());
        }

        let response = upstream
            .send()
            .await
            .with_context(|| format!("upstream request to {} failed", url))?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .with_context(|| format!("reading upstream body from {} failed", url))?;

        Ok(MirrorResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(origin: &str) -> UpstreamProcessor {
        UpstreamProcessor::new(reqwest::Client::new(), origin)
    }

    #[test]
    fn test_upstream_url_joins_cleanly() {
        let p = processor("https://game.example.com/");
        assert_eq!(
            p.upstream_url("/0/?lang=en"),
            "https://game.example.com/0/?lang=en"
        );

        let p = processor("https://game.example.com");
        assert_eq!(p.upstream_url("/"), "https://game.example.com/");
    }

    #[test]
    fn test_mirror_response_sets_content_type() {
        let response = MirrorResponse::ok("text/html", "<p>hi</p>").into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html"
        );
    }
}
