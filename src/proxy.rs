//! Stateless routing proxy.
//!
//! Every inbound request carrying a `key` query parameter is forwarded to the
//! node the [`ShardRouter`] selects for that key, and the node's response is
//! relayed back verbatim. There is no retry, failover, or circuit breaking: a
//! down node's shard of keys is unavailable until the node returns.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::to_bytes,
    extract::{Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::router::ShardRouter;

/// Forwarded bodies are buffered in full before resending; cap them so a
/// single request cannot balloon proxy memory.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Immutable cross-request proxy context: the shard table and one shared
/// HTTP client.
pub struct ProxyState {
    router: ShardRouter,
    client: reqwest::Client,
}

impl ProxyState {
    /// The timeout bounds the whole forwarded round-trip, so a hung node
    /// surfaces as a 502 instead of pinning the connection indefinitely.
    pub fn new(nodes: Vec<String>, timeout: Duration) -> Result<Self> {
        let router = ShardRouter::new(nodes)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build proxy http client")?;
        Ok(Self { router, client })
    }

    pub fn router(&self) -> &ShardRouter {
        &self.router
    }
}

/// Builds the proxy's HTTP router: a single catch-all forwarding handler.
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .fallback(handle_forward)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

async fn handle_forward(
    State(state): State<Arc<ProxyState>>,
    Query(query): Query<KeyQuery>,
    request: Request,
) -> Response {
    // Missing key fails before any routing attempt.
    let Some(key) = query.key.filter(|key| !key.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing key parameter").into_response();
    };

    let (target, shard) = state.router.route(&key);
    let url = target_url(target, request.uri().path(), request.uri().query());
    debug!(%key, shard, %url, "forwarding request");

    let method = match reqwest::Method::from_bytes(request.method().as_str().as_bytes()) {
        Ok(method) => method,
        Err(_) => return (StatusCode::BAD_REQUEST, "unsupported method").into_response(),
    };
    let body = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(_) => return (StatusCode::BAD_REQUEST, "unreadable request body").into_response(),
    };

    let forwarded = state.client.request(method, url).body(body).send().await;
    let response = match forwarded {
        Ok(response) => response,
        Err(err) => {
            warn!(shard, node = target, error = %err, "node unreachable");
            return (StatusCode::BAD_GATEWAY, "node unavailable").into_response();
        }
    };

    relay(response).await
}

/// Converts the node's response into ours, preserving status and body.
async fn relay(response: reqwest::Response) -> Response {
    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    match response.bytes().await {
        Ok(body) => (status, body).into_response(),
        Err(err) => {
            warn!(error = %err, "failed to read node response");
            (StatusCode::BAD_GATEWAY, "node unavailable").into_response()
        }
    }
}

/// Rebuilds the request URL against the selected node, keeping the original
/// path and full query string.
fn target_url(target: &str, path: &str, query: Option<&str>) -> String {
    match query {
        Some(query) => format!("{target}{path}?{query}"),
        None => format!("{target}{path}"),
    }
}
