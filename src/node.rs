//! Storage node: HTTP surface plus the WAL-then-store write path.
//!
//! All handlers share one [`NodeState`] built in `main` and passed through
//! axum state, so tests can construct independent instances instead of
//! reaching for process globals.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::store::KvStore;
use crate::wal::{self, Durability, Record, Recovery, Wal};

pub struct NodeConfig {
    pub node_id: String,
    pub wal_path: PathBuf,
    pub durability: Durability,
    pub recovery: Recovery,
}

/// Shared per-node context: identity, the in-memory store, and the open WAL.
pub struct NodeState {
    node_id: String,
    store: KvStore,
    wal: Mutex<Wal>,
}

impl NodeState {
    /// Replays the WAL into a fresh store, then opens the log for appending.
    ///
    /// Runs before the listener starts, so recovery sees no concurrent
    /// access.
    pub async fn open(config: NodeConfig) -> Result<Self> {
        let replay = wal::replay(&config.wal_path, config.recovery).await?;
        if replay.skipped > 0 {
            warn!(
                node = %config.node_id,
                skipped = replay.skipped,
                "wal replay skipped malformed records"
            );
        }

        let records = replay.records.len();
        let mut store = KvStore::new();
        store.recover(replay.records);

        let wal = Wal::open(&config.wal_path, config.durability).await?;
        info!(
            node = %config.node_id,
            records,
            keys = store.len(),
            "state restored from wal"
        );

        Ok(Self {
            node_id: config.node_id,
            store,
            wal: Mutex::new(wal),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn key_count(&self) -> usize {
        self.store.len()
    }

    /// Reads straight from the store; the log is never consulted.
    pub fn get(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    /// Durably records a write, then applies it to the store.
    ///
    /// The WAL mutex is the single serialization point for writers: it is
    /// held across both the append and the map mutation, so log order equals
    /// applied order. If the append fails the store is left untouched.
    pub async fn set(&self, key: String, value: String) -> Result<()> {
        let mut wal = self.wal.lock().await;
        wal.append(&Record::set(key.clone(), value.clone())).await?;
        self.store.set(key, value);
        Ok(())
    }

    /// Durably records a deletion, then removes the key. Logged for parity
    /// with [`set`](Self::set) so a deleted key stays deleted after replay.
    pub async fn delete(&self, key: String) -> Result<()> {
        let mut wal = self.wal.lock().await;
        wal.append(&Record::del(key.clone())).await?;
        self.store.delete(&key);
        Ok(())
    }
}

/// Builds the node's HTTP router. Wrong-method requests (e.g. GET `/set`)
/// get a 405 from axum's method routing.
pub fn router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/get", get(handle_get))
        .route("/set", post(handle_set))
        .route("/delete", post(handle_delete))
        .route("/status", get(handle_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetRequest {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    key: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    node: String,
    keys: usize,
}

async fn handle_get(
    State(state): State<Arc<NodeState>>,
    Query(query): Query<KeyQuery>,
) -> Response {
    let Some(key) = query.key.filter(|key| !key.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing key parameter").into_response();
    };
    match state.get(&key) {
        Some(value) => (StatusCode::OK, value).into_response(),
        None => (StatusCode::NOT_FOUND, "key not found").into_response(),
    }
}

async fn handle_set(State(state): State<Arc<NodeState>>, body: String) -> Response {
    // Parsed by hand rather than with the Json extractor so malformed bodies
    // map to a plain 400, per the node's error taxonomy.
    let request: SetRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid JSON payload").into_response(),
    };
    if let Err(response) = validate_key(&request.key) {
        return response;
    }
    if request.value.contains('\n') {
        return (StatusCode::BAD_REQUEST, "value may not contain newlines").into_response();
    }
    match state.set(request.key, request.value).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(err) => {
            warn!(error = ?err, "wal append failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "persistence error").into_response()
        }
    }
}

async fn handle_delete(State(state): State<Arc<NodeState>>, body: String) -> Response {
    let request: DeleteRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid JSON payload").into_response(),
    };
    if let Err(response) = validate_key(&request.key) {
        return response;
    }
    match state.delete(request.key).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(err) => {
            warn!(error = ?err, "wal append failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "persistence error").into_response()
        }
    }
}

async fn handle_status(State(state): State<Arc<NodeState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        node: state.node_id().to_string(),
        keys: state.key_count(),
    })
}

/// Keys become the second comma-separated WAL field, so the delimiter and
/// line terminator are rejected here instead of corrupting the log.
fn validate_key(key: &str) -> Result<(), Response> {
    if key.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "missing key").into_response());
    }
    if key.contains(',') || key.contains('\n') {
        return Err((StatusCode::BAD_REQUEST, "key may not contain ',' or newlines").into_response());
    }
    Ok(())
}
