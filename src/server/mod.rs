//! Embedded HTTP server for the snapshot document store.
//!
//! One JSON document per user key, uploaded and downloaded whole, with
//! shared-token auth and ETag-based conditional fetch. The store write is
//! atomic, so a client pulling mid-upload sees the previous document.

mod store;

pub use store::{DocumentStore, Fetch, StoreError, DEFAULT_USER_KEY};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

/// Server state shared across requests.
#[derive(Clone)]
pub struct ServerState {
    pub store: Arc<DocumentStore>,
    /// Shared secret required on every request when set.
    pub token: Option<String>,
}

#[derive(Deserialize)]
pub struct StorageQuery {
    #[serde(default = "default_user")]
    user: String,
}

fn default_user() -> String {
    DEFAULT_USER_KEY.to_string()
}

/// Token check, applied before any storage access. A server without a
/// configured token accepts everything.
fn token_ok(configured: Option<&str>, presented: Option<&str>) -> bool {
    match configured {
        None | Some("") => true,
        Some(expected) => presented == Some(expected),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "invalid token"})),
    )
        .into_response()
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn get_storage(
    State(state): State<ServerState>,
    Query(query): Query<StorageQuery>,
    headers: HeaderMap,
) -> Response {
    if !token_ok(state.token.as_deref(), header_str(&headers, "x-token")) {
        return unauthorized();
    }

    let known_hash = header_str(&headers, "if-none-match").map(|v| v.trim().trim_matches('"'));

    let result = match known_hash {
        Some(hash) => state.store.get_if_changed(&query.user, hash),
        None => state
            .store
            .get(&query.user)
            .map(|opt| opt.map(|(bytes, etag)| Fetch::Document { bytes, etag })),
    };

    match result {
        Ok(None) => (
            StatusCode::OK,
            [(header::ETAG, "\"0\"".to_string())],
            Json(json!({"version": 0, "payload": null})),
        )
            .into_response(),
        Ok(Some(Fetch::Unchanged)) => StatusCode::NOT_MODIFIED.into_response(),
        Ok(Some(Fetch::Document { bytes, etag })) => (
            StatusCode::OK,
            [
                (header::ETAG, format!("\"{etag}\"")),
                (header::CONTENT_TYPE, "application/json".to_string()),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            log::error!("Store: read failed for user {}: {}", query.user, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "storage read failed"})),
            )
                .into_response()
        }
    }
}

async fn put_storage(
    State(state): State<ServerState>,
    Query(query): Query<StorageQuery>,
    headers: HeaderMap,
    Json(document): Json<serde_json::Value>,
) -> Response {
    if !token_ok(state.token.as_deref(), header_str(&headers, "x-token")) {
        return unauthorized();
    }

    let bytes = match serde_json::to_vec_pretty(&document) {
        Ok(bytes) => bytes,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"detail": format!("invalid document: {e}")})),
            )
                .into_response()
        }
    };

    match state.store.put(&query.user, &bytes) {
        Ok(etag) => {
            log::info!(
                "Store: stored {} bytes for user {}",
                bytes.len(),
                DocumentStore::sanitize_user_key(&query.user)
            );
            Json(json!({"ok": true, "etag": etag})).into_response()
        }
        Err(e) => {
            log::error!("Store: write failed for user {}: {}", query.user, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "storage write failed"})),
            )
                .into_response()
        }
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/storage", get(get_storage).post(put_storage))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn run(addr: SocketAddr, state: ServerState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("Document store listening on {}", addr);
    axum::serve(listener, router(state)).await
}
