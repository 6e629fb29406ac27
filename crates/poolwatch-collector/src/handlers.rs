//! REST API handlers.
//!
//! Operator routes read the store or go through the dispatcher and return
//! JSON wrapped in [`ApiResponse`].

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use poolwatch_core::{ParameterChange, PoolKey, PoolSnapshot, UploadAck};
use poolwatch_state::MergeOutcome;
use tracing::{debug, warn};

use crate::ApiState;
use crate::dispatcher::DispatchError;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Pools ──────────────────────────────────────────────────────

/// GET /api/v1/pools
pub async fn list_pools(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list() {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/pools/{host}/{application}/{id}
pub async fn get_pool(
    State(state): State<ApiState>,
    Path((host, application, id)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let key = PoolKey::new(host, application, id);
    match state.store.get(&key) {
        Ok(Some(record)) => ApiResponse::ok(record).into_response(),
        Ok(None) => error_response("pool not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// PUT /api/v1/pools/{host}/{application}/{id}
pub async fn change_pool(
    State(state): State<ApiState>,
    Path((host, application, id)): Path<(String, String, String)>,
    Json(change): Json<ParameterChange>,
) -> impl IntoResponse {
    let key = PoolKey::new(host, application, id);
    match state.dispatcher.request_change(&key, change).await {
        Ok(record) => ApiResponse::ok(record).into_response(),
        Err(e) => {
            let status = match &e {
                DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
                DispatchError::RemoteUnreachable { .. } => StatusCode::BAD_GATEWAY,
                DispatchError::RemoteRejected { .. } => StatusCode::BAD_REQUEST,
                DispatchError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(&e.to_string(), status).into_response()
        }
    }
}

// ── Ingest ─────────────────────────────────────────────────────

/// POST /api/v1/pools/upload
///
/// Snapshots missing an identity, host, or application cannot be
/// addressed later, so they are counted as rejected and skipped. The
/// rest of the batch is merged in one transaction.
pub async fn upload_snapshots(
    State(state): State<ApiState>,
    Json(batch): Json<Vec<PoolSnapshot>>,
) -> impl IntoResponse {
    let total = batch.len();
    let valid: Vec<PoolSnapshot> = batch
        .into_iter()
        .filter(is_addressable)
        .collect();
    let rejected = total - valid.len();
    if rejected > 0 {
        warn!(rejected, "snapshots without identity, host or application rejected");
    }

    match state.store.merge_batch(&valid) {
        Ok(outcomes) => {
            let stale = outcomes
                .iter()
                .filter(|o| **o == MergeOutcome::Stale)
                .count();
            debug!(accepted = valid.len(), rejected, stale, "snapshot batch ingested");
            Json(UploadAck {
                accepted: valid.len(),
                rejected,
            })
            .into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

fn is_addressable(snapshot: &PoolSnapshot) -> bool {
    !snapshot.identity.is_empty()
        && !snapshot.source_host.trim().is_empty()
        && !snapshot.source_application.trim().is_empty()
}
