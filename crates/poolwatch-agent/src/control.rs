//! Control endpoint — receives parameter changes from the collector and
//! applies them to live pools.
//!
//! `POST /api/v1/pool/modify` with a [`ControlRequest`] body. Every reply,
//! including errors, carries a [`ControlResponse`] body.
//!
//! | Condition                         | Status |
//! |-----------------------------------|--------|
//! | Applied (or nothing to change)    | 200    |
//! | Empty or malformed body           | 400    |
//! | Change would leave core > max     | 400    |
//! | Unknown or stale pool             | 404    |
//! | Any method other than POST        | 405    |
//! | Unexpected handle failure         | 500    |
//!
//! At most `concurrency` requests are handled at once; the rest wait for a
//! slot.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Json;
use poolwatch_core::{
    CONTROL_PATH, ControlRequest, ControlResponse, ParameterChange, PoolIdentity, PoolParameters,
    SourceInfo,
};
use thiserror::Error;
use tokio::sync::Semaphore;
use tower::limit::GlobalConcurrencyLimitLayer;
use tracing::{info, warn};

use crate::handle::{HandleError, HandleResult, PoolHandle};
use crate::registry::PoolRegistry;

/// Why a change was not applied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("thread pool {0} not found")]
    PoolNotFound(PoolIdentity),

    #[error("{0}")]
    Validation(String),

    #[error("failed to modify thread pool: {0}")]
    Internal(String),
}

impl ControlError {
    pub fn status(&self) -> StatusCode {
        match self {
            ControlError::PoolNotFound(_) => StatusCode::NOT_FOUND,
            ControlError::Validation(_) => StatusCode::BAD_REQUEST,
            ControlError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Apply `change` to the pool registered under `identity`.
///
/// Fields ≤ 0 are left alone. The resolved combination is validated
/// before anything is written, so a rejected change never mutates the
/// pool. Returns the values read back after the writes.
pub fn apply_change(
    registry: &PoolRegistry,
    identity: &PoolIdentity,
    change: ParameterChange,
) -> Result<PoolParameters, ControlError> {
    let handle = registry
        .get(identity)
        .ok_or_else(|| ControlError::PoolNotFound(identity.clone()))?;
    // The combination is validated up front, so a handle refusing a
    // write here is unexpected.
    let as_control = |e: HandleError| match e {
        HandleError::Stale => ControlError::PoolNotFound(identity.clone()),
        HandleError::InvalidParameter(msg) => ControlError::Internal(msg),
    };

    let current = read_parameters(handle.as_ref()).map_err(as_control)?;
    if change.is_noop() {
        return Ok(current);
    }

    let target = change.resolve(&current);
    if target.core_pool_size > target.maximum_pool_size {
        return Err(ControlError::Validation(format!(
            "corePoolSize {} exceeds maximumPoolSize {}",
            target.core_pool_size, target.maximum_pool_size
        )));
    }

    write_parameters(handle.as_ref(), &change, &current, &target).map_err(as_control)?;
    let applied = read_parameters(handle.as_ref()).map_err(as_control)?;

    info!(
        %identity,
        core_pool_size = applied.core_pool_size,
        maximum_pool_size = applied.maximum_pool_size,
        keep_alive_time_millis = applied.keep_alive_time_millis,
        "pool parameters modified"
    );
    Ok(applied)
}

fn read_parameters(handle: &dyn PoolHandle) -> HandleResult<PoolParameters> {
    Ok(PoolParameters {
        core_pool_size: handle.core_pool_size()?,
        maximum_pool_size: handle.maximum_pool_size()?,
        keep_alive_time_millis: handle.keep_alive_time()?.as_millis() as u64,
    })
}

// Order the size writes so no intermediate state has core > max: grow max
// before core, shrink core before max.
fn write_parameters(
    handle: &dyn PoolHandle,
    change: &ParameterChange,
    current: &PoolParameters,
    target: &PoolParameters,
) -> HandleResult<()> {
    let set_core = || match change.core_pool_size() {
        Some(size) => handle.set_core_pool_size(size),
        None => Ok(()),
    };
    let set_max = || match change.maximum_pool_size() {
        Some(size) => handle.set_maximum_pool_size(size),
        None => Ok(()),
    };

    if target.maximum_pool_size >= current.maximum_pool_size {
        set_max()?;
        set_core()?;
    } else {
        set_core()?;
        set_max()?;
    }

    if let Some(millis) = change.keep_alive_time_millis() {
        handle.set_keep_alive_time(Duration::from_millis(millis))?;
    }
    Ok(())
}

// ── HTTP ───────────────────────────────────────────────────────

#[derive(Clone)]
struct ControlState {
    registry: Arc<PoolRegistry>,
    source: SourceInfo,
}

/// Build the agent's control router, handling at most `concurrency`
/// requests at once.
pub fn control_router(registry: Arc<PoolRegistry>, source: SourceInfo, concurrency: usize) -> Router {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    limited_router(registry, source, permits)
}

fn limited_router(registry: Arc<PoolRegistry>, source: SourceInfo, permits: Arc<Semaphore>) -> Router {
    Router::new()
        .route(CONTROL_PATH, any(modify_pool))
        .layer(GlobalConcurrencyLimitLayer::with_semaphore(permits))
        .with_state(ControlState { registry, source })
}

fn reply(status: StatusCode, message: impl Into<String>, parameters: Option<PoolParameters>) -> Response {
    (
        status,
        Json(ControlResponse {
            code: status.as_u16(),
            message: message.into(),
            parameters,
        }),
    )
        .into_response()
}

/// ANY /api/v1/pool/modify
async fn modify_pool(State(state): State<ControlState>, method: Method, body: Bytes) -> Response {
    if method != Method::POST {
        return reply(StatusCode::METHOD_NOT_ALLOWED, "method not allowed", None);
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return reply(StatusCode::BAD_REQUEST, "request body is empty", None);
    }

    let request: ControlRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return reply(StatusCode::BAD_REQUEST, format!("malformed request: {e}"), None);
        }
    };

    let identity = request.thread_pool_id.clone();
    match apply_change(&state.registry, &identity, request.change()) {
        Ok(applied) => reply(StatusCode::OK, "thread pool modified", Some(applied)),
        Err(e) => {
            warn!(
                %identity,
                host = %state.source.host,
                application = %state.source.application,
                status = e.status().as_u16(),
                error = %e,
                "pool modification rejected"
            );
            reply(e.status(), e.to_string(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePool;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn registry_with(id: &str, pool: &Arc<FakePool>) -> Arc<PoolRegistry> {
        let registry = Arc::new(PoolRegistry::new());
        let handle: Arc<dyn PoolHandle> = pool.clone();
        registry.register(id.into(), &handle);
        registry
    }

    fn source() -> SourceInfo {
        SourceInfo::new("10.0.0.1", "billing")
    }

    fn request(method: Method, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(CONTROL_PATH)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(registry: Arc<PoolRegistry>, method: Method, body: &str) -> (StatusCode, ControlResponse) {
        let resp = control_router(registry, source(), 4)
            .oneshot(request(method, body))
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    // ── apply_change ──────────────────────────────────────────

    #[test]
    fn applies_only_positive_fields() {
        let pool = FakePool::shared(5, 10, 60_000);
        let registry = registry_with("p1", &pool);

        let applied = apply_change(&registry, &"p1".into(), ParameterChange::new(8, -1, 0)).unwrap();
        assert_eq!(
            applied,
            PoolParameters {
                core_pool_size: 8,
                maximum_pool_size: 10,
                keep_alive_time_millis: 60_000,
            }
        );
    }

    #[test]
    fn raising_both_above_old_max_succeeds() {
        let pool = FakePool::shared(5, 10, 60_000);
        let registry = registry_with("p1", &pool);

        let applied =
            apply_change(&registry, &"p1".into(), ParameterChange::new(15, 20, 30_000)).unwrap();
        assert_eq!(applied.core_pool_size, 15);
        assert_eq!(applied.maximum_pool_size, 20);
        assert_eq!(applied.keep_alive_time_millis, 30_000);
    }

    #[test]
    fn lowering_both_below_old_core_succeeds() {
        let pool = FakePool::shared(5, 10, 60_000);
        let registry = registry_with("p1", &pool);

        let applied = apply_change(&registry, &"p1".into(), ParameterChange::new(1, 2, -1)).unwrap();
        assert_eq!(applied.core_pool_size, 1);
        assert_eq!(applied.maximum_pool_size, 2);
    }

    #[test]
    fn core_above_max_is_rejected_without_mutation() {
        let pool = FakePool::shared(5, 10, 60_000);
        let registry = registry_with("p1", &pool);

        let err = apply_change(&registry, &"p1".into(), ParameterChange::new(12, -1, 5)).unwrap_err();
        assert!(matches!(err, ControlError::Validation(_)));
        assert_eq!(pool.core_pool_size().unwrap(), 5);
        assert_eq!(pool.keep_alive_time().unwrap(), Duration::from_millis(60_000));
    }

    #[test]
    fn noop_returns_current_values() {
        let pool = FakePool::shared(5, 10, 60_000);
        let registry = registry_with("p1", &pool);

        let applied = apply_change(&registry, &"p1".into(), ParameterChange::new(0, 0, -3)).unwrap();
        assert_eq!(
            applied,
            PoolParameters {
                core_pool_size: 5,
                maximum_pool_size: 10,
                keep_alive_time_millis: 60_000,
            }
        );
        assert_eq!(pool.core_pool_size().unwrap(), 5);
        assert_eq!(pool.maximum_pool_size().unwrap(), 10);
        assert_eq!(pool.keep_alive_time().unwrap(), Duration::from_millis(60_000));
    }

    #[test]
    fn unknown_and_stale_pools_are_not_found() {
        let pool = FakePool::shared(5, 10, 60_000);
        let registry = registry_with("p1", &pool);

        let err = apply_change(&registry, &"nope".into(), ParameterChange::new(1, 1, 1)).unwrap_err();
        assert_eq!(err, ControlError::PoolNotFound("nope".into()));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&"p1".into()).is_some());
        assert!(registry.get(&"nope".into()).is_none());
        assert_eq!(pool.core_pool_size().unwrap(), 5);
        assert_eq!(pool.maximum_pool_size().unwrap(), 10);
        assert_eq!(pool.keep_alive_time().unwrap(), Duration::from_millis(60_000));

        pool.mark_stale();
        let err = apply_change(&registry, &"p1".into(), ParameterChange::new(1, 1, 1)).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    // ── HTTP ──────────────────────────────────────────────────

    #[tokio::test]
    async fn post_modifies_pool() {
        let pool = FakePool::shared(5, 10, 60_000);
        let registry = registry_with("p1", &pool);

        let (status, body) = call(
            registry,
            Method::POST,
            r#"{"threadPoolId":"p1","corePoolSize":8,"maximumPoolSize":-1,"keepAliveTime":-1}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.code, 200);
        assert_eq!(body.parameters.unwrap().core_pool_size, 8);
        assert_eq!(pool.core_pool_size().unwrap(), 8);
        assert_eq!(pool.maximum_pool_size().unwrap(), 10);
    }

    #[tokio::test]
    async fn get_is_method_not_allowed() {
        let pool = FakePool::shared(5, 10, 60_000);
        let (status, body) = call(registry_with("p1", &pool), Method::GET, "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body.code, 405);
    }

    #[tokio::test]
    async fn empty_body_is_bad_request() {
        let pool = FakePool::shared(5, 10, 60_000);
        let (status, body) = call(registry_with("p1", &pool), Method::POST, "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, 400);
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let pool = FakePool::shared(5, 10, 60_000);
        let (status, _) = call(registry_with("p1", &pool), Method::POST, "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_pool_is_not_found() {
        let pool = FakePool::shared(5, 10, 60_000);
        let (status, body) = call(
            registry_with("p1", &pool),
            Method::POST,
            r#"{"threadPoolId":"nope","corePoolSize":8}"#,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.message.contains("nope"));
    }

    #[tokio::test]
    async fn invalid_combination_is_bad_request() {
        let pool = FakePool::shared(5, 10, 60_000);
        let (status, _) = call(
            registry_with("p1", &pool),
            Method::POST,
            r#"{"threadPoolId":"p1","corePoolSize":20}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(pool.core_pool_size().unwrap(), 5);
    }

    #[tokio::test]
    async fn requests_beyond_the_limit_wait_for_a_slot() {
        let pool = FakePool::shared(5, 10, 60_000);
        let registry = registry_with("p1", &pool);
        let permits = Arc::new(Semaphore::new(1));
        let router = limited_router(registry, source(), permits.clone());

        let held = permits.clone().acquire_owned().await.unwrap();
        let pending = tokio::spawn(router.oneshot(request(
            Method::POST,
            r#"{"threadPoolId":"p1","corePoolSize":8}"#,
        )));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!pending.is_finished());
        assert_eq!(pool.core_pool_size().unwrap(), 5);

        drop(held);
        let resp = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(pool.core_pool_size().unwrap(), 8);
        assert_eq!(permits.available_permits(), 1);
    }
}
