//! poolwatch-collector — central ingest and control for poolwatch agents.
//!
//! Agents push snapshot batches to the upload route; operators read the
//! merged records and request parameter changes, which the
//! [`CommandDispatcher`] forwards to the owning agent.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/pools` | List all pool records |
//! | GET | `/api/v1/pools/{host}/{application}/{id}` | Get one pool record |
//! | PUT | `/api/v1/pools/{host}/{application}/{id}` | Request a parameter change |
//! | POST | `/api/v1/pools/upload` | Ingest a snapshot batch (agent-facing) |
//!
//! Operator routes wrap their payload in `{success, data, error}`. The
//! upload route answers with a bare `UploadAck`.

pub mod dispatcher;
pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use poolwatch_state::CollectorStore;

pub use dispatcher::{CommandDispatcher, DispatchError, DispatchResult, DispatcherConfig};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: CollectorStore,
    pub dispatcher: CommandDispatcher,
}

/// Build the collector router.
pub fn build_router(store: CollectorStore, dispatcher: CommandDispatcher) -> Router {
    let api_state = ApiState { store, dispatcher };

    let api_routes = Router::new()
        .route("/pools", get(handlers::list_pools))
        .route("/pools/upload", post(handlers::upload_snapshots))
        .route(
            "/pools/{host}/{application}/{id}",
            get(handlers::get_pool).put(handlers::change_pool),
        )
        .with_state(api_state);

    Router::new().nest("/api/v1", api_routes)
}
