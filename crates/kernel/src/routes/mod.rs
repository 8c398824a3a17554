//! HTTP route handlers.

pub mod health;
pub mod listing;
pub mod metrics;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Every route, with request tracing, bound to `state`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(listing::router())
        .merge(metrics::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
