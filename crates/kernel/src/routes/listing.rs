//! Listing API routes.
//!
//! - `GET  /api/listing/{resource}` runs a listing from query-string parameters
//! - `POST /api/listing/{resource}` runs a listing from a JSON body
//! - `GET  /api/listing/{resource}/capabilities` describes what a resource accepts

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::AppResult;
use crate::listing::{Capabilities, ListingError, ListingPage, ListingRequest};
use crate::state::AppState;

/// Create the listing router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/listing/{resource}",
            get(list_from_query).post(list_from_body),
        )
        .route("/api/listing/{resource}/capabilities", get(capabilities))
}

async fn list_from_query(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> AppResult<Json<ListingPage>> {
    let request = ListingRequest::from_query_pairs(params);
    run_listing(&state, &resource, &request).await
}

async fn list_from_body(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Json(request): Json<ListingRequest>,
) -> AppResult<Json<ListingPage>> {
    run_listing(&state, &resource, &request).await
}

async fn run_listing(
    state: &AppState,
    resource: &str,
    request: &ListingRequest,
) -> AppResult<Json<ListingPage>> {
    let started = Instant::now();
    let result = state.listings().get_results(resource, request).await;

    // Unknown names share one label to bound cardinality.
    let (label, outcome) = match &result {
        Ok(_) => (resource, "ok"),
        Err(ListingError::UnknownResource(_)) => ("unknown", "not_found"),
        Err(_) => (resource, "error"),
    };
    state
        .metrics()
        .record_listing(label, outcome, started.elapsed().as_secs_f64());

    Ok(Json(result?))
}

async fn capabilities(
    State(state): State<AppState>,
    Path(resource): Path<String>,
) -> AppResult<Json<Capabilities>> {
    Ok(Json(state.listings().capabilities(&resource)?))
}
