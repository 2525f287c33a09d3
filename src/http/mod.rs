mod bookings;
mod error;
mod favorites;
mod listings;
mod users;

pub use error::ApiError;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use ulid::Ulid;

use crate::engine::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(engine: Arc<Engine>) -> Router {
    let state = AppState { engine };
    Router::new()
        .route("/health", get(health))
        .route("/users", post(users::register))
        .route("/users/:id", get(users::get))
        .route("/profile", get(users::profile).put(users::update_profile))
        .route(
            "/owner/listings",
            get(listings::owner_index).post(listings::create),
        )
        .route(
            "/owner/listings/:id",
            get(listings::owner_show)
                .put(listings::update)
                .delete(listings::remove),
        )
        .route("/listings", get(listings::search))
        .route("/listings/:id", get(listings::show))
        .route("/listings/:id/availability", get(listings::availability))
        .route("/bookings", get(bookings::index).post(bookings::create))
        .route("/bookings/my", get(bookings::mine))
        .route("/bookings/history/traveler", get(bookings::history))
        .route("/bookings/:id", get(bookings::show))
        .route("/bookings/:id/accept", put(bookings::accept))
        .route("/bookings/:id/reject", put(bookings::reject))
        .route("/bookings/:id/cancel", put(bookings::cancel))
        .route("/favorites", get(favorites::index).post(favorites::add))
        .route("/favorites/check/:listing_id", get(favorites::check))
        .route("/favorites/:listing_id", axum::routing::delete(favorites::remove))
        .layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

/// Request count and latency, labelled by the matched route rather than the raw path.
async fn track_metrics(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        crate::observability::HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        crate::observability::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method,
        "route" => route
    )
    .record(started.elapsed().as_secs_f64());
    response
}

/// Parse a ULID path segment.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Ulid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid {what} id: {raw}")))
}
