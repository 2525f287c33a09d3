use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::{BookingFilter, NewBooking};
use crate::model::{ActingUser, BookingStatus, Role};

use super::{parse_id, ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingBody {
    listing_id: Option<String>,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
    guests: Option<u32>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    role: Option<Role>,
    status: Option<BookingStatus>,
}

pub async fn create(
    State(state): State<AppState>,
    actor: ActingUser,
    body: Result<Json<CreateBookingBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body?;
    let (Some(listing_id), Some(check_in), Some(check_out), Some(guests)) =
        (body.listing_id, body.check_in, body.check_out, body.guests)
    else {
        return Err(ApiError::missing_fields());
    };
    let req = NewBooking {
        listing_id: parse_id(&listing_id, "listing")?,
        check_in,
        check_out,
        guests,
        message: body.message.filter(|m| !m.trim().is_empty()),
    };
    let booking = state.engine.create_booking(&actor, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Booking request sent", "booking": booking })),
    ))
}

pub async fn index(
    State(state): State<AppState>,
    actor: ActingUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let filter = BookingFilter {
        role: query.role,
        status: query.status,
    };
    let bookings = state.engine.list_bookings(&actor, &filter).await;
    Ok(Json(json!({ "bookings": bookings })))
}

pub async fn mine(State(state): State<AppState>, actor: ActingUser) -> Json<Value> {
    let bookings = state.engine.my_bookings(&actor).await;
    Json(json!({ "count": bookings.len(), "bookings": bookings }))
}

pub async fn history(State(state): State<AppState>, actor: ActingUser) -> Json<Value> {
    let bookings = state.engine.traveler_history(&actor).await;
    Json(json!({ "bookings": bookings }))
}

pub async fn show(
    State(state): State<AppState>,
    actor: ActingUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "booking")?;
    let booking = state.engine.get_booking(&id, &actor).await?;
    Ok(Json(json!({ "booking": booking })))
}

pub async fn accept(
    State(state): State<AppState>,
    actor: ActingUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "booking")?;
    let booking = state.engine.accept_booking(id, &actor).await?;
    Ok(Json(json!({ "message": "Booking accepted and dates blocked", "booking": booking })))
}

pub async fn reject(
    State(state): State<AppState>,
    actor: ActingUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "booking")?;
    let booking = state.engine.reject_booking(id, &actor).await?;
    Ok(Json(json!({ "message": "Booking rejected", "booking": booking })))
}

pub async fn cancel(
    State(state): State<AppState>,
    actor: ActingUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "booking")?;
    let booking = state.engine.cancel_booking(id, &actor).await?;
    Ok(Json(json!({ "message": "Booking cancelled and dates released", "booking": booking })))
}
