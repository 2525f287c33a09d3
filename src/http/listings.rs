use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::{ListingFilter, ListingPatch, NewListing};
use crate::model::{ActingUser, Availability, ListingStatus, PropertyType, Role};

use super::{parse_id, ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingBody {
    title: Option<String>,
    description: Option<String>,
    property_type: Option<PropertyType>,
    city: Option<String>,
    country: Option<String>,
    address: Option<String>,
    price_per_night: Option<Decimal>,
    max_guests: Option<u32>,
    bedrooms: Option<u32>,
    bathrooms: Option<Decimal>,
    amenities: Option<Vec<String>>,
    status: Option<ListingStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    city: Option<String>,
    location: Option<String>,
    guests: Option<u32>,
    min_price: Option<Decimal>,
    max_price: Option<Decimal>,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
}

fn require_owner(actor: &ActingUser) -> Result<(), ApiError> {
    if actor.role != Role::Owner {
        return Err(ApiError::forbidden("Owner access required"));
    }
    Ok(())
}

pub async fn create(
    State(state): State<AppState>,
    actor: ActingUser,
    body: Result<Json<ListingBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_owner(&actor)?;
    let Json(body) = body?;
    let (Some(title), Some(city), Some(price_per_night), Some(max_guests)) =
        (body.title, body.city, body.price_per_night, body.max_guests)
    else {
        return Err(ApiError::missing_fields());
    };
    let new = NewListing {
        title,
        description: body.description,
        property_type: body.property_type,
        city,
        country: body.country,
        address: body.address,
        price_per_night,
        max_guests,
        bedrooms: body.bedrooms,
        bathrooms: body.bathrooms,
        amenities: body.amenities.unwrap_or_default(),
    };
    let listing = state.engine.create_listing(&actor, new).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Listing created", "listing": listing })),
    ))
}

pub async fn owner_index(
    State(state): State<AppState>,
    actor: ActingUser,
) -> Result<Json<Value>, ApiError> {
    require_owner(&actor)?;
    let listings = state.engine.owner_listings(&actor).await;
    Ok(Json(json!({ "listings": listings })))
}

pub async fn owner_show(
    State(state): State<AppState>,
    actor: ActingUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    require_owner(&actor)?;
    let id = parse_id(&id, "listing")?;
    let listing = state.engine.owner_listing(&id, &actor).await?;
    Ok(Json(json!({ "listing": listing })))
}

pub async fn update(
    State(state): State<AppState>,
    actor: ActingUser,
    Path(id): Path<String>,
    body: Result<Json<ListingBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    require_owner(&actor)?;
    let id = parse_id(&id, "listing")?;
    let Json(body) = body?;
    let patch = ListingPatch {
        title: body.title,
        description: body.description,
        property_type: body.property_type,
        city: body.city,
        country: body.country,
        address: body.address,
        price_per_night: body.price_per_night,
        max_guests: body.max_guests,
        bedrooms: body.bedrooms,
        bathrooms: body.bathrooms,
        amenities: body.amenities,
        status: body.status,
    };
    let listing = state.engine.update_listing(id, &actor, patch).await?;
    Ok(Json(json!({ "message": "Listing updated", "listing": listing })))
}

pub async fn remove(
    State(state): State<AppState>,
    actor: ActingUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    require_owner(&actor)?;
    let id = parse_id(&id, "listing")?;
    state.engine.delete_listing(id, &actor).await?;
    Ok(Json(json!({ "message": "Listing deleted" })))
}

pub async fn search(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(q) = query?;
    let filter = ListingFilter {
        city: q.location.or(q.city).filter(|c| !c.trim().is_empty()),
        guests: q.guests,
        min_price: q.min_price,
        max_price: q.max_price,
        check_in: q.check_in,
        check_out: q.check_out,
    };
    let listings = state.engine.search_listings(&filter).await?;
    tracing::debug!(results = listings.len(), "listing search");
    Ok(Json(json!({
        "success": true,
        "count": listings.len(),
        "listings": listings,
    })))
}

pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "listing")?;
    let listing = state.engine.get_listing(&id).await?;
    Ok(Json(json!({ "success": true, "listing": listing })))
}

pub async fn availability(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> Result<Json<Availability>, ApiError> {
    let id = parse_id(&id, "listing")?;
    let Query(q) = query?;
    let (Some(check_in), Some(check_out)) = (q.check_in, q.check_out) else {
        return Err(ApiError::bad_request("Check-in and check-out dates required"));
    };
    let availability = state
        .engine
        .check_availability(&id, check_in, check_out)
        .await?;
    Ok(Json(availability))
}
