use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::model::ActingUser;

use super::{parse_id, ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFavoriteBody {
    listing_id: Option<String>,
}

pub async fn add(
    State(state): State<AppState>,
    actor: ActingUser,
    body: Result<Json<AddFavoriteBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body?;
    let Some(listing_id) = body.listing_id else {
        return Err(ApiError::bad_request("Listing ID is required"));
    };
    let listing_id = parse_id(&listing_id, "listing")?;
    let favorite = state.engine.add_favorite(&actor, listing_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Added to favorites", "favorite": favorite })),
    ))
}

pub async fn index(State(state): State<AppState>, actor: ActingUser) -> Json<Value> {
    let favorites = state.engine.list_favorites(&actor).await;
    Json(json!({ "count": favorites.len(), "favorites": favorites }))
}

pub async fn remove(
    State(state): State<AppState>,
    actor: ActingUser,
    Path(listing_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let listing_id = parse_id(&listing_id, "listing")?;
    state.engine.remove_favorite(&actor, listing_id).await?;
    Ok(Json(json!({ "message": "Removed from favorites" })))
}

pub async fn check(
    State(state): State<AppState>,
    actor: ActingUser,
    Path(listing_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let listing_id = parse_id(&listing_id, "listing")?;
    Ok(Json(json!({ "isFavorite": state.engine.is_favorite(&actor, &listing_id) })))
}
