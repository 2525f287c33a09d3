use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::{NewUser, ProfilePatch};
use crate::model::{ActingUser, Role};

use super::{parse_id, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    name: Option<String>,
    email: Option<String>,
    role: Option<Role>,
    phone: Option<String>,
    city: Option<String>,
    country: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body?;
    let (Some(name), Some(email)) = (body.name, body.email) else {
        return Err(ApiError::missing_fields());
    };
    let new = NewUser {
        name,
        email,
        role: body.role.unwrap_or(Role::Traveler),
        phone: body.phone,
        city: body.city,
        country: body.country,
    };
    let user = state.engine.register_user(new).await?;
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "user")?;
    let user = state.engine.get_user(&id)?;
    Ok(Json(json!({ "user": user })))
}

#[derive(Debug, Deserialize)]
pub struct ProfileBody {
    name: Option<String>,
    phone: Option<String>,
    city: Option<String>,
    country: Option<String>,
}

pub async fn profile(
    State(state): State<AppState>,
    actor: ActingUser,
) -> Result<Json<Value>, ApiError> {
    let user = state.engine.get_user(&actor.id)?;
    Ok(Json(json!({ "user": user })))
}

pub async fn update_profile(
    State(state): State<AppState>,
    actor: ActingUser,
    body: Result<Json<ProfileBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let patch = ProfilePatch {
        name: body.name,
        phone: body.phone,
        city: body.city,
        country: body.country,
    };
    let user = state.engine.update_profile(&actor, patch).await?;
    Ok(Json(json!({ "user": user })))
}
