//! Caller identity. The session layer in front of this service authenticates the user and
//! forwards who they are in two headers; those headers are trusted as-is.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use ulid::Ulid;

use crate::http::ApiError;
use crate::model::{ActingUser, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// `None` if either header is missing or malformed.
pub fn acting_user(headers: &HeaderMap) -> Option<ActingUser> {
    let id = header(headers, USER_ID_HEADER)?.parse::<Ulid>().ok()?;
    let role = header(headers, USER_ROLE_HEADER)?.parse::<Role>().ok()?;
    Some(ActingUser::new(id, role))
}

#[async_trait]
impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        acting_user(&parts.headers).ok_or_else(|| ApiError::unauthorized("Please log in first"))
    }
}
