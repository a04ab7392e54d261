//! Session boundary (spec §6.4 "all endpoints require a session token").
//!
//! Account management itself -- creating users, password resets, OAuth --
//! is out of scope (spec §1 Non-goals); this module only issues and
//! verifies the opaque bearer token every other handler checks. Grounded
//! on the teacher's `auth/local.rs` for the bcrypt verify step, reworked
//! around this crate's UUID session tokens rather than a JWT.

use axum::{
  Json, Router,
  extract::{FromRef, FromRequestParts, State},
  http::request::Parts,
  routing::post,
};
use drydock_client::entities::user::Session;
use serde::Deserialize;

use crate::{db, error::AppError, state::AppState};

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/login", post(login))
    .route("/logout", post(logout))
}

#[derive(Deserialize)]
struct LoginRequest {
  username: String,
  password: String,
}

async fn login(
  State(state): State<AppState>,
  Json(req): Json<LoginRequest>,
) -> Result<Json<Session>, AppError> {
  let user = db::users::find_by_username(&state.db, &req.username)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid username or password"))?;
  let verified = bcrypt::verify(&req.password, &user.password_hash)
    .map_err(|e| AppError::unauthorized(format!("malformed password hash: {e}")))?;
  if !verified {
    return Err(AppError::unauthorized("invalid username or password"));
  }
  let session = db::sessions::create(&state.db, user.id).await?;
  Ok(Json(session))
}

async fn logout(SessionUser { token, .. }: SessionUser, State(state): State<AppState>) -> Result<(), AppError> {
  db::sessions::delete(&state.db, &token).await?;
  Ok(())
}

/// Identity of the caller, extracted from `Authorization: Bearer <token>`
/// (spec §6.4). Every handler that touches user-scoped data takes this
/// instead of a raw user id path/query parameter, so there is no way to
/// forget the ownership check.
pub struct SessionUser {
  pub user_id: i64,
  pub token: String,
}

impl<S> FromRequestParts<S> for SessionUser
where
  AppState: axum::extract::FromRef<S>,
  S: Send + Sync,
{
  type Rejection = AppError;

  async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
    let state = AppState::from_ref(state);
    let header = parts
      .headers
      .get(axum::http::header::AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .ok_or_else(|| AppError::unauthorized("missing Authorization header"))?;
    let token = header
      .strip_prefix("Bearer ")
      .ok_or_else(|| AppError::unauthorized("expected a Bearer token"))?
      .to_string();
    let session = db::sessions::find_valid(&state.db, &token)
      .await?
      .ok_or_else(|| AppError::unauthorized("session expired or invalid"))?;
    Ok(SessionUser { user_id: session.user_id, token })
  }
}
