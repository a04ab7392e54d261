//! `/api/webhooks`: management surface for the notification sinks `notify::publish`
//! fans out to (spec §6.3 "user-configured webhook URLs"). Not in spec §6.4's
//! representative route list, but the list is explicitly non-exhaustive and
//! webhook rows otherwise have no way to be created.

use axum::{
  Json, Router,
  extract::{Path, State},
  routing::get,
};
use drydock_client::entities::notification::{Webhook, WebhookInput};
use serde::Deserialize;

use crate::{api::auth::SessionUser, db, error::AppError, state::AppState};

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/", get(list).post(create))
    .route("/{id}", axum::routing::post(toggle).delete(delete_one))
}

async fn list(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
) -> Result<Json<Vec<Webhook>>, AppError> {
  Ok(Json(db::notifications::list_for_user(&state.db, user_id).await?))
}

async fn create(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Json(input): Json<WebhookInput>,
) -> Result<Json<Webhook>, AppError> {
  Ok(Json(
    db::notifications::create_webhook(&state.db, user_id, &input.name, &input.url).await?,
  ))
}

#[derive(Deserialize)]
struct ToggleRequest {
  enabled: bool,
}

async fn toggle(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(id): Path<i64>,
  Json(req): Json<ToggleRequest>,
) -> Result<(), AppError> {
  db::notifications::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("webhook not found"))?;
  db::notifications::set_enabled(&state.db, user_id, id, req.enabled).await?;
  Ok(())
}

async fn delete_one(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(id): Path<i64>,
) -> Result<(), AppError> {
  db::notifications::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("webhook not found"))?;
  db::notifications::delete_webhook(&state.db, user_id, id).await?;
  Ok(())
}
