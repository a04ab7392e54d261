//! `/api/tracked-apps` (spec §6.4): CRUD over release streams watched
//! independently of any running container.

use axum::{
  Json, Router,
  extract::{Path, State},
  routing::post,
};
use drydock_client::entities::tracked_app::{TrackedApp, TrackedAppInput};

use crate::{api::auth::SessionUser, db, error::AppError, state::AppState};

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/", axum::routing::get(list).post(create))
    .route("/{id}", post(update).delete(delete_one))
}

async fn list(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
) -> Result<Json<Vec<TrackedApp>>, AppError> {
  Ok(Json(db::tracked_apps::list_for_user(&state.db, user_id).await?))
}

async fn create(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Json(input): Json<TrackedAppInput>,
) -> Result<Json<TrackedApp>, AppError> {
  Ok(Json(db::tracked_apps::create(&state.db, user_id, input).await?))
}

async fn update(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(id): Path<i64>,
  Json(input): Json<TrackedAppInput>,
) -> Result<(), AppError> {
  db::tracked_apps::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("tracked app not found"))?;
  db::tracked_apps::update(&state.db, user_id, id, input).await?;
  Ok(())
}

async fn delete_one(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(id): Path<i64>,
) -> Result<(), AppError> {
  db::tracked_apps::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("tracked app not found"))?;
  db::tracked_apps::delete(&state.db, user_id, id).await?;
  Ok(())
}
