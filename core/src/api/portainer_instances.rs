//! `/api/portainer/instances` (spec §6.4): full CRUD over `PortainerInstance`.
//! Create/update/delete also keep [`AppState`]'s live client map in sync so
//! the scheduler and cache never dial a stale or deleted instance.

use axum::{
  Json, Router,
  extract::{Path, State},
  routing::{get, post},
};
use drydock_client::entities::portainer_instance::{PortainerInstance, PortainerInstanceInput};

use crate::{api::auth::SessionUser, db, error::AppError, state::AppState};

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/", get(list).post(create))
    .route("/{id}", post(update).delete(delete_one))
}

async fn list(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
) -> Result<Json<Vec<PortainerInstance>>, AppError> {
  Ok(Json(db::portainer_instances::list_for_user(&state.db, user_id).await?))
}

async fn create(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Json(input): Json<PortainerInstanceInput>,
) -> Result<Json<PortainerInstance>, AppError> {
  let instance = db::portainer_instances::create(&state.db, user_id, input).await?;
  state.insert_portainer_client(instance.clone());
  Ok(Json(instance))
}

async fn update(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(id): Path<i64>,
  Json(input): Json<PortainerInstanceInput>,
) -> Result<(), AppError> {
  db::portainer_instances::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("portainer instance not found"))?;
  db::portainer_instances::update(&state.db, user_id, id, input).await?;
  let updated = db::portainer_instances::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("portainer instance not found"))?;
  state.insert_portainer_client(updated);
  Ok(())
}

async fn delete_one(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(id): Path<i64>,
) -> Result<(), AppError> {
  db::portainer_instances::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("portainer instance not found"))?;
  db::portainer_instances::delete(&state.db, user_id, id).await?;
  state.remove_portainer_client(id);
  Ok(())
}
