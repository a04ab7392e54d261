//! `/api/containers` (spec §4.5, §6.4): reads go through [`ContainerCache`],
//! the manual upgrade route bypasses the intent engine entirely and drives
//! [`PortainerClient::recreate_container`] directly.

use axum::{
  Json, Router,
  extract::{Path, Query, State},
  routing::{get, post},
};
use drydock_client::entities::container::ContainerWithUpdateInfo;
use serde::{Deserialize, Serialize};

use crate::{api::auth::SessionUser, db, error::AppError, state::AppState};

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/", get(list))
    .route("/{container_id}/upgrade", post(upgrade))
}

#[derive(Deserialize)]
struct ListParams {
  portainer_instance_id: Option<i64>,
  #[serde(default)]
  force_refresh: bool,
}

#[derive(Serialize)]
struct ListResponse {
  containers: Vec<ContainerWithUpdateInfo>,
  stale: bool,
}

async fn list(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, AppError> {
  let clients = state.portainer_clients_snapshot();
  let cached = state
    .cache
    .read(&state.db, &clients, user_id, params.portainer_instance_id, params.force_refresh)
    .await?;
  Ok(Json(ListResponse { containers: cached.containers, stale: cached.stale }))
}

/// Manual single-container upgrade (spec §4.5): recreates `container_id` on
/// its own Portainer instance using the latest known digest, independent of
/// any intent. Invalidates the cache on success so the next read reflects
/// the new container.
async fn upgrade(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(container_id): Path<i64>,
) -> Result<(), AppError> {
  let container = db::containers::list_for_user(&state.db, user_id)
    .await?
    .into_iter()
    .find(|c| c.id == container_id)
    .ok_or_else(|| AppError::not_found("container not found"))?;

  let with_update = db::containers::with_update_info(&state.db, user_id, Some(container.portainer_instance_id))
    .await?
    .into_iter()
    .find(|c| c.container.id == container_id)
    .ok_or_else(|| AppError::not_found("container not found"))?;

  let latest_digest = with_update
    .latest_digest
    .clone()
    .ok_or_else(|| AppError::conflict("no newer image digest is known for this container"))?;
  let new_image = format!("{}@{latest_digest}", container.image_repo);

  let client = state
    .portainer_client(container.portainer_instance_id)
    .ok_or_else(|| AppError::conflict("no portainer client configured for this instance"))?;

  client
    .recreate_container(container.endpoint_id, &container.container_id, &new_image)
    .await?;

  state.cache.invalidate_user(user_id);
  Ok(())
}
