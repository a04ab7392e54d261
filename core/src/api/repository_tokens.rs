//! `/api/repository-access-tokens` (spec §6.4): CRUD plus `associate-images`,
//! which retroactively points a repo/tag's `deployed_images` rows at a token
//! so the registry client picks it up on the next check.

use axum::{
  Json, Router,
  extract::{Path, State},
  routing::post,
};
use drydock_client::entities::repository_token::{RepositoryAccessToken, RepositoryAccessTokenInput};
use serde::Deserialize;

use crate::{api::auth::SessionUser, db, error::AppError, state::AppState};

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/", axum::routing::get(list).post(create))
    .route("/{id}", post(update).delete(delete_one))
    .route("/{id}/associate-images", post(associate_images))
}

async fn list(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
) -> Result<Json<Vec<RepositoryAccessToken>>, AppError> {
  Ok(Json(db::repository_tokens::list_for_user(&state.db, user_id).await?))
}

async fn create(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Json(input): Json<RepositoryAccessTokenInput>,
) -> Result<Json<RepositoryAccessToken>, AppError> {
  Ok(Json(db::repository_tokens::create(&state.db, user_id, input).await?))
}

async fn update(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(id): Path<i64>,
  Json(input): Json<RepositoryAccessTokenInput>,
) -> Result<(), AppError> {
  db::repository_tokens::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("repository access token not found"))?;
  db::repository_tokens::update(&state.db, user_id, id, input).await?;
  Ok(())
}

async fn delete_one(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(id): Path<i64>,
) -> Result<(), AppError> {
  db::repository_tokens::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("repository access token not found"))?;
  db::repository_tokens::delete(&state.db, user_id, id).await?;
  Ok(())
}

#[derive(Deserialize)]
struct AssociateImagesRequest {
  image_repo: String,
  image_tag: String,
}

async fn associate_images(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(id): Path<i64>,
  Json(req): Json<AssociateImagesRequest>,
) -> Result<(), AppError> {
  db::repository_tokens::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("repository access token not found"))?;
  state
    .db
    .write(|conn| Box::pin(async move {
      db::deployed_images::associate_token(conn, user_id, &req.image_repo, &req.image_tag, Some(id)).await
    }))
    .await?;
  state.cache.invalidate_user(user_id);
  Ok(())
}
