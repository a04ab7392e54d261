//! `/api/intents` (spec §6.4): CRUD over auto-upgrade policies, plus
//! `toggle`, a dry-run `test-match`, and their execution history. The
//! sibling `/api/intent-executions/{id}/containers` route lives here too
//! since it shares the same owning-intent lookup.

use axum::{
  Json, Router,
  extract::{Path, State},
  routing::{get, post},
};
use drydock_client::entities::{
  intent::{Intent, IntentInput, MatchCandidate},
  intent_execution::{IntentExecution, IntentExecutionContainer},
};
use serde::{Deserialize, Serialize};

use crate::{api::auth::SessionUser, db, error::AppError, intent, state::AppState};

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/", get(list).post(create))
    .route("/{id}", post(update).delete(delete_one))
    .route("/{id}/toggle", post(toggle))
    .route("/{id}/test-match", post(test_match))
    .route("/{id}/executions", get(executions))
}

/// Mounted at `/api/intent-executions`, separate from the `/api/intents`
/// tree (spec §6.4).
pub fn executions_router() -> Router<AppState> {
  Router::new().route("/{id}/containers", get(execution_containers))
}

async fn list(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
) -> Result<Json<Vec<Intent>>, AppError> {
  Ok(Json(db::intents::list_for_user(&state.db, user_id).await?))
}

async fn create(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Json(input): Json<IntentInput>,
) -> Result<Json<Intent>, AppError> {
  Ok(Json(db::intents::create(&state.db, user_id, input).await?))
}

async fn update(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(id): Path<i64>,
  Json(input): Json<IntentInput>,
) -> Result<(), AppError> {
  db::intents::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("intent not found"))?;
  db::intents::update(&state.db, user_id, id, input).await?;
  Ok(())
}

async fn delete_one(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(id): Path<i64>,
) -> Result<(), AppError> {
  db::intents::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("intent not found"))?;
  db::intents::delete(&state.db, user_id, id).await?;
  Ok(())
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
  db::intents::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("intent not found"))?;
  db::intents::set_enabled(&state.db, user_id, id, req.enabled).await?;
  Ok(())
}

#[derive(Deserialize)]
struct TestMatchRequest {
  container_name: String,
  image_repo: String,
  portainer_instance_id: i64,
  #[serde(default)]
  stack_name: Option<String>,
  #[serde(default)]
  registry: Option<String>,
}

#[derive(Serialize)]
struct TestMatchResponse {
  matched: bool,
}

/// Dry-run predicate evaluation against one synthetic candidate (spec §6.4):
/// no execution row, no side effects, just `intent::matches`.
async fn test_match(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(id): Path<i64>,
  Json(req): Json<TestMatchRequest>,
) -> Result<Json<TestMatchResponse>, AppError> {
  let intent = db::intents::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("intent not found"))?;
  let candidate = MatchCandidate {
    container_name: &req.container_name,
    image_repo: &req.image_repo,
    portainer_instance_id: req.portainer_instance_id,
    stack_name: req.stack_name.as_deref(),
    registry: req.registry.as_deref(),
  };
  Ok(Json(TestMatchResponse { matched: intent::matches(&intent, &candidate) }))
}

async fn executions(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(id): Path<i64>,
) -> Result<Json<Vec<IntentExecution>>, AppError> {
  db::intents::get_owned(&state.db, user_id, id)
    .await?
    .ok_or_else(|| AppError::not_found("intent not found"))?;
  Ok(Json(db::intent_executions::list_for_intent(&state.db, user_id, id).await?))
}

async fn execution_containers(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Path(execution_id): Path<i64>,
) -> Result<Json<Vec<IntentExecutionContainer>>, AppError> {
  // `intent_executions` carries `user_id` directly, so ownership is checked
  // without a join back through `intents`.
  let executions = db::intent_executions::list_for_user(&state.db, user_id).await?;
  if !executions.iter().any(|e| e.id == execution_id) {
    return Err(AppError::not_found("intent execution not found"));
  }
  Ok(Json(db::intent_executions::containers_for_execution(&state.db, execution_id).await?))
}
