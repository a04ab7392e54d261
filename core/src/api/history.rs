//! `/api/upgrade-history` and `/api/tracked-app-upgrade-history` (spec
//! §6.4): flat read models with no dedicated history table of their own --
//! the former is just every `intent_executions` row for the user, the
//! latter every `tracked_apps` row, whose `current*/latest*` columns already
//! double as the most-recent-check snapshot (see DESIGN.md).

use axum::{Json, Router, extract::State, routing::get};
use drydock_client::entities::{intent_execution::IntentExecution, tracked_app::TrackedApp};

use crate::{api::auth::SessionUser, db, error::AppError, state::AppState};

pub fn upgrade_history_router() -> Router<AppState> {
  Router::new().route("/", get(upgrade_history))
}

pub fn tracked_app_upgrade_history_router() -> Router<AppState> {
  Router::new().route("/", get(tracked_app_upgrade_history))
}

async fn upgrade_history(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
) -> Result<Json<Vec<IntentExecution>>, AppError> {
  Ok(Json(db::intent_executions::list_for_user(&state.db, user_id).await?))
}

async fn tracked_app_upgrade_history(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
) -> Result<Json<Vec<TrackedApp>>, AppError> {
  Ok(Json(db::tracked_apps::list_for_user(&state.db, user_id).await?))
}
