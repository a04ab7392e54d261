//! `/api/batch` (spec §6.4, §4.6): per-user job configuration, manual
//! triggering, and run history.

use axum::{
  Json, Router,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
  routing::{get, post},
};
use drydock_client::entities::batch::{BatchConfig, BatchRun, JobType, MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES};
use serde::{Deserialize, Serialize};

use crate::{api::auth::SessionUser, db, error::AppError, schedule, state::AppState};

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/config", get(list_config).post(upsert_config))
    .route("/run", post(run))
    .route("/runs", get(list_runs))
}

async fn list_config(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
) -> Result<Json<Vec<BatchConfig>>, AppError> {
  Ok(Json(db::batch::list_config(&state.db, user_id).await?))
}

async fn upsert_config(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Json(input): Json<BatchConfig>,
) -> Result<(), AppError> {
  if input.user_id != user_id {
    return Err(AppError::forbidden("cannot set batch config for another user"));
  }
  if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&input.interval_minutes) {
    return Err(AppError::validation(format!(
      "intervalMinutes must be between {MIN_INTERVAL_MINUTES} and {MAX_INTERVAL_MINUTES}"
    )));
  }
  db::batch::upsert_config(&state.db, user_id, input.job_type, input.enabled, input.interval_minutes).await?;
  Ok(())
}

#[derive(Deserialize)]
struct JobTypeQuery {
  job_type: Option<String>,
}

fn parse_job_type(q: &JobTypeQuery) -> Result<Option<JobType>, AppError> {
  match &q.job_type {
    None => Ok(None),
    Some(s) => JobType::parse(s)
      .map(Some)
      .ok_or_else(|| AppError::validation(format!("unknown jobType '{s}'"))),
  }
}

#[derive(Serialize)]
struct RunResponse {
  run_id: i64,
}

/// Manual trigger (spec §6.4, §8 scenario 5): `409` with the already-running
/// run's id if a job for `(user, jobType)` is already in flight.
async fn run(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Query(q): Query<JobTypeQuery>,
) -> Result<impl IntoResponse, AppError> {
  let job_type = parse_job_type(&q)?.ok_or_else(|| AppError::validation("jobType is required"))?;
  match schedule::run_job(&state, user_id, job_type, true).await? {
    schedule::RunOutcome::Ran { run_id } => Ok((StatusCode::OK, Json(RunResponse { run_id }))),
    schedule::RunOutcome::AlreadyRunning { run_id } => {
      Ok((StatusCode::CONFLICT, Json(RunResponse { run_id })))
    }
  }
}

async fn list_runs(
  SessionUser { user_id, .. }: SessionUser,
  State(state): State<AppState>,
  Query(q): Query<JobTypeQuery>,
) -> Result<Json<Vec<BatchRun>>, AppError> {
  let job_type = parse_job_type(&q)?;
  Ok(Json(db::batch::list_runs(&state.db, user_id, job_type).await?))
}
