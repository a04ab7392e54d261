use anyhow::Context;
use chrono::{Duration, Utc};
use drydock_client::entities::intent_execution::{
  ContainerExecutionStatus, ExecutionStatus, IntentExecution,
  IntentExecutionContainer, TriggerType,
};
use sqlx::{FromRow, SqliteConnection};

use super::Db;

/// Startup-sweep staleness threshold, mirroring [`super::batch::cleanup_stale_batch_jobs`]'s
/// 60-minute window (spec §4.6: "cleanupStaleIntentExecutions runs before
/// the first wake, alongside cleanupStaleBatchJobs").
const STARTUP_STALE_MINUTES: i64 = 60;

#[derive(FromRow)]
struct Row {
  id: i64,
  intent_id: i64,
  user_id: i64,
  status: String,
  trigger_type: String,
  containers_matched: i64,
  containers_upgraded: i64,
  containers_failed: i64,
  containers_skipped: i64,
  started_at: String,
  completed_at: Option<String>,
  duration_ms: Option<i64>,
  error_message: Option<String>,
}

fn status_str(s: ExecutionStatus) -> &'static str {
  match s {
    ExecutionStatus::Pending => "pending",
    ExecutionStatus::Running => "running",
    ExecutionStatus::Completed => "completed",
    ExecutionStatus::Failed => "failed",
    ExecutionStatus::Partial => "partial",
  }
}

fn parse_status(s: &str) -> ExecutionStatus {
  match s {
    "running" => ExecutionStatus::Running,
    "completed" => ExecutionStatus::Completed,
    "failed" => ExecutionStatus::Failed,
    "partial" => ExecutionStatus::Partial,
    _ => ExecutionStatus::Pending,
  }
}

fn trigger_str(t: TriggerType) -> &'static str {
  match t {
    TriggerType::ScanDetected => "scan_detected",
    TriggerType::Manual => "manual",
    TriggerType::ScheduledWindow => "scheduled_window",
  }
}

fn parse_trigger(s: &str) -> TriggerType {
  match s {
    "manual" => TriggerType::Manual,
    "scheduled_window" => TriggerType::ScheduledWindow,
    _ => TriggerType::ScanDetected,
  }
}

fn container_status_str(s: ContainerExecutionStatus) -> &'static str {
  match s {
    ContainerExecutionStatus::Upgraded => "upgraded",
    ContainerExecutionStatus::Failed => "failed",
    ContainerExecutionStatus::Skipped => "skipped",
    ContainerExecutionStatus::DryRun => "dry_run",
  }
}

impl From<Row> for IntentExecution {
  fn from(r: Row) -> Self {
    IntentExecution {
      id: r.id,
      intent_id: r.intent_id,
      user_id: r.user_id,
      status: parse_status(&r.status),
      trigger_type: parse_trigger(&r.trigger_type),
      containers_matched: r.containers_matched,
      containers_upgraded: r.containers_upgraded,
      containers_failed: r.containers_failed,
      containers_skipped: r.containers_skipped,
      started_at: r.started_at,
      completed_at: r.completed_at,
      duration_ms: r.duration_ms,
      error_message: r.error_message,
    }
  }
}

const SELECT: &str = "SELECT id, intent_id, user_id, status, trigger_type, containers_matched, containers_upgraded, containers_failed, containers_skipped, started_at, completed_at, duration_ms, error_message FROM intent_executions";

/// Every execution across all of a user's intents, newest first -- the
/// `GET /api/upgrade-history` read model (spec §6.4).
pub async fn list_for_user(db: &Db, user_id: i64) -> anyhow::Result<Vec<IntentExecution>> {
  let rows: Vec<Row> = sqlx::query_as(&format!("{SELECT} WHERE user_id = ? ORDER BY started_at DESC"))
    .bind(user_id)
    .fetch_all(db.pool())
    .await
    .context("failed to list intent executions for user")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn list_for_intent(
  db: &Db,
  user_id: i64,
  intent_id: i64,
) -> anyhow::Result<Vec<IntentExecution>> {
  let rows: Vec<Row> = sqlx::query_as(&format!(
    "{SELECT} WHERE user_id = ? AND intent_id = ? ORDER BY started_at DESC"
  ))
  .bind(user_id)
  .bind(intent_id)
  .fetch_all(db.pool())
  .await
  .context("failed to list intent executions")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn start(
  conn: &mut SqliteConnection,
  intent_id: i64,
  user_id: i64,
  trigger_type: TriggerType,
  containers_matched: i64,
) -> anyhow::Result<i64> {
  let id = sqlx::query(
    "INSERT INTO intent_executions (intent_id, user_id, status, trigger_type, containers_matched, started_at)
     VALUES (?, ?, 'running', ?, ?, ?)",
  )
  .bind(intent_id)
  .bind(user_id)
  .bind(trigger_str(trigger_type))
  .bind(containers_matched)
  .bind(drydock_client::entities::now_iso())
  .execute(&mut *conn)
  .await
  .context("failed to start intent execution")?
  .last_insert_rowid();
  Ok(id)
}

#[allow(clippy::too_many_arguments)]
pub async fn finish(
  conn: &mut SqliteConnection,
  id: i64,
  status: ExecutionStatus,
  containers_upgraded: i64,
  containers_failed: i64,
  containers_skipped: i64,
  duration_ms: i64,
  error_message: Option<&str>,
) -> anyhow::Result<()> {
  sqlx::query(
    "UPDATE intent_executions SET
       status = ?, containers_upgraded = ?, containers_failed = ?,
       containers_skipped = ?, completed_at = ?, duration_ms = ?, error_message = ?
     WHERE id = ?",
  )
  .bind(status_str(status))
  .bind(containers_upgraded)
  .bind(containers_failed)
  .bind(containers_skipped)
  .bind(drydock_client::entities::now_iso())
  .bind(duration_ms)
  .bind(error_message)
  .bind(id)
  .execute(&mut *conn)
  .await
  .context("failed to finish intent execution")?;
  Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn record_container(
  conn: &mut SqliteConnection,
  execution_id: i64,
  container_id: i64,
  container_name: &str,
  image_name: &str,
  portainer_instance_id: Option<i64>,
  status: ContainerExecutionStatus,
  old_image: Option<&str>,
  new_image: Option<&str>,
  old_digest: Option<&str>,
  new_digest: Option<&str>,
  error_message: Option<&str>,
  duration_ms: Option<i64>,
) -> anyhow::Result<()> {
  sqlx::query(
    "INSERT INTO intent_execution_containers
      (execution_id, container_id, container_name, image_name, portainer_instance_id,
       status, old_image, new_image, old_digest, new_digest, error_message, duration_ms)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
  )
  .bind(execution_id)
  .bind(container_id)
  .bind(container_name)
  .bind(image_name)
  .bind(portainer_instance_id)
  .bind(container_status_str(status))
  .bind(old_image)
  .bind(new_image)
  .bind(old_digest)
  .bind(new_digest)
  .bind(error_message)
  .bind(duration_ms)
  .execute(&mut *conn)
  .await
  .context("failed to record intent execution container")?;
  Ok(())
}

/// `cleanupStaleIntentExecutions` (spec §4.6): on process start, reaps every
/// execution older than [`STARTUP_STALE_MINUTES`] still `status = 'running'`,
/// regardless of user or intent -- a restart mid-execution otherwise leaves
/// the row stuck `running` forever.
pub async fn cleanup_stale_intent_executions(db: &Db) -> anyhow::Result<u64> {
  db.write(|conn: &mut SqliteConnection| async move {
    let cutoff = (Utc::now() - Duration::minutes(STARTUP_STALE_MINUTES)).to_rfc3339();
    let stale: Vec<i64> = sqlx::query_scalar(
      "SELECT id FROM intent_executions WHERE status = 'running' AND started_at < ?",
    )
    .bind(&cutoff)
    .fetch_all(&mut *conn)
    .await
    .context("failed to list stale intent executions")?;
    let count = stale.len() as u64;
    for id in stale {
      sqlx::query(
        "UPDATE intent_executions SET status = 'failed', completed_at = ?, error_message = ?
         WHERE id = ?",
      )
      .bind(drydock_client::entities::now_iso())
      .bind("Execution was interrupted (server restart detected).")
      .bind(id)
      .execute(&mut *conn)
      .await
      .context("failed to mark intent execution interrupted")?;
    }
    Ok(count)
  })
  .await
}

pub async fn containers_for_execution(
  db: &Db,
  execution_id: i64,
) -> anyhow::Result<Vec<IntentExecutionContainer>> {
  let rows = sqlx::query(
    "SELECT id, execution_id, container_id, container_name, image_name, portainer_instance_id, status, old_image, new_image, old_digest, new_digest, error_message, duration_ms
     FROM intent_execution_containers WHERE execution_id = ?",
  )
  .bind(execution_id)
  .fetch_all(db.pool())
  .await
  .context("failed to list intent execution containers")?;
  use sqlx::Row as _;
  Ok(
    rows
      .into_iter()
      .map(|row| IntentExecutionContainer {
        id: row.get("id"),
        execution_id: row.get("execution_id"),
        container_id: row.get("container_id"),
        container_name: row.get("container_name"),
        image_name: row.get("image_name"),
        portainer_instance_id: row.get("portainer_instance_id"),
        status: match row.get::<String, _>("status").as_str() {
          "upgraded" => ContainerExecutionStatus::Upgraded,
          "failed" => ContainerExecutionStatus::Failed,
          "dry_run" => ContainerExecutionStatus::DryRun,
          _ => ContainerExecutionStatus::Skipped,
        },
        old_image: row.get("old_image"),
        new_image: row.get("new_image"),
        old_digest: row.get("old_digest"),
        new_digest: row.get("new_digest"),
        error_message: row.get("error_message"),
        duration_ms: row.get("duration_ms"),
      })
      .collect(),
  )
}
