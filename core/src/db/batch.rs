use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use drydock_client::entities::batch::{
  BatchConfig, BatchRun, JobType, LockOutcome, RunStatus,
};
use sqlx::{FromRow, SqliteConnection};

use super::Db;

/// Lock-path staleness threshold (spec §4.1 `checkAndAcquireBatchJobLock`,
/// §8: "5 minutes in the lock path"). Deliberately distinct from
/// [`STARTUP_STALE_MINUTES`]; see DESIGN.md for the open-question decision.
const LOCK_STALE_MINUTES: i64 = 5;
/// Startup-sweep staleness threshold (spec §4.1 `cleanupStaleBatchJobs`, §8:
/// "60 minutes in the startup sweep").
const STARTUP_STALE_MINUTES: i64 = 60;

fn job_type_str(j: JobType) -> &'static str {
  j.as_str()
}

fn status_str(s: RunStatus) -> &'static str {
  match s {
    RunStatus::Running => "running",
    RunStatus::Completed => "completed",
    RunStatus::Failed => "failed",
  }
}

fn parse_status(s: &str) -> RunStatus {
  match s {
    "completed" => RunStatus::Completed,
    "failed" => RunStatus::Failed,
    _ => RunStatus::Running,
  }
}

#[derive(FromRow)]
struct ConfigRow {
  user_id: i64,
  job_type: String,
  enabled: i64,
  interval_minutes: i64,
}

impl From<ConfigRow> for BatchConfig {
  fn from(r: ConfigRow) -> Self {
    BatchConfig {
      user_id: r.user_id,
      job_type: JobType::parse(&r.job_type).unwrap_or(JobType::AutoUpdate),
      enabled: r.enabled != 0,
      interval_minutes: r.interval_minutes,
    }
  }
}

#[derive(FromRow)]
struct RunRow {
  id: i64,
  user_id: i64,
  job_type: String,
  status: String,
  is_manual: i64,
  started_at: String,
  completed_at: Option<String>,
  duration_ms: Option<i64>,
  containers_checked: i64,
  containers_updated: i64,
  error_message: Option<String>,
  logs: String,
}

impl From<RunRow> for BatchRun {
  fn from(r: RunRow) -> Self {
    BatchRun {
      id: r.id,
      user_id: r.user_id,
      job_type: JobType::parse(&r.job_type).unwrap_or(JobType::AutoUpdate),
      status: parse_status(&r.status),
      is_manual: r.is_manual != 0,
      started_at: r.started_at,
      completed_at: r.completed_at,
      duration_ms: r.duration_ms,
      containers_checked: r.containers_checked,
      containers_updated: r.containers_updated,
      error_message: r.error_message,
      logs: r.logs,
    }
  }
}

const RUN_SELECT: &str = "SELECT id, user_id, job_type, status, is_manual, started_at, completed_at, duration_ms, containers_checked, containers_updated, error_message, logs FROM batch_runs";

pub async fn list_config(db: &Db, user_id: i64) -> anyhow::Result<Vec<BatchConfig>> {
  let rows: Vec<ConfigRow> = sqlx::query_as(
    "SELECT user_id, job_type, enabled, interval_minutes FROM batch_config WHERE user_id = ?",
  )
  .bind(user_id)
  .fetch_all(db.pool())
  .await
  .context("failed to list batch config")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn list_all_enabled_config(db: &Db) -> anyhow::Result<Vec<BatchConfig>> {
  let rows: Vec<ConfigRow> = sqlx::query_as(
    "SELECT user_id, job_type, enabled, interval_minutes FROM batch_config WHERE enabled = 1",
  )
  .fetch_all(db.pool())
  .await
  .context("failed to list enabled batch config")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn upsert_config(
  db: &Db,
  user_id: i64,
  job_type: JobType,
  enabled: bool,
  interval_minutes: i64,
) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    sqlx::query(
      "INSERT INTO batch_config (user_id, job_type, enabled, interval_minutes)
       VALUES (?, ?, ?, ?)
       ON CONFLICT(user_id, job_type) DO UPDATE SET
         enabled = excluded.enabled, interval_minutes = excluded.interval_minutes",
    )
    .bind(user_id)
    .bind(job_type_str(job_type))
    .bind(enabled)
    .bind(interval_minutes)
    .execute(conn)
    .await
    .context("failed to upsert batch config")?;
    Ok(())
  })
  .await
}

pub async fn list_runs(
  db: &Db,
  user_id: i64,
  job_type: Option<JobType>,
) -> anyhow::Result<Vec<BatchRun>> {
  let rows: Vec<RunRow> = if let Some(jt) = job_type {
    sqlx::query_as(&format!(
      "{RUN_SELECT} WHERE user_id = ? AND job_type = ? ORDER BY started_at DESC"
    ))
    .bind(user_id)
    .bind(job_type_str(jt))
    .fetch_all(db.pool())
    .await
  } else {
    sqlx::query_as(&format!(
      "{RUN_SELECT} WHERE user_id = ? ORDER BY started_at DESC"
    ))
    .bind(user_id)
    .fetch_all(db.pool())
    .await
  }
  .context("failed to list batch runs")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

/// `checkAndAcquireBatchJobLock` (spec §4.1, §4.6, §8 scenario 5): inside a
/// single `BEGIN IMMEDIATE` transaction, looks for a running, uncompleted
/// run for `(user_id, job_type)`. A run older than [`LOCK_STALE_MINUTES`] is
/// reaped as failed and the lock is granted; otherwise the caller is told
/// `AlreadyRunning`. Returns the outcome only -- the `BatchRun` row for a
/// granted lock is created separately by the caller, matching the spec's
/// "commit releases the transaction; the actual row is created by the
/// caller" wording.
pub async fn check_and_acquire_lock(
  db: &Db,
  user_id: i64,
  job_type: JobType,
) -> anyhow::Result<LockOutcome> {
  db.write(|conn: &mut SqliteConnection| async move {
    let running: Option<(i64, String)> = sqlx::query_as(
      "SELECT id, started_at FROM batch_runs
       WHERE user_id = ? AND job_type = ? AND status = 'running' AND completed_at IS NULL
       ORDER BY started_at DESC LIMIT 1",
    )
    .bind(user_id)
    .bind(job_type_str(job_type))
    .fetch_optional(&mut *conn)
    .await
    .context("failed to look up running batch run")?;

    let Some((run_id, started_at)) = running else {
      return Ok(LockOutcome::Acquired);
    };
    let started: DateTime<Utc> = DateTime::parse_from_rfc3339(&started_at)
      .context("corrupt batch run started_at")?
      .with_timezone(&Utc);
    if Utc::now() - started > Duration::minutes(LOCK_STALE_MINUTES) {
      mark_interrupted(&mut *conn, run_id, &started_at).await?;
      Ok(LockOutcome::Acquired)
    } else {
      Ok(LockOutcome::AlreadyRunning { run_id })
    }
  })
  .await
}

async fn mark_interrupted(
  conn: &mut SqliteConnection,
  run_id: i64,
  started_at: &str,
) -> anyhow::Result<()> {
  let now = Utc::now();
  let started = DateTime::parse_from_rfc3339(started_at)
    .context("corrupt batch run started_at")?
    .with_timezone(&Utc);
  let duration_ms = (now - started).num_milliseconds();
  sqlx::query(
    "UPDATE batch_runs SET status = 'failed', completed_at = ?, duration_ms = ?, error_message = ?
     WHERE id = ?",
  )
  .bind(now.to_rfc3339())
  .bind(duration_ms)
  .bind(format!(
    "Job was interrupted (server restart detected). Original start: {started_at}"
  ))
  .bind(run_id)
  .execute(&mut *conn)
  .await
  .context("failed to mark batch run interrupted")?;
  Ok(())
}

pub async fn start_run(
  db: &Db,
  user_id: i64,
  job_type: JobType,
  is_manual: bool,
) -> anyhow::Result<i64> {
  db.write(|conn: &mut SqliteConnection| async move {
    let id = sqlx::query(
      "INSERT INTO batch_runs (user_id, job_type, status, is_manual, started_at, logs)
       VALUES (?, ?, 'running', ?, ?, '')",
    )
    .bind(user_id)
    .bind(job_type_str(job_type))
    .bind(is_manual)
    .bind(Utc::now().to_rfc3339())
    .execute(conn)
    .await
    .context("failed to start batch run")?
    .last_insert_rowid();
    Ok(id)
  })
  .await
}

pub async fn finish_run(
  db: &Db,
  run_id: i64,
  status: RunStatus,
  containers_checked: i64,
  containers_updated: i64,
  error_message: Option<&str>,
  logs: &str,
) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    let started_at: String =
      sqlx::query_scalar("SELECT started_at FROM batch_runs WHERE id = ?")
        .bind(run_id)
        .fetch_one(&mut *conn)
        .await
        .context("failed to load batch run start time")?;
    let started = DateTime::parse_from_rfc3339(&started_at)
      .context("corrupt batch run started_at")?
      .with_timezone(&Utc);
    let now = Utc::now();
    sqlx::query(
      "UPDATE batch_runs SET status = ?, completed_at = ?, duration_ms = ?,
         containers_checked = ?, containers_updated = ?, error_message = ?, logs = ?
       WHERE id = ?",
    )
    .bind(status_str(status))
    .bind(now.to_rfc3339())
    .bind((now - started).num_milliseconds())
    .bind(containers_checked)
    .bind(containers_updated)
    .bind(error_message)
    .bind(logs)
    .bind(run_id)
    .execute(conn)
    .await
    .context("failed to finish batch run")?;
    Ok(())
  })
  .await
}

/// Start time of the most recent run for `(user_id, job_type)`, regardless
/// of its outcome -- the scheduler's elapsed-interval check (spec §4.6:
/// "now - lastStart >= intervalMinutes") reads this rather than only
/// completed runs, so a run that is still `running` still counts as the
/// last attempt.
pub async fn latest_run_started_at(
  db: &Db,
  user_id: i64,
  job_type: JobType,
) -> anyhow::Result<Option<DateTime<Utc>>> {
  let started_at: Option<String> = sqlx::query_scalar(
    "SELECT started_at FROM batch_runs WHERE user_id = ? AND job_type = ?
     ORDER BY started_at DESC LIMIT 1",
  )
  .bind(user_id)
  .bind(job_type_str(job_type))
  .fetch_optional(db.pool())
  .await
  .context("failed to look up latest batch run")?;
  started_at
    .map(|s| {
      DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .context("corrupt batch run started_at")
    })
    .transpose()
}

/// `cleanupStaleBatchJobs` (spec §4.1, §8 scenario 6): on process start,
/// reaps every run older than [`STARTUP_STALE_MINUTES`] still `status =
/// 'running'`, regardless of user or job type.
pub async fn cleanup_stale_batch_jobs(db: &Db) -> anyhow::Result<u64> {
  db.write(|conn: &mut SqliteConnection| async move {
    let cutoff = (Utc::now() - Duration::minutes(STARTUP_STALE_MINUTES)).to_rfc3339();
    let stale: Vec<(i64, String)> = sqlx::query_as(
      "SELECT id, started_at FROM batch_runs WHERE status = 'running' AND started_at < ?",
    )
    .bind(&cutoff)
    .fetch_all(&mut *conn)
    .await
    .context("failed to list stale batch runs")?;
    let count = stale.len() as u64;
    for (id, started_at) in stale {
      mark_interrupted(&mut *conn, id, &started_at).await?;
    }
    Ok(count)
  })
  .await
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn seed_user(db: &Db) -> i64 {
    crate::db::users::create(db, "u", "h").await.unwrap().id
  }

  #[tokio::test]
  async fn second_lock_attempt_is_rejected_while_running() {
    let db = Db::connect_in_memory().await.unwrap();
    let user_id = seed_user(&db).await;
    assert_eq!(
      check_and_acquire_lock(&db, user_id, JobType::AutoUpdate).await.unwrap(),
      LockOutcome::Acquired
    );
    let run_id = start_run(&db, user_id, JobType::AutoUpdate, false).await.unwrap();
    match check_and_acquire_lock(&db, user_id, JobType::AutoUpdate).await.unwrap() {
      LockOutcome::AlreadyRunning { run_id: blocked_by } => assert_eq!(blocked_by, run_id),
      LockOutcome::Acquired => panic!("expected lock to be held"),
    }
  }

  #[tokio::test]
  async fn lock_is_reaped_once_stale() {
    let db = Db::connect_in_memory().await.unwrap();
    let user_id = seed_user(&db).await;
    let run_id = start_run(&db, user_id, JobType::AutoUpdate, false).await.unwrap();
    let stale_start = (Utc::now() - Duration::minutes(LOCK_STALE_MINUTES + 1)).to_rfc3339();
    sqlx::query("UPDATE batch_runs SET started_at = ? WHERE id = ?")
      .bind(&stale_start)
      .bind(run_id)
      .execute(db.pool())
      .await
      .unwrap();

    let outcome = check_and_acquire_lock(&db, user_id, JobType::AutoUpdate).await.unwrap();
    assert_eq!(outcome, LockOutcome::Acquired);

    let runs = list_runs(&db, user_id, Some(JobType::AutoUpdate)).await.unwrap();
    let reaped = runs.iter().find(|r| r.id == run_id).unwrap();
    assert_eq!(reaped.status, RunStatus::Failed);
  }

  #[tokio::test]
  async fn upsert_config_is_idempotent_per_user_and_job_type() {
    let db = Db::connect_in_memory().await.unwrap();
    let user_id = seed_user(&db).await;
    upsert_config(&db, user_id, JobType::AutoUpdate, true, 30).await.unwrap();
    upsert_config(&db, user_id, JobType::AutoUpdate, false, 60).await.unwrap();
    let configs = list_config(&db, user_id).await.unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].interval_minutes, 60);
    assert!(!configs[0].enabled);
  }
}
