//! Batch scheduler (spec §4.6, C6): a per-minute ticker that runs each
//! user's enabled [`BatchConfig`] jobs on a simple elapsed-interval model,
//! plus per-intent cron windows for `ScheduleType::Scheduled` intents.
//!
//! Grounded on the teacher's `schedule.rs` for the overall shape -- a
//! `wait_until_timelength` ticker spawning detached per-resource work -- but
//! the interval model itself is `now - lastStart >= intervalMinutes`, not
//! cron: spec §4.6 describes `BatchConfig` scheduling in exactly those terms,
//! reserving cron (`croner`) for `Intent.scheduleCron`.

use anyhow::Context;
use async_timing_util::Timelength;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use drydock_client::entities::{
  batch::{JobType, LockOutcome, RunStatus},
  intent::ScheduleType,
};

use crate::{db, detector, intent, state::AppState};

/// Runs the startup reaper sweep (spec §4.6: "on startup, cleanupStaleBatchJobs
/// and cleanupStaleIntentExecutions run before the first wake").
pub async fn startup_sweep(state: &AppState) -> anyhow::Result<()> {
  let batch_reaped = db::batch::cleanup_stale_batch_jobs(&state.db).await?;
  let intent_reaped = db::intent_executions::cleanup_stale_intent_executions(&state.db).await?;
  if batch_reaped > 0 || intent_reaped > 0 {
    tracing::warn!(
      batch_reaped,
      intent_reaped,
      "reaped jobs/executions interrupted by a prior restart"
    );
  }
  Ok(())
}

/// Spawns the ticker loop. One tick per minute; each due job runs in its own
/// detached task so a slow job for one user never delays the others.
pub fn spawn(state: AppState) {
  tokio::spawn(async move {
    loop {
      async_timing_util::wait_until_timelength(Timelength::OneMinute, 0).await;
      if let Err(e) = tick(&state).await {
        tracing::warn!("scheduler tick failed: {:#}", e);
      }
    }
  });
}

async fn tick(state: &AppState) -> anyhow::Result<()> {
  let configs = db::batch::list_all_enabled_config(&state.db).await?;
  for config in configs {
    let last_start =
      db::batch::latest_run_started_at(&state.db, config.user_id, config.job_type).await?;
    let due = match last_start {
      Some(last) => Utc::now() - last >= ChronoDuration::minutes(config.interval_minutes),
      None => true,
    };
    if !due {
      continue;
    }
    let state = state.clone();
    tokio::spawn(async move {
      if let Err(e) = run_job(&state, config.user_id, config.job_type, false).await {
        tracing::warn!(
          "batch job {} for user {} failed: {:#}",
          config.job_type.as_str(),
          config.user_id,
          e
        );
      }
    });
  }

  let now = Utc::now();
  for intent in db::intents::list_enabled(&state.db).await? {
    if intent.schedule_type != ScheduleType::Scheduled {
      continue;
    }
    let Some(cron_expr) = intent.schedule_cron.clone() else { continue };
    match cron_due_now(&cron_expr, now) {
      Ok(true) => {
        let state = state.clone();
        tokio::spawn(async move {
          let clients = state.portainer_clients_snapshot();
          match intent::engine::execute(
            &state.db,
            &state.http,
            &clients,
            &intent,
            drydock_client::entities::intent_execution::TriggerType::ScheduledWindow,
          )
          .await
          {
            Ok(summary) => {
              if summary.upgraded > 0 {
                state.cache.invalidate_user(intent.user_id);
              }
            }
            Err(e) => tracing::warn!(
              "scheduled intent {} ({}) failed: {:#}",
              intent.id,
              intent.name,
              e
            ),
          }
        });
      }
      Ok(false) => {}
      Err(e) => tracing::warn!(
        "intent {} has an unparseable scheduleCron '{cron_expr}': {:#}",
        intent.id,
        e
      ),
    }
  }

  Ok(())
}

/// Whether `expr` has an occurrence in the minute ending at `now` -- the
/// per-minute-tick equivalent of "is this cron due right now".
fn cron_due_now(expr: &str, now: DateTime<Utc>) -> anyhow::Result<bool> {
  // No `.with_seconds_required()` call: `scheduleCron` is plain 5-field cron
  // (minute hour dom month dow), matching the common crontab convention.
  let cron = croner::parser::CronParser::builder()
    .dom_and_dow(true)
    .build()
    .parse(expr)
    .with_context(|| format!("invalid cron expression '{expr}'"))?;
  let window_start = now - ChronoDuration::seconds(59);
  match cron.find_next_occurrence(&window_start, false) {
    Ok(next) => Ok(next <= now),
    Err(_) => Ok(false),
  }
}

pub enum RunOutcome {
  Ran { run_id: i64 },
  AlreadyRunning { run_id: i64 },
}

/// Runs one `(user_id, job_type)` batch job end to end: lock, execute,
/// persist the result. Shared by the ticker and the manual
/// `POST /api/batch/run` endpoint (spec §6.4, §8 scenario 5).
pub async fn run_job(
  state: &AppState,
  user_id: i64,
  job_type: JobType,
  is_manual: bool,
) -> anyhow::Result<RunOutcome> {
  let outcome = db::batch::check_and_acquire_lock(&state.db, user_id, job_type).await?;
  if let LockOutcome::AlreadyRunning { run_id } = outcome {
    return Ok(RunOutcome::AlreadyRunning { run_id });
  }

  let run_id = db::batch::start_run(&state.db, user_id, job_type, is_manual).await?;
  let mut logs = Vec::new();
  let result = execute_job(state, user_id, job_type, &mut logs).await;

  let (status, checked, updated, error_message) = match &result {
    Ok(summary) => (RunStatus::Completed, summary.containers_checked, summary.containers_updated, None),
    Err(e) => (RunStatus::Failed, 0, 0, Some(format!("{e:#}"))),
  };
  db::batch::finish_run(
    &state.db,
    run_id,
    status,
    checked,
    updated,
    error_message.as_deref(),
    &logs.join("\n"),
  )
  .await?;

  result.map(|_| RunOutcome::Ran { run_id })
}

async fn execute_job(
  state: &AppState,
  user_id: i64,
  job_type: JobType,
  logs: &mut Vec<String>,
) -> anyhow::Result<detector::DetectionSummary> {
  match job_type {
    JobType::DockerHubPull => {
      let clients = state.portainer_clients_snapshot();
      let cached = state.cache.read(&state.db, &clients, user_id, None, true).await?;
      logs.push(format!("polled {} instance(s), {} container(s) observed", clients.len(), cached.containers.len()));
      if cached.stale {
        logs.push("portainer unreachable, fell back to cached container state".to_string());
      }
      let summary = detector::run_batch_detection(&state.db, &state.http, user_id).await?;
      logs.push(format!(
        "{} checked, {} with an update available, {} transitioned",
        summary.containers_checked,
        summary.containers_updated,
        summary.transitioned.len()
      ));
      if summary.containers_checked > 0 {
        state.cache.invalidate_user(user_id);
      }
      if !summary.transitioned.is_empty() {
        trigger_scan_detected(state, user_id, &summary.transitioned, logs).await?;
      }
      Ok(summary)
    }
    JobType::TrackedAppsCheck => {
      let summary = detector::run_tracked_apps_check(&state.db, &state.http, user_id).await?;
      logs.push(format!(
        "{} tracked app(s) checked, {} with an update available",
        summary.containers_checked, summary.containers_updated
      ));
      Ok(summary)
    }
    JobType::AutoUpdate => {
      let clients = state.portainer_clients_snapshot();
      let intents: Vec<_> = db::intents::list_for_user(&state.db, user_id)
        .await?
        .into_iter()
        .filter(|i| i.enabled && i.schedule_type == ScheduleType::Immediate)
        .collect();
      let mut summary = detector::DetectionSummary::default();
      for intent in &intents {
        let outcome = intent::engine::execute(
          &state.db,
          &state.http,
          &clients,
          intent,
          drydock_client::entities::intent_execution::TriggerType::ScheduledWindow,
        )
        .await?;
        logs.push(format!(
          "intent '{}': {} matched, {} upgraded, {} failed",
          intent.name, outcome.matched, outcome.upgraded, outcome.failed
        ));
        summary.containers_checked += outcome.matched;
        summary.containers_updated += outcome.upgraded;
        if outcome.upgraded > 0 {
          state.cache.invalidate_user(user_id);
        }
      }
      Ok(summary)
    }
  }
}

/// Fires every enabled, `ScheduleType::Immediate` intent against the
/// just-detected transition set (spec §4.7: the `scan_detected` trigger).
/// Matching is re-evaluated inside `engine::execute` against current state,
/// so `transitioned` only gates *whether* to run an intent this tick, not
/// which containers it acts on.
async fn trigger_scan_detected(
  state: &AppState,
  user_id: i64,
  transitioned: &[i64],
  logs: &mut Vec<String>,
) -> anyhow::Result<()> {
  if transitioned.is_empty() {
    return Ok(());
  }
  let clients = state.portainer_clients_snapshot();
  let intents: Vec<_> = db::intents::list_for_user(&state.db, user_id)
    .await?
    .into_iter()
    .filter(|i| i.enabled && i.schedule_type == ScheduleType::Immediate)
    .collect();
  for intent in &intents {
    let outcome = intent::engine::execute(
      &state.db,
      &state.http,
      &clients,
      intent,
      drydock_client::entities::intent_execution::TriggerType::ScanDetected,
    )
    .await?;
    logs.push(format!(
      "scan-detected intent '{}': {} matched, {} upgraded, {} failed",
      intent.name, outcome.matched, outcome.upgraded, outcome.failed
    ));
  }
  Ok(())
}
