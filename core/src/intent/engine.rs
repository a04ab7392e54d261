//! Intent execution engine (spec §4.7 "Execution", C7).
//!
//! `maxConcurrent` groups candidates for bookkeeping, but the spec's own
//! wording ("processes groups sequentially; within a group, upgrades run
//! sequentially") leaves no room in a single execution for actual
//! parallelism -- real concurrency lives at the scheduler level, where
//! independent intents (and their distinct Portainer instances) run as
//! separate executions. See DESIGN.md.

use std::{collections::HashMap, sync::Arc, time::Duration};

use drydock_client::entities::{
  container::ContainerWithUpdateInfo,
  intent::{Intent, MatchCandidate},
  intent_execution::{ContainerExecutionStatus, ExecutionStatus, TriggerType},
  notification::{NotificationEvent, NotificationType},
};
use reqwest::Client;
use tokio::time::Instant;

use crate::{
  db::{self, Db},
  notify,
  portainer::PortainerClient,
};

#[derive(Debug)]
pub struct ExecutionSummary {
  pub execution_id: i64,
  pub status: ExecutionStatus,
  pub matched: i64,
  pub upgraded: i64,
  pub failed: i64,
}

/// Runs one `IntentExecution` for `intent` to completion (spec §4.7 steps
/// 1-5). `clients` is the live registry of Portainer connections, keyed by
/// `portainer_instance_id`.
pub async fn execute(
  db: &Db,
  http: &Client,
  clients: &HashMap<i64, Arc<PortainerClient>>,
  intent: &Intent,
  trigger_type: TriggerType,
) -> anyhow::Result<ExecutionSummary> {
  let started = Instant::now();

  let all = db::containers::with_update_info(db, intent.user_id, None).await?;
  let candidates: Vec<&ContainerWithUpdateInfo> = all
    .iter()
    .filter(|c| c.has_update())
    .filter(|c| super::matches(intent, &candidate_of(c)))
    .collect();

  let matched = candidates.len() as i64;
  let execution_id = db
    .write(|conn| Box::pin(async move {
      db::intent_executions::start(conn, intent.id, intent.user_id, trigger_type, matched).await
    }))
    .await?;

  if intent.notify_on_batch_start {
    notify::publish(
      db,
      http,
      NotificationEvent {
        user_id: intent.user_id,
        notification_type: NotificationType::AutoUpdateBatchStarted,
        deduplication_key: format!("batch-start:{}:{execution_id}", intent.user_id),
        title: format!("Auto-update started: {}", intent.name),
        description: format!("{matched} container(s) matched for upgrade"),
        fields: vec![notify::field("Intent", &intent.name)],
        timestamp: drydock_client::entities::now_iso(),
      },
    )
    .await;
  }

  let group_size = intent.max_concurrent.max(1) as usize;
  let mut upgraded = 0i64;
  let mut failed = 0i64;

  for group in candidates.chunks(group_size) {
    for container in group {
      let outcome = apply_one(db, clients, intent, execution_id, container).await;
      match outcome {
        ContainerOutcome::Upgraded => {
          upgraded += 1;
          if intent.notify_on_success {
            notify_outcome(db, http, intent, execution_id, container, true, None).await;
          }
          if intent.sequential_delay_sec > 0 {
            tokio::time::sleep(Duration::from_secs(intent.sequential_delay_sec as u64)).await;
          }
        }
        ContainerOutcome::Failed(ref err) => {
          failed += 1;
          if intent.notify_on_failure {
            notify_outcome(db, http, intent, execution_id, container, false, Some(err)).await;
          }
        }
        ContainerOutcome::DryRun => {}
      }
    }
  }

  let status = if failed == 0 {
    ExecutionStatus::Completed
  } else if upgraded > 0 {
    ExecutionStatus::Partial
  } else {
    ExecutionStatus::Failed
  };

  let duration_ms = started.elapsed().as_millis() as i64;
  let skipped = matched - upgraded - failed;
  db.write(|conn| Box::pin(async move {
    db::intent_executions::finish(
      conn,
      execution_id,
      status,
      upgraded,
      failed,
      skipped.max(0),
      duration_ms,
      None,
    )
    .await?;
    db::intents::record_evaluation(conn, intent.id, Some(execution_id)).await
  }))
  .await?;

  if intent.notify_on_success || intent.notify_on_failure {
    notify::publish(
      db,
      http,
      NotificationEvent {
        user_id: intent.user_id,
        notification_type: NotificationType::AutoUpdateBatchSummary,
        deduplication_key: format!("batch-summary:{}:{execution_id}", intent.user_id),
        title: format!("Auto-update finished: {}", intent.name),
        description: format!("{upgraded} upgraded, {failed} failed, {matched} matched"),
        fields: vec![
          notify::field("Upgraded", upgraded.to_string()),
          notify::field("Failed", failed.to_string()),
        ],
        timestamp: drydock_client::entities::now_iso(),
      },
    )
    .await;
  }

  Ok(ExecutionSummary { execution_id, status, matched, upgraded, failed })
}

enum ContainerOutcome {
  Upgraded,
  Failed(String),
  DryRun,
}

fn candidate_of(c: &ContainerWithUpdateInfo) -> MatchCandidate<'_> {
  MatchCandidate {
    container_name: &c.container.container_name,
    image_repo: &c.container.image_repo,
    portainer_instance_id: c.container.portainer_instance_id,
    stack_name: c.container.stack_name.as_deref(),
    registry: c.registry.as_deref(),
  }
}

async fn apply_one(
  db: &Db,
  clients: &HashMap<i64, Arc<PortainerClient>>,
  intent: &Intent,
  execution_id: i64,
  container: &ContainerWithUpdateInfo,
) -> ContainerOutcome {
  let old_image = container.container.image_name.clone();
  let latest_digest = container.latest_digest.clone().unwrap_or_default();
  let new_image = format!("{}@{}", container.container.image_repo, latest_digest);

  if intent.dry_run {
    let _ = db
      .write(|conn| Box::pin(async move {
        db::intent_executions::record_container(
          conn,
          execution_id,
          container.container.id,
          &container.container.container_name,
          &container.container.image_name,
          Some(container.container.portainer_instance_id),
          ContainerExecutionStatus::DryRun,
          Some(&old_image),
          Some(&new_image),
          container.current_digest.as_deref(),
          container.latest_digest.as_deref(),
          None,
          None,
        )
        .await
      }))
      .await;
    return ContainerOutcome::DryRun;
  }

  let Some(client) = clients.get(&container.container.portainer_instance_id) else {
    record_failed(db, execution_id, container, &old_image, &new_image, "no portainer client configured for this instance").await;
    return ContainerOutcome::Failed("no portainer client configured for this instance".to_string());
  };

  let started = Instant::now();
  let result = client
    .recreate_container(
      container.container.endpoint_id,
      &container.container.container_id,
      &new_image,
    )
    .await;
  let duration_ms = started.elapsed().as_millis() as i64;

  match result {
    Ok(_) => {
      let _ = db
        .write(|conn| Box::pin(async move {
          db::intent_executions::record_container(
            conn,
            execution_id,
            container.container.id,
            &container.container.container_name,
            &container.container.image_name,
            Some(container.container.portainer_instance_id),
            ContainerExecutionStatus::Upgraded,
            Some(&old_image),
            Some(&new_image),
            container.current_digest.as_deref(),
            container.latest_digest.as_deref(),
            None,
            Some(duration_ms),
          )
          .await
        }))
        .await;
      ContainerOutcome::Upgraded
    }
    Err(e) => {
      let msg = format!("{e:#}");
      record_failed(db, execution_id, container, &old_image, &new_image, &msg).await;
      ContainerOutcome::Failed(msg)
    }
  }
}

async fn record_failed(
  db: &Db,
  execution_id: i64,
  container: &ContainerWithUpdateInfo,
  old_image: &str,
  new_image: &str,
  error_message: &str,
) {
  let old_image = old_image.to_string();
  let new_image = new_image.to_string();
  let error_message = error_message.to_string();
  let _ = db
    .write(|conn| Box::pin(async move {
      db::intent_executions::record_container(
        conn,
        execution_id,
        container.container.id,
        &container.container.container_name,
        &container.container.image_name,
        Some(container.container.portainer_instance_id),
        ContainerExecutionStatus::Failed,
        Some(&old_image),
        Some(&new_image),
        container.current_digest.as_deref(),
        container.latest_digest.as_deref(),
        Some(&error_message),
        None,
      )
      .await
    }))
    .await;
}

async fn notify_outcome(
  db: &Db,
  http: &Client,
  intent: &Intent,
  execution_id: i64,
  container: &ContainerWithUpdateInfo,
  success: bool,
  error: Option<&str>,
) {
  let (notification_type, title) = if success {
    (NotificationType::AutoUpdateSuccess, "Container upgraded")
  } else {
    (NotificationType::AutoUpdateFailure, "Container upgrade failed")
  };
  let mut fields = vec![
    notify::field("Container", &container.container.container_name),
    notify::field("Image", &container.container.image_name),
  ];
  if let Some(err) = error {
    fields.push(notify::field("Error", err));
  }
  notify::publish(
    db,
    http,
    NotificationEvent {
      user_id: intent.user_id,
      notification_type,
      deduplication_key: format!(
        "upgrade:{}:{execution_id}:{}",
        intent.user_id, container.container.id
      ),
      title: title.to_string(),
      description: format!("{} ({})", container.container.container_name, intent.name),
      fields,
      timestamp: drydock_client::entities::now_iso(),
    },
  )
  .await;
}

#[cfg(test)]
mod tests {
  use super::*;
  use drydock_client::entities::intent::ScheduleType;

  fn base_intent() -> Intent {
    Intent {
      id: 1,
      user_id: 1,
      name: "test".into(),
      description: None,
      enabled: true,
      match_containers: vec![],
      match_images: vec![],
      match_instances: None,
      match_stacks: vec![],
      match_registries: vec![],
      exclude_containers: vec![],
      exclude_images: vec![],
      exclude_stacks: vec![],
      exclude_registries: vec![],
      schedule_type: ScheduleType::Immediate,
      schedule_cron: None,
      max_concurrent: 1,
      dry_run: false,
      sequential_delay_sec: 0,
      notify_on_update_detected: false,
      notify_on_batch_start: false,
      notify_on_success: false,
      notify_on_failure: false,
      last_evaluated_at: None,
      last_execution_id: None,
    }
  }

  #[tokio::test]
  async fn no_candidates_completes_immediately() {
    let db = Db::connect_in_memory().await.unwrap();
    let http = Client::new();
    let clients = HashMap::new();
    let intent = base_intent();
    let summary = execute(&db, &http, &clients, &intent, TriggerType::Manual)
      .await
      .unwrap();
    assert_eq!(summary.matched, 0);
    assert_eq!(summary.status, ExecutionStatus::Completed);
  }
}
