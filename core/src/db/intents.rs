use anyhow::Context;
use drydock_client::entities::intent::{
  Intent, IntentInput, ScheduleType, MAX_INTENTS_PER_USER,
};
use sqlx::{FromRow, SqliteConnection};

use super::Db;
use crate::error::{AppError, AppResult};

#[derive(FromRow)]
struct Row {
  id: i64,
  user_id: i64,
  name: String,
  description: Option<String>,
  enabled: i64,
  match_containers: String,
  match_images: String,
  match_instances: Option<String>,
  match_stacks: String,
  match_registries: String,
  exclude_containers: String,
  exclude_images: String,
  exclude_stacks: String,
  exclude_registries: String,
  schedule_type: String,
  schedule_cron: Option<String>,
  max_concurrent: i64,
  dry_run: i64,
  sequential_delay_sec: i64,
  notify_on_update_detected: i64,
  notify_on_batch_start: i64,
  notify_on_success: i64,
  notify_on_failure: i64,
  last_evaluated_at: Option<String>,
  last_execution_id: Option<i64>,
}

fn to_json(list: &[String]) -> String {
  serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

fn from_json(s: &str) -> Vec<String> {
  serde_json::from_str(s).unwrap_or_default()
}

fn schedule_type_str(s: ScheduleType) -> &'static str {
  match s {
    ScheduleType::Immediate => "immediate",
    ScheduleType::Scheduled => "scheduled",
  }
}

fn parse_schedule_type(s: &str) -> ScheduleType {
  match s {
    "scheduled" => ScheduleType::Scheduled,
    _ => ScheduleType::Immediate,
  }
}

impl From<Row> for Intent {
  fn from(r: Row) -> Self {
    Intent {
      id: r.id,
      user_id: r.user_id,
      name: r.name,
      description: r.description,
      enabled: r.enabled != 0,
      match_containers: from_json(&r.match_containers),
      match_images: from_json(&r.match_images),
      match_instances: r
        .match_instances
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok()),
      match_stacks: from_json(&r.match_stacks),
      match_registries: from_json(&r.match_registries),
      exclude_containers: from_json(&r.exclude_containers),
      exclude_images: from_json(&r.exclude_images),
      exclude_stacks: from_json(&r.exclude_stacks),
      exclude_registries: from_json(&r.exclude_registries),
      schedule_type: parse_schedule_type(&r.schedule_type),
      schedule_cron: r.schedule_cron,
      max_concurrent: r.max_concurrent as u32,
      dry_run: r.dry_run != 0,
      sequential_delay_sec: r.sequential_delay_sec as u32,
      notify_on_update_detected: r.notify_on_update_detected != 0,
      notify_on_batch_start: r.notify_on_batch_start != 0,
      notify_on_success: r.notify_on_success != 0,
      notify_on_failure: r.notify_on_failure != 0,
      last_evaluated_at: r.last_evaluated_at,
      last_execution_id: r.last_execution_id,
    }
  }
}

const SELECT: &str = "SELECT id, user_id, name, description, enabled, match_containers, match_images, match_instances, match_stacks, match_registries, exclude_containers, exclude_images, exclude_stacks, exclude_registries, schedule_type, schedule_cron, max_concurrent, dry_run, sequential_delay_sec, notify_on_update_detected, notify_on_batch_start, notify_on_success, notify_on_failure, last_evaluated_at, last_execution_id FROM intents";

pub async fn list_for_user(db: &Db, user_id: i64) -> anyhow::Result<Vec<Intent>> {
  let rows: Vec<Row> = sqlx::query_as(&format!("{SELECT} WHERE user_id = ?"))
    .bind(user_id)
    .fetch_all(db.pool())
    .await
    .context("failed to list intents")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn list_enabled(db: &Db) -> anyhow::Result<Vec<Intent>> {
  let rows: Vec<Row> = sqlx::query_as(&format!("{SELECT} WHERE enabled = 1"))
    .fetch_all(db.pool())
    .await
    .context("failed to list enabled intents")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get_owned(
  db: &Db,
  user_id: i64,
  id: i64,
) -> anyhow::Result<Option<Intent>> {
  let row: Option<Row> =
    sqlx::query_as(&format!("{SELECT} WHERE id = ? AND user_id = ?"))
      .bind(id)
      .bind(user_id)
      .fetch_optional(db.pool())
      .await
      .context("failed to get intent")?;
  Ok(row.map(Into::into))
}

/// Creates an intent, enforcing the per-user cap atomically inside the same
/// write transaction (spec §3, §8: "the 51st creation fails atomically, with
/// no partial row").
pub async fn create(
  db: &Db,
  user_id: i64,
  input: IntentInput,
) -> AppResult<Intent> {
  let result = db
    .write(|conn: &mut SqliteConnection| async move {
      let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM intents WHERE user_id = ?")
          .bind(user_id)
          .fetch_one(&mut *conn)
          .await
          .context("failed to count intents")?;
      if count >= MAX_INTENTS_PER_USER {
        anyhow::bail!(IntentCapExceeded);
      }
      let match_instances_json = input
        .match_instances
        .as_ref()
        .map(|v| serde_json::to_string(v).unwrap_or_else(|_| "[]".into()));
      let id = sqlx::query(
        "INSERT INTO intents
          (user_id, name, description, enabled, match_containers, match_images,
           match_instances, match_stacks, match_registries, exclude_containers,
           exclude_images, exclude_stacks, exclude_registries, schedule_type,
           schedule_cron, max_concurrent, dry_run, sequential_delay_sec,
           notify_on_update_detected, notify_on_batch_start, notify_on_success,
           notify_on_failure)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
      )
      .bind(user_id)
      .bind(&input.name)
      .bind(&input.description)
      .bind(input.enabled)
      .bind(to_json(&input.match_containers))
      .bind(to_json(&input.match_images))
      .bind(&match_instances_json)
      .bind(to_json(&input.match_stacks))
      .bind(to_json(&input.match_registries))
      .bind(to_json(&input.exclude_containers))
      .bind(to_json(&input.exclude_images))
      .bind(to_json(&input.exclude_stacks))
      .bind(to_json(&input.exclude_registries))
      .bind(schedule_type_str(input.schedule_type))
      .bind(&input.schedule_cron)
      .bind(input.max_concurrent)
      .bind(input.dry_run)
      .bind(input.sequential_delay_sec)
      .bind(input.notify_on_update_detected)
      .bind(input.notify_on_batch_start)
      .bind(input.notify_on_success)
      .bind(input.notify_on_failure)
      .execute(&mut *conn)
      .await
      .context("failed to insert intent")?
      .last_insert_rowid();
      Ok(Intent {
        id,
        user_id,
        name: input.name,
        description: input.description,
        enabled: input.enabled,
        match_containers: input.match_containers,
        match_images: input.match_images,
        match_instances: input.match_instances,
        match_stacks: input.match_stacks,
        match_registries: input.match_registries,
        exclude_containers: input.exclude_containers,
        exclude_images: input.exclude_images,
        exclude_stacks: input.exclude_stacks,
        exclude_registries: input.exclude_registries,
        schedule_type: input.schedule_type,
        schedule_cron: input.schedule_cron,
        max_concurrent: input.max_concurrent,
        dry_run: input.dry_run,
        sequential_delay_sec: input.sequential_delay_sec,
        notify_on_update_detected: input.notify_on_update_detected,
        notify_on_batch_start: input.notify_on_batch_start,
        notify_on_success: input.notify_on_success,
        notify_on_failure: input.notify_on_failure,
        last_evaluated_at: None,
        last_execution_id: None,
      })
    })
    .await;

  match result {
    Ok(intent) => Ok(intent),
    Err(e) => {
      if e.downcast_ref::<IntentCapExceeded>().is_some() {
        Err(AppError::validation(format!(
          "user {user_id} already has the maximum of {MAX_INTENTS_PER_USER} intents"
        )))
      } else {
        Err(e.into())
      }
    }
  }
}

#[derive(Debug, thiserror::Error)]
#[error("intent cap exceeded")]
struct IntentCapExceeded;

pub async fn update(
  db: &Db,
  user_id: i64,
  id: i64,
  input: IntentInput,
) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    let match_instances_json = input
      .match_instances
      .as_ref()
      .map(|v| serde_json::to_string(v).unwrap_or_else(|_| "[]".into()));
    sqlx::query(
      "UPDATE intents SET
        name = ?, description = ?, enabled = ?, match_containers = ?, match_images = ?,
        match_instances = ?, match_stacks = ?, match_registries = ?, exclude_containers = ?,
        exclude_images = ?, exclude_stacks = ?, exclude_registries = ?, schedule_type = ?,
        schedule_cron = ?, max_concurrent = ?, dry_run = ?, sequential_delay_sec = ?,
        notify_on_update_detected = ?, notify_on_batch_start = ?, notify_on_success = ?,
        notify_on_failure = ?
       WHERE id = ? AND user_id = ?",
    )
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.enabled)
    .bind(to_json(&input.match_containers))
    .bind(to_json(&input.match_images))
    .bind(&match_instances_json)
    .bind(to_json(&input.match_stacks))
    .bind(to_json(&input.match_registries))
    .bind(to_json(&input.exclude_containers))
    .bind(to_json(&input.exclude_images))
    .bind(to_json(&input.exclude_stacks))
    .bind(to_json(&input.exclude_registries))
    .bind(schedule_type_str(input.schedule_type))
    .bind(&input.schedule_cron)
    .bind(input.max_concurrent)
    .bind(input.dry_run)
    .bind(input.sequential_delay_sec)
    .bind(input.notify_on_update_detected)
    .bind(input.notify_on_batch_start)
    .bind(input.notify_on_success)
    .bind(input.notify_on_failure)
    .bind(id)
    .bind(user_id)
    .execute(conn)
    .await
    .context("failed to update intent")?;
    Ok(())
  })
  .await
}

pub async fn delete(db: &Db, user_id: i64, id: i64) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    sqlx::query("DELETE FROM intents WHERE id = ? AND user_id = ?")
      .bind(id)
      .bind(user_id)
      .execute(conn)
      .await
      .context("failed to delete intent")?;
    Ok(())
  })
  .await
}

pub async fn set_enabled(
  db: &Db,
  user_id: i64,
  id: i64,
  enabled: bool,
) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    sqlx::query("UPDATE intents SET enabled = ? WHERE id = ? AND user_id = ?")
      .bind(enabled)
      .bind(id)
      .bind(user_id)
      .execute(conn)
      .await
      .context("failed to toggle intent")?;
    Ok(())
  })
  .await
}

pub async fn record_evaluation(
  conn: &mut SqliteConnection,
  id: i64,
  execution_id: Option<i64>,
) -> anyhow::Result<()> {
  sqlx::query(
    "UPDATE intents SET last_evaluated_at = ?, last_execution_id = COALESCE(?, last_execution_id) WHERE id = ?",
  )
  .bind(drydock_client::entities::now_iso())
  .bind(execution_id)
  .bind(id)
  .execute(&mut *conn)
  .await
  .context("failed to record intent evaluation")?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn input(name: &str) -> IntentInput {
    IntentInput {
      name: name.to_string(),
      description: None,
      enabled: true,
      match_containers: vec![],
      match_images: vec!["nginx*".to_string()],
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
    }
  }

  async fn seed_user(db: &Db) -> i64 {
    crate::db::users::create(db, "u", "h").await.unwrap().id
  }

  #[tokio::test]
  async fn create_enforces_per_user_cap() {
    let db = Db::connect_in_memory().await.unwrap();
    let user_id = seed_user(&db).await;
    for i in 0..MAX_INTENTS_PER_USER {
      create(&db, user_id, input(&format!("intent-{i}"))).await.unwrap();
    }
    let err = create(&db, user_id, input("one-too-many")).await.unwrap_err();
    assert_eq!(
      err.kind,
      drydock_client::entities::error::ErrorKind::Validation
    );
    assert_eq!(list_for_user(&db, user_id).await.unwrap().len(), MAX_INTENTS_PER_USER as usize);
  }

  #[tokio::test]
  async fn update_and_toggle_round_trip() {
    let db = Db::connect_in_memory().await.unwrap();
    let user_id = seed_user(&db).await;
    let created = create(&db, user_id, input("watch-nginx")).await.unwrap();

    let mut updated_input = input("watch-nginx-renamed");
    updated_input.dry_run = true;
    update(&db, user_id, created.id, updated_input).await.unwrap();
    let fetched = get_owned(&db, user_id, created.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "watch-nginx-renamed");
    assert!(fetched.dry_run);

    set_enabled(&db, user_id, created.id, false).await.unwrap();
    let fetched = get_owned(&db, user_id, created.id).await.unwrap().unwrap();
    assert!(!fetched.enabled);
  }

  #[tokio::test]
  async fn get_owned_is_scoped_to_user() {
    let db = Db::connect_in_memory().await.unwrap();
    let owner = seed_user(&db).await;
    let other = crate::db::users::create(&db, "other", "h").await.unwrap().id;
    let created = create(&db, owner, input("mine")).await.unwrap();
    assert!(get_owned(&db, other, created.id).await.unwrap().is_none());
  }
}
