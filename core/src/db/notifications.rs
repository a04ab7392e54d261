use anyhow::Context;
use drydock_client::entities::notification::{NotificationType, Webhook};
use sqlx::{FromRow, SqliteConnection};

use super::Db;

fn notification_type_str(t: NotificationType) -> &'static str {
  t.as_str()
}

/// Attempts to record that `deduplication_key` has been sent for `user_id`.
/// Returns `true` if this call won the race and the caller should actually
/// dispatch; `false` if another sender already recorded it (spec §4.8: "at
/// most once per (user, deduplication_key)").
pub async fn try_claim_dedup(
  db: &Db,
  user_id: i64,
  deduplication_key: &str,
  notification_type: NotificationType,
) -> anyhow::Result<bool> {
  db.write(|conn: &mut SqliteConnection| {
    let deduplication_key = deduplication_key.to_string();
    async move {
      let result = sqlx::query(
        "INSERT INTO notifications_sent (user_id, deduplication_key, notification_type, sent_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(user_id, deduplication_key) DO NOTHING",
      )
      .bind(user_id)
      .bind(&deduplication_key)
      .bind(notification_type_str(notification_type))
      .bind(drydock_client::entities::now_iso())
      .execute(&mut *conn)
      .await
      .context("failed to claim notification dedup key")?;
      Ok(result.rows_affected() == 1)
    }
  })
  .await
}

#[derive(FromRow)]
struct WebhookRow {
  id: i64,
  user_id: i64,
  name: String,
  url: String,
  enabled: i64,
}

impl From<WebhookRow> for Webhook {
  fn from(r: WebhookRow) -> Self {
    Webhook {
      id: r.id,
      user_id: r.user_id,
      name: r.name,
      url: r.url,
      enabled: r.enabled != 0,
    }
  }
}

const WEBHOOK_SELECT: &str =
  "SELECT id, user_id, name, url, enabled FROM webhooks";

pub async fn list_enabled_webhooks(
  db: &Db,
  user_id: i64,
) -> anyhow::Result<Vec<Webhook>> {
  let rows: Vec<WebhookRow> = sqlx::query_as(&format!(
    "{WEBHOOK_SELECT} WHERE user_id = ? AND enabled = 1"
  ))
  .bind(user_id)
  .fetch_all(db.pool())
  .await
  .context("failed to list webhooks")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn list_for_user(db: &Db, user_id: i64) -> anyhow::Result<Vec<Webhook>> {
  let rows: Vec<WebhookRow> = sqlx::query_as(&format!("{WEBHOOK_SELECT} WHERE user_id = ?"))
    .bind(user_id)
    .fetch_all(db.pool())
    .await
    .context("failed to list webhooks")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get_owned(db: &Db, user_id: i64, id: i64) -> anyhow::Result<Option<Webhook>> {
  let row: Option<WebhookRow> =
    sqlx::query_as(&format!("{WEBHOOK_SELECT} WHERE id = ? AND user_id = ?"))
      .bind(id)
      .bind(user_id)
      .fetch_optional(db.pool())
      .await
      .context("failed to fetch webhook")?;
  Ok(row.map(Into::into))
}

pub async fn set_enabled(db: &Db, user_id: i64, id: i64, enabled: bool) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    sqlx::query("UPDATE webhooks SET enabled = ? WHERE id = ? AND user_id = ?")
      .bind(enabled)
      .bind(id)
      .bind(user_id)
      .execute(conn)
      .await
      .context("failed to update webhook")?;
    Ok(())
  })
  .await
}

pub async fn create_webhook(
  db: &Db,
  user_id: i64,
  name: &str,
  url: &str,
) -> anyhow::Result<Webhook> {
  db.write(|conn: &mut SqliteConnection| async move {
    let id = sqlx::query(
      "INSERT INTO webhooks (user_id, name, url, enabled) VALUES (?, ?, ?, 1)",
    )
    .bind(user_id)
    .bind(name)
    .bind(url)
    .execute(conn)
    .await
    .context("failed to insert webhook")?
    .last_insert_rowid();
    Ok(Webhook {
      id,
      user_id,
      name: name.to_string(),
      url: url.to_string(),
      enabled: true,
    })
  })
  .await
}

pub async fn delete_webhook(db: &Db, user_id: i64, id: i64) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    sqlx::query("DELETE FROM webhooks WHERE id = ? AND user_id = ?")
      .bind(id)
      .bind(user_id)
      .execute(conn)
      .await
      .context("failed to delete webhook")?;
    Ok(())
  })
  .await
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Db;

  #[tokio::test]
  async fn dedup_key_claimed_exactly_once() {
    let db = Db::connect_in_memory().await.unwrap();
    crate::db::users::create(&db, "u", "h").await.unwrap();
    let first =
      try_claim_dedup(&db, 1, "intent:1:container:2", NotificationType::AutoUpdateSuccess)
        .await
        .unwrap();
    let second =
      try_claim_dedup(&db, 1, "intent:1:container:2", NotificationType::AutoUpdateSuccess)
        .await
        .unwrap();
    assert!(first);
    assert!(!second);
  }
}
