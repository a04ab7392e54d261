//! Notification dispatcher (spec §4.8, C8): a dedup-gated publisher with a
//! single outbound transport (webhook POST). The core only enqueues -- the
//! transport side is deliberately pluggable (spec §6.3).

use drydock_client::entities::notification::{NotificationEvent, NotificationField};
use reqwest::Client;

use crate::db::{self, Db};

/// Publishes `event`, claiming its dedup key first (spec §4.8: "insert with
/// `IGNORE` on conflict; if 0 rows the event is dropped"). Transport errors
/// are logged, never propagated -- a failed webhook POST must not fail the
/// batch run or intent execution that produced the event.
pub async fn publish(db: &Db, http: &Client, event: NotificationEvent) {
  match db::notifications::try_claim_dedup(
    db,
    event.user_id,
    &event.deduplication_key,
    event.notification_type,
  )
  .await
  {
    Ok(true) => {}
    Ok(false) => {
      tracing::debug!(key = %event.deduplication_key, "notification already sent, skipping");
      return;
    }
    Err(e) => {
      tracing::warn!("failed to claim dedup key {}: {:#}", event.deduplication_key, e);
      return;
    }
  }

  let webhooks = match db::notifications::list_enabled_webhooks(db, event.user_id).await {
    Ok(list) => list,
    Err(e) => {
      tracing::warn!("failed to list webhooks for user {}: {:#}", event.user_id, e);
      return;
    }
  };

  let payload = serde_json::json!({
    "type": event.notification_type.as_str(),
    "title": event.title,
    "description": event.description,
    "fields": event.fields,
    "timestamp": event.timestamp,
  });

  for webhook in webhooks {
    let res = http.post(&webhook.url).json(&payload).send().await;
    match res {
      Ok(r) if r.status().is_success() => {}
      Ok(r) => tracing::warn!(
        "webhook {} ({}) returned {}",
        webhook.name,
        webhook.url,
        r.status()
      ),
      Err(e) => tracing::warn!("webhook {} ({}) failed: {:#}", webhook.name, webhook.url, e),
    }
  }
}

pub fn field(name: impl Into<String>, value: impl Into<String>) -> NotificationField {
  NotificationField { name: name.into(), value: value.into() }
}
