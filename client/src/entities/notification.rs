use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationType {
  AutoUpdateDetected,
  AutoUpdateBatchStarted,
  AutoUpdateSuccess,
  AutoUpdateFailure,
  AutoUpdateBatchSummary,
  TrackedAppUpdate,
  TrackedAppBatchSummary,
}

impl NotificationType {
  pub fn as_str(&self) -> &'static str {
    match self {
      NotificationType::AutoUpdateDetected => "auto-update-detected",
      NotificationType::AutoUpdateBatchStarted => {
        "auto-update-batch-started"
      }
      NotificationType::AutoUpdateSuccess => "auto-update-success",
      NotificationType::AutoUpdateFailure => "auto-update-failure",
      NotificationType::AutoUpdateBatchSummary => {
        "auto-update-batch-summary"
      }
      NotificationType::TrackedAppUpdate => "tracked-app-update",
      NotificationType::TrackedAppBatchSummary => {
        "tracked-app-batch-summary"
      }
    }
  }
}

/// A notification payload field (spec §6.3), e.g. `{"Image", "nginx:latest"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationField {
  pub name: String,
  pub value: String,
}

/// The content template enqueued for dispatch. Transport (the actual webhook
/// POST) is pluggable and out of scope per spec §1/§6.3 — this is the
/// "with what content" half of "when and with what content".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
  pub user_id: i64,
  pub notification_type: NotificationType,
  pub deduplication_key: String,
  pub title: String,
  pub description: String,
  pub fields: Vec<NotificationField>,
  pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSentRecord {
  pub user_id: i64,
  pub deduplication_key: String,
  pub notification_type: NotificationType,
  pub sent_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
  pub id: i64,
  pub user_id: i64,
  pub name: String,
  pub url: String,
  pub enabled: bool,
}

/// Request body for registering a webhook sink (spec §6.3). Never carries
/// `id`/`user_id` — those are assigned by the owning handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookInput {
  pub name: String,
  pub url: String,
}
