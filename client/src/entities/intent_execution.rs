use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
  ScanDetected,
  Manual,
  ScheduledWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentExecution {
  pub id: i64,
  pub intent_id: i64,
  pub user_id: i64,
  pub status: ExecutionStatus,
  pub trigger_type: TriggerType,
  pub containers_matched: i64,
  pub containers_upgraded: i64,
  pub containers_failed: i64,
  pub containers_skipped: i64,
  pub started_at: String,
  pub completed_at: Option<String>,
  pub duration_ms: Option<i64>,
  pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerExecutionStatus {
  Upgraded,
  Failed,
  Skipped,
  DryRun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentExecutionContainer {
  pub id: i64,
  pub execution_id: i64,
  pub container_id: i64,
  pub container_name: String,
  pub image_name: String,
  pub portainer_instance_id: Option<i64>,
  pub status: ContainerExecutionStatus,
  pub old_image: Option<String>,
  pub new_image: Option<String>,
  pub old_digest: Option<String>,
  pub new_digest: Option<String>,
  pub error_message: Option<String>,
  pub duration_ms: Option<i64>,
}
