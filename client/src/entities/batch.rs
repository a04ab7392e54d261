use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
  DockerHubPull,
  TrackedAppsCheck,
  AutoUpdate,
}

impl JobType {
  pub const ALL: [JobType; 3] = [
    JobType::DockerHubPull,
    JobType::TrackedAppsCheck,
    JobType::AutoUpdate,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      JobType::DockerHubPull => "docker-hub-pull",
      JobType::TrackedAppsCheck => "tracked-apps-check",
      JobType::AutoUpdate => "auto-update",
    }
  }

  pub fn parse(s: &str) -> Option<JobType> {
    match s {
      "docker-hub-pull" => Some(JobType::DockerHubPull),
      "tracked-apps-check" => Some(JobType::TrackedAppsCheck),
      "auto-update" => Some(JobType::AutoUpdate),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
  pub user_id: i64,
  pub job_type: JobType,
  pub enabled: bool,
  pub interval_minutes: i64,
}

/// Bounds enforced on `interval_minutes` (spec §8).
pub const MIN_INTERVAL_MINUTES: i64 = 1;
pub const MAX_INTERVAL_MINUTES: i64 = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Running,
  Completed,
  Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
  pub id: i64,
  pub user_id: i64,
  pub job_type: JobType,
  pub status: RunStatus,
  pub is_manual: bool,
  pub started_at: String,
  pub completed_at: Option<String>,
  pub duration_ms: Option<i64>,
  pub containers_checked: i64,
  pub containers_updated: i64,
  pub error_message: Option<String>,
  pub logs: String,
}

/// Result of attempting to acquire the per-`(user_id, job_type)` batch lock
/// (spec §4.1 `checkAndAcquireBatchJobLock`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
  Acquired,
  AlreadyRunning { run_id: i64 },
}
