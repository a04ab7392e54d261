use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
  Immediate,
  Scheduled,
}

/// A declarative auto-upgrade policy (spec §3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
  pub id: i64,
  pub user_id: i64,
  pub name: String,
  pub description: Option<String>,
  pub enabled: bool,

  pub match_containers: Vec<String>,
  pub match_images: Vec<String>,
  pub match_instances: Option<Vec<i64>>,
  pub match_stacks: Vec<String>,
  pub match_registries: Vec<String>,

  pub exclude_containers: Vec<String>,
  pub exclude_images: Vec<String>,
  pub exclude_stacks: Vec<String>,
  pub exclude_registries: Vec<String>,

  pub schedule_type: ScheduleType,
  pub schedule_cron: Option<String>,

  pub max_concurrent: u32,
  pub dry_run: bool,
  pub sequential_delay_sec: u32,

  pub notify_on_update_detected: bool,
  pub notify_on_batch_start: bool,
  pub notify_on_success: bool,
  pub notify_on_failure: bool,

  pub last_evaluated_at: Option<String>,
  pub last_execution_id: Option<i64>,
}

/// Maximum number of intents allowed per user (spec §3, §8).
pub const MAX_INTENTS_PER_USER: i64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentInput {
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default)]
  pub match_containers: Vec<String>,
  #[serde(default)]
  pub match_images: Vec<String>,
  #[serde(default)]
  pub match_instances: Option<Vec<i64>>,
  #[serde(default)]
  pub match_stacks: Vec<String>,
  #[serde(default)]
  pub match_registries: Vec<String>,
  #[serde(default)]
  pub exclude_containers: Vec<String>,
  #[serde(default)]
  pub exclude_images: Vec<String>,
  #[serde(default)]
  pub exclude_stacks: Vec<String>,
  #[serde(default)]
  pub exclude_registries: Vec<String>,
  pub schedule_type: ScheduleType,
  #[serde(default)]
  pub schedule_cron: Option<String>,
  #[serde(default = "default_max_concurrent")]
  pub max_concurrent: u32,
  #[serde(default)]
  pub dry_run: bool,
  #[serde(default)]
  pub sequential_delay_sec: u32,
  #[serde(default)]
  pub notify_on_update_detected: bool,
  #[serde(default)]
  pub notify_on_batch_start: bool,
  #[serde(default)]
  pub notify_on_success: bool,
  #[serde(default)]
  pub notify_on_failure: bool,
}

fn default_true() -> bool {
  true
}

fn default_max_concurrent() -> u32 {
  1
}

/// Glob/regex matching candidate, the minimal slice of [`crate::entities::container::Container`]
/// an intent predicate needs. Kept separate so the pure `matches` function in
/// `drydock_core::intent` has no database dependency.
#[derive(Debug, Clone)]
pub struct MatchCandidate<'a> {
  pub container_name: &'a str,
  pub image_repo: &'a str,
  pub portainer_instance_id: i64,
  pub stack_name: Option<&'a str>,
  pub registry: Option<&'a str>,
}
