//! Intent engine (spec §4.7, C7): a declarative predicate plus the
//! execution loop that acts on it.

pub mod engine;

use drydock_client::entities::intent::{Intent, MatchCandidate};

use crate::helpers::matcher::{any_excludes, any_matches};

/// `matches(intent, c)` (spec §4.7). Pure: no I/O, no database access.
pub fn matches(intent: &Intent, c: &MatchCandidate<'_>) -> bool {
  let stack_name = c.stack_name.unwrap_or("");

  let instance_ok = match &intent.match_instances {
    Some(ids) => ids.contains(&c.portainer_instance_id),
    None => true,
  };

  let positive = any_matches(&intent.match_containers, c.container_name)
    && any_matches(&intent.match_images, c.image_repo)
    && instance_ok
    && any_matches(&intent.match_stacks, stack_name)
    && match_registry(&intent.match_registries, c.registry);

  if !positive {
    return false;
  }

  !any_excludes(&intent.exclude_containers, c.container_name)
    && !any_excludes(&intent.exclude_images, c.image_repo)
    && !any_excludes(&intent.exclude_stacks, stack_name)
    && !exclude_registry(&intent.exclude_registries, c.registry)
}

/// Registry criteria are exact-match, not globs (spec §4.7: `eq(r,
/// c.registry)`).
fn match_registry(registries: &[String], registry: Option<&str>) -> bool {
  if registries.is_empty() {
    return true;
  }
  match registry {
    Some(r) => registries.iter().any(|x| x == r),
    None => false,
  }
}

fn exclude_registry(registries: &[String], registry: Option<&str>) -> bool {
  match registry {
    Some(r) => registries.iter().any(|x| x == r),
    None => false,
  }
}

#[cfg(test)]
mod tests {
  use drydock_client::entities::intent::ScheduleType;

  use super::*;

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

  #[test]
  fn empty_criteria_match_everything() {
    let intent = base_intent();
    let c = MatchCandidate {
      container_name: "anything",
      image_repo: "anything",
      portainer_instance_id: 42,
      stack_name: None,
      registry: None,
    };
    assert!(matches(&intent, &c));
  }

  #[test]
  fn unstacked_container_treated_as_empty_stack() {
    let mut intent = base_intent();
    intent.match_stacks = vec!["".to_string()];
    let c = MatchCandidate {
      container_name: "c",
      image_repo: "nginx",
      portainer_instance_id: 1,
      stack_name: None,
      registry: None,
    };
    assert!(matches(&intent, &c));

    intent.match_stacks = vec!["myapp".to_string()];
    assert!(!matches(&intent, &c));
  }

  #[test]
  fn exclude_wins_over_match() {
    let mut intent = base_intent();
    intent.match_images = vec!["nginx*".to_string()];
    intent.exclude_containers = vec!["nginx-canary".to_string()];
    let c = MatchCandidate {
      container_name: "nginx-canary",
      image_repo: "nginx",
      portainer_instance_id: 1,
      stack_name: None,
      registry: None,
    };
    assert!(!matches(&intent, &c));
  }

  #[test]
  fn match_instances_restricts_by_id() {
    let mut intent = base_intent();
    intent.match_instances = Some(vec![1, 2]);
    let c = MatchCandidate {
      container_name: "c",
      image_repo: "nginx",
      portainer_instance_id: 3,
      stack_name: None,
      registry: None,
    };
    assert!(!matches(&intent, &c));
  }
}
