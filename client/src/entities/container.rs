use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
  pub id: i64,
  pub user_id: i64,
  pub portainer_instance_id: i64,
  pub container_id: String,
  pub container_name: String,
  pub endpoint_id: i64,
  pub image_name: String,
  pub image_repo: String,
  pub status: String,
  pub state: String,
  pub stack_name: Option<String>,
  pub deployed_image_id: Option<i64>,
  pub uses_network_mode: Option<String>,
  pub provides_network: bool,
  pub last_seen: String,
}

/// Denormalised view returned by `getContainersWithUpdates` (spec §4.1):
/// carries both the currently-deployed digest and the registry's latest
/// digest so callers compute `has_update` via [`crate::digest::compute_has_update`]
/// rather than reading a stored flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerWithUpdateInfo {
  #[serde(flatten)]
  pub container: Container,
  pub registry: Option<String>,
  pub current_digest: Option<String>,
  pub latest_digest: Option<String>,
  pub latest_version: Option<String>,
  pub latest_publish_date: Option<String>,
  pub exists_in_registry: Option<bool>,
}

impl ContainerWithUpdateInfo {
  pub fn has_update(&self) -> bool {
    crate::digest::compute_has_update(
      self.current_digest.as_deref(),
      self.latest_digest.as_deref(),
    )
  }
}

/// A container as freshly observed from a Portainer `inspect` call (spec §4.3),
/// prior to being merged with cached/db state.
#[derive(Debug, Clone)]
pub struct ObservedContainer {
  pub container_id: String,
  pub container_name: String,
  pub endpoint_id: i64,
  pub image_name: String,
  pub image_repo: String,
  pub image_tag: String,
  pub current_digest: Option<String>,
  pub repo_digests: Vec<String>,
  pub created: Option<String>,
  pub status: String,
  pub state: String,
  pub stack_name: Option<String>,
  pub service_name: Option<String>,
  pub network_mode: Option<String>,
  pub provides_network: bool,
}
