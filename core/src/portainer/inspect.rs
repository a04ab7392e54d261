//! Docker `inspect` response modelling (spec §4.3). Kept as a thin typed
//! wrapper over the raw JSON so [`ContainerInspect::to_create_body`] can
//! round-trip `Config`/`HostConfig`/`NetworkingConfig` bit-identically apart
//! from the image -- the critical correctness path for upgrades.

use drydock_client::entities::container::ObservedContainer;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerInspect {
  #[serde(rename = "Id")]
  pub id: String,
  #[serde(rename = "Name")]
  pub name: String,
  #[serde(rename = "Created")]
  pub created: Option<String>,
  #[serde(rename = "State")]
  pub state: StateInfo,
  #[serde(rename = "Image")]
  pub image: String,
  #[serde(rename = "Config")]
  pub config: Value,
  #[serde(rename = "HostConfig")]
  pub host_config: Value,
  #[serde(rename = "NetworkSettings")]
  pub network_settings: NetworkSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateInfo {
  #[serde(rename = "Status")]
  pub status: String,
  #[serde(rename = "Running", default)]
  pub running: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSettings {
  #[serde(rename = "Networks", default)]
  pub networks: serde_json::Map<String, Value>,
}

impl ContainerInspect {
  /// Maps the raw inspect payload into the cache/detector layer's staging
  /// type (spec §4.3: "Image (repo@digest), RepoDigests, Created, Labels
  /// (stackName/serviceName), network mode").
  pub fn into_observed(self, endpoint_id: i64) -> ObservedContainer {
    let (image_repo, image_tag) = split_image_repo_tag(&self.image);
    let current_digest = self
      .image
      .split_once('@')
      .and_then(|(_, d)| drydock_client::digest::normalize(d));
    let repo_digests = self
      .config
      .get("Image")
      .and_then(|v| v.as_str())
      .into_iter()
      .map(str::to_string)
      .collect();
    let labels = self
      .config
      .get("Labels")
      .and_then(|v| v.as_object())
      .cloned()
      .unwrap_or_default();
    let stack_name = labels
      .get("com.docker.compose.project")
      .and_then(|v| v.as_str())
      .map(str::to_string);
    let service_name = labels
      .get("com.docker.compose.service")
      .and_then(|v| v.as_str())
      .map(str::to_string);
    let network_mode = self
      .host_config
      .get("NetworkMode")
      .and_then(|v| v.as_str())
      .map(str::to_string);
    let provides_network = !self.network_settings.networks.is_empty()
      && network_mode.as_deref() != Some("none");

    ObservedContainer {
      container_id: self.id,
      container_name: self.name.trim_start_matches('/').to_string(),
      endpoint_id,
      image_name: self.image.clone(),
      image_repo,
      image_tag,
      current_digest,
      repo_digests,
      created: self.created,
      status: self.state.status.clone(),
      state: if self.state.running { "running".to_string() } else { self.state.status },
      stack_name,
      service_name,
      network_mode,
      provides_network,
    }
  }

  /// Builds the body for `POST .../containers/create`, preserving
  /// `Config`/`HostConfig`/`NetworkingConfig` and swapping only the image
  /// (spec §4.3: "round-trip bit-identically apart from the image").
  pub fn to_create_body(&self, new_image: &str) -> Value {
    let mut config = self.config.clone();
    if let Value::Object(map) = &mut config {
      map.insert("Image".to_string(), Value::String(new_image.to_string()));
    }
    let networking_config = serde_json::json!({
      "EndpointsConfig": Value::Object(self.network_settings.networks.clone()),
    });
    let mut body = config;
    if let Value::Object(map) = &mut body {
      map.insert("HostConfig".to_string(), self.host_config.clone());
      map.insert("NetworkingConfig".to_string(), networking_config);
    }
    body
  }
}

fn split_image_repo_tag(image: &str) -> (String, String) {
  let base = image.split('@').next().unwrap_or(image);
  match base.rsplit_once(':') {
    Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), tag.to_string()),
    _ => (base.to_string(), "latest".to_string()),
  }
}
