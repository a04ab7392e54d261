use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryProvider {
  DockerHub,
  Ghcr,
  GitlabRegistry,
  GithubReleases,
  GitlabReleases,
}

/// "What the registry says is current for this coordinate" (spec §3).
///
/// Invariant: `latest_digest` is either `None` or a normalised
/// `sha256:<64 hex>` string (see [`crate::digest::normalize`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryImageVersion {
  pub id: i64,
  pub user_id: i64,
  pub image_repo: String,
  pub registry: String,
  pub provider: Option<RegistryProvider>,
  pub namespace: Option<String>,
  pub repository: String,
  pub tag: String,
  pub latest_digest: Option<String>,
  pub latest_version: Option<String>,
  pub latest_publish_date: Option<String>,
  pub exists_in_registry: bool,
  pub no_digest: bool,
  pub last_checked: String,
}

/// Outcome of a single registry resolution (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct ResolvedVersion {
  pub latest_digest: Option<String>,
  pub latest_version: Option<String>,
  pub latest_publish_date: Option<String>,
  pub exists_in_registry: bool,
  pub provider: Option<RegistryProvider>,
  pub registry: String,
  pub namespace: Option<String>,
  pub repository: String,
}
