use drydock_client::entities::registry_version::{RegistryProvider, ResolvedVersion};
use reqwest::Client;

use super::oci::{resolve_digest, OciLookup};
use crate::error::AppResult;

const HOST: &str = "registry-1.docker.io";

/// Docker Hub repository coordinates default the `library/` namespace for
/// unqualified images (spec §4.2: "resolve tag -> manifest digest").
pub fn normalize_repository(repository: &str) -> String {
  if repository.contains('/') {
    repository.to_string()
  } else {
    format!("library/{repository}")
  }
}

pub async fn resolve(
  client: &Client,
  repository: &str,
  tag: &str,
  token: Option<&str>,
) -> AppResult<ResolvedVersion> {
  let repository = normalize_repository(repository);
  let mut resolved = resolve_digest(OciLookup {
    client,
    host: HOST,
    repository: &repository,
    tag,
    static_token: token,
  })
  .await?;
  resolved.provider = Some(RegistryProvider::DockerHub);
  resolved.registry = HOST.to_string();
  resolved.repository = repository;
  Ok(resolved)
}
