use drydock_client::entities::registry_version::{RegistryProvider, ResolvedVersion};
use reqwest::Client;

use super::oci::{resolve_digest, OciLookup};
use crate::error::AppResult;

const HOST: &str = "registry.gitlab.com";

pub async fn resolve(
  client: &Client,
  repository: &str,
  tag: &str,
  token: Option<&str>,
) -> AppResult<ResolvedVersion> {
  let mut resolved = resolve_digest(OciLookup {
    client,
    host: HOST,
    repository,
    tag,
    static_token: token,
  })
  .await?;
  resolved.provider = Some(RegistryProvider::GitlabRegistry);
  resolved.registry = HOST.to_string();
  resolved.repository = repository.to_string();
  Ok(resolved)
}
