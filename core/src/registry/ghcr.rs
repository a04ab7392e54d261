use drydock_client::entities::registry_version::{RegistryProvider, ResolvedVersion};
use reqwest::Client;

use super::oci::{resolve_digest, OciLookup};
use crate::error::AppResult;

const HOST: &str = "ghcr.io";

/// GHCR requires a bearer token exchange for every pull; private repos need
/// a GitHub PAT from the associated `RepositoryAccessToken` (spec §4.2).
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
  resolved.provider = Some(RegistryProvider::Ghcr);
  resolved.registry = HOST.to_string();
  resolved.repository = repository.to_string();
  Ok(resolved)
}
