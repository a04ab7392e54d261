//! Registry clients (spec §4.2, C2). A uniform capability -- given
//! `(imageRepo, tag, optional accessToken)`, return a [`ResolvedVersion`] --
//! implemented per provider and dispatched by `imageRepo` prefix.

pub mod docker_hub;
pub mod ghcr;
pub mod github_releases;
pub mod gitlab_registry;
pub mod gitlab_releases;
mod oci;
pub mod retry;

use drydock_client::entities::registry_version::ResolvedVersion;
use reqwest::Client;

use crate::error::AppResult;

/// Picks the registry client by examining `image_repo`'s prefix (spec §4.4
/// step 2: "`ghcr.io/…`, `registry.gitlab.com/…`, else Docker Hub").
pub async fn resolve_image(
  client: &Client,
  image_repo: &str,
  tag: &str,
  token: Option<&str>,
) -> AppResult<ResolvedVersion> {
  if let Some(rest) = image_repo.strip_prefix("ghcr.io/") {
    ghcr::resolve(client, rest, tag, token).await
  } else if let Some(rest) = image_repo.strip_prefix("registry.gitlab.com/") {
    gitlab_registry::resolve(client, rest, tag, token).await
  } else {
    docker_hub::resolve(client, image_repo, tag, token).await
  }
}
