use serde::{Deserialize, Serialize};

/// "This exact image is in use somewhere" (spec §3).
///
/// Invariant: if a row exists, at least one [`crate::entities::container::Container`]
/// references it, except in the short window between container delete and
/// orphan cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployedImage {
  pub id: i64,
  pub user_id: i64,
  pub image_repo: String,
  pub image_tag: String,
  pub image_digest: String,
  pub image_created_date: Option<String>,
  pub registry: Option<String>,
  pub namespace: Option<String>,
  pub repository: Option<String>,
  pub repo_digests: Option<String>,
  pub repository_token_id: Option<i64>,
  pub first_seen: String,
  pub last_seen: String,
}

/// Fields needed to upsert a [`DeployedImage`] from a Portainer observation.
#[derive(Debug, Clone)]
pub struct DeployedImageUpsert {
  pub user_id: i64,
  pub image_repo: String,
  pub image_tag: String,
  pub image_digest: String,
  pub image_created_date: Option<String>,
  pub registry: Option<String>,
  pub namespace: Option<String>,
  pub repository: Option<String>,
  pub repo_digests: Option<String>,
}
