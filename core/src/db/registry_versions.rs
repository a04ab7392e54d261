use anyhow::Context;
use drydock_client::entities::registry_version::{
  RegistryImageVersion, RegistryProvider, ResolvedVersion,
};
use sqlx::{FromRow, SqliteConnection};

use super::Db;

#[derive(FromRow)]
struct Row {
  id: i64,
  user_id: i64,
  image_repo: String,
  registry: String,
  provider: Option<String>,
  namespace: Option<String>,
  repository: String,
  tag: String,
  latest_digest: Option<String>,
  latest_version: Option<String>,
  latest_publish_date: Option<String>,
  exists_in_registry: i64,
  no_digest: i64,
  last_checked: String,
}

fn provider_str(p: RegistryProvider) -> &'static str {
  match p {
    RegistryProvider::DockerHub => "docker_hub",
    RegistryProvider::Ghcr => "ghcr",
    RegistryProvider::GitlabRegistry => "gitlab_registry",
    RegistryProvider::GithubReleases => "github_releases",
    RegistryProvider::GitlabReleases => "gitlab_releases",
  }
}

fn parse_provider(s: &str) -> Option<RegistryProvider> {
  match s {
    "docker_hub" => Some(RegistryProvider::DockerHub),
    "ghcr" => Some(RegistryProvider::Ghcr),
    "gitlab_registry" => Some(RegistryProvider::GitlabRegistry),
    "github_releases" => Some(RegistryProvider::GithubReleases),
    "gitlab_releases" => Some(RegistryProvider::GitlabReleases),
    _ => None,
  }
}

impl From<Row> for RegistryImageVersion {
  fn from(r: Row) -> Self {
    RegistryImageVersion {
      id: r.id,
      user_id: r.user_id,
      image_repo: r.image_repo,
      registry: r.registry,
      provider: r.provider.as_deref().and_then(parse_provider),
      namespace: r.namespace,
      repository: r.repository,
      tag: r.tag,
      latest_digest: r.latest_digest,
      latest_version: r.latest_version,
      latest_publish_date: r.latest_publish_date,
      exists_in_registry: r.exists_in_registry != 0,
      no_digest: r.no_digest != 0,
      last_checked: r.last_checked,
    }
  }
}

const SELECT: &str = "SELECT id, user_id, image_repo, registry, provider, namespace, repository, tag, latest_digest, latest_version, latest_publish_date, exists_in_registry, no_digest, last_checked FROM registry_image_versions";

pub async fn get(
  db: &Db,
  user_id: i64,
  image_repo: &str,
  tag: &str,
) -> anyhow::Result<Option<RegistryImageVersion>> {
  let row: Option<Row> = sqlx::query_as(&format!(
    "{SELECT} WHERE user_id = ? AND image_repo = ? AND tag = ?"
  ))
  .bind(user_id)
  .bind(image_repo)
  .bind(tag)
  .fetch_optional(db.pool())
  .await
  .context("failed to get registry image version")?;
  Ok(row.map(Into::into))
}

pub async fn list_for_user(
  db: &Db,
  user_id: i64,
) -> anyhow::Result<Vec<RegistryImageVersion>> {
  let rows: Vec<Row> = sqlx::query_as(&format!("{SELECT} WHERE user_id = ?"))
    .bind(user_id)
    .fetch_all(db.pool())
    .await
    .context("failed to list registry image versions")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

/// Upserts the resolved "latest" for `(user_id, image_repo, tag)` (spec
/// §4.4 step 4). Called from inside a [`Db::write`] transaction that also
/// touches `deployed_images.last_seen`, so it takes a connection directly
/// rather than acquiring its own.
pub async fn upsert(
  conn: &mut SqliteConnection,
  user_id: i64,
  image_repo: &str,
  tag: &str,
  resolved: &ResolvedVersion,
) -> anyhow::Result<()> {
  let latest_digest =
    resolved.latest_digest.as_deref().and_then(drydock_client::digest::normalize);
  let no_digest = resolved.exists_in_registry && latest_digest.is_none();
  sqlx::query(
    "INSERT INTO registry_image_versions
      (user_id, image_repo, registry, provider, namespace, repository, tag, latest_digest, latest_version, latest_publish_date, exists_in_registry, no_digest, last_checked)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
     ON CONFLICT(user_id, image_repo, tag) DO UPDATE SET
       registry = excluded.registry,
       provider = excluded.provider,
       namespace = excluded.namespace,
       repository = excluded.repository,
       latest_digest = excluded.latest_digest,
       latest_version = excluded.latest_version,
       latest_publish_date = excluded.latest_publish_date,
       exists_in_registry = excluded.exists_in_registry,
       no_digest = excluded.no_digest,
       last_checked = excluded.last_checked",
  )
  .bind(user_id)
  .bind(image_repo)
  .bind(&resolved.registry)
  .bind(resolved.provider.map(provider_str))
  .bind(&resolved.namespace)
  .bind(&resolved.repository)
  .bind(tag)
  .bind(&latest_digest)
  .bind(&resolved.latest_version)
  .bind(&resolved.latest_publish_date)
  .bind(resolved.exists_in_registry)
  .bind(no_digest)
  .bind(drydock_client::entities::now_iso())
  .execute(&mut *conn)
  .await
  .context("failed to upsert registry image version")?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Db;

  #[tokio::test]
  async fn missing_digest_header_records_no_digest_true() {
    let db = Db::connect_in_memory().await.unwrap();
    crate::db::users::create(&db, "u", "h").await.unwrap();
    let resolved = ResolvedVersion {
      latest_digest: None,
      latest_version: Some("1.2.3".into()),
      latest_publish_date: None,
      exists_in_registry: true,
      provider: Some(RegistryProvider::DockerHub),
      registry: "docker.io".into(),
      namespace: None,
      repository: "nginx".into(),
    };
    db.write(|conn| Box::pin(async move {
      upsert(conn, 1, "nginx", "latest", &resolved).await
    }))
    .await
    .unwrap();
    let stored = get(&db, 1, "nginx", "latest").await.unwrap().unwrap();
    assert!(stored.no_digest);
    assert!(stored.exists_in_registry);
    assert_eq!(stored.latest_digest, None);
  }
}
