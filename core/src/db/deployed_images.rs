use anyhow::Context;
use drydock_client::entities::deployed_image::{
  DeployedImage, DeployedImageUpsert,
};
use sqlx::{FromRow, Row, SqliteConnection};

use super::Db;

#[derive(FromRow)]
struct ImgRow {
  id: i64,
  user_id: i64,
  image_repo: String,
  image_tag: String,
  image_digest: String,
  image_created_date: Option<String>,
  registry: Option<String>,
  namespace: Option<String>,
  repository: Option<String>,
  repo_digests: Option<String>,
  repository_token_id: Option<i64>,
  first_seen: String,
  last_seen: String,
}

impl From<ImgRow> for DeployedImage {
  fn from(r: ImgRow) -> Self {
    DeployedImage {
      id: r.id,
      user_id: r.user_id,
      image_repo: r.image_repo,
      image_tag: r.image_tag,
      image_digest: r.image_digest,
      image_created_date: r.image_created_date,
      registry: r.registry,
      namespace: r.namespace,
      repository: r.repository,
      repo_digests: r.repo_digests,
      repository_token_id: r.repository_token_id,
      first_seen: r.first_seen,
      last_seen: r.last_seen,
    }
  }
}

const SELECT: &str = "SELECT id, user_id, image_repo, image_tag, image_digest, image_created_date, registry, namespace, repository, repo_digests, repository_token_id, first_seen, last_seen FROM deployed_images";

pub async fn list_for_user(
  db: &Db,
  user_id: i64,
) -> anyhow::Result<Vec<DeployedImage>> {
  let rows: Vec<ImgRow> = sqlx::query_as(&format!("{SELECT} WHERE user_id = ?"))
    .bind(user_id)
    .fetch_all(db.pool())
    .await
    .context("failed to list deployed images")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

/// Distinct `(image_repo, image_tag)` pairs for a user, along with whichever
/// access token was last associated with that repo -- the unit of work for
/// the update detector's registry fan-out (spec §4.4 step 1-2). Picks an
/// arbitrary token among rows sharing the same `(image_repo, image_tag)`;
/// the spec models the association per image, not per digest.
pub async fn distinct_repo_tag_pairs(
  db: &Db,
  user_id: i64,
) -> anyhow::Result<Vec<(String, String, Option<i64>)>> {
  let rows = sqlx::query(
    "SELECT image_repo, image_tag, MAX(repository_token_id) as repository_token_id
     FROM deployed_images WHERE user_id = ?
     GROUP BY image_repo, image_tag",
  )
  .bind(user_id)
  .fetch_all(db.pool())
  .await
  .context("failed to list distinct repo/tag pairs")?;
  Ok(
    rows
      .into_iter()
      .map(|row| {
        (
          row.get::<String, _>("image_repo"),
          row.get::<String, _>("image_tag"),
          row.get::<Option<i64>, _>("repository_token_id"),
        )
      })
      .collect(),
  )
}

/// Sets the access token association for every `deployed_images` row
/// matching `(image_repo, image_tag)` (spec §6.4 "associate-images").
pub async fn associate_token(
  conn: &mut SqliteConnection,
  user_id: i64,
  image_repo: &str,
  image_tag: &str,
  repository_token_id: Option<i64>,
) -> anyhow::Result<u64> {
  let result = sqlx::query(
    "UPDATE deployed_images SET repository_token_id = ?
     WHERE user_id = ? AND image_repo = ? AND image_tag = ?",
  )
  .bind(repository_token_id)
  .bind(user_id)
  .bind(image_repo)
  .bind(image_tag)
  .execute(&mut *conn)
  .await
  .context("failed to associate repository token")?;
  Ok(result.rows_affected())
}

/// Upserts `(user_id, image_repo, image_tag, image_digest)`, advancing
/// `last_seen` on conflict (spec §8: "upserting the same key twice yields
/// one row with `last_seen` advanced").
pub async fn upsert(
  conn: &mut SqliteConnection,
  upsert: &DeployedImageUpsert,
) -> anyhow::Result<i64> {
  let now = drydock_client::entities::now_iso();
  sqlx::query(
    "INSERT INTO deployed_images
      (user_id, image_repo, image_tag, image_digest, image_created_date, registry, namespace, repository, repo_digests, first_seen, last_seen)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
     ON CONFLICT(user_id, image_repo, image_tag, image_digest) DO UPDATE SET
       last_seen = excluded.last_seen,
       image_created_date = COALESCE(excluded.image_created_date, deployed_images.image_created_date),
       registry = COALESCE(excluded.registry, deployed_images.registry),
       namespace = COALESCE(excluded.namespace, deployed_images.namespace),
       repository = COALESCE(excluded.repository, deployed_images.repository),
       repo_digests = COALESCE(excluded.repo_digests, deployed_images.repo_digests)",
  )
  .bind(upsert.user_id)
  .bind(&upsert.image_repo)
  .bind(&upsert.image_tag)
  .bind(&upsert.image_digest)
  .bind(&upsert.image_created_date)
  .bind(&upsert.registry)
  .bind(&upsert.namespace)
  .bind(&upsert.repository)
  .bind(&upsert.repo_digests)
  .bind(&now)
  .bind(&now)
  .execute(&mut *conn)
  .await
  .context("failed to upsert deployed image")?;

  let id: i64 = sqlx::query_scalar(
    "SELECT id FROM deployed_images WHERE user_id = ? AND image_repo = ? AND image_tag = ? AND image_digest = ?",
  )
  .bind(upsert.user_id)
  .bind(&upsert.image_repo)
  .bind(&upsert.image_tag)
  .bind(&upsert.image_digest)
  .fetch_one(&mut *conn)
  .await
  .context("failed to read back deployed image id")?;
  Ok(id)
}

/// Deletes `deployed_images` rows with no referring `containers` row (spec
/// §3 invariant, §4.5 step 4, §4.1 lifecycle). Run after every container
/// delete pass.
pub async fn cleanup_orphans(
  conn: &mut SqliteConnection,
  user_id: i64,
) -> anyhow::Result<u64> {
  let result = sqlx::query(
    "DELETE FROM deployed_images
     WHERE user_id = ?
       AND id NOT IN (SELECT deployed_image_id FROM containers WHERE deployed_image_id IS NOT NULL)",
  )
  .bind(user_id)
  .execute(&mut *conn)
  .await
  .context("failed to clean up orphaned deployed images")?;
  Ok(result.rows_affected())
}
