use anyhow::Context;
use drydock_client::entities::tracked_app::{
  SourceType, TrackedApp, TrackedAppInput,
};
use sqlx::{FromRow, SqliteConnection};

use super::Db;

#[derive(FromRow)]
struct Row {
  id: i64,
  user_id: i64,
  name: String,
  image_name: Option<String>,
  github_repo: Option<String>,
  source_type: String,
  repository_token_id: Option<i64>,
  current_version: Option<String>,
  current_digest: Option<String>,
  latest_version: Option<String>,
  latest_digest: Option<String>,
  current_version_publish_date: Option<String>,
  latest_version_publish_date: Option<String>,
  last_checked: Option<String>,
}

fn source_type_str(s: SourceType) -> &'static str {
  match s {
    SourceType::Docker => "docker",
    SourceType::Github => "github",
    SourceType::Gitlab => "gitlab",
  }
}

fn parse_source_type(s: &str) -> SourceType {
  match s {
    "gitlab" => SourceType::Gitlab,
    "github" => SourceType::Github,
    _ => SourceType::Docker,
  }
}

impl From<Row> for TrackedApp {
  fn from(r: Row) -> Self {
    TrackedApp {
      id: r.id,
      user_id: r.user_id,
      name: r.name,
      image_name: r.image_name,
      github_repo: r.github_repo,
      source_type: parse_source_type(&r.source_type),
      repository_token_id: r.repository_token_id,
      current_version: r.current_version,
      current_digest: r.current_digest,
      latest_version: r.latest_version,
      latest_digest: r.latest_digest,
      current_version_publish_date: r.current_version_publish_date,
      latest_version_publish_date: r.latest_version_publish_date,
      last_checked: r.last_checked,
    }
  }
}

const SELECT: &str = "SELECT id, user_id, name, image_name, github_repo, source_type, repository_token_id, current_version, current_digest, latest_version, latest_digest, current_version_publish_date, latest_version_publish_date, last_checked FROM tracked_apps";

pub async fn list_for_user(
  db: &Db,
  user_id: i64,
) -> anyhow::Result<Vec<TrackedApp>> {
  let rows: Vec<Row> = sqlx::query_as(&format!("{SELECT} WHERE user_id = ?"))
    .bind(user_id)
    .fetch_all(db.pool())
    .await
    .context("failed to list tracked apps")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get_owned(
  db: &Db,
  user_id: i64,
  id: i64,
) -> anyhow::Result<Option<TrackedApp>> {
  let row: Option<Row> =
    sqlx::query_as(&format!("{SELECT} WHERE id = ? AND user_id = ?"))
      .bind(id)
      .bind(user_id)
      .fetch_optional(db.pool())
      .await
      .context("failed to get tracked app")?;
  Ok(row.map(Into::into))
}

pub async fn create(
  db: &Db,
  user_id: i64,
  input: TrackedAppInput,
) -> anyhow::Result<TrackedApp> {
  db.write(|conn: &mut SqliteConnection| async move {
    let id = sqlx::query(
      "INSERT INTO tracked_apps (user_id, name, image_name, github_repo, source_type, repository_token_id)
       VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&input.name)
    .bind(&input.image_name)
    .bind(&input.github_repo)
    .bind(source_type_str(input.source_type))
    .bind(input.repository_token_id)
    .execute(conn)
    .await
    .context("failed to insert tracked app")?
    .last_insert_rowid();
    Ok(TrackedApp {
      id,
      user_id,
      name: input.name,
      image_name: input.image_name,
      github_repo: input.github_repo,
      source_type: input.source_type,
      repository_token_id: input.repository_token_id,
      current_version: None,
      current_digest: None,
      latest_version: None,
      latest_digest: None,
      current_version_publish_date: None,
      latest_version_publish_date: None,
      last_checked: None,
    })
  })
  .await
}

pub async fn update(
  db: &Db,
  user_id: i64,
  id: i64,
  input: TrackedAppInput,
) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    sqlx::query(
      "UPDATE tracked_apps SET
         name = ?, image_name = ?, github_repo = ?, source_type = ?, repository_token_id = ?
       WHERE id = ? AND user_id = ?",
    )
    .bind(&input.name)
    .bind(&input.image_name)
    .bind(&input.github_repo)
    .bind(source_type_str(input.source_type))
    .bind(input.repository_token_id)
    .bind(id)
    .bind(user_id)
    .execute(conn)
    .await
    .context("failed to update tracked app")?;
    Ok(())
  })
  .await
}

pub async fn delete(db: &Db, user_id: i64, id: i64) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    sqlx::query("DELETE FROM tracked_apps WHERE id = ? AND user_id = ?")
      .bind(id)
      .bind(user_id)
      .execute(conn)
      .await
      .context("failed to delete tracked app")?;
    Ok(())
  })
  .await
}

/// Records the result of a release check (spec §4.4 applied to tracked apps
/// rather than deployed containers).
#[allow(clippy::too_many_arguments)]
pub async fn record_check_result(
  conn: &mut SqliteConnection,
  id: i64,
  current_version: Option<&str>,
  current_digest: Option<&str>,
  latest_version: Option<&str>,
  latest_digest: Option<&str>,
  current_publish_date: Option<&str>,
  latest_publish_date: Option<&str>,
) -> anyhow::Result<()> {
  sqlx::query(
    "UPDATE tracked_apps SET
       current_version = COALESCE(?, current_version),
       current_digest = COALESCE(?, current_digest),
       latest_version = ?,
       latest_digest = ?,
       current_version_publish_date = COALESCE(?, current_version_publish_date),
       latest_version_publish_date = ?,
       last_checked = ?
     WHERE id = ?",
  )
  .bind(current_version)
  .bind(current_digest)
  .bind(latest_version)
  .bind(latest_digest)
  .bind(current_publish_date)
  .bind(latest_publish_date)
  .bind(drydock_client::entities::now_iso())
  .bind(id)
  .execute(&mut *conn)
  .await
  .context("failed to record tracked app check result")?;
  Ok(())
}
