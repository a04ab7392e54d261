use anyhow::Context;
use drydock_client::entities::repository_token::{
  RepositoryAccessToken, RepositoryAccessTokenInput, TokenProvider,
};
use sqlx::{FromRow, SqliteConnection};

use super::Db;

#[derive(FromRow)]
struct Row {
  id: i64,
  user_id: i64,
  provider: String,
  name: String,
  access_token: String,
  created_at: String,
}

fn provider_str(p: TokenProvider) -> &'static str {
  match p {
    TokenProvider::Github => "github",
    TokenProvider::Gitlab => "gitlab",
  }
}

fn parse_provider(s: &str) -> TokenProvider {
  match s {
    "gitlab" => TokenProvider::Gitlab,
    _ => TokenProvider::Github,
  }
}

impl From<Row> for RepositoryAccessToken {
  fn from(r: Row) -> Self {
    RepositoryAccessToken {
      id: r.id,
      user_id: r.user_id,
      provider: parse_provider(&r.provider),
      name: r.name,
      access_token: r.access_token,
      created_at: r.created_at,
    }
  }
}

const SELECT: &str = "SELECT id, user_id, provider, name, access_token, created_at FROM repository_access_tokens";

pub async fn list_for_user(
  db: &Db,
  user_id: i64,
) -> anyhow::Result<Vec<RepositoryAccessToken>> {
  let rows: Vec<Row> = sqlx::query_as(&format!("{SELECT} WHERE user_id = ?"))
    .bind(user_id)
    .fetch_all(db.pool())
    .await
    .context("failed to list repository tokens")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get_owned(
  db: &Db,
  user_id: i64,
  id: i64,
) -> anyhow::Result<Option<RepositoryAccessToken>> {
  let row: Option<Row> =
    sqlx::query_as(&format!("{SELECT} WHERE id = ? AND user_id = ?"))
      .bind(id)
      .bind(user_id)
      .fetch_optional(db.pool())
      .await
      .context("failed to get repository token")?;
  Ok(row.map(Into::into))
}

pub async fn create(
  db: &Db,
  user_id: i64,
  input: RepositoryAccessTokenInput,
) -> anyhow::Result<RepositoryAccessToken> {
  db.write(|conn: &mut SqliteConnection| async move {
    let now = drydock_client::entities::now_iso();
    let id = sqlx::query(
      "INSERT INTO repository_access_tokens (user_id, provider, name, access_token, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(provider_str(input.provider))
    .bind(&input.name)
    .bind(&input.access_token)
    .bind(&now)
    .execute(conn)
    .await
    .context("failed to insert repository token")?
    .last_insert_rowid();
    Ok(RepositoryAccessToken {
      id,
      user_id,
      provider: input.provider,
      name: input.name,
      access_token: input.access_token,
      created_at: now,
    })
  })
  .await
}

pub async fn update(
  db: &Db,
  user_id: i64,
  id: i64,
  input: RepositoryAccessTokenInput,
) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    sqlx::query(
      "UPDATE repository_access_tokens SET provider = ?, name = ?, access_token = ? WHERE id = ? AND user_id = ?",
    )
    .bind(provider_str(input.provider))
    .bind(&input.name)
    .bind(&input.access_token)
    .bind(id)
    .bind(user_id)
    .execute(conn)
    .await
    .context("failed to update repository token")?;
    Ok(())
  })
  .await
}

pub async fn delete(db: &Db, user_id: i64, id: i64) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    sqlx::query(
      "DELETE FROM repository_access_tokens WHERE id = ? AND user_id = ?",
    )
    .bind(id)
    .bind(user_id)
    .execute(conn)
    .await
    .context("failed to delete repository token")?;
    Ok(())
  })
  .await
}
