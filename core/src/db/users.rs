use anyhow::Context;
use drydock_client::entities::{now_iso, user::User};
use sqlx::{FromRow, SqliteConnection};

use super::Db;

#[derive(FromRow)]
struct UserRow {
  id: i64,
  username: String,
  password_hash: String,
  is_admin: i64,
  created_at: String,
}

impl From<UserRow> for User {
  fn from(row: UserRow) -> Self {
    User {
      id: row.id,
      username: row.username,
      password_hash: row.password_hash,
      is_admin: row.is_admin != 0,
      created_at: row.created_at,
    }
  }
}

const SELECT: &str =
  "SELECT id, username, password_hash, is_admin, created_at FROM users";

pub async fn create(
  db: &Db,
  username: &str,
  password_hash: &str,
) -> anyhow::Result<User> {
  let username = username.to_string();
  let password_hash = password_hash.to_string();
  db.write(|conn: &mut SqliteConnection| async move {
    let now = now_iso();
    let id = sqlx::query(
      "INSERT INTO users (username, password_hash, is_admin, created_at) VALUES (?, ?, 0, ?)",
    )
    .bind(&username)
    .bind(&password_hash)
    .bind(&now)
    .execute(conn)
    .await
    .context("failed to insert user")?
    .last_insert_rowid();
    Ok(User {
      id,
      username,
      password_hash,
      is_admin: false,
      created_at: now,
    })
  })
  .await
}

pub async fn find_by_username(
  db: &Db,
  username: &str,
) -> anyhow::Result<Option<User>> {
  let row: Option<UserRow> =
    sqlx::query_as(&format!("{SELECT} WHERE username = ?"))
      .bind(username)
      .fetch_optional(db.pool())
      .await
      .context("failed to query user")?;
  Ok(row.map(Into::into))
}

pub async fn find_by_id(
  db: &Db,
  id: i64,
) -> anyhow::Result<Option<User>> {
  let row: Option<UserRow> = sqlx::query_as(&format!("{SELECT} WHERE id = ?"))
    .bind(id)
    .fetch_optional(db.pool())
    .await
    .context("failed to query user")?;
  Ok(row.map(Into::into))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn create_and_find_round_trips() {
    let db = Db::connect_in_memory().await.unwrap();
    let created = create(&db, "alice", "hash").await.unwrap();
    let found = find_by_id(&db, created.id).await.unwrap().unwrap();
    assert_eq!(found.username, "alice");
    let by_name = find_by_username(&db, "alice").await.unwrap().unwrap();
    assert_eq!(by_name.id, created.id);
  }
}
