use anyhow::Context;
use chrono::{Duration, Utc};
use drydock_client::entities::user::Session;
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use super::Db;
use crate::config::app_config;

#[derive(FromRow)]
struct SessionRow {
  token: String,
  user_id: i64,
  created_at: String,
  expires_at: String,
}

impl From<SessionRow> for Session {
  fn from(row: SessionRow) -> Self {
    Session {
      token: row.token,
      user_id: row.user_id,
      created_at: row.created_at,
      expires_at: row.expires_at,
    }
  }
}

pub async fn create(db: &Db, user_id: i64) -> anyhow::Result<Session> {
  db.write(|conn: &mut SqliteConnection| async move {
    let token = Uuid::new_v4().to_string();
    let now = Utc::now();
    let expires =
      now + Duration::days(app_config().jwt_ttl_days);
    sqlx::query(
      "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&token)
    .bind(user_id)
    .bind(now.to_rfc3339())
    .bind(expires.to_rfc3339())
    .execute(conn)
    .await
    .context("failed to insert session")?;
    Ok(Session {
      token,
      user_id,
      created_at: now.to_rfc3339(),
      expires_at: expires.to_rfc3339(),
    })
  })
  .await
}

/// Looks up a session and validates it hasn't expired. Expired sessions are
/// treated as absent rather than deleted eagerly -- cheap reads should never
/// trigger a write.
pub async fn find_valid(
  db: &Db,
  token: &str,
) -> anyhow::Result<Option<Session>> {
  let row: Option<SessionRow> = sqlx::query_as(
    "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ?",
  )
  .bind(token)
  .fetch_optional(db.pool())
  .await
  .context("failed to query session")?;
  let Some(row) = row else { return Ok(None) };
  let expires = chrono::DateTime::parse_from_rfc3339(&row.expires_at)
    .context("corrupt session expiry")?;
  if expires < Utc::now() {
    return Ok(None);
  }
  Ok(Some(row.into()))
}

pub async fn delete(db: &Db, token: &str) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
      .bind(token)
      .execute(conn)
      .await
      .context("failed to delete session")?;
    Ok(())
  })
  .await
}
