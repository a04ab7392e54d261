use anyhow::Context;
use drydock_client::entities::portainer_instance::{
  AuthType, PortainerInstance, PortainerInstanceInput,
};
use sqlx::{FromRow, SqliteConnection};

use super::Db;

#[derive(FromRow)]
struct Row {
  id: i64,
  user_id: i64,
  name: String,
  url: String,
  auth_type: String,
  username: Option<String>,
  password: Option<String>,
  api_key: Option<String>,
  display_order: i64,
  ip_address: Option<String>,
}

fn parse_auth_type(s: &str) -> AuthType {
  match s {
    "apikey" => AuthType::Apikey,
    _ => AuthType::Password,
  }
}

fn auth_type_str(a: AuthType) -> &'static str {
  match a {
    AuthType::Password => "password",
    AuthType::Apikey => "apikey",
  }
}

impl From<Row> for PortainerInstance {
  fn from(r: Row) -> Self {
    PortainerInstance {
      id: r.id,
      user_id: r.user_id,
      name: r.name,
      url: r.url,
      auth_type: parse_auth_type(&r.auth_type),
      username: r.username,
      password: r.password,
      api_key: r.api_key,
      display_order: r.display_order,
      ip_address: r.ip_address,
    }
  }
}

const SELECT: &str = "SELECT id, user_id, name, url, auth_type, username, password, api_key, display_order, ip_address FROM portainer_instances";

pub async fn list_for_user(
  db: &Db,
  user_id: i64,
) -> anyhow::Result<Vec<PortainerInstance>> {
  let rows: Vec<Row> = sqlx::query_as(&format!(
    "{SELECT} WHERE user_id = ? ORDER BY display_order, id"
  ))
  .bind(user_id)
  .fetch_all(db.pool())
  .await
  .context("failed to list portainer instances")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn list_all(db: &Db) -> anyhow::Result<Vec<PortainerInstance>> {
  let rows: Vec<Row> = sqlx::query_as(SELECT)
    .fetch_all(db.pool())
    .await
    .context("failed to list portainer instances")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get_owned(
  db: &Db,
  user_id: i64,
  id: i64,
) -> anyhow::Result<Option<PortainerInstance>> {
  let row: Option<Row> =
    sqlx::query_as(&format!("{SELECT} WHERE id = ? AND user_id = ?"))
      .bind(id)
      .bind(user_id)
      .fetch_optional(db.pool())
      .await
      .context("failed to get portainer instance")?;
  Ok(row.map(Into::into))
}

pub async fn create(
  db: &Db,
  user_id: i64,
  input: PortainerInstanceInput,
) -> anyhow::Result<PortainerInstance> {
  db.write(|conn: &mut SqliteConnection| async move {
    let id = sqlx::query(
      "INSERT INTO portainer_instances
        (user_id, name, url, auth_type, username, password, api_key, display_order, ip_address)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&input.name)
    .bind(&input.url)
    .bind(auth_type_str(input.auth_type))
    .bind(&input.username)
    .bind(&input.password)
    .bind(&input.api_key)
    .bind(input.display_order)
    .bind(&input.ip_address)
    .execute(conn)
    .await
    .context("failed to insert portainer instance")?
    .last_insert_rowid();
    Ok(PortainerInstance {
      id,
      user_id,
      name: input.name,
      url: input.url,
      auth_type: input.auth_type,
      username: input.username,
      password: input.password,
      api_key: input.api_key,
      display_order: input.display_order,
      ip_address: input.ip_address,
    })
  })
  .await
}

pub async fn update(
  db: &Db,
  user_id: i64,
  id: i64,
  input: PortainerInstanceInput,
) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    sqlx::query(
      "UPDATE portainer_instances SET
        name = ?, url = ?, auth_type = ?, username = ?, password = ?,
        api_key = ?, display_order = ?, ip_address = ?
       WHERE id = ? AND user_id = ?",
    )
    .bind(&input.name)
    .bind(&input.url)
    .bind(auth_type_str(input.auth_type))
    .bind(&input.username)
    .bind(&input.password)
    .bind(&input.api_key)
    .bind(input.display_order)
    .bind(&input.ip_address)
    .bind(id)
    .bind(user_id)
    .execute(conn)
    .await
    .context("failed to update portainer instance")?;
    Ok(())
  })
  .await
}

/// Deletes the instance. Cascades to `containers` via the foreign key, but
/// NOT to `deployed_images` -- cleanup of orphaned deployed images is
/// explicit (spec §3).
pub async fn delete(db: &Db, user_id: i64, id: i64) -> anyhow::Result<()> {
  db.write(|conn: &mut SqliteConnection| async move {
    sqlx::query("DELETE FROM portainer_instances WHERE id = ? AND user_id = ?")
      .bind(id)
      .bind(user_id)
      .execute(conn)
      .await
      .context("failed to delete portainer instance")?;
    Ok(())
  })
  .await
}
