use anyhow::Context;
use drydock_client::entities::container::{Container, ContainerWithUpdateInfo};
use sqlx::{FromRow, SqliteConnection};

use super::Db;

#[derive(FromRow)]
struct Row {
  id: i64,
  user_id: i64,
  portainer_instance_id: i64,
  container_id: String,
  container_name: String,
  endpoint_id: i64,
  image_name: String,
  image_repo: String,
  status: String,
  state: String,
  stack_name: Option<String>,
  deployed_image_id: Option<i64>,
  uses_network_mode: Option<String>,
  provides_network: i64,
  last_seen: String,
}

impl From<Row> for Container {
  fn from(r: Row) -> Self {
    Container {
      id: r.id,
      user_id: r.user_id,
      portainer_instance_id: r.portainer_instance_id,
      container_id: r.container_id,
      container_name: r.container_name,
      endpoint_id: r.endpoint_id,
      image_name: r.image_name,
      image_repo: r.image_repo,
      status: r.status,
      state: r.state,
      stack_name: r.stack_name,
      deployed_image_id: r.deployed_image_id,
      uses_network_mode: r.uses_network_mode,
      provides_network: r.provides_network != 0,
      last_seen: r.last_seen,
    }
  }
}

const SELECT: &str = "SELECT id, user_id, portainer_instance_id, container_id, container_name, endpoint_id, image_name, image_repo, status, state, stack_name, deployed_image_id, uses_network_mode, provides_network, last_seen FROM containers";

pub async fn list_for_user(
  db: &Db,
  user_id: i64,
) -> anyhow::Result<Vec<Container>> {
  let rows: Vec<Row> = sqlx::query_as(&format!("{SELECT} WHERE user_id = ?"))
    .bind(user_id)
    .fetch_all(db.pool())
    .await
    .context("failed to list containers")?;
  Ok(rows.into_iter().map(Into::into).collect())
}

/// `getContainersWithUpdates` (spec §4.1): joins `containers ⟕ deployed_images
/// ⟕ registry_image_versions` on `(user_id, image_repo, image_tag = tag)`.
/// `hasUpdate` is intentionally absent from the row; callers derive it via
/// [`ContainerWithUpdateInfo::has_update`].
pub async fn with_update_info(
  db: &Db,
  user_id: i64,
  portainer_instance_id: Option<i64>,
) -> anyhow::Result<Vec<ContainerWithUpdateInfo>> {
  let mut sql = String::from(
    "SELECT
       c.id, c.user_id, c.portainer_instance_id, c.container_id, c.container_name,
       c.endpoint_id, c.image_name, c.image_repo, c.status, c.state, c.stack_name,
       c.deployed_image_id, c.uses_network_mode, c.provides_network, c.last_seen,
       d.registry as reg_registry, d.image_digest as current_digest,
       v.latest_digest, v.latest_version, v.latest_publish_date, v.exists_in_registry
     FROM containers c
     LEFT JOIN deployed_images d ON d.id = c.deployed_image_id
     LEFT JOIN registry_image_versions v
       ON v.user_id = c.user_id AND v.image_repo = c.image_repo AND v.tag = c.image_tag
     WHERE c.user_id = ?",
  );
  if portainer_instance_id.is_some() {
    sql.push_str(" AND c.portainer_instance_id = ?");
  }
  let mut query = sqlx::query(&sql).bind(user_id);
  if let Some(pid) = portainer_instance_id {
    query = query.bind(pid);
  }
  let rows = query
    .fetch_all(db.pool())
    .await
    .context("failed to query containers with update info")?;

  use sqlx::Row as _;
  let mut out = Vec::with_capacity(rows.len());
  for row in rows {
    let container = Container {
      id: row.get("id"),
      user_id: row.get("user_id"),
      portainer_instance_id: row.get("portainer_instance_id"),
      container_id: row.get("container_id"),
      container_name: row.get("container_name"),
      endpoint_id: row.get("endpoint_id"),
      image_name: row.get("image_name"),
      image_repo: row.get("image_repo"),
      status: row.get("status"),
      state: row.get("state"),
      stack_name: row.get("stack_name"),
      deployed_image_id: row.get("deployed_image_id"),
      uses_network_mode: row.get("uses_network_mode"),
      provides_network: row.get::<i64, _>("provides_network") != 0,
      last_seen: row.get("last_seen"),
    };
    out.push(ContainerWithUpdateInfo {
      container,
      registry: row.get("reg_registry"),
      current_digest: row.get("current_digest"),
      latest_digest: row.get("latest_digest"),
      latest_version: row.get("latest_version"),
      latest_publish_date: row.get("latest_publish_date"),
      exists_in_registry: row
        .get::<Option<i64>, _>("exists_in_registry")
        .map(|v| v != 0),
    });
  }
  Ok(out)
}

/// Upserts a container row observed from a Portainer poll, pointing it at
/// `deployed_image_id` (spec §4.3, §4.5).
#[allow(clippy::too_many_arguments)]
pub async fn upsert(
  conn: &mut SqliteConnection,
  user_id: i64,
  portainer_instance_id: i64,
  container_id: &str,
  container_name: &str,
  endpoint_id: i64,
  image_name: &str,
  image_repo: &str,
  image_tag: &str,
  status: &str,
  state: &str,
  stack_name: Option<&str>,
  deployed_image_id: i64,
  uses_network_mode: Option<&str>,
  provides_network: bool,
) -> anyhow::Result<i64> {
  let now = drydock_client::entities::now_iso();
  sqlx::query(
    "INSERT INTO containers
      (user_id, portainer_instance_id, container_id, container_name, endpoint_id,
       image_name, image_repo, image_tag, status, state, stack_name,
       deployed_image_id, uses_network_mode, provides_network, last_seen)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
     ON CONFLICT(user_id, container_id, portainer_instance_id, endpoint_id) DO UPDATE SET
       container_name = excluded.container_name,
       image_name = excluded.image_name,
       image_repo = excluded.image_repo,
       image_tag = excluded.image_tag,
       status = excluded.status,
       state = excluded.state,
       stack_name = excluded.stack_name,
       deployed_image_id = excluded.deployed_image_id,
       uses_network_mode = excluded.uses_network_mode,
       provides_network = excluded.provides_network,
       last_seen = excluded.last_seen",
  )
  .bind(user_id)
  .bind(portainer_instance_id)
  .bind(container_id)
  .bind(container_name)
  .bind(endpoint_id)
  .bind(image_name)
  .bind(image_repo)
  .bind(image_tag)
  .bind(status)
  .bind(state)
  .bind(stack_name)
  .bind(deployed_image_id)
  .bind(uses_network_mode)
  .bind(provides_network)
  .bind(&now)
  .execute(&mut *conn)
  .await
  .context("failed to upsert container")?;

  let id: i64 = sqlx::query_scalar(
    "SELECT id FROM containers WHERE user_id = ? AND container_id = ? AND portainer_instance_id = ? AND endpoint_id = ?",
  )
  .bind(user_id)
  .bind(container_id)
  .bind(portainer_instance_id)
  .bind(endpoint_id)
  .fetch_one(&mut *conn)
  .await
  .context("failed to read back container id")?;
  Ok(id)
}

pub async fn find_by_container_id(
  db: &Db,
  user_id: i64,
  portainer_instance_id: i64,
  container_id_prefix: &str,
) -> anyhow::Result<Option<Container>> {
  // Full match first, then 12-char prefix (spec §4.5 step 3: "full or
  // 12-char prefix").
  let rows: Vec<Row> = sqlx::query_as(&format!(
    "{SELECT} WHERE user_id = ? AND portainer_instance_id = ? AND container_id LIKE ?"
  ))
  .bind(user_id)
  .bind(portainer_instance_id)
  .bind(format!("{container_id_prefix}%"))
  .fetch_all(db.pool())
  .await
  .context("failed to look up container by id")?;
  Ok(rows.into_iter().next().map(Into::into))
}

pub async fn find_by_image_and_endpoint(
  db: &Db,
  user_id: i64,
  portainer_instance_id: i64,
  image_name: &str,
  endpoint_id: i64,
) -> anyhow::Result<Option<Container>> {
  let rows: Vec<Row> = sqlx::query_as(&format!(
    "{SELECT} WHERE user_id = ? AND portainer_instance_id = ? AND image_name = ? AND endpoint_id = ?"
  ))
  .bind(user_id)
  .bind(portainer_instance_id)
  .bind(image_name)
  .bind(endpoint_id)
  .fetch_optional(db.pool())
  .await
  .context("failed to look up container by image/endpoint")?;
  Ok(rows.into_iter().next().map(Into::into))
}

/// Deletes containers not seen for >= 7 days, or missing from the most
/// recent authoritative poll of `portainer_instance_id` (spec §3 lifecycle).
pub async fn delete_stale(
  conn: &mut SqliteConnection,
  user_id: i64,
  cutoff_iso: &str,
) -> anyhow::Result<u64> {
  let result = sqlx::query(
    "DELETE FROM containers WHERE user_id = ? AND last_seen < ?",
  )
  .bind(user_id)
  .bind(cutoff_iso)
  .execute(&mut *conn)
  .await
  .context("failed to delete stale containers")?;
  Ok(result.rows_affected())
}

/// Deletes containers belonging to `portainer_instance_id` whose primary key
/// is not in `seen_ids` -- the authoritative-list side of spec §3's
/// "absent from the authoritative list returned by a poll".
pub async fn delete_missing(
  conn: &mut SqliteConnection,
  user_id: i64,
  portainer_instance_id: i64,
  seen_ids: &[i64],
) -> anyhow::Result<u64> {
  if seen_ids.is_empty() {
    let result = sqlx::query(
      "DELETE FROM containers WHERE user_id = ? AND portainer_instance_id = ?",
    )
    .bind(user_id)
    .bind(portainer_instance_id)
    .execute(&mut *conn)
    .await
    .context("failed to delete missing containers")?;
    return Ok(result.rows_affected());
  }
  let placeholders =
    seen_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
  let sql = format!(
    "DELETE FROM containers WHERE user_id = ? AND portainer_instance_id = ? AND id NOT IN ({placeholders})"
  );
  let mut query = sqlx::query(&sql).bind(user_id).bind(portainer_instance_id);
  for id in seen_ids {
    query = query.bind(id);
  }
  let result = query
    .execute(&mut *conn)
    .await
    .context("failed to delete missing containers")?;
  Ok(result.rows_affected())
}
