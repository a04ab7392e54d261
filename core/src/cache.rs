//! Container cache (spec §4.5, C5): a database cache (the `containers` /
//! `deployed_images` / `registry_image_versions` triple) fronted by a
//! short-TTL in-memory merge cache keyed by `(userId, portainerInstanceId?)`
//! -- standing in for the spec's `portainerUrl?` key, since instances are
//! already addressed by id everywhere else in this crate (see DESIGN.md).

use std::{collections::HashMap, sync::Arc, time::Duration};

use dashmap::DashMap;
use drydock_client::entities::{
  container::{ContainerWithUpdateInfo, ObservedContainer},
  deployed_image::DeployedImageUpsert,
};
use tokio::time::Instant;

use crate::{db::Db, error::AppResult, portainer::PortainerClient};

const TTL: Duration = Duration::from_secs(30);

type CacheKey = (i64, Option<i64>);

#[derive(Clone)]
struct CacheEntry {
  fetched_at: Instant,
  data: Vec<ContainerWithUpdateInfo>,
  /// Set when the last refresh fell back to the DB cache because Portainer
  /// was unreachable (spec §4.5: "marked so the UI can surface stale").
  stale: bool,
}

pub struct ContainerCache {
  entries: DashMap<CacheKey, CacheEntry>,
}

pub struct CachedContainers {
  pub containers: Vec<ContainerWithUpdateInfo>,
  pub stale: bool,
}

impl ContainerCache {
  pub fn new() -> Self {
    Self { entries: DashMap::new() }
  }

  /// Clears every memory-cache entry for `user_id` (spec §4.5 invalidation:
  /// "any write to containers/deployed_images/registry_image_versions for a
  /// given userId clears all memory-cache entries for that user").
  pub fn invalidate_user(&self, user_id: i64) {
    self.entries.retain(|(uid, _), _| *uid != user_id);
  }

  pub async fn read(
    &self,
    db: &Db,
    clients: &HashMap<i64, Arc<PortainerClient>>,
    user_id: i64,
    portainer_instance_id: Option<i64>,
    force_refresh: bool,
  ) -> AppResult<CachedContainers> {
    let key = (user_id, portainer_instance_id);
    if !force_refresh {
      if let Some(entry) = self.entries.get(&key) {
        if entry.fetched_at.elapsed() < TTL {
          return Ok(CachedContainers {
            containers: entry.data.clone(),
            stale: entry.stale,
          });
        }
      }
    }

    let relevant_clients: Vec<(i64, Arc<PortainerClient>)> = match portainer_instance_id {
      Some(id) => clients.get(&id).map(|c| vec![(id, c.clone())]).unwrap_or_default(),
      None => clients.iter().map(|(id, c)| (*id, c.clone())).collect(),
    };

    let db_view_fut = crate::db::containers::with_update_info(db, user_id, portainer_instance_id);
    let poll_fut = poll_instances(&relevant_clients);
    let (db_view, polled) = tokio::join!(db_view_fut, poll_fut);
    let db_view = db_view?;

    let Some(observed_by_instance) = polled else {
      let entry = CacheEntry { fetched_at: Instant::now(), data: db_view.clone(), stale: true };
      self.entries.insert(key, entry);
      return Ok(CachedContainers { containers: db_view, stale: true });
    };

    for (instance_id, observed_list) in observed_by_instance {
      let mut seen_ids = Vec::with_capacity(observed_list.len());
      for observed in observed_list {
        match merge_observed(db, user_id, instance_id, &observed).await {
          Ok(container_id) => seen_ids.push(container_id),
          Err(e) => {
            tracing::warn!("failed to merge observed container {}: {:#}", observed.container_id, e);
          }
        }
      }
      // The just-polled list is authoritative for this instance (spec §3:
      // "absent from the authoritative list returned by a poll" is deleted).
      if let Err(e) = db
        .write(|conn| Box::pin(async move {
          crate::db::containers::delete_missing(conn, user_id, instance_id, &seen_ids).await?;
          crate::db::deployed_images::cleanup_orphans(conn, user_id).await?;
          Ok(())
        }))
        .await
      {
        tracing::warn!("failed to reap missing containers for instance {instance_id}: {:#}", e);
      }
    }

    let merged = crate::db::containers::with_update_info(db, user_id, portainer_instance_id).await?;
    let entry = CacheEntry { fetched_at: Instant::now(), data: merged.clone(), stale: false };
    self.entries.insert(key, entry);
    Ok(CachedContainers { containers: merged, stale: false })
  }
}

impl Default for ContainerCache {
  fn default() -> Self {
    Self::new()
  }
}

/// Polls every given instance; returns `None` if *all* of them failed, so
/// the caller can fall back to the DB cache wholesale (spec §4.5: "cache
/// failure is non-fatal ... falls back to the DB cache alone").
async fn poll_instances(
  clients: &[(i64, Arc<PortainerClient>)],
) -> Option<Vec<(i64, Vec<ObservedContainer>)>> {
  if clients.is_empty() {
    return Some(Vec::new());
  }
  let futures = clients.iter().map(|(id, client)| {
    let id = *id;
    let client = client.clone();
    async move { (id, client.poll_all().await) }
  });
  let results = futures::future::join_all(futures).await;
  let mut out = Vec::new();
  let mut any_ok = false;
  for (id, result) in results {
    match result {
      Ok(list) => {
        any_ok = true;
        out.push((id, list));
      }
      Err(e) => tracing::warn!("portainer instance {id} unreachable: {:#}", e),
    }
  }
  if any_ok { Some(out) } else { None }
}

/// Merges one freshly observed container into the DB cache, performing
/// manual-upgrade detection (spec §4.5 steps 3-4).
async fn merge_observed(
  db: &Db,
  user_id: i64,
  portainer_instance_id: i64,
  observed: &ObservedContainer,
) -> anyhow::Result<i64> {
  let existing = crate::db::containers::find_by_container_id(
    db,
    user_id,
    portainer_instance_id,
    &short_id(&observed.container_id),
  )
  .await?
  .or(
    crate::db::containers::find_by_image_and_endpoint(
      db,
      user_id,
      portainer_instance_id,
      &observed.image_name,
      observed.endpoint_id,
    )
    .await?,
  );

  let repo_digests = if observed.repo_digests.is_empty() {
    None
  } else {
    Some(serde_json::to_string(&observed.repo_digests)?)
  };

  db.write(|conn| {
    let observed = observed.clone();
    let repo_digests = repo_digests.clone();
    Box::pin(async move {
      let digest = observed
        .current_digest
        .clone()
        .unwrap_or_else(|| format!("unknown:{}", observed.container_id));

      if let Some(prev) = &existing {
        if let Some(prev_deployed_id) = prev.deployed_image_id {
          let prev_digest: Option<String> = sqlx::query_scalar(
            "SELECT image_digest FROM deployed_images WHERE id = ?",
          )
          .bind(prev_deployed_id)
          .fetch_optional(&mut *conn)
          .await?;
          if prev_digest.as_deref() != observed.current_digest.as_deref()
            && observed.current_digest.is_some()
          {
            tracing::info!(
              container_id = %observed.container_id,
              "manual_upgrade detected: digest changed outside drydock"
            );
          }
        }
      }

      let deployed_image_id = crate::db::deployed_images::upsert(
        conn,
        &DeployedImageUpsert {
          user_id,
          image_repo: observed.image_repo.clone(),
          image_tag: observed.image_tag.clone(),
          image_digest: digest,
          image_created_date: observed.created.clone(),
          registry: None,
          namespace: None,
          repository: None,
          repo_digests,
        },
      )
      .await?;

      let container_id = crate::db::containers::upsert(
        conn,
        user_id,
        portainer_instance_id,
        &observed.container_id,
        &observed.container_name,
        observed.endpoint_id,
        &observed.image_name,
        &observed.image_repo,
        &observed.image_tag,
        &observed.status,
        &observed.state,
        observed.stack_name.as_deref(),
        deployed_image_id,
        observed.network_mode.as_deref(),
        observed.provides_network,
      )
      .await?;
      Ok(container_id)
    })
  })
  .await
}

fn short_id(container_id: &str) -> String {
  container_id.chars().take(12).collect()
}
