//! Update detector (spec §4.4, C4): orchestrates registry resolution across
//! a user's deployed images and surfaces newly-true `hasUpdate` transitions
//! as notifications. The only definition of "needs update" stays
//! `ContainerWithUpdateInfo::has_update`, evaluated at query time.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use drydock_client::entities::notification::{NotificationEvent, NotificationType};
use futures::stream::{self, StreamExt};
use reqwest::Client;

use crate::{config::app_config, db, db::Db, notify};

/// Containers not seen by a Portainer poll for this long are reaped (spec
/// §3 lifecycle).
const STALE_AFTER: Duration = Duration::days(7);

#[derive(Debug, Default)]
pub struct DetectionSummary {
  pub containers_checked: i64,
  /// Containers for which `has_update()` is true as of this pass (a
  /// snapshot count, not a delta).
  pub containers_updated: i64,
  /// Container ids whose `has_update()` flipped false -> true this pass --
  /// the `scan_detected` trigger population for the intent engine.
  pub transitioned: Vec<i64>,
  pub errors: Vec<String>,
}

/// Batch entry point invoked by the `docker-hub-pull` and
/// `tracked-apps-check` job types (spec §4.4).
pub async fn run_batch_detection(
  db: &Db,
  http: &Client,
  user_id: i64,
) -> anyhow::Result<DetectionSummary> {
  let before = db::containers::with_update_info(db, user_id, None).await?;
  let before_state: HashMap<i64, bool> =
    before.iter().map(|c| (c.container.id, c.has_update())).collect();

  let pairs = db::deployed_images::distinct_repo_tag_pairs(db, user_id).await?;
  let worker_pool = app_config().registry_worker_pool.max(1);

  let results: Vec<(String, String, anyhow::Result<()>)> = stream::iter(pairs)
    .map(|(image_repo, image_tag, token_id)| {
      let db = db;
      let http = http;
      async move {
        let outcome = resolve_and_upsert(db, http, user_id, &image_repo, &image_tag, token_id).await;
        (image_repo, image_tag, outcome)
      }
    })
    .buffer_unordered(worker_pool)
    .collect()
    .await;

  let mut summary = DetectionSummary::default();
  for (image_repo, image_tag, outcome) in results {
    if let Err(e) = outcome {
      tracing::warn!("detector: failed to resolve {image_repo}:{image_tag}: {:#}", e);
      summary.errors.push(format!("{image_repo}:{image_tag}: {e:#}"));
    }
  }

  let after = db::containers::with_update_info(db, user_id, None).await?;
  summary.containers_checked = after.len() as i64;
  summary.containers_updated = after.iter().filter(|c| c.has_update()).count() as i64;

  for container in &after {
    let was_update = before_state.get(&container.container.id).copied().unwrap_or(false);
    if !was_update && container.has_update() {
      summary.transitioned.push(container.container.id);
      let digest = container.latest_digest.clone().unwrap_or_default();
      let event = NotificationEvent {
        user_id,
        notification_type: NotificationType::AutoUpdateDetected,
        deduplication_key: format!(
          "update:{user_id}:{}:{digest}",
          container.container.image_repo
        ),
        title: "Update available".to_string(),
        description: format!(
          "{} has an update available",
          container.container.container_name
        ),
        fields: vec![
          notify::field("Container", &container.container.container_name),
          notify::field("Image", &container.container.image_repo),
          notify::field("Latest digest", &digest),
        ],
        timestamp: drydock_client::entities::now_iso(),
      };
      notify::publish(db, http, event).await;
    }
  }

  let cutoff_iso = (Utc::now() - STALE_AFTER).to_rfc3339();
  if let Err(e) = db
    .write(|conn| {
      let cutoff_iso = cutoff_iso.clone();
      async move {
        db::containers::delete_stale(conn, user_id, &cutoff_iso).await?;
        db::deployed_images::cleanup_orphans(conn, user_id).await?;
        Ok(())
      }
    })
    .await
  {
    tracing::warn!("detector: failed to reap stale containers for user {user_id}: {:#}", e);
  }

  Ok(summary)
}

/// The `tracked-apps-check` job handler (spec §4.6): resolves each tracked
/// app via its configured source (docker registry, GitHub releases, GitLab
/// releases) and enqueues a `tracked-app-update` notification on digest or
/// version change.
pub async fn run_tracked_apps_check(
  db: &Db,
  http: &Client,
  user_id: i64,
) -> anyhow::Result<DetectionSummary> {
  let apps = db::tracked_apps::list_for_user(db, user_id).await?;
  let worker_pool = app_config().registry_worker_pool.max(1);

  let results: Vec<(i64, bool, anyhow::Result<bool>)> = stream::iter(apps)
    .map(|app| {
      let db = db;
      let http = http;
      async move {
        let had_update = app.has_update();
        let outcome = check_tracked_app(db, http, &app).await;
        (app.id, had_update, outcome)
      }
    })
    .buffer_unordered(worker_pool)
    .collect()
    .await;

  let mut summary = DetectionSummary::default();
  summary.containers_checked = results.len() as i64;
  for (app_id, had_update, outcome) in results {
    match outcome {
      Ok(has_update_now) => {
        summary.containers_updated += has_update_now as i64;
        if !had_update && has_update_now {
          summary.transitioned.push(app_id);
        }
      }
      Err(e) => {
        tracing::warn!("tracked-apps-check: app {app_id} failed: {:#}", e);
        summary.errors.push(format!("app {app_id}: {e:#}"));
      }
    }
  }
  Ok(summary)
}

async fn check_tracked_app(
  db: &Db,
  http: &Client,
  app: &drydock_client::entities::tracked_app::TrackedApp,
) -> anyhow::Result<bool> {
  use drydock_client::entities::tracked_app::SourceType;

  let token = match app.repository_token_id {
    Some(id) => db::repository_tokens::get_owned(db, app.user_id, id)
      .await?
      .map(|t| t.access_token),
    None => None,
  };

  let (latest_version, latest_digest, latest_publish_date) = match app.source_type {
    SourceType::Github => {
      let repo = app
        .github_repo
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("tracked app {} has no githubRepo", app.id))?;
      let release =
        crate::registry::github_releases::latest_release(http, repo, token.as_deref()).await?;
      (release.version, None, release.published_at)
    }
    SourceType::Gitlab => {
      let repo = app
        .github_repo
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("tracked app {} has no githubRepo", app.id))?;
      let release =
        crate::registry::gitlab_releases::latest_release(http, repo, token.as_deref()).await?;
      (release.version, None, release.published_at)
    }
    SourceType::Docker => {
      let image = app
        .image_name
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("tracked app {} has no imageName", app.id))?;
      let (repo, tag) = image.rsplit_once(':').unwrap_or((image, "latest"));
      let resolved = crate::registry::resolve_image(http, repo, tag, token.as_deref()).await?;
      (resolved.latest_version, resolved.latest_digest, resolved.latest_publish_date)
    }
  };

  let has_update_now = drydock_client::entities::tracked_app::TrackedApp {
    latest_version: latest_version.clone(),
    latest_digest: latest_digest.clone(),
    ..app.clone()
  }
  .has_update();

  db.write(|conn| {
    let latest_version = latest_version.clone();
    let latest_digest = latest_digest.clone();
    let latest_publish_date = latest_publish_date.clone();
    async move {
      db::tracked_apps::record_check_result(
        conn,
        app.id,
        None,
        None,
        latest_version.as_deref(),
        latest_digest.as_deref(),
        None,
        latest_publish_date.as_deref(),
      )
      .await
    }
  })
  .await?;

  if has_update_now {
    let event = NotificationEvent {
      user_id: app.user_id,
      notification_type: NotificationType::TrackedAppUpdate,
      deduplication_key: format!(
        "tracked-app:{}:{}:{}",
        app.user_id,
        app.id,
        latest_digest.as_deref().or(latest_version.as_deref()).unwrap_or("")
      ),
      title: format!("{} has a new release", app.name),
      description: format!(
        "{} is now at {}",
        app.name,
        latest_version.as_deref().unwrap_or("unknown version")
      ),
      fields: vec![notify::field("App", &app.name)],
      timestamp: drydock_client::entities::now_iso(),
    };
    notify::publish(db, http, event).await;
  }

  Ok(has_update_now)
}

/// Resolves one `(imageRepo, tag)` pair and, on success, persists the
/// result with `deployed_images.lastSeen` in the same transaction (spec
/// §4.4 "Ordering guarantee").
async fn resolve_and_upsert(
  db: &Db,
  http: &Client,
  user_id: i64,
  image_repo: &str,
  image_tag: &str,
  token_id: Option<i64>,
) -> anyhow::Result<()> {
  let token = match token_id {
    Some(id) => db::repository_tokens::get_owned(db, user_id, id)
      .await?
      .map(|t| t.access_token),
    None => None,
  };

  let resolved =
    crate::registry::resolve_image(http, image_repo, image_tag, token.as_deref()).await?;

  db.write(|conn| {
    let image_repo = image_repo.to_string();
    let image_tag = image_tag.to_string();
    async move {
      db::registry_versions::upsert(conn, user_id, &image_repo, &image_tag, &resolved).await?;
      sqlx::query(
        "UPDATE deployed_images SET last_seen = ? WHERE user_id = ? AND image_repo = ? AND image_tag = ?",
      )
      .bind(drydock_client::entities::now_iso())
      .bind(user_id)
      .bind(&image_repo)
      .bind(&image_tag)
      .execute(&mut *conn)
      .await?;
      Ok(())
    }
  })
  .await
}
