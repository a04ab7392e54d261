//! The `/api` tree (spec §6.4): one `Router<AppState>` nesting each
//! resource's own router. Every route below `auth::router()` requires a
//! valid session (spec: "all endpoints require a session token"), enforced
//! per-handler by the [`auth::SessionUser`] extractor rather than a blanket
//! middleware, since a couple of routes (executions, container history) key
//! off ids that don't live under their owning resource's path prefix.

pub mod auth;
pub mod batch;
pub mod containers;
pub mod history;
pub mod intents;
pub mod portainer_instances;
pub mod repository_tokens;
pub mod tracked_apps;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
  Router::new()
    .nest("/auth", auth::router())
    .nest("/portainer/instances", portainer_instances::router())
    .nest("/containers", containers::router())
    .nest("/repository-access-tokens", repository_tokens::router())
    .nest("/tracked-apps", tracked_apps::router())
    .nest("/intents", intents::router())
    .nest("/intent-executions", intents::executions_router())
    .nest("/batch", batch::router())
    .nest("/webhooks", webhooks::router())
    .nest("/upgrade-history", history::upgrade_history_router())
    .nest("/tracked-app-upgrade-history", history::tracked_app_upgrade_history_router())
}
