pub mod batch;
pub mod config;
pub mod container;
pub mod deployed_image;
pub mod error;
pub mod intent;
pub mod intent_execution;
pub mod notification;
pub mod portainer_instance;
pub mod registry_version;
pub mod repository_token;
pub mod tracked_app;
pub mod user;

/// Current UTC timestamp rendered as ISO-8601 with a `T` separator
/// (spec §6.5: "all timestamp columns are UTC ISO-8601").
pub fn now_iso() -> String {
  chrono::Utc::now().to_rfc3339()
}
