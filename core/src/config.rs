use std::sync::OnceLock;

use anyhow::Context;
use drydock_client::entities::config::{LogConfig, LogLevel, StdioLogMode};
use serde::Deserialize;

/// Raw environment shape, parsed with `envy` the same way the teacher's
/// `bin/core/src/config.rs` parses `Env` before folding it into the final
/// config. Kept far smaller: this project has no config-file merge layer
/// (spec §6.6 names only env vars), so there is nothing to fold into.
#[derive(Debug, Deserialize)]
struct Env {
  #[serde(default = "default_data_dir")]
  data_dir: String,
  #[serde(default = "default_port")]
  port: u16,
  #[serde(default = "default_bind_ip")]
  bind_ip: String,
  #[serde(default)]
  node_env: String,
  #[serde(default)]
  jwt_secret: String,
  #[serde(default = "default_jwt_ttl_days")]
  jwt_ttl_days: i64,
  #[serde(default = "default_log_level")]
  log_level: String,
  #[serde(default = "default_log_format")]
  log_format: String,
  #[serde(default = "default_registry_worker_pool")]
  registry_worker_pool: usize,
  #[serde(default = "default_http_timeout_secs")]
  http_timeout_secs: u64,
}

fn default_data_dir() -> String {
  "/data".to_string()
}
fn default_port() -> u16 {
  8120
}
fn default_bind_ip() -> String {
  "0.0.0.0".to_string()
}
fn default_jwt_ttl_days() -> i64 {
  30
}
fn default_log_level() -> String {
  "info".to_string()
}
fn default_log_format() -> String {
  "standard".to_string()
}
fn default_registry_worker_pool() -> usize {
  8
}
fn default_http_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub data_dir: String,
  pub port: u16,
  pub bind_ip: String,
  pub jwt_secret: String,
  pub jwt_ttl_days: i64,
  pub logging: LogConfig,
  /// Size of the fixed registry-lookup worker pool (spec §5).
  pub registry_worker_pool: usize,
  /// Timeout applied to every C2/C3 HTTP call (spec §4.2, §5: "every call
  /// must time out within 30 s").
  pub http_timeout_secs: u64,
}

impl AppConfig {
  /// Resolved database file path under `data_dir` (spec §6.5).
  pub fn database_path(&self) -> String {
    format!("{}/drydock.sqlite", self.data_dir.trim_end_matches('/'))
  }

  /// Config with secrets redacted, safe to log at startup (mirrors the
  /// teacher's `core_config().sanitized()` banner in `main.rs`).
  pub fn sanitized(&self) -> serde_json::Value {
    serde_json::json!({
      "data_dir": self.data_dir,
      "port": self.port,
      "bind_ip": self.bind_ip,
      "jwt_secret": if self.jwt_secret.is_empty() { "<generated>" } else { "<set>" },
      "jwt_ttl_days": self.jwt_ttl_days,
      "registry_worker_pool": self.registry_worker_pool,
      "http_timeout_secs": self.http_timeout_secs,
    })
  }
}

pub fn app_config() -> &'static AppConfig {
  static CONFIG: OnceLock<AppConfig> = OnceLock::new();
  CONFIG.get_or_init(|| load().expect("failed to load configuration"))
}

fn load() -> anyhow::Result<AppConfig> {
  let mut env: Env =
    envy::from_env().context("failed to parse environment")?;

  // `NODE_ENV=test` switches the default data directory to a temp path
  // (spec §6.6), matching test-harness ergonomics without a dedicated
  // flag.
  if env.node_env == "test" && env.data_dir == default_data_dir() {
    env.data_dir = std::env::temp_dir()
      .join("drydock-test")
      .to_string_lossy()
      .to_string();
  }

  let level = match env.log_level.to_lowercase().as_str() {
    "error" => LogLevel::Error,
    "warn" => LogLevel::Warn,
    "debug" => LogLevel::Debug,
    "trace" => LogLevel::Trace,
    _ => LogLevel::Info,
  };
  let stdio = match env.log_format.to_lowercase().as_str() {
    "json" => StdioLogMode::Json,
    "none" => StdioLogMode::None,
    _ => StdioLogMode::Standard,
  };

  Ok(AppConfig {
    data_dir: env.data_dir,
    port: env.port,
    bind_ip: env.bind_ip,
    jwt_secret: env.jwt_secret,
    jwt_ttl_days: env.jwt_ttl_days,
    logging: LogConfig { level, stdio },
    registry_worker_pool: env.registry_worker_pool,
    http_timeout_secs: env.http_timeout_secs,
  })
}
