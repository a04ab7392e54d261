use anyhow::Context;
use drydock_client::entities::config::{LogConfig, LogLevel, StdioLogMode};
use tracing_subscriber::{
  EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Initialises the global tracing subscriber. Grounded on `lib/logger` in
/// the teacher, trimmed of its OpenTelemetry export layer: this project has
/// no distributed-tracing requirement, so only the `stdio`/`level` axes are
/// kept.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
  let level = match config.level {
    LogLevel::Error => "error",
    LogLevel::Warn => "warn",
    LogLevel::Info => "info",
    LogLevel::Debug => "debug",
    LogLevel::Trace => "trace",
  };
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(level));

  let registry = Registry::default().with(filter);

  match config.stdio {
    StdioLogMode::Standard => {
      registry.with(tracing_subscriber::fmt::layer()).try_init()
    }
    StdioLogMode::Json => registry
      .with(tracing_subscriber::fmt::layer().json())
      .try_init(),
    StdioLogMode::None => return Ok(()),
  }
  .context("failed to init logger")
}
