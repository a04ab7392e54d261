#[macro_use]
extern crate tracing;

use std::{net::SocketAddr, str::FromStr};

use anyhow::Context;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::{config::app_config, db::Db, state::AppState};

mod api;
mod cache;
mod config;
mod db;
mod detector;
mod error;
mod helpers;
mod intent;
mod logger;
mod notify;
mod portainer;
mod registry;
mod schedule;
mod state;

async fn app() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  let config = app_config();
  logger::init(&config.logging)?;

  info!("drydock v{}", env!("CARGO_PKG_VERSION"));
  info!("{:?}", config.sanitized());

  let db = Db::connect(&config.database_path()).await?;
  let state = AppState::new(db).await?;

  schedule::startup_sweep(&state).await?;
  schedule::spawn(state.clone());

  let app = Router::new()
    .nest("/api", api::router())
    .layer(
      CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any),
    )
    .with_state(state);

  let addr = format!("{}:{}", config.bind_ip, config.port);
  let socket_addr = SocketAddr::from_str(&addr).context("failed to parse listen address")?;
  info!("drydock starting on http://{socket_addr}");
  let listener = tokio::net::TcpListener::bind(socket_addr)
    .await
    .context("failed to bind listen address")?;
  axum::serve(listener, app)
    .await
    .context("failed to start http server")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let mut term_signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
  tokio::select! {
    res = tokio::spawn(app()) => res?,
    _ = term_signal.recv() => Ok(()),
  }
}
