//! Persistence layer (spec §4.1, C1).
//!
//! Readers go straight to the pool. Every multi-statement write goes through
//! [`Db::write`], which serialises writers process-wide behind a single
//! mutex and wraps the body in a `BEGIN IMMEDIATE` transaction -- the
//! deliberate "single writer" design spec §4.1 calls for to sidestep
//! `SQLITE_BUSY` without a connection-pool-wide lock on readers.

use std::future::Future;

use anyhow::Context;
use sqlx::{SqliteConnection, SqlitePool, sqlite::SqliteConnectOptions};

pub mod batch;
pub mod containers;
pub mod deployed_images;
pub mod intent_executions;
pub mod intents;
pub mod migrate;
pub mod notifications;
pub mod portainer_instances;
pub mod registry_versions;
pub mod repository_tokens;
pub mod sessions;
pub mod tracked_apps;
pub mod users;

pub struct Db {
  pool: SqlitePool,
  write_lock: tokio::sync::Mutex<()>,
}

impl Db {
  pub async fn connect(database_path: &str) -> anyhow::Result<Db> {
    if let Some(parent) = std::path::Path::new(database_path).parent() {
      std::fs::create_dir_all(parent).with_context(|| {
        format!("failed to create data directory {}", parent.display())
      })?;
    }
    let options = SqliteConnectOptions::new()
      .filename(database_path)
      .create_if_missing(true)
      .foreign_keys(true);
    let pool = SqlitePool::connect_with(options)
      .await
      .context("failed to open sqlite database")?;
    migrate::run(&pool).await?;
    Ok(Db {
      pool,
      write_lock: tokio::sync::Mutex::new(()),
    })
  }

  #[cfg(test)]
  pub async fn connect_in_memory() -> anyhow::Result<Db> {
    let pool = SqlitePool::connect("sqlite::memory:").await?;
    migrate::run(&pool).await?;
    Ok(Db {
      pool,
      write_lock: tokio::sync::Mutex::new(()),
    })
  }

  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }

  /// Runs `f` inside a process-wide-serialised `BEGIN IMMEDIATE` transaction
  /// (spec §4.1). On error the transaction is rolled back and the error
  /// propagated untouched.
  pub async fn write<F, T>(&self, f: F) -> anyhow::Result<T>
  where
    for<'c> F: FnOnce(&'c mut SqliteConnection) -> std::pin::Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'c>>,
  {
    let _permit = self.write_lock.lock().await;
    let mut conn = self
      .pool
      .acquire()
      .await
      .context("failed to acquire sqlite connection")?;
    sqlx::query("BEGIN IMMEDIATE")
      .execute(&mut *conn)
      .await
      .context("failed to begin immediate transaction")?;
    match f(&mut conn).await {
      Ok(value) => {
        sqlx::query("COMMIT")
          .execute(&mut *conn)
          .await
          .context("failed to commit transaction")?;
        Ok(value)
      }
      Err(e) => {
        let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
        Err(e)
      }
    }
  }
}
