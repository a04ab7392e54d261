use anyhow::Context;
use sqlx::SqlitePool;

/// Forward-only, versioned migrations discovered from files named
/// `NNNN_name.sql`, tracked in a `schema_migrations` table (spec §4.1).
/// Embedded at compile time rather than scanned from disk at runtime, since
/// the binary ships as a single statically-linked executable.
struct Migration {
  version: i64,
  name: &'static str,
  sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
  Migration {
    version: 1,
    name: "init",
    sql: include_str!("migrations/0001_init.sql"),
  },
  Migration {
    version: 2,
    name: "indexes",
    sql: include_str!("migrations/0002_indexes.sql"),
  },
];

pub async fn run(pool: &SqlitePool) -> anyhow::Result<()> {
  sqlx::query(
    "CREATE TABLE IF NOT EXISTS schema_migrations (
       version INTEGER PRIMARY KEY,
       name TEXT NOT NULL,
       applied_at TEXT NOT NULL
     )",
  )
  .execute(pool)
  .await
  .context("failed to create schema_migrations table")?;

  let applied: Vec<i64> =
    sqlx::query_scalar("SELECT version FROM schema_migrations")
      .fetch_all(pool)
      .await
      .context("failed to read schema_migrations")?;

  for migration in MIGRATIONS {
    if applied.contains(&migration.version) {
      continue;
    }
    tracing::info!(
      "applying migration {} ({})",
      migration.version,
      migration.name
    );
    let mut tx = pool.begin().await.context("failed to begin migration transaction")?;
    for statement in migration.sql.split(';') {
      let statement = statement.trim();
      if statement.is_empty() {
        continue;
      }
      sqlx::query(statement).execute(&mut *tx).await.with_context(|| {
        format!(
          "migration {} ({}) failed on statement: {statement}",
          migration.version, migration.name
        )
      })?;
    }
    sqlx::query(
      "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
    )
    .bind(migration.version)
    .bind(migration.name)
    .bind(drydock_client::entities::now_iso())
    .execute(&mut *tx)
    .await
    .context("failed to record migration")?;
    tx.commit().await.context("failed to commit migration")?;
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn migrations_are_idempotent() {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    run(&pool).await.unwrap();
    // Running twice must be a no-op (spec §8: "running the same migration
    // twice is a no-op").
    run(&pool).await.unwrap();
    let count: i64 =
      sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, MIGRATIONS.len() as i64);
  }
}
