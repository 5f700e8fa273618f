//! Database schema migrations (idempotent).

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema for the database configured in `config`.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // One row per case id; the vector is a little-endian f32 BLOB.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            text TEXT NOT NULL,
            source TEXT NOT NULL,
            date TEXT,
            seq INTEGER NOT NULL,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_index_entries_seq ON index_entries(seq DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
