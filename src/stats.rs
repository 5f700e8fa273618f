//! Index statistics.
//!
//! Summarises what the precedent index holds: entry count, stored vector
//! dimensions, and when entries were last ingested. Used by
//! `clausemate stats` to confirm that ingestion runs are landing.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;

/// Entry counts for one stored vector dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimsStats {
    pub dims: i64,
    pub entries: i64,
    pub last_ingested_ts: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub total_entries: i64,
    pub dated_entries: i64,
    pub by_dims: Vec<DimsStats>,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<IndexStats> {
    let total_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
        .fetch_one(pool)
        .await?;

    let dated_entries: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM index_entries WHERE date IS NOT NULL AND date != ''")
            .fetch_one(pool)
            .await?;

    let rows = sqlx::query(
        r#"
        SELECT dims, COUNT(*) AS entries, MAX(ingested_at) AS last_ingested
        FROM index_entries
        GROUP BY dims
        ORDER BY entries DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_dims = rows
        .iter()
        .map(|row| DimsStats {
            dims: row.get("dims"),
            entries: row.get("entries"),
            last_ingested_ts: row.get("last_ingested"),
        })
        .collect();

    Ok(IndexStats {
        total_entries,
        dated_entries,
        by_dims,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let stats = collect_stats(&pool).await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("ClauseMate — Index Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!(
        "  Embedding:   {} ({} dims)",
        config.embedding.model.as_deref().unwrap_or(&config.embedding.provider),
        config.index_dims()
    );
    println!();
    println!("  Entries:     {}", stats.total_entries);
    println!("  With date:   {}", stats.dated_entries);

    if !stats.by_dims.is_empty() {
        println!();
        println!("  By dimension:");
        println!("  {:<8} {:>8}   {}", "DIMS", "ENTRIES", "LAST INGEST");
        println!("  {}", "-".repeat(40));
        for d in &stats.by_dims {
            let marker = if d.dims as usize == config.index_dims() {
                ""
            } else {
                "  (not searchable with current model)"
            };
            let last = match d.last_ingested_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!("  {:<8} {:>8}   {}{}", d.dims, d.entries, last, marker);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
