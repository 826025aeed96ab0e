use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // One live snapshot per tracked identity. `location` uses '' for "no
    // location" because NULLs are pairwise-distinct inside SQLite UNIQUE
    // constraints and would allow duplicate rows.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            keyword TEXT NOT NULL,
            domain TEXT NOT NULL,
            device TEXT NOT NULL,
            engine TEXT NOT NULL,
            location TEXT NOT NULL DEFAULT '',
            rank INTEGER NOT NULL,
            matched_identity TEXT NOT NULL,
            rating REAL,
            reviews INTEGER,
            baseline_24h INTEGER,
            baseline_7d INTEGER,
            baseline_30d INTEGER,
            rolled_24h_at INTEGER,
            rolled_7d_at INTEGER,
            rolled_30d_at INTEGER,
            first_seen_at INTEGER NOT NULL,
            observed_at INTEGER NOT NULL,
            UNIQUE(user_id, keyword, domain, device, location)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_user_domain ON snapshots(user_id, domain)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_identity ON snapshots(keyword, domain, device, location)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_observed_at ON snapshots(observed_at DESC)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
