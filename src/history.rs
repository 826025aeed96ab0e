//! Read side: current snapshots with trend indicators.
//!
//! Produces the rows behind the domains/statistics views: one line per
//! tracked keyword combination with its position and the 24h/7d/30d
//! deltas derived from the stored baselines.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::matcher;
use crate::models::{Device, RankSnapshot, SearchEngine};
use crate::store::{SnapshotStore, SqliteSnapshotStore};
use crate::trend::{self, Trend};

/// One displayable history row.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRow {
    pub keyword: String,
    pub device: Device,
    pub engine: SearchEngine,
    pub location: Option<String>,
    pub rank: i64,
    pub matched_identity: String,
    pub rating: Option<f64>,
    pub reviews: Option<i64>,
    pub observed_at: DateTime<Utc>,
    pub trend_24h: Trend,
    pub trend_7d: Trend,
    pub trend_30d: Trend,
}

impl HistoryRow {
    fn from_snapshot(snapshot: &RankSnapshot) -> Self {
        Self {
            keyword: snapshot.keyword.clone(),
            device: snapshot.device,
            engine: snapshot.engine,
            location: snapshot.location.clone(),
            rank: snapshot.rank,
            matched_identity: snapshot.matched_identity.clone(),
            rating: snapshot.rating,
            reviews: snapshot.reviews,
            observed_at: snapshot.observed_at,
            trend_24h: trend::derive(snapshot.rank, snapshot.baselines.rank_24h),
            trend_7d: trend::derive(snapshot.rank, snapshot.baselines.rank_7d),
            trend_30d: trend::derive(snapshot.rank, snapshot.baselines.rank_30d),
        }
    }
}

/// Current snapshots for one user's domain, with derived trends.
pub async fn domain_history(
    store: &dyn SnapshotStore,
    user_id: &str,
    domain: &str,
    keyword: Option<&str>,
) -> Result<Vec<HistoryRow>> {
    let Some(domain) = matcher::normalize_domain(domain) else {
        bail!("invalid domain: {}", domain);
    };
    let snapshots = store.list_for_user(user_id, &domain, keyword).await?;
    Ok(snapshots.iter().map(HistoryRow::from_snapshot).collect())
}

/// Run the history command: list a domain's snapshots and print a table.
pub async fn run_history(
    config: &Config,
    user_id: &str,
    domain: &str,
    keyword: Option<&str>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteSnapshotStore::new(pool.clone());

    let rows = domain_history(&store, user_id, domain, keyword).await?;

    if rows.is_empty() {
        println!("No snapshots for this domain.");
        pool.close().await;
        return Ok(());
    }

    println!(
        "{:<32} {:<12} {:>6} {:>8} {:>8} {:>8}   {}",
        "KEYWORD", "DEVICE", "RANK", "24H", "7D", "30D", "OBSERVED"
    );
    println!("{}", "-".repeat(92));

    for row in &rows {
        println!(
            "{:<32} {:<12} {:>6} {:>8} {:>8} {:>8}   {}",
            truncate(&row.keyword, 32),
            row.device.as_str(),
            format_rank(row.rank),
            format_trend(&row.trend_24h),
            format_trend(&row.trend_7d),
            format_trend(&row.trend_30d),
            row.observed_at.format("%Y-%m-%d %H:%M"),
        );
    }

    println!();
    println!("{} row(s)", rows.len());

    pool.close().await;
    Ok(())
}

fn format_rank(rank: i64) -> String {
    if rank > 0 {
        format!("#{rank}")
    } else {
        "—".to_string()
    }
}

fn format_trend(trend: &Trend) -> String {
    match trend.delta {
        Some(delta) if delta != 0 => format!("{} {:+}", trend.symbol(), delta),
        Some(_) => trend.symbol().to_string(),
        None => trend.symbol().to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RankQuery;
    use crate::store::{MemorySnapshotStore, Observation};
    use crate::trend::Direction;

    #[tokio::test]
    async fn history_derives_trends_from_baselines() {
        let store = MemorySnapshotStore::new();
        let query = RankQuery::new(
            "u1",
            "pizza nyc",
            "joes-pizza.com",
            Device::Desktop,
            SearchEngine::Google,
            None,
        );

        store
            .record(
                &query,
                &Observation {
                    rank: 10,
                    matched_identity: "joes-pizza.com".to_string(),
                    rating: None,
                    reviews: None,
                    observed_at: "2026-07-01T00:00:00Z".parse().unwrap(),
                },
            )
            .await
            .unwrap();
        store
            .record(
                &query,
                &Observation {
                    rank: 3,
                    matched_identity: "joes-pizza.com".to_string(),
                    rating: None,
                    reviews: None,
                    observed_at: "2026-07-03T00:00:00Z".parse().unwrap(),
                },
            )
            .await
            .unwrap();

        // The raw domain input is normalized before lookup.
        let rows = domain_history(&store, "u1", "https://www.joes-pizza.com", None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rank, 3);
        assert_eq!(rows[0].trend_24h.baseline, Some(10));
        assert_eq!(rows[0].trend_24h.delta, Some(7));
        assert_eq!(rows[0].trend_24h.direction, Direction::Improved);
    }

    #[tokio::test]
    async fn keyword_filter_narrows_rows() {
        let store = MemorySnapshotStore::new();
        for keyword in ["pizza nyc", "best slices"] {
            let query = RankQuery::new(
                "u1",
                keyword,
                "joes-pizza.com",
                Device::Desktop,
                SearchEngine::Google,
                None,
            );
            store
                .record(
                    &query,
                    &Observation {
                        rank: 4,
                        matched_identity: "joes-pizza.com".to_string(),
                        rating: None,
                        reviews: None,
                        observed_at: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }

        let rows = domain_history(&store, "u1", "joes-pizza.com", Some("pizza nyc"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].keyword, "pizza nyc");
    }
}
