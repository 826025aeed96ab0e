//! Snapshot persistence.
//!
//! One live row per (user, keyword, domain, device, location) identity.
//! [`SnapshotStore::record`] performs the read-merge-write inside a single
//! transaction so that a user-initiated search racing a scheduled refresh
//! cannot drop a baseline roll. The pool handle is passed in by the caller;
//! connection lifecycle is owned by the process entry point.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Device, RankQuery, RankSnapshot, SearchEngine, TrendBaselines};
use crate::trend;

/// A fresh observation to merge into the store.
#[derive(Debug, Clone)]
pub struct Observation {
    pub rank: i64,
    pub matched_identity: String,
    pub rating: Option<f64>,
    pub reviews: Option<i64>,
    pub observed_at: DateTime<Utc>,
}

/// Identity tuple shared by one or more users, as consumed by the batch
/// refresh: the tuple is resolved once and the result fans out per user.
#[derive(Debug, Clone)]
pub struct IdentityGroup {
    pub keyword: String,
    pub domain: String,
    pub device: Device,
    pub engine: SearchEngine,
    pub location: Option<String>,
    pub user_ids: Vec<String>,
}

/// Persistence contract consumed by the resolution pipeline.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Current snapshot for an identity, if one exists.
    async fn find_current(&self, query: &RankQuery) -> Result<Option<RankSnapshot>>;

    /// Merge a fresh observation into the identity's snapshot, rolling the
    /// trend baselines from the record being replaced. Must be atomic per
    /// identity.
    async fn record(&self, query: &RankQuery, observation: &Observation) -> Result<RankSnapshot>;

    /// Current snapshots for one user's domain, newest first, optionally
    /// narrowed to a single keyword.
    async fn list_for_user(
        &self,
        user_id: &str,
        domain: &str,
        keyword: Option<&str>,
    ) -> Result<Vec<RankSnapshot>>;

    /// Distinct identity tuples across all users.
    async fn distinct_identities(&self) -> Result<Vec<IdentityGroup>>;
}

/// SQLite-backed store.
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn find_current(&self, query: &RankQuery) -> Result<Option<RankSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM snapshots
            WHERE user_id = ? AND keyword = ? AND domain = ? AND device = ? AND location = ?
            "#,
        )
        .bind(&query.user_id)
        .bind(&query.keyword)
        .bind(&query.domain)
        .bind(query.device.as_str())
        .bind(query.location_key())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row_to_snapshot(&row)).transpose()
    }

    async fn record(&self, query: &RankQuery, observation: &Observation) -> Result<RankSnapshot> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            r#"
            SELECT * FROM snapshots
            WHERE user_id = ? AND keyword = ? AND domain = ? AND device = ? AND location = ?
            "#,
        )
        .bind(&query.user_id)
        .bind(&query.keyword)
        .bind(&query.domain)
        .bind(query.device.as_str())
        .bind(query.location_key())
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| row_to_snapshot(&row))
        .transpose()?;

        let baselines = trend::roll_baselines(existing.as_ref(), observation.observed_at);
        let id = existing
            .as_ref()
            .map(|snapshot| snapshot.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let first_seen_at = existing
            .as_ref()
            .map(|snapshot| snapshot.first_seen_at)
            .unwrap_or(observation.observed_at);

        sqlx::query(
            r#"
            INSERT INTO snapshots (
                id, user_id, keyword, domain, device, engine, location,
                rank, matched_identity, rating, reviews,
                baseline_24h, baseline_7d, baseline_30d,
                rolled_24h_at, rolled_7d_at, rolled_30d_at,
                first_seen_at, observed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, keyword, domain, device, location) DO UPDATE SET
                engine = excluded.engine,
                rank = excluded.rank,
                matched_identity = excluded.matched_identity,
                rating = excluded.rating,
                reviews = excluded.reviews,
                baseline_24h = excluded.baseline_24h,
                baseline_7d = excluded.baseline_7d,
                baseline_30d = excluded.baseline_30d,
                rolled_24h_at = excluded.rolled_24h_at,
                rolled_7d_at = excluded.rolled_7d_at,
                rolled_30d_at = excluded.rolled_30d_at,
                observed_at = excluded.observed_at
            "#,
        )
        .bind(&id)
        .bind(&query.user_id)
        .bind(&query.keyword)
        .bind(&query.domain)
        .bind(query.device.as_str())
        .bind(query.engine.as_str())
        .bind(query.location_key())
        .bind(observation.rank)
        .bind(&observation.matched_identity)
        .bind(observation.rating)
        .bind(observation.reviews)
        .bind(baselines.rank_24h)
        .bind(baselines.rank_7d)
        .bind(baselines.rank_30d)
        .bind(baselines.rolled_24h_at.map(|ts| ts.timestamp()))
        .bind(baselines.rolled_7d_at.map(|ts| ts.timestamp()))
        .bind(baselines.rolled_30d_at.map(|ts| ts.timestamp()))
        .bind(first_seen_at.timestamp())
        .bind(observation.observed_at.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RankSnapshot {
            id,
            user_id: query.user_id.clone(),
            keyword: query.keyword.clone(),
            domain: query.domain.clone(),
            device: query.device,
            engine: query.engine,
            location: query.location.clone(),
            rank: observation.rank,
            matched_identity: observation.matched_identity.clone(),
            rating: observation.rating,
            reviews: observation.reviews,
            baselines,
            first_seen_at,
            observed_at: observation.observed_at,
        })
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        domain: &str,
        keyword: Option<&str>,
    ) -> Result<Vec<RankSnapshot>> {
        let rows = match keyword {
            Some(keyword) => {
                sqlx::query(
                    r#"
                    SELECT * FROM snapshots
                    WHERE user_id = ? AND domain = ? AND keyword = ?
                    ORDER BY observed_at DESC
                    "#,
                )
                .bind(user_id)
                .bind(domain)
                .bind(keyword)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM snapshots
                    WHERE user_id = ? AND domain = ?
                    ORDER BY observed_at DESC
                    "#,
                )
                .bind(user_id)
                .bind(domain)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_snapshot).collect()
    }

    async fn distinct_identities(&self) -> Result<Vec<IdentityGroup>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, keyword, domain, device, engine, location FROM snapshots
            ORDER BY keyword, domain, device, location, user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        // Stable grouping: first row of a tuple fixes the group's order and engine.
        let mut groups: Vec<IdentityGroup> = Vec::new();
        let mut index: HashMap<(String, String, String, String), usize> = HashMap::new();

        for row in &rows {
            let user_id: String = row.get("user_id");
            let keyword: String = row.get("keyword");
            let domain: String = row.get("domain");
            let device_raw: String = row.get("device");
            let engine_raw: String = row.get("engine");
            let location: String = row.get("location");

            let key = (
                keyword.clone(),
                domain.clone(),
                device_raw.clone(),
                location.clone(),
            );
            match index.get(&key) {
                Some(&at) => groups[at].user_ids.push(user_id),
                None => {
                    let device: Device = device_raw.parse().map_err(anyhow::Error::msg)?;
                    let engine: SearchEngine = engine_raw.parse().map_err(anyhow::Error::msg)?;
                    index.insert(key, groups.len());
                    groups.push(IdentityGroup {
                        keyword,
                        domain,
                        device,
                        engine,
                        location: (!location.is_empty()).then_some(location),
                        user_ids: vec![user_id],
                    });
                }
            }
        }

        Ok(groups)
    }
}

fn row_to_snapshot(row: &sqlx::sqlite::SqliteRow) -> Result<RankSnapshot> {
    let device_raw: String = row.get("device");
    let engine_raw: String = row.get("engine");
    let location: String = row.get("location");

    Ok(RankSnapshot {
        id: row.get("id"),
        user_id: row.get("user_id"),
        keyword: row.get("keyword"),
        domain: row.get("domain"),
        device: device_raw.parse().map_err(anyhow::Error::msg)?,
        engine: engine_raw.parse().map_err(anyhow::Error::msg)?,
        location: (!location.is_empty()).then_some(location),
        rank: row.get("rank"),
        matched_identity: row.get("matched_identity"),
        rating: row.get("rating"),
        reviews: row.get("reviews"),
        baselines: TrendBaselines {
            rank_24h: row.get("baseline_24h"),
            rank_7d: row.get("baseline_7d"),
            rank_30d: row.get("baseline_30d"),
            rolled_24h_at: from_unix_opt(row.get("rolled_24h_at"))?,
            rolled_7d_at: from_unix_opt(row.get("rolled_7d_at"))?,
            rolled_30d_at: from_unix_opt(row.get("rolled_30d_at"))?,
        },
        first_seen_at: from_unix(row.get("first_seen_at"))?,
        observed_at: from_unix(row.get("observed_at"))?,
    })
}

fn from_unix(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).with_context(|| format!("timestamp out of range: {ts}"))
}

fn from_unix_opt(ts: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ts.map(from_unix).transpose()
}

/// In-memory store for unit tests.
///
/// A `HashMap` keyed by the identity tuple behind an `RwLock`; `record`
/// holds the write lock across the whole read-merge-write, giving the same
/// atomicity the SQLite transaction provides.
pub struct MemorySnapshotStore {
    rows: std::sync::RwLock<HashMap<MemoryKey, RankSnapshot>>,
}

type MemoryKey = (String, String, String, Device, String);

fn memory_key(query: &RankQuery) -> MemoryKey {
    (
        query.user_id.clone(),
        query.keyword.clone(),
        query.domain.clone(),
        query.device,
        query.location_key().to_string(),
    )
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            rows: std::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn find_current(&self, query: &RankQuery) -> Result<Option<RankSnapshot>> {
        let rows = self.rows.read().unwrap();
        Ok(rows.get(&memory_key(query)).cloned())
    }

    async fn record(&self, query: &RankQuery, observation: &Observation) -> Result<RankSnapshot> {
        let mut rows = self.rows.write().unwrap();
        let existing = rows.get(&memory_key(query));

        let baselines = trend::roll_baselines(existing, observation.observed_at);
        let id = existing
            .map(|snapshot| snapshot.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let first_seen_at = existing
            .map(|snapshot| snapshot.first_seen_at)
            .unwrap_or(observation.observed_at);

        let snapshot = RankSnapshot {
            id,
            user_id: query.user_id.clone(),
            keyword: query.keyword.clone(),
            domain: query.domain.clone(),
            device: query.device,
            engine: query.engine,
            location: query.location.clone(),
            rank: observation.rank,
            matched_identity: observation.matched_identity.clone(),
            rating: observation.rating,
            reviews: observation.reviews,
            baselines,
            first_seen_at,
            observed_at: observation.observed_at,
        };
        rows.insert(memory_key(query), snapshot.clone());
        Ok(snapshot)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        domain: &str,
        keyword: Option<&str>,
    ) -> Result<Vec<RankSnapshot>> {
        let rows = self.rows.read().unwrap();
        let mut matching: Vec<RankSnapshot> = rows
            .values()
            .filter(|s| s.user_id == user_id && s.domain == domain)
            .filter(|s| keyword.map_or(true, |k| s.keyword == k))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        Ok(matching)
    }

    async fn distinct_identities(&self) -> Result<Vec<IdentityGroup>> {
        let rows = self.rows.read().unwrap();
        let mut snapshots: Vec<&RankSnapshot> = rows.values().collect();
        snapshots.sort_by(|a, b| {
            (&a.keyword, &a.domain, a.device.as_str(), &a.location, &a.user_id).cmp(&(
                &b.keyword,
                &b.domain,
                b.device.as_str(),
                &b.location,
                &b.user_id,
            ))
        });

        let mut groups: Vec<IdentityGroup> = Vec::new();
        let mut index: HashMap<(String, String, Device, String), usize> = HashMap::new();
        for snapshot in snapshots {
            let key = (
                snapshot.keyword.clone(),
                snapshot.domain.clone(),
                snapshot.device,
                snapshot.location.clone().unwrap_or_default(),
            );
            match index.get(&key) {
                Some(&at) => groups[at].user_ids.push(snapshot.user_id.clone()),
                None => {
                    index.insert(key, groups.len());
                    groups.push(IdentityGroup {
                        keyword: snapshot.keyword.clone(),
                        domain: snapshot.domain.clone(),
                        device: snapshot.device,
                        engine: snapshot.engine,
                        location: snapshot.location.clone(),
                        user_ids: vec![snapshot.user_id.clone()],
                    });
                }
            }
        }
        Ok(groups)
    }
}
