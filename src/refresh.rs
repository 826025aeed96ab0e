//! Scheduled batch refresh over every tracked identity.
//!
//! Distinct (keyword, domain, device, location) tuples are refreshed
//! sequentially — the provider is paid per request and rate-limited, so
//! there is no fan-out across tuples. Because several users can track the
//! same tuple, each tuple is resolved once and the observation is written
//! once per user. Tuples fail independently: a provider or persistence
//! failure on one is logged and the pass moves on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::models::{RankQuery, SearchEngine};
use crate::provider::{SearchProvider, SerpClient};
use crate::resolver;
use crate::store::{IdentityGroup, Observation, SnapshotStore, SqliteSnapshotStore};

/// Counters for one refresh pass.
#[derive(Debug, Default, Serialize)]
pub struct RefreshReport {
    pub identities: usize,
    pub found: usize,
    pub not_found: usize,
    pub failed: usize,
    pub snapshots_written: usize,
    /// True when a shutdown request stopped the pass early. The in-flight
    /// tuple is always allowed to finish.
    pub interrupted: bool,
}

/// One pass over all distinct identity tuples. Idempotent and safe to re-run.
pub async fn run_pass(
    provider: &dyn SearchProvider,
    store: &dyn SnapshotStore,
    max_depth: u32,
    shutdown: &AtomicBool,
) -> Result<RefreshReport> {
    let groups = store.distinct_identities().await?;
    let mut report = RefreshReport {
        identities: groups.len(),
        ..RefreshReport::default()
    };

    for group in groups {
        if shutdown.load(Ordering::Relaxed) {
            report.interrupted = true;
            break;
        }
        if let Err(error) = refresh_group(provider, store, &group, max_depth, &mut report).await {
            warn!(
                keyword = %group.keyword,
                domain = %group.domain,
                device = %group.device,
                %error,
                "refresh item failed; continuing with next identity"
            );
            report.failed += 1;
        }
    }

    Ok(report)
}

async fn refresh_group(
    provider: &dyn SearchProvider,
    store: &dyn SnapshotStore,
    group: &IdentityGroup,
    max_depth: u32,
    report: &mut RefreshReport,
) -> Result<()> {
    let engine = if group.device.is_local() {
        SearchEngine::GoogleLocal
    } else {
        group.engine
    };

    // Resolution is user-independent; probe with the first sharer.
    let probe = RankQuery::new(
        &group.user_ids[0],
        &group.keyword,
        &group.domain,
        group.device,
        engine,
        group.location.clone(),
    );
    let resolution = resolver::resolve(provider, &probe, max_depth).await?;

    if resolution.is_found() {
        report.found += 1;
    } else {
        report.not_found += 1;
    }

    let observation = Observation {
        rank: resolution.rank,
        matched_identity: resolution
            .matched_identity
            .unwrap_or_else(|| group.domain.clone()),
        rating: resolution.rating,
        reviews: resolution.reviews,
        observed_at: Utc::now(),
    };

    for user_id in &group.user_ids {
        let query = RankQuery::new(
            user_id,
            &group.keyword,
            &group.domain,
            group.device,
            engine,
            group.location.clone(),
        );
        store.record(&query, &observation).await?;
        report.snapshots_written += 1;
    }

    info!(
        keyword = %group.keyword,
        domain = %group.domain,
        rank = observation.rank,
        users = group.user_ids.len(),
        "identity refreshed"
    );
    Ok(())
}

/// Run a refresh pass from the CLI and print the summary.
///
/// Ctrl-C requests a graceful stop: the in-flight identity finishes, no
/// new one starts.
pub async fn run_refresh(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteSnapshotStore::new(pool.clone());
    let provider = SerpClient::new(&config.provider)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown requested; finishing the in-flight identity");
            shutdown_flag.store(true, Ordering::Relaxed);
        }
    });

    let report = run_pass(&provider, &store, config.tracking.max_depth, &shutdown).await?;

    println!("refresh");
    println!("  identities: {}", report.identities);
    println!("  found: {}", report.found);
    println!("  not found: {}", report.not_found);
    println!("  failed: {}", report.failed);
    println!("  snapshots written: {}", report.snapshots_written);
    if report.interrupted {
        println!("  interrupted before completion");
    }
    println!("ok");

    pool.close().await;
    Ok(())
}
