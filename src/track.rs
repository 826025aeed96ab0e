//! Interactive tracking pipeline.
//!
//! Coordinates the full flow for a user-submitted request: keyword-list
//! parsing → per-device resolution → snapshot recording → trend readout.
//! Each keyword/device combination is resolved independently and in
//! sequence; pagination inside a single resolution cannot be parallelized
//! because of the early-exit control flow.

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::matcher;
use crate::models::{Device, RankQuery, SearchEngine};
use crate::provider::{ProviderError, SearchProvider, SerpClient};
use crate::resolver;
use crate::store::{Observation, SnapshotStore, SqliteSnapshotStore};
use crate::trend::{self, Trend};

/// A user-submitted tracking request.
#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub user_id: String,
    /// Raw multi-keyword input; split on newlines and commas.
    pub keywords: String,
    /// Raw domain input; normalized before matching.
    pub domain: String,
    pub devices: Vec<Device>,
    pub location: Option<String>,
    /// Organic engine. The local pseudo-device ignores this.
    pub engine: SearchEngine,
}

/// One resolved keyword/device combination.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TrackOutcome {
    pub keyword: String,
    pub device: Device,
    pub rank: i64,
    pub matched_identity: Option<String>,
    pub rating: Option<f64>,
    pub reviews: Option<i64>,
    pub trend_24h: Trend,
    pub trend_7d: Trend,
    pub trend_30d: Trend,
}

/// Split a raw keyword field on newlines and commas, as entered in the
/// dashboard form.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(['\n', ','])
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve every keyword/device combination and record the outcomes.
///
/// A domain that cannot be normalized is rejected up front. Provider
/// transport failures abort the whole request — interactive callers show
/// them as a generic search error — while "not found" is a normal outcome
/// carried in the returned list.
pub async fn track(
    provider: &dyn SearchProvider,
    store: &dyn SnapshotStore,
    request: &TrackRequest,
    max_depth: u32,
) -> Result<Vec<TrackOutcome>> {
    let keywords = parse_keywords(&request.keywords);
    if keywords.is_empty() {
        bail!("no valid keywords in input");
    }
    let Some(domain) = matcher::normalize_domain(&request.domain) else {
        bail!("invalid domain: {}", request.domain);
    };
    let devices: &[Device] = if request.devices.is_empty() {
        &[Device::Desktop]
    } else {
        &request.devices
    };

    let mut outcomes = Vec::new();
    for keyword in &keywords {
        for &device in devices {
            let engine = if device.is_local() {
                SearchEngine::GoogleLocal
            } else {
                request.engine
            };
            let query = RankQuery::new(
                &request.user_id,
                keyword,
                &domain,
                device,
                engine,
                request.location.clone(),
            );

            let resolution = resolver::resolve(provider, &query, max_depth)
                .await
                .map_err(surface_provider_error)?;
            info!(
                keyword = %query.keyword,
                %device,
                rank = resolution.rank,
                "query resolved"
            );

            let observation = Observation {
                rank: resolution.rank,
                matched_identity: resolution
                    .matched_identity
                    .clone()
                    .unwrap_or_else(|| domain.clone()),
                rating: resolution.rating,
                reviews: resolution.reviews,
                observed_at: Utc::now(),
            };
            let snapshot = store.record(&query, &observation).await?;

            outcomes.push(TrackOutcome {
                keyword: keyword.clone(),
                device,
                rank: snapshot.rank,
                matched_identity: resolution.matched_identity,
                rating: snapshot.rating,
                reviews: snapshot.reviews,
                trend_24h: trend::derive(snapshot.rank, snapshot.baselines.rank_24h),
                trend_7d: trend::derive(snapshot.rank, snapshot.baselines.rank_7d),
                trend_30d: trend::derive(snapshot.rank, snapshot.baselines.rank_30d),
            });
        }
    }

    Ok(outcomes)
}

/// Interactive callers get one generic message for any provider failure;
/// the typed error stays in the chain for logs and the HTTP layer.
fn surface_provider_error(error: ProviderError) -> anyhow::Error {
    anyhow::Error::new(error).context("error performing search")
}

/// Run a track request from the CLI and print the outcomes.
pub async fn run_track(config: &Config, request: TrackRequest) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteSnapshotStore::new(pool.clone());
    let provider = SerpClient::new(&config.provider)?;

    let outcomes = track(&provider, &store, &request, config.tracking.max_depth).await?;

    let mut found = 0;
    for outcome in &outcomes {
        let position = if outcome.rank > 0 {
            found += 1;
            format!("#{}", outcome.rank)
        } else {
            "not found".to_string()
        };
        let trend_display = match outcome.trend_24h.delta {
            Some(delta) => format!("{} {:+}", outcome.trend_24h.symbol(), delta),
            None => outcome.trend_24h.symbol().to_string(),
        };
        let extras = match (outcome.rating, outcome.reviews) {
            (Some(rating), Some(reviews)) => format!("  {:.1}★ ({} reviews)", rating, reviews),
            (Some(rating), None) => format!("  {:.1}★", rating),
            _ => String::new(),
        };
        println!(
            "  {:<32} {:<12} {:>10}  {}{}",
            outcome.keyword,
            outcome.device.as_str(),
            position,
            trend_display,
            extras
        );
    }

    println!();
    println!("tracked {} combination(s), {} found", outcomes.len(), found);
    println!("ok");

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{OrganicResult, PageRequest, ResultPage};
    use crate::store::MemorySnapshotStore;
    use async_trait::async_trait;

    /// Provider that ranks every keyword at a fixed organic position.
    struct FixedRankProvider {
        position: i64,
    }

    #[async_trait]
    impl SearchProvider for FixedRankProvider {
        async fn fetch_page(&self, _request: &PageRequest) -> Result<ResultPage, ProviderError> {
            let results = (1..=10)
                .map(|position| OrganicResult {
                    link: Some(if position == self.position {
                        "https://www.joes-pizza.com".to_string()
                    } else {
                        format!("https://site-{position}.example")
                    }),
                    position: Some(position),
                })
                .collect();
            Ok(ResultPage::Organic(results))
        }
    }

    fn request(keywords: &str, devices: Vec<Device>) -> TrackRequest {
        TrackRequest {
            user_id: "u1".to_string(),
            keywords: keywords.to_string(),
            domain: "https://www.Joes-Pizza.com".to_string(),
            devices,
            location: None,
            engine: SearchEngine::Google,
        }
    }

    #[test]
    fn keyword_parsing_splits_on_newlines_and_commas() {
        assert_eq!(
            parse_keywords("pizza nyc, best pizza\n slice shop ,,\n"),
            vec!["pizza nyc", "best pizza", "slice shop"]
        );
        assert!(parse_keywords(" , \n ").is_empty());
    }

    #[tokio::test]
    async fn tracks_every_keyword_device_combination() {
        let provider = FixedRankProvider { position: 3 };
        let store = MemorySnapshotStore::new();

        let outcomes = track(
            &provider,
            &store,
            &request("pizza nyc, best pizza", vec![Device::Desktop, Device::Mobile]),
            100,
        )
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|outcome| outcome.rank == 3));
        assert!(outcomes
            .iter()
            .all(|outcome| outcome.matched_identity.as_deref() == Some("joes-pizza.com")));

        // The raw domain was normalized before storage.
        let rows = store
            .list_for_user("u1", "joes-pizza.com", None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[tokio::test]
    async fn rejects_empty_keywords_and_bad_domains() {
        let provider = FixedRankProvider { position: 1 };
        let store = MemorySnapshotStore::new();

        let bad_keywords = request(" , ", vec![Device::Desktop]);
        assert!(track(&provider, &store, &bad_keywords, 100).await.is_err());

        let mut bad_domain = request("pizza", vec![Device::Desktop]);
        bad_domain.domain = "http://".to_string();
        assert!(track(&provider, &store, &bad_domain, 100).await.is_err());
    }

    #[tokio::test]
    async fn defaults_to_desktop_when_no_device_given() {
        let provider = FixedRankProvider { position: 1 };
        let store = MemorySnapshotStore::new();

        let outcomes = track(&provider, &store, &request("pizza", Vec::new()), 100)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].device, Device::Desktop);
    }
}
