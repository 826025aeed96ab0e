//! Core data models used throughout ranktrack.
//!
//! These types represent the tracked queries, provider result records, and
//! persisted snapshots that flow through the resolution pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device a ranking is tracked for.
///
/// `GoogleLocal` is a pseudo-device: it selects the local/map engine with
/// 20-results-per-page pagination and forces the provider's device
/// parameter to mobile, since the local engine only serves mobile layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Desktop,
    Mobile,
    GoogleLocal,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Desktop => "desktop",
            Device::Mobile => "mobile",
            Device::GoogleLocal => "google_local",
        }
    }

    /// The `device` parameter sent to the provider.
    pub fn provider_param(&self) -> &'static str {
        match self {
            Device::Desktop => "desktop",
            Device::Mobile | Device::GoogleLocal => "mobile",
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Device::GoogleLocal)
    }

    /// Results per provider page: 20 for local listings, 10 for organic.
    pub fn page_size(&self) -> u32 {
        if self.is_local() {
            20
        } else {
            10
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "desktop" => Ok(Device::Desktop),
            "mobile" => Ok(Device::Mobile),
            "google_local" => Ok(Device::GoogleLocal),
            other => Err(format!(
                "unknown device '{}' (expected desktop, mobile, or google_local)",
                other
            )),
        }
    }
}

/// Provider engine a query is issued against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchEngine {
    Google,
    GoogleLocal,
    GoogleAiMode,
    GoogleMaps,
}

impl SearchEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEngine::Google => "google",
            SearchEngine::GoogleLocal => "google_local",
            SearchEngine::GoogleAiMode => "google_ai_mode",
            SearchEngine::GoogleMaps => "google_maps",
        }
    }
}

impl fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(SearchEngine::Google),
            "google_local" => Ok(SearchEngine::GoogleLocal),
            "google_ai_mode" => Ok(SearchEngine::GoogleAiMode),
            "google_maps" => Ok(SearchEngine::GoogleMaps),
            other => Err(format!(
                "unknown engine '{}' (expected google, google_local, google_ai_mode, or google_maps)",
                other
            )),
        }
    }
}

/// Identity of one tracked ranking.
///
/// The (user, keyword, domain, device, location) tuple is the natural key
/// for snapshot lookup and deduplication. The engine is carried as a
/// display attribute and is not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RankQuery {
    pub user_id: String,
    pub keyword: String,
    /// Normalized target domain used as the matching key.
    pub domain: String,
    pub device: Device,
    pub engine: SearchEngine,
    /// `None` and the empty string both mean "no location".
    pub location: Option<String>,
}

impl RankQuery {
    pub fn new(
        user_id: &str,
        keyword: &str,
        domain: &str,
        device: Device,
        engine: SearchEngine,
        location: Option<String>,
    ) -> Self {
        let location = location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        Self {
            user_id: user_id.to_string(),
            keyword: keyword.trim().to_string(),
            domain: domain.to_string(),
            device,
            engine,
            location,
        }
    }

    /// Keyword as sent to the provider, with the location text appended.
    pub fn effective_keyword(&self) -> String {
        match &self.location {
            Some(location) => format!("{} {}", self.keyword, location),
            None => self.keyword.clone(),
        }
    }

    /// Location column value. The empty string stands in for "no location"
    /// so the unique index treats both spellings identically.
    pub fn location_key(&self) -> &str {
        self.location.as_deref().unwrap_or("")
    }
}

/// Outcome of resolving one query against the provider.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    /// 1-based position across pages; 0 means not found within the scanned depth.
    pub rank: i64,
    /// Domain the matching result actually displayed, when one matched.
    pub matched_identity: Option<String>,
    pub rating: Option<f64>,
    pub reviews: Option<i64>,
}

impl Resolution {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn is_found(&self) -> bool {
        self.rank > 0
    }
}

/// Rolling trend baselines stored with a snapshot.
///
/// Each window keeps the rank it last rolled from and when it rolled.
/// A `None` baseline renders as "no data".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendBaselines {
    pub rank_24h: Option<i64>,
    pub rank_7d: Option<i64>,
    pub rank_30d: Option<i64>,
    pub rolled_24h_at: Option<DateTime<Utc>>,
    pub rolled_7d_at: Option<DateTime<Utc>>,
    pub rolled_30d_at: Option<DateTime<Utc>>,
}

/// One persisted rank observation plus its rolling baselines.
///
/// Exactly one live snapshot exists per [`RankQuery`] identity; every new
/// resolution for the same identity upserts this record in place.
#[derive(Debug, Clone, Serialize)]
pub struct RankSnapshot {
    pub id: String,
    pub user_id: String,
    pub keyword: String,
    pub domain: String,
    pub device: Device,
    pub engine: SearchEngine,
    pub location: Option<String>,
    pub rank: i64,
    pub matched_identity: String,
    pub rating: Option<f64>,
    pub reviews: Option<i64>,
    #[serde(flatten)]
    pub baselines: TrendBaselines,
    /// When this identity was first recorded; anchors window seeding and
    /// never changes on upsert.
    pub first_seen_at: DateTime<Utc>,
    pub observed_at: DateTime<Utc>,
}

impl RankSnapshot {
    /// Rebuild the identity tuple this snapshot is keyed by.
    pub fn query(&self) -> RankQuery {
        RankQuery::new(
            &self.user_id,
            &self.keyword,
            &self.domain,
            self.device,
            self.engine,
            self.location.clone(),
        )
    }
}
