//! Search-results provider client.
//!
//! Issues one page request per call against a SerpApi-compatible endpoint
//! and maps the response into a typed page per engine. Pagination, match
//! scanning, and retry policy all belong to the caller — this layer only
//! shapes the wire contract and classifies failures.
//!
//! # Failure classification
//!
//! - A response body whose `error` string mentions the location is an
//!   [`ProviderError::InvalidLocation`]: the location text was rejected,
//!   so the caller stops paginating that query instead of failing a batch.
//! - A request exceeding the configured timeout is [`ProviderError::Timeout`],
//!   which the resolver treats like an empty page.
//! - Everything else surfaces as [`ProviderError::Status`] or
//!   [`ProviderError::Transport`] and aborts the current query only.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::models::{RankQuery, SearchEngine};

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rejected the location string for this query.
    #[error("provider rejected location: {0}")]
    InvalidLocation(String),
    /// The page request exceeded the configured timeout.
    #[error("provider request timed out")]
    Timeout,
    /// The provider answered with a non-success status or an in-body error.
    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },
    /// Network-level failure before any usable response.
    #[error("provider transport failure: {0}")]
    Transport(#[source] reqwest::Error),
}

/// One entry of `organic_results`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganicResult {
    pub link: Option<String>,
    pub position: Option<i64>,
}

/// One entry of `local_results` (or `ads_results` when the provider
/// substitutes ads for an empty local pack).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalResult {
    pub position: Option<i64>,
    pub website: Option<String>,
    pub links: Option<LocalLinks>,
    pub title: Option<String>,
    pub rating: Option<f64>,
    pub reviews: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalLinks {
    pub website: Option<String>,
}

/// One node of the AI-mode answer tree. Blocks nest arbitrarily through
/// `list`, and sources are attached as `snippet_links`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextBlock {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub snippet: Option<String>,
    #[serde(default)]
    pub list: Vec<TextBlock>,
    #[serde(default)]
    pub snippet_links: Vec<SnippetLink>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnippetLink {
    pub link: Option<String>,
}

/// One page worth of results, shaped per engine.
///
/// Each engine carries only its own candidate shape instead of one loose
/// bag of optional fields.
#[derive(Debug, Clone)]
pub enum ResultPage {
    Organic(Vec<OrganicResult>),
    Local(Vec<LocalResult>),
    Ai(Vec<TextBlock>),
}

impl ResultPage {
    pub fn is_empty(&self) -> bool {
        match self {
            ResultPage::Organic(results) => results.is_empty(),
            ResultPage::Local(results) => results.is_empty(),
            ResultPage::Ai(blocks) => blocks.is_empty(),
        }
    }
}

/// Superset of the provider response; collapsed into a [`ResultPage`]
/// according to the engine that was queried.
#[derive(Debug, Default, Deserialize)]
struct RawResponse {
    organic_results: Option<Vec<OrganicResult>>,
    local_results: Option<Vec<LocalResult>>,
    ads_results: Option<Vec<LocalResult>>,
    text_blocks: Option<Vec<TextBlock>>,
    search_metadata: Option<SearchMetadata>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchMetadata {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// A single page request as issued to the provider.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Keyword text, already suffixed with the location when one is set.
    pub keyword: String,
    pub engine: SearchEngine,
    pub location: Option<String>,
    pub device: &'static str,
    pub num: u32,
    pub start: u32,
}

impl PageRequest {
    /// Page request for one offset of a rank query. The local pseudo-device
    /// switches engine, page size, and device parameter.
    pub fn for_query(query: &RankQuery, start: u32) -> Self {
        let engine = if query.device.is_local() {
            SearchEngine::GoogleLocal
        } else {
            query.engine
        };
        Self {
            keyword: query.effective_keyword(),
            engine,
            location: query.location.clone(),
            device: query.device.provider_param(),
            num: query.device.page_size(),
            start,
        }
    }

    /// Request for a single AI-mode answer. AI mode has no pagination.
    pub fn ai(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            engine: SearchEngine::GoogleAiMode,
            location: None,
            device: "mobile",
            num: 0,
            start: 0,
        }
    }
}

/// Seam between the resolution pipeline and the outside world. The real
/// client talks HTTP; tests substitute scripted pages.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<ResultPage, ProviderError>;
}

/// HTTP client for the SerpApi wire contract.
pub struct SerpClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    google_domain: String,
    hl: String,
    gl: Option<String>,
}

impl SerpClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Fails when no API key can be resolved — a configuration error that
    /// callers surface before processing any query.
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let api_key = config.resolve_api_key()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
            google_domain: config.google_domain.clone(),
            hl: config.hl.clone(),
            gl: config.gl.clone(),
        })
    }
}

#[async_trait]
impl SearchProvider for SerpClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<ResultPage, ProviderError> {
        let mut params: Vec<(&str, String)> = vec![
            ("api_key", self.api_key.clone()),
            ("q", request.keyword.clone()),
            ("engine", request.engine.as_str().to_string()),
        ];
        // AI mode takes a bare query; only the paged engines get the
        // locale, pagination, and device parameters.
        if request.engine != SearchEngine::GoogleAiMode {
            params.push(("google_domain", self.google_domain.clone()));
            params.push(("hl", self.hl.clone()));
            if let Some(gl) = &self.gl {
                params.push(("gl", gl.clone()));
            }
            params.push(("num", request.num.to_string()));
            params.push(("start", request.start.to_string()));
            params.push(("device", request.device.to_string()));
            if let Some(location) = &request.location {
                params.push(("location", location.clone()));
            }
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_body(status.as_u16(), &body));
        }

        let raw: RawResponse = response.json().await.map_err(classify_transport)?;

        // Some provider failures come back as 200 with an error field.
        if let Some(message) = raw.error {
            return Err(classify_message(200, message));
        }

        collapse(request.engine, raw)
    }
}

fn classify_transport(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(error)
    }
}

fn classify_body(status: u16, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .unwrap_or_else(|| body.trim().to_string());
    classify_message(status, message)
}

fn classify_message(status: u16, message: String) -> ProviderError {
    if message.to_ascii_lowercase().contains("location") {
        ProviderError::InvalidLocation(message)
    } else {
        ProviderError::Status { status, message }
    }
}

fn collapse(engine: SearchEngine, raw: RawResponse) -> Result<ResultPage, ProviderError> {
    match engine {
        SearchEngine::GoogleAiMode => {
            let completed = raw
                .search_metadata
                .and_then(|metadata| metadata.status)
                .is_some_and(|status| status == "Success");
            if !completed {
                return Err(ProviderError::Status {
                    status: 200,
                    message: "AI search did not complete".to_string(),
                });
            }
            Ok(ResultPage::Ai(raw.text_blocks.unwrap_or_default()))
        }
        SearchEngine::GoogleLocal | SearchEngine::GoogleMaps => Ok(ResultPage::Local(
            raw.local_results.or(raw.ads_results).unwrap_or_default(),
        )),
        SearchEngine::Google => Ok(ResultPage::Organic(raw.organic_results.unwrap_or_default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Device;

    #[test]
    fn local_request_forces_engine_and_mobile() {
        let query = RankQuery::new(
            "u1",
            "pizza",
            "joes-pizza.com",
            Device::GoogleLocal,
            SearchEngine::Google,
            Some("New York".to_string()),
        );
        let request = PageRequest::for_query(&query, 40);
        assert_eq!(request.engine, SearchEngine::GoogleLocal);
        assert_eq!(request.device, "mobile");
        assert_eq!(request.num, 20);
        assert_eq!(request.start, 40);
        assert_eq!(request.keyword, "pizza New York");
    }

    #[test]
    fn organic_request_keeps_engine_and_device() {
        let query = RankQuery::new(
            "u1",
            "pizza",
            "joes-pizza.com",
            Device::Desktop,
            SearchEngine::Google,
            None,
        );
        let request = PageRequest::for_query(&query, 10);
        assert_eq!(request.engine, SearchEngine::Google);
        assert_eq!(request.device, "desktop");
        assert_eq!(request.num, 10);
    }

    #[test]
    fn location_errors_are_distinguished() {
        let error = classify_body(400, r#"{"error":"Unsupported `location` parameter."}"#);
        assert!(matches!(error, ProviderError::InvalidLocation(_)));

        let error = classify_body(500, r#"{"error":"Internal failure"}"#);
        assert!(matches!(
            error,
            ProviderError::Status { status: 500, .. }
        ));

        // Unparseable body falls back to the raw text.
        let error = classify_body(502, "bad gateway");
        match error {
            ProviderError::Status { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn collapse_prefers_local_results_over_ads() {
        let raw = RawResponse {
            local_results: Some(vec![LocalResult {
                title: Some("Joe's".to_string()),
                ..LocalResult::default()
            }]),
            ads_results: Some(vec![LocalResult::default(), LocalResult::default()]),
            ..RawResponse::default()
        };
        match collapse(SearchEngine::GoogleLocal, raw).unwrap() {
            ResultPage::Local(results) => assert_eq!(results.len(), 1),
            other => panic!("unexpected page: {other:?}"),
        }
    }

    #[test]
    fn collapse_rejects_incomplete_ai_answers() {
        let raw: RawResponse =
            serde_json::from_str(r#"{"search_metadata":{"status":"Error"},"text_blocks":[]}"#)
                .unwrap();
        assert!(collapse(SearchEngine::GoogleAiMode, raw).is_err());
    }
}
