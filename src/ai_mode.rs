//! AI-answer extraction.
//!
//! Google's AI mode returns a recursive tree of text blocks instead of a
//! ranked result list, so a domain's "position" is its order of first
//! mention across the answer. Linked sources in a block are collected
//! before domain-looking tokens spelled out in its snippet text, walking
//! the tree depth-first. When the domain is never cited, a substring hit
//! on the business name counts as a first-position mention.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::info;

use crate::matcher;
use crate::models::{Device, RankQuery, SearchEngine};
use crate::provider::{PageRequest, ResultPage, SearchProvider, TextBlock};
use crate::store::{Observation, SnapshotStore};

/// `example.co.uk`-style token: dot-separated labels ending in a TLD.
fn domain_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,}$")
            .expect("domain token regex")
    })
}

/// Collect every snippet in reading order (depth-first through nested lists).
pub fn collect_snippets(blocks: &[TextBlock]) -> Vec<String> {
    fn walk(block: &TextBlock, snippets: &mut Vec<String>) {
        if let Some(snippet) = &block.snippet {
            snippets.push(snippet.clone());
        }
        for child in &block.list {
            walk(child, snippets);
        }
    }

    let mut snippets = Vec::new();
    for block in blocks {
        walk(block, &mut snippets);
    }
    snippets
}

/// Domains mentioned in the answer, deduplicated, in reading order.
pub fn domains_in_order(blocks: &[TextBlock]) -> Vec<String> {
    fn push_unique(domains: &mut Vec<String>, domain: String) {
        if !domain.is_empty() && !domains.contains(&domain) {
            domains.push(domain);
        }
    }

    fn walk(block: &TextBlock, domains: &mut Vec<String>) {
        for snippet_link in &block.snippet_links {
            let Some(link) = snippet_link.link.as_deref().map(str::trim) else {
                continue;
            };
            if !link.starts_with("http") {
                continue;
            }
            let host = link
                .strip_prefix("https://")
                .or_else(|| link.strip_prefix("http://"))
                .unwrap_or(link)
                .split('/')
                .next()
                .unwrap_or("")
                .to_ascii_lowercase();
            push_unique(domains, host.strip_prefix("www.").unwrap_or(&host).to_string());
        }

        if let Some(snippet) = &block.snippet {
            let tokens = snippet.split(|c: char| {
                c.is_whitespace() || matches!(c, '`' | '"' | '\'' | '(' | ')' | '[' | ']')
            });
            for token in tokens {
                if token.is_empty() || !domain_token_re().is_match(token) {
                    continue;
                }
                let token = token.to_ascii_lowercase();
                push_unique(
                    domains,
                    token.strip_prefix("www.").unwrap_or(&token).to_string(),
                );
            }
        }

        for child in &block.list {
            walk(child, domains);
        }
    }

    let mut domains = Vec::new();
    for block in blocks {
        walk(block, &mut domains);
    }
    domains
}

/// Whether the business name appears anywhere in the concatenated answer text.
pub fn business_mentioned(blocks: &[TextBlock], normalized_business: &str) -> bool {
    if normalized_business.is_empty() {
        return false;
    }
    collect_snippets(blocks)
        .join(" ")
        .to_lowercase()
        .contains(normalized_business)
}

/// Where a business surfaced inside one AI answer.
#[derive(Debug, Clone, Serialize)]
pub struct AiPlacement {
    /// 1-based order of the domain's first mention, if cited.
    pub domain_position: Option<i64>,
    /// 1 when the business name appears in the answer text.
    pub business_position: Option<i64>,
}

impl AiPlacement {
    /// The position worth recording: an explicit domain citation beats the
    /// business-name fallback.
    pub fn final_position(&self) -> Option<i64> {
        self.domain_position.or(self.business_position)
    }
}

/// Locate a domain/business pair inside an answer tree.
pub fn locate(blocks: &[TextBlock], domain: &str, business: &str) -> AiPlacement {
    let domains = domains_in_order(blocks);
    let domain_position = domains
        .iter()
        .position(|candidate| candidate == domain)
        .map(|index| index as i64 + 1);
    let business_position = business_mentioned(blocks, business).then_some(1);
    AiPlacement {
        domain_position,
        business_position,
    }
}

/// An AI-mode check request.
#[derive(Debug, Clone)]
pub struct AiCheckRequest {
    pub user_id: String,
    pub keyword: String,
    pub business: String,
    pub domain: String,
}

/// Outcome of an AI-mode check.
#[derive(Debug, Clone, Serialize)]
pub struct AiOutcome {
    pub keyword: String,
    pub domain: String,
    pub business: String,
    pub placement: AiPlacement,
    /// Whether a snapshot was recorded (only mentions are persisted).
    pub recorded: bool,
}

/// Fetch one AI answer and record where the business surfaced in it.
pub async fn check(
    provider: &dyn SearchProvider,
    store: &dyn SnapshotStore,
    request: &AiCheckRequest,
) -> Result<AiOutcome> {
    let keyword = request.keyword.trim();
    if keyword.is_empty() {
        bail!("keyword must not be empty");
    }
    let business = request.business.trim().to_lowercase();
    if business.is_empty() {
        bail!("business name must not be empty");
    }
    let Some(domain) = matcher::normalize_domain(&request.domain) else {
        bail!("invalid domain: {}", request.domain);
    };

    let page = provider
        .fetch_page(&PageRequest::ai(keyword))
        .await
        .context("error fetching AI results")?;
    let ResultPage::Ai(blocks) = page else {
        bail!("provider returned a non-AI page for an AI query");
    };

    let placement = locate(&blocks, &domain, &business);

    let recorded = if let Some(position) = placement.final_position() {
        let query = RankQuery::new(
            &request.user_id,
            keyword,
            &domain,
            Device::Mobile,
            SearchEngine::GoogleAiMode,
            None,
        );
        let observation = Observation {
            rank: position,
            matched_identity: domain.clone(),
            rating: None,
            reviews: None,
            observed_at: Utc::now(),
        };
        store.record(&query, &observation).await?;
        info!(keyword, %domain, position, "AI mention recorded");
        true
    } else {
        false
    };

    Ok(AiOutcome {
        keyword: keyword.to_string(),
        domain,
        business,
        placement,
        recorded,
    })
}
