//! Rank resolution: pagination control flow over the provider.
//!
//! Pages come back rank-ordered, so the first candidate that matches is
//! the best possible match; pagination stops the moment one is found.
//! Scanning one query costs one paid provider call per page, which makes
//! the early exits here the cost-control point of the whole pipeline.

use tracing::{debug, warn};

use crate::matcher;
use crate::models::{RankQuery, Resolution};
use crate::provider::{PageRequest, ProviderError, ResultPage, SearchProvider};

/// Deepest absolute rank scanned before a query is reported not found.
/// 10 organic pages or 5 local pages.
pub const DEFAULT_MAX_DEPTH: u32 = 100;

/// Resolve one query to its best (first-found) rank.
///
/// Stops paginating on the first match, on an empty page (provider
/// exhausted), on a page timeout (treated as an empty page), or at
/// `max_depth`. A rejected location resolves to "not found" — it is a
/// per-query condition, not a batch failure. Only transport-level errors
/// surface to the caller.
pub async fn resolve<P: SearchProvider + ?Sized>(
    provider: &P,
    query: &RankQuery,
    max_depth: u32,
) -> Result<Resolution, ProviderError> {
    let page_size = query.device.page_size();
    let mut start = 0;

    while start < max_depth {
        let request = PageRequest::for_query(query, start);
        let page = match provider.fetch_page(&request).await {
            Ok(page) => page,
            Err(ProviderError::InvalidLocation(message)) => {
                warn!(
                    keyword = %query.keyword,
                    location = query.location.as_deref().unwrap_or(""),
                    %message,
                    "location rejected; reporting not found"
                );
                return Ok(Resolution::not_found());
            }
            Err(ProviderError::Timeout) => {
                warn!(keyword = %query.keyword, start, "page request timed out; stopping pagination");
                return Ok(Resolution::not_found());
            }
            Err(other) => return Err(other),
        };

        if page.is_empty() {
            debug!(keyword = %query.keyword, start, "provider exhausted");
            break;
        }

        if let Some(resolution) = scan_page(&page, query, start) {
            debug!(
                keyword = %query.keyword,
                rank = resolution.rank,
                "match found, stopping pagination"
            );
            return Ok(resolution);
        }

        start += page_size;
    }

    Ok(Resolution::not_found())
}

/// Scan one page in order; the first matching candidate wins.
fn scan_page(page: &ResultPage, query: &RankQuery, offset: u32) -> Option<Resolution> {
    match page {
        ResultPage::Organic(results) => {
            for (index, result) in results.iter().enumerate() {
                let Some(link) = result.link.as_deref() else {
                    continue;
                };
                if let Some(identity) = matcher::match_organic(link, &query.domain) {
                    // Absolute rank; the in-page index stands in when the
                    // provider omits the position field.
                    let position = result.position.unwrap_or(index as i64 + 1);
                    return Some(Resolution {
                        rank: offset as i64 + position,
                        matched_identity: Some(identity),
                        rating: None,
                        reviews: None,
                    });
                }
            }
            None
        }
        ResultPage::Local(results) => {
            for result in results {
                // Listings without a position cannot be ranked.
                let Some(position) = result.position else {
                    continue;
                };
                let links_website = result.links.as_ref().and_then(|l| l.website.as_deref());
                if let Some(identity) = matcher::match_local(
                    result.website.as_deref(),
                    links_website,
                    result.title.as_deref(),
                    &query.domain,
                ) {
                    return Some(Resolution {
                        rank: offset as i64 + position,
                        matched_identity: Some(identity),
                        rating: result.rating,
                        reviews: result.reviews,
                    });
                }
            }
            None
        }
        // AI answers have no ranked pages; they resolve through ai_mode.
        ResultPage::Ai(_) => None,
    }
}
