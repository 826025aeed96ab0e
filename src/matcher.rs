//! Domain matching heuristics.
//!
//! Decides whether a provider result record represents the tracked domain.
//! Result records are noisy: organic entries always carry a link, while
//! local/map listings may expose a website directly, under a `links`
//! sub-object, or not at all (brand-name-only listings). Matching runs an
//! ordered fallback chain and the first strategy that applies decides.
//!
//! All comparisons are case-, scheme-, and `www.`-insensitive. Input that
//! cannot be parsed as a URL normalizes to `None` and simply never matches;
//! it is not an error.

use url::Url;

/// TLD suffixes stripped when reducing a domain to its brand base.
const TLD_SUFFIXES: &[&str] = &[".es", ".com", ".net", ".org", ".eu", ".io", ".co"];

/// Normalize a URL or bare host down to a comparable domain: host only,
/// lowercase, no scheme, no leading `www.`.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let full = if raw.starts_with("//") {
        format!("https:{}", raw)
    } else if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let parsed = Url::parse(&full).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Reduce a target domain to its alphanumeric "base" for brand-name
/// comparison: no `www.`, no known TLD suffix, lowercase alphanumerics only.
/// `joes-pizza.com` becomes `joespizza`.
pub fn domain_base(domain: &str) -> String {
    let stripped = domain.strip_prefix("www.").unwrap_or(domain);
    let stripped = TLD_SUFFIXES
        .iter()
        .find_map(|suffix| stripped.strip_suffix(suffix))
        .unwrap_or(stripped);
    alphanumeric(stripped)
}

fn alphanumeric(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Loose brand-name heuristic for listings that expose no website at all:
/// either alphanumeric form may contain the other as a substring, so
/// "Joe's Pizza NYC" matches `joes-pizza.com`.
pub fn title_matches_domain(title: &str, domain: &str) -> bool {
    let base = domain_base(domain);
    let cleaned = alphanumeric(title);
    if base.is_empty() || cleaned.is_empty() {
        return false;
    }
    cleaned.contains(&base) || base.contains(&cleaned)
}

/// Match an organic result's link against the target domain.
///
/// Organic results always carry a link, so equality on the normalized host
/// is the only strategy; the title fallback is local-listing-specific.
pub fn match_organic(link: &str, target: &str) -> Option<String> {
    normalize_domain(link).filter(|domain| domain == target)
}

/// Run the fallback chain for a local/map listing.
///
/// 1. A `website` field, normalized, compared for equality.
/// 2. Otherwise a nested `links.website` field, same comparison.
/// 3. Otherwise, when only a display title is present, the brand-name
///    substring heuristic.
///
/// Returns the identity that matched: the listing's own domain, or the
/// target itself when only the title heuristic applied. A listing whose
/// website normalizes to a *different* domain never falls through to the
/// title heuristic.
pub fn match_local(
    website: Option<&str>,
    links_website: Option<&str>,
    title: Option<&str>,
    target: &str,
) -> Option<String> {
    let listed = if let Some(website) = website {
        normalize_domain(website)
    } else if let Some(links_website) = links_website {
        normalize_domain(links_website)
    } else {
        None
    };

    match listed {
        Some(domain) if domain == target => Some(domain),
        Some(_) => None,
        None => title
            .filter(|t| title_matches_domain(t, target))
            .map(|_| target.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_scheme_www_and_case() {
        assert_eq!(
            normalize_domain("https://www.Example.com/path?q=1"),
            Some("example.com".to_string())
        );
        assert_eq!(
            normalize_domain("example.com"),
            Some("example.com".to_string())
        );
        assert_eq!(
            normalize_domain("//cdn.example.com/asset.js"),
            Some("cdn.example.com".to_string())
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["https://www.Example.com/a", "example.com", "WWW.Foo.IO"] {
            let once = normalize_domain(raw).unwrap();
            assert_eq!(normalize_domain(&once), Some(once.clone()));
        }
    }

    #[test]
    fn normalize_rejects_garbage_without_panicking() {
        assert_eq!(normalize_domain(""), None);
        assert_eq!(normalize_domain("   "), None);
        assert_eq!(normalize_domain("http://"), None);
        assert_eq!(normalize_domain("https://exa mple.com"), None);
    }

    #[test]
    fn organic_match_is_www_and_scheme_insensitive() {
        assert_eq!(
            match_organic("https://www.example.com", "example.com"),
            Some("example.com".to_string())
        );
        // Target domains are pre-normalized, so a raw "www." target never
        // occurs in practice, but a bare host on the candidate side must work.
        assert_eq!(
            match_organic("example.com", "example.com"),
            Some("example.com".to_string())
        );
        assert_eq!(match_organic("https://other.com", "example.com"), None);
    }

    #[test]
    fn domain_base_strips_tld_and_punctuation() {
        assert_eq!(domain_base("joes-pizza.com"), "joespizza");
        assert_eq!(domain_base("www.cafe-central.es"), "cafecentral");
        // Unknown TLDs keep their suffix letters.
        assert_eq!(domain_base("shop.example.dev"), "shopexampledev");
    }

    #[test]
    fn title_heuristic_matches_brand_names() {
        assert!(title_matches_domain("Joe's Pizza NYC", "joes-pizza.com"));
        assert!(title_matches_domain("JOES PIZZA", "joes-pizza.com"));
        assert!(!title_matches_domain("Maria's Bakery", "joes-pizza.com"));
        assert!(!title_matches_domain("---", "joes-pizza.com"));
    }

    #[test]
    fn local_chain_prefers_website_over_title() {
        // Website present and matching: identity is the listed domain.
        assert_eq!(
            match_local(
                Some("https://www.joes-pizza.com"),
                None,
                Some("Totally Different"),
                "joes-pizza.com"
            ),
            Some("joes-pizza.com".to_string())
        );
        // Website present but different: no title fallback.
        assert_eq!(
            match_local(
                Some("https://other.com"),
                None,
                Some("Joe's Pizza"),
                "joes-pizza.com"
            ),
            None
        );
        // Nested links.website is consulted when website is absent.
        assert_eq!(
            match_local(
                None,
                Some("joes-pizza.com/menu"),
                None,
                "joes-pizza.com"
            ),
            Some("joes-pizza.com".to_string())
        );
        // No URL at all: title heuristic reports the target as identity.
        assert_eq!(
            match_local(None, None, Some("Joe's Pizza NYC"), "joes-pizza.com"),
            Some("joes-pizza.com".to_string())
        );
        assert_eq!(match_local(None, None, None, "joes-pizza.com"), None);
    }
}
