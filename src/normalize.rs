//! URL canonicalization.
//!
//! The normalized form is the deduplication key for the item store, so two
//! spellings of the same resource must normalize identically. Policy:
//! lowercase scheme and host, drop default ports, drop tracking query
//! parameters, sort the remaining query pairs, strip a single trailing slash,
//! drop the fragment.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("failed to parse URL '{url}': {source}")]
    Parse {
        url: String,
        source: url::ParseError,
    },
}

/// Query keys dropped during normalization, matched as lowercase prefixes.
/// "ref" intentionally also catches "referrer" and friends.
const TRACKING_PREFIXES: &[&str] = &["utm_", "fbclid", "gclid", "mc_", "ref", "igshid"];

/// True iff the URL parses, has an http/https scheme, and a non-empty host.
/// Anything else is rejected before it can reach the store.
pub fn is_valid(url: &str) -> bool {
    match Url::parse(url.trim()) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Canonicalize a URL. Pure and idempotent over parseable absolute URLs.
pub fn normalize(url: &str) -> Result<String, NormalizeError> {
    let trimmed = url.trim();
    let parsed = Url::parse(trimmed).map_err(|source| NormalizeError::Parse {
        url: trimmed.to_string(),
        source,
    })?;

    // The url crate already lowercases scheme and host at parse time.
    let scheme = parsed.scheme();
    let host = parsed.host_str().unwrap_or("");
    let port = parsed.port().filter(|p| *p != 80 && *p != 443);

    let mut query_pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| {
            let key = key.to_lowercase();
            !TRACKING_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    query_pairs.sort();

    let mut path = parsed.path();
    if path.ends_with('/') && path != "/" {
        path = &path[..path.len() - 1];
    }

    let mut out = format!("{scheme}://{host}");
    if let Some(port) = port {
        out.push_str(&format!(":{port}"));
    }
    out.push_str(path);
    if !query_pairs.is_empty() {
        let encoded: Vec<String> = query_pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        out.push('?');
        out.push_str(&encoded.join("&"));
    }
    Ok(out)
}
