//! Redirect classification.
//!
//! Decides whether the independent fetch landed on a materially different
//! resource than the page the user was looking at.

use serde::Serialize;
use url::Url;

use markdownizer_shared::is_tracking_param;

/// Outcome of comparing the requested URL with where the fetch ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectOutcome {
    pub is_redirect: bool,
    pub original_url: String,
    pub final_url: String,
}

/// Comparison key for one URL.
#[derive(Debug, PartialEq, Eq)]
struct UrlKey {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
    query: Vec<(String, String)>,
}

/// Compare two URLs after normalization.
///
/// Equal after normalization means "not a redirect". Normalization lower-cases
/// the scheme and host, treats `http` and `https` as the same, drops a `www.`
/// prefix, strips one trailing slash from the path, ignores the fragment,
/// drops tracking query parameters and sorts the rest. Input that does not
/// parse as a URL with a host always counts as a redirect.
pub fn classify(original_url: &str, final_url: &str) -> RedirectOutcome {
    let is_redirect = match (normalize(original_url), normalize(final_url)) {
        (Some(a), Some(b)) => a != b,
        _ => true,
    };
    RedirectOutcome {
        is_redirect,
        original_url: original_url.to_string(),
        final_url: final_url.to_string(),
    }
}

fn normalize(raw: &str) -> Option<UrlKey> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        return None;
    }

    let scheme = parsed.scheme().to_ascii_lowercase();
    let secure_family = matches!(scheme.as_str(), "http" | "https");

    let mut path = parsed.path().to_string();
    if path.ends_with('/') {
        path.pop();
    }

    let mut query: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    query.sort();

    Some(UrlKey {
        // http and https compare equal; other schemes must match exactly.
        scheme: if secure_family { String::new() } else { scheme },
        host,
        port: parsed.port(),
        path,
        query,
    })
}
