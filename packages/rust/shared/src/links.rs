//! URL hygiene: tracking-parameter stripping and secret redaction for logs.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Query parameters that only exist to track the reader.
pub const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "msclkid",
    "ref",
    "source",
];

/// `true` if `name` is a tracking query parameter.
pub fn is_tracking_param(name: &str) -> bool {
    TRACKING_PARAMS.contains(&name) || name.starts_with("utm_")
}

/// Remove tracking parameters from a URL.
///
/// Unparseable input is returned unchanged.
pub fn strip_tracking(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };

    if parsed.query().is_none() {
        return url.to_string();
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    parsed.to_string()
}

/// Redact credential-looking query values so a URL is safe to log.
pub fn redact_tokens(url: &str) -> String {
    static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\b((?:access_|api_)?token|api_key|key|secret|auth)=([^&#\s]+)")
            .expect("valid regex")
    });

    TOKEN_RE.replace_all(url, "$1=[REDACTED]").to_string()
}
