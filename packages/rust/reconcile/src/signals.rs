//! Quality signals for one candidate.
//!
//! Every signal is a pure function of its inputs and lies in `[0, 1]`.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use url::Url;

use markdownizer_shared::{Candidate, is_tracking_param};

/// Only this much visible text is scanned for a date.
const FRESHNESS_SCAN_CHARS: usize = 2000;

/// Derived metrics for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Signals {
    pub normalized_length: f64,
    pub density: f64,
    pub overlap: f64,
    pub structure_richness: f64,
    pub freshness: f64,
    pub link_quality: f64,
}

/// Inputs to signal computation that are not part of the candidate.
#[derive(Debug, Clone, Copy)]
pub struct SignalContext {
    /// Text length (chars) at which `normalized_length` saturates.
    pub length_saturation: f64,
    /// Dates within this many days before `now` count as recent.
    pub recency_days: i64,
    pub now: DateTime<Utc>,
}

/// Compute all signals for `candidate`, using `reference_text` for overlap.
pub fn compute_signals(candidate: &Candidate, reference_text: &str, ctx: &SignalContext) -> Signals {
    let doc = Html::parse_fragment(candidate.html_body());
    let text = candidate.plain_text();
    let text_len = candidate.text_len();

    Signals {
        normalized_length: normalized_length(text_len, ctx.length_saturation),
        density: density(text, candidate.html_body()),
        overlap: overlap(text, reference_text),
        structure_richness: structure_richness(&doc, text_len),
        freshness: freshness(&doc, text, ctx),
        link_quality: link_quality(&doc),
    }
}

// ---------------------------------------------------------------------------
// Length and density
// ---------------------------------------------------------------------------

/// `min(1, len / saturation)`.
pub fn normalized_length(text_len: usize, saturation: f64) -> f64 {
    if saturation <= 0.0 {
        return 1.0;
    }
    (text_len as f64 / saturation).min(1.0)
}

/// Text length over markup length, clamped to `[0, 1]`.
pub fn density(text: &str, html: &str) -> f64 {
    let html_len = html.chars().count();
    if html_len == 0 {
        return 0.0;
    }
    (text.chars().count() as f64 / html_len as f64).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Overlap
// ---------------------------------------------------------------------------

/// Jaccard similarity of word trigrams. Falls back to single words when either
/// side is shorter than three words. Zero when either side is empty.
pub fn overlap(a: &str, b: &str) -> f64 {
    let words_a = words(a);
    let words_b = words(b);
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let n = if words_a.len() < 3 || words_b.len() < 3 {
        1
    } else {
        3
    };
    jaccard(&shingles(&words_a, n), &shingles(&words_b, n))
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn shingles(words: &[String], n: usize) -> HashSet<String> {
    words.windows(n).map(|w| w.join(" ")).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

/// Weighted heading/list-item/table count per 1000 chars of text, scaled and capped.
pub fn structure_richness(doc: &Html, text_len: usize) -> f64 {
    let headings = count(doc, "h1, h2, h3, h4, h5, h6");
    let items = count(doc, "li");
    let tables = count(doc, "table");

    let weighted = (2 * headings + items + 3 * tables) as f64;
    let units = (text_len as f64 / 1000.0).max(1.0);
    (weighted / units / 10.0).min(1.0)
}

fn count(doc: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|sel| doc.select(&sel).count())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Freshness
// ---------------------------------------------------------------------------

/// 1 if a recent date is found in metadata, `<time datetime>`, or the start of the text.
pub fn freshness(doc: &Html, text: &str, ctx: &SignalContext) -> f64 {
    let recent = |d: NaiveDate| is_recent(d, ctx);

    let meta_sel = Selector::parse(
        "meta[property='article:published_time'], meta[property='article:modified_time'], \
         meta[property='og:updated_time'], meta[name='date'], meta[name='pubdate'], \
         meta[name='last-modified'], meta[itemprop='datePublished'], meta[itemprop='dateModified']",
    )
    .expect("valid selector");
    let time_sel = Selector::parse("time[datetime]").expect("valid selector");

    let from_markup = doc
        .select(&meta_sel)
        .filter_map(|el| el.value().attr("content"))
        .chain(
            doc.select(&time_sel)
                .filter_map(|el| el.value().attr("datetime")),
        )
        .flat_map(parse_dates)
        .any(recent);

    let head: String = text.chars().take(FRESHNESS_SCAN_CHARS).collect();
    if from_markup || parse_dates(&head).into_iter().any(recent) {
        1.0
    } else {
        0.0
    }
}

/// Inside the window ending at `now` (one day of clock skew allowed into the future).
fn is_recent(date: NaiveDate, ctx: &SignalContext) -> bool {
    let today = ctx.now.date_naive();
    date >= today - Duration::days(ctx.recency_days) && date <= today + Duration::days(1)
}

/// Every date that can be read out of `value`.
pub fn parse_dates(value: &str) -> Vec<NaiveDate> {
    static ISO_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})").expect("valid regex"));
    static US_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("valid regex"));
    static MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
        )
        .expect("valid regex")
    });

    let mut dates = Vec::new();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value.trim()) {
        dates.push(dt.date_naive());
    }
    for caps in ISO_RE.captures_iter(value) {
        dates.extend(ymd(&caps[1], &caps[2], &caps[3]));
    }
    for caps in US_RE.captures_iter(value) {
        dates.extend(ymd(&caps[3], &caps[1], &caps[2]));
    }
    for caps in MONTH_RE.captures_iter(value) {
        let month = month_number(&caps[1].to_ascii_lowercase());
        if let Some(month) = month {
            dates.extend(ymd(&caps[3], &month.to_string(), &caps[2]));
        }
    }

    dates
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn month_number(abbrev: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    MONTHS
        .iter()
        .position(|m| *m == abbrev)
        .map(|i| i as u32 + 1)
}

// ---------------------------------------------------------------------------
// Link quality
// ---------------------------------------------------------------------------

/// Share of links that are not tracking or boilerplate. 1 when there are no links.
pub fn link_quality(doc: &Html) -> f64 {
    let link_sel = Selector::parse("a[href]").expect("valid selector");
    let links: Vec<(String, String)> = doc
        .select(&link_sel)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim().to_string();
            let text = a.text().collect::<String>().trim().to_lowercase();
            Some((href, text))
        })
        .collect();

    if links.is_empty() {
        return 1.0;
    }
    let meaningful = links
        .iter()
        .filter(|(href, text)| !is_boilerplate_link(href, text))
        .count();
    meaningful as f64 / links.len() as f64
}

/// Link targets and labels that carry no content for the reader.
pub fn is_boilerplate_link(href: &str, text: &str) -> bool {
    const BOILERPLATE_TARGETS: &[&str] = &[
        "/share",
        "sharer",
        "/intent/tweet",
        "/login",
        "/signin",
        "/sign-in",
        "/signup",
        "/register",
        "/subscribe",
        "/newsletter",
        "/cart",
        "doubleclick.net",
        "googleadservices",
        "/ads/",
        "/privacy",
        "/cookie",
        "/terms",
    ];
    const BOILERPLATE_LABELS: &[&str] = &[
        "share",
        "tweet",
        "click here",
        "subscribe",
        "sign in",
        "log in",
        "sign up",
        "advertisement",
    ];

    if href.is_empty() || href == "#" || href.to_ascii_lowercase().starts_with("javascript:") {
        return true;
    }
    if BOILERPLATE_LABELS.contains(&text) {
        return true;
    }
    let lower = href.to_ascii_lowercase();
    if BOILERPLATE_TARGETS.iter().any(|p| lower.contains(p)) {
        return true;
    }
    Url::parse(href)
        .map(|u| u.query_pairs().any(|(k, _)| is_tracking_param(&k)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use markdownizer_shared::{CandidateSource, ExtractionMethod};

    fn ctx() -> SignalContext {
        SignalContext {
            length_saturation: 2000.0,
            recency_days: 730,
            now: Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap(),
        }
    }

    fn doc(html: &str) -> Html {
        Html::parse_fragment(html)
    }

    #[test]
    fn length_saturates() {
        assert_eq!(normalized_length(1000, 2000.0), 0.5);
        assert_eq!(normalized_length(12_000, 2000.0), 1.0);
        assert_eq!(normalized_length(0, 2000.0), 0.0);
    }

    #[test]
    fn density_is_clamped() {
        assert_eq!(density("abcd", "<p>abcd</p>"), 4.0 / 11.0);
        assert_eq!(density("abc", ""), 0.0);
        assert_eq!(density("longer text", "short"), 1.0);
    }

    #[test]
    fn overlap_identical_and_disjoint() {
        let text = "the quick brown fox jumps over the lazy dog";
        assert_eq!(overlap(text, text), 1.0);
        assert_eq!(overlap(text, "completely unrelated words appear here"), 0.0);
        assert_eq!(overlap(text, ""), 0.0);
        assert_eq!(overlap("", ""), 0.0);
    }

    #[test]
    fn overlap_is_symmetric_and_partial() {
        let a = "one two three four five six";
        let b = "one two three four seven eight";
        let ab = overlap(a, b);
        assert_eq!(ab, overlap(b, a));
        assert!(ab > 0.0 && ab < 1.0);
    }

    #[test]
    fn overlap_short_texts_use_words() {
        assert_eq!(overlap("Hello world", "hello there"), 1.0 / 3.0);
    }

    #[test]
    fn structure_counts_weighted_elements() {
        let d = doc("<h2>A</h2><ul><li>x</li><li>y</li></ul><table></table>");
        // (2*1 + 2 + 3) / 1 unit / 10
        assert!((structure_richness(&d, 500) - 0.7).abs() < 1e-9);
        assert_eq!(structure_richness(&doc("<p>plain</p>"), 500), 0.0);
        let many = "<h2>x</h2>".repeat(40);
        assert_eq!(structure_richness(&doc(&many), 100), 1.0);
    }

    #[test]
    fn freshness_from_meta_and_time() {
        let c = ctx();
        let d = doc(r#"<meta property="article:published_time" content="2026-09-01T08:00:00Z"><p>x</p>"#);
        assert_eq!(freshness(&d, "x", &c), 1.0);
        let d = doc(r#"<time datetime="2025-12-24">Christmas Eve</time>"#);
        assert_eq!(freshness(&d, "Christmas Eve", &c), 1.0);
    }

    #[test]
    fn freshness_from_visible_text() {
        let c = ctx();
        let d = doc("<p>x</p>");
        assert_eq!(freshness(&d, "Published Oct 3, 2026 by staff", &c), 1.0);
        assert_eq!(freshness(&d, "Updated 7/4/2026", &c), 1.0);
    }

    #[test]
    fn stale_or_future_dates_do_not_count() {
        let c = ctx();
        let d = doc("<p>x</p>");
        assert_eq!(freshness(&d, "Posted 2019-01-01", &c), 0.0);
        assert_eq!(freshness(&d, "Scheduled for 2027-06-01", &c), 0.0);
        assert_eq!(freshness(&d, "no dates here", &c), 0.0);
    }

    #[test]
    fn unparseable_dates_are_ignored() {
        assert!(parse_dates("2026-13-45").is_empty());
        assert!(parse_dates("Foo 99, 2026").is_empty());
    }

    #[test]
    fn link_quality_counts_boilerplate() {
        let d = doc(
            r#"<a href="https://example.com/guide">Guide</a>
               <a href="https://example.com/a?utm_source=x">Tracked</a>
               <a href="https://twitter.com/intent/tweet?u=1">Tweet this</a>
               <a href="/docs/api">API</a>"#,
        );
        assert_eq!(link_quality(&d), 0.5);
    }

    #[test]
    fn no_links_is_not_penalized() {
        assert_eq!(link_quality(&doc("<p>text</p>")), 1.0);
    }

    #[test]
    fn all_signals_in_unit_range() {
        let candidate = Candidate::new(
            CandidateSource::ServerFetched,
            "T",
            "<h1>T</h1><p>Some body text with a <a href='#'>link</a>.</p>",
            "T Some body text with a link.",
            ExtractionMethod::ServerGeneric,
        );
        let s = compute_signals(&candidate, "Some body text", &ctx());
        for v in [
            s.normalized_length,
            s.density,
            s.overlap,
            s.structure_richness,
            s.freshness,
            s.link_quality,
        ] {
            assert!((0.0..=1.0).contains(&v), "{v} out of range");
        }
        assert_eq!(s.link_quality, 0.0);
    }
}
