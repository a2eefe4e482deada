//! HTTP blocker probe.
//!
//! Detects, never bypasses. The page is fetched anonymously and the response
//! is classified by [`analyze_blocker_page`].

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

use markdownizer_reconcile::{BlockerProber, BlockerVerdict, ProbeReport};
use markdownizer_shared::{FetchConfig, MarkdownizerError, ProbeConfig, Result, redact_tokens};

use crate::client::{build_client, get};

const PAYWALL_MARKERS: &[&str] = &[
    "subscribe",
    "subscription",
    "premium",
    "member",
    "free trial",
    "unlock",
    "paywall",
];

const CAPTCHA_MARKERS: &[&str] = &["captcha", "recaptcha", "hcaptcha", "cf-challenge"];

const LOGIN_MARKERS: &[&str] = &[
    "sign in",
    "log in",
    "login",
    "password",
    "authenticate",
    "session expired",
];

/// Below this many visible characters an iframe is likely carrying the content.
const IFRAME_TEXT_CHARS: usize = 200;

/// Below this many visible characters the page is noted as thin.
const THIN_TEXT_CHARS: usize = 100;

/// Probes a URL over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpBlockerProber {
    client: Client,
}

impl HttpBlockerProber {
    pub fn new(fetch: &FetchConfig, probe: &ProbeConfig) -> Result<Self> {
        let client = build_client(fetch, Duration::from_secs(probe.timeout_secs))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BlockerProber for HttpBlockerProber {
    #[instrument(skip_all, fields(url = %redact_tokens(url)))]
    async fn probe(&self, url: &str, budget: Duration) -> Result<ProbeReport> {
        let raw = tokio::time::timeout(budget, get(&self.client, url))
            .await
            .map_err(|_| MarkdownizerError::Timeout {
                operation: "probe",
                secs: budget.as_secs(),
            })??;

        let report = analyze_blocker_page(raw.status, &raw.body);
        debug!(verdict = %report.verdict, status = raw.status, "probe response classified");
        Ok(report)
    }
}

/// Classify a probed response.
///
/// Verdict priority is login wall, then paywall, then CAPTCHA. Every finding is
/// recorded in the notes, including the ones that lost on priority.
pub fn analyze_blocker_page(status: u16, html: &str) -> ProbeReport {
    static LOGIN_FORM: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(r#"form[action*="login"], form[action*="signin"], input[type="password"]"#)
            .expect("valid selector")
    });
    static OVERLAY: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(r#"[class*="overlay"], [class*="modal"], [class*="paywall"]"#)
            .expect("valid selector")
    });
    static IFRAME: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("iframe").expect("valid selector"));

    let doc = Html::parse_document(html);
    let markup = html.to_lowercase();
    let text = body_text(&doc);
    let lowered_text = text.to_lowercase();
    let text_len = text.chars().count();
    let mut notes = Vec::new();

    let mut login = false;
    if matches!(status, 401 | 403) {
        login = true;
        notes.push(format!("HTTP {status}"));
    } else if LOGIN_MARKERS.iter().any(|m| markup.contains(m))
        && doc.select(&LOGIN_FORM).next().is_some()
    {
        login = true;
        notes.push("login form present".into());
    }

    let overlay_text = doc
        .select(&OVERLAY)
        .flat_map(|el| el.text())
        .collect::<String>()
        .to_lowercase();
    let paywall = PAYWALL_MARKERS
        .iter()
        .find(|m| overlay_text.contains(*m) || lowered_text.contains(*m))
        .copied();
    if let Some(marker) = paywall {
        notes.push(format!("paywall keyword {marker:?}"));
    }

    let captcha = CAPTCHA_MARKERS.iter().find(|m| markup.contains(*m)).copied();
    if let Some(marker) = captcha {
        notes.push(format!("captcha marker {marker:?}"));
    }

    let iframes = doc.select(&IFRAME).count();
    if iframes > 0 && text_len < IFRAME_TEXT_CHARS {
        notes.push(format!(
            "{iframes} iframe(s) with only {text_len} chars of page text"
        ));
    }
    if text_len < THIN_TEXT_CHARS && !login {
        notes.push(format!("thin content ({text_len} chars)"));
    }

    let verdict = if login {
        BlockerVerdict::LoginWall
    } else if paywall.is_some() {
        BlockerVerdict::Paywall
    } else if captcha.is_some() {
        BlockerVerdict::Captcha
    } else {
        BlockerVerdict::None
    };

    ProbeReport { verdict, notes }
}

/// Visible body text, skipping scripts and styles.
fn body_text(doc: &Html) -> String {
    static BODY: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("body").expect("valid selector"));

    let Some(body) = doc.select(&BODY).next() else {
        return String::new();
    };
    let mut out = String::new();
    collect_visible(body, &mut out);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_visible(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if !matches!(child_el.value().name(), "script" | "style" | "noscript" | "template") {
                collect_visible(child_el, out);
            }
        }
    }
}
