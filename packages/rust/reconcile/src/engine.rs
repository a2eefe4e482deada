//! The reconciliation state machine.
//!
//! ```text
//! START -> REDIRECT_CHECK -> FAST_ACCEPT ----------------------------> DONE
//!                         \-> FULL_COMPARE -> [BLOCKER_CHECK] ------> DONE
//! ```
//!
//! Collaborator failures (fetch, extraction, probe) never escape: they fall
//! back to the browser capture and are recorded in [`Diagnostics`]. Only a
//! missing browser capture or a broken conversion is an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use markdownizer_markdown::{
    CodeBlockPipeline, CodeBlockSummary, ConvertOptions, Converter, HtmdRenderer, MarkdownRenderer,
};
use markdownizer_shared::{
    AppConfig, Candidate, CandidateSource, CaptureRequest, MarkdownizerError, Result,
    content_hash, redact_tokens,
};

use crate::collaborators::{BlockerProber, ContentExtractor, PageFetcher, ProbeReport};
use crate::redirect::{RedirectOutcome, classify};
use crate::scorer::ScoringPolicy;
use crate::signals::{SignalContext, Signals, compute_signals};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Immutable runtime configuration for one engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub policy: ScoringPolicy,
    /// Server text shorter than this is "very thin".
    pub very_thin_chars: usize,
    /// Server text shorter than this is "suspicious". Both trigger a probe.
    pub suspicious_chars: usize,
    pub fetch_timeout: Duration,
    pub probe_enabled: bool,
    pub probe_timeout: Duration,
    pub recency_days: i64,
    pub pipeline: CodeBlockPipeline,
}

impl EngineConfig {
    fn from_parts(config: &AppConfig, policy: ScoringPolicy, pipeline: CodeBlockPipeline) -> Self {
        Self {
            policy,
            very_thin_chars: config.thresholds.very_thin_chars,
            suspicious_chars: config.thresholds.suspicious_chars,
            fetch_timeout: Duration::from_secs(config.fetch.timeout_secs),
            probe_enabled: config.probe.enabled,
            probe_timeout: Duration::from_secs(config.probe.timeout_secs),
            recency_days: config.freshness.recency_days,
            pipeline,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_parts(
            &AppConfig::default(),
            ScoringPolicy::V1,
            CodeBlockPipeline::default(),
        )
    }
}

impl TryFrom<&AppConfig> for EngineConfig {
    type Error = MarkdownizerError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let policy = ScoringPolicy::by_version(&config.scoring.policy).ok_or_else(|| {
            MarkdownizerError::config(format!(
                "unknown scoring policy {:?} (known: \"v1\")",
                config.scoring.policy
            ))
        })?;
        let pipeline = CodeBlockPipeline::from_config(&config.code_blocks)?;
        Ok(Self::from_parts(config, policy, pipeline))
    }
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// One reconciliation request.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    /// The URL the user was looking at.
    pub url: String,
    /// The capture from the user's browser session.
    pub browser: Option<Candidate>,
    /// When the browser capture was taken.
    pub captured_at: Option<String>,
}

impl ReconcileRequest {
    pub fn new(url: impl Into<String>, browser: Candidate) -> Self {
        Self {
            url: url.into(),
            browser: Some(browser),
            captured_at: None,
        }
    }
}

impl From<&CaptureRequest> for ReconcileRequest {
    fn from(capture: &CaptureRequest) -> Self {
        Self {
            url: capture.url.clone(),
            browser: Some(capture.to_candidate()),
            captured_at: capture.meta.captured_at.clone(),
        }
    }
}

/// States of the reconciliation state machine, recorded in visiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    RedirectCheck,
    FastAccept,
    FullCompare,
    BlockerCheck,
    Done,
}

/// Why the browser capture was taken without a numeric comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FastAcceptReason {
    Redirect,
    FetchFailed,
    ExtractionFailed,
    BlockerDetected,
}

/// How short the server text was when it triggered a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortContent {
    VeryThin,
    Suspicious,
}

/// Final scores, rounded to three decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores {
    pub browser: f64,
    pub server: f64,
}

impl Scores {
    fn rounded(browser: f64, server: f64) -> Self {
        let round = |v: f64| (v * 1000.0).round() / 1000.0;
        Self {
            browser: round(browser),
            server: round(server),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalPair {
    pub browser: Signals,
    pub server: Signals,
}

/// Everything needed to explain a choice.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub policy_version: &'static str,
    /// `None` when the fetch never completed.
    pub redirect: Option<RedirectOutcome>,
    pub fast_accept: Option<FastAcceptReason>,
    pub scores: Option<Scores>,
    pub signals: Option<SignalPair>,
    pub short_content: Option<ShortContent>,
    pub probe_invoked: bool,
    pub probe: Option<ProbeReport>,
    pub blocker_detected: bool,
    /// Absorbed collaborator failures.
    pub collaborator_errors: Vec<String>,
    pub phases: Vec<Phase>,
    pub code_blocks: Vec<CodeBlockSummary>,
    /// SHA-256 of the final Markdown.
    pub content_hash: String,
}

impl Diagnostics {
    fn new(policy_version: &'static str) -> Self {
        Self {
            policy_version,
            redirect: None,
            fast_accept: None,
            scores: None,
            signals: None,
            short_content: None,
            probe_invoked: false,
            probe: None,
            blocker_detected: false,
            collaborator_errors: Vec::new(),
            phases: Vec::new(),
            code_blocks: Vec::new(),
            content_hash: String::new(),
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!(?phase, "entering phase");
        self.phases.push(phase);
    }

    fn absorb(&mut self, collaborator: &str, error: &MarkdownizerError) {
        warn!(collaborator, error = %error, "collaborator failed, preferring browser capture");
        self.collaborator_errors.push(format!("{collaborator}: {error}"));
    }
}

/// The chosen candidate, its Markdown, and why it was chosen.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    pub chosen: Candidate,
    pub markdown: String,
    pub diagnostics: Diagnostics,
}

impl ReconciliationResult {
    pub fn chosen_source(&self) -> CandidateSource {
        self.chosen.source()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stateless between requests; share one instance across tasks.
pub struct ReconciliationEngine {
    config: EngineConfig,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ContentExtractor>,
    prober: Option<Arc<dyn BlockerProber>>,
    converter: Converter,
    clock: fn() -> DateTime<Utc>,
}

impl ReconciliationEngine {
    pub fn new(
        config: EngineConfig,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn ContentExtractor>,
    ) -> Self {
        let converter = Converter::new(config.pipeline.clone(), Arc::new(HtmdRenderer::default()));
        Self {
            config,
            fetcher,
            extractor,
            prober: None,
            converter,
            clock: Utc::now,
        }
    }

    /// Enable blocker probing of short server content.
    pub fn with_prober(mut self, prober: Arc<dyn BlockerProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Swap the HTML-to-Markdown renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn MarkdownRenderer>) -> Self {
        self.converter = Converter::new(self.config.pipeline.clone(), renderer);
        self
    }

    /// Fix "now" for the freshness signal.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one reconciliation.
    #[instrument(skip_all, fields(url = %redact_tokens(&request.url)))]
    pub async fn reconcile(&self, request: ReconcileRequest) -> Result<ReconciliationResult> {
        let ReconcileRequest {
            url,
            browser,
            captured_at,
        } = request;
        let captured_at = captured_at.as_deref();
        let policy = &self.config.policy;

        let mut diag = Diagnostics::new(policy.version);
        diag.enter(Phase::Start);

        let browser = match browser {
            None => return Err(MarkdownizerError::input("no browser capture was provided")),
            Some(c) if c.is_empty() => {
                return Err(MarkdownizerError::input("browser capture has no content"));
            }
            Some(c) => c,
        };

        // -- REDIRECT_CHECK --------------------------------------------------
        diag.enter(Phase::RedirectCheck);
        let page = match timeout(self.config.fetch_timeout, self.fetcher.fetch(&url)).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                diag.absorb("fetch", &e);
                return self.fast_accept(&url, captured_at, browser, FastAcceptReason::FetchFailed, diag);
            }
            Err(_) => {
                let e = MarkdownizerError::Timeout {
                    operation: "fetch",
                    secs: self.config.fetch_timeout.as_secs(),
                };
                diag.absorb("fetch", &e);
                return self.fast_accept(&url, captured_at, browser, FastAcceptReason::FetchFailed, diag);
            }
        };

        let redirect = classify(&url, &page.final_url);
        let is_redirect = redirect.is_redirect;
        diag.redirect = Some(redirect);
        if is_redirect {
            info!(
                final_url = %redact_tokens(&page.final_url),
                "fetch landed elsewhere, keeping browser capture"
            );
            return self.fast_accept(&url, captured_at, browser, FastAcceptReason::Redirect, diag);
        }

        let server = match self.extractor.extract(&page) {
            Ok(candidate) if !candidate.is_empty() => candidate,
            Ok(_) => {
                let e = MarkdownizerError::Extraction("server extraction was empty".into());
                diag.absorb("extract", &e);
                return self.fast_accept(&url, captured_at, browser, FastAcceptReason::ExtractionFailed, diag);
            }
            Err(e) => {
                diag.absorb("extract", &e);
                return self.fast_accept(&url, captured_at, browser, FastAcceptReason::ExtractionFailed, diag);
            }
        };

        // -- FULL_COMPARE ----------------------------------------------------
        diag.enter(Phase::FullCompare);
        let ctx = SignalContext {
            length_saturation: policy.length_saturation,
            recency_days: self.config.recency_days,
            now: (self.clock)(),
        };
        let browser_signals = compute_signals(&browser, server.plain_text(), &ctx);
        let server_signals = compute_signals(&server, browser.plain_text(), &ctx);
        let browser_score = policy.score(&browser_signals, false);
        let mut server_score = policy.score(&server_signals, false);
        debug!(
            browser_score,
            server_score,
            ?browser_signals,
            ?server_signals,
            "candidates scored"
        );

        // -- BLOCKER_CHECK ---------------------------------------------------
        diag.short_content = self.short_content(server.text_len());
        if diag.short_content.is_some() && self.config.probe_enabled {
            if let Some(report) = self.probe(&url, &mut diag).await {
                if report.verdict.is_blocked() {
                    diag.blocker_detected = true;
                    server_score = policy.score(&server_signals, true);
                }
                diag.probe = Some(report);
            }
        }

        diag.scores = Some(Scores::rounded(browser_score, server_score));
        diag.signals = Some(SignalPair {
            browser: browser_signals,
            server: server_signals,
        });

        let chosen = if diag.blocker_detected {
            diag.fast_accept = Some(FastAcceptReason::BlockerDetected);
            diag.enter(Phase::FastAccept);
            CandidateSource::BrowserCaptured
        } else {
            policy.decide(browser_score, server_score)
        };
        info!(%chosen, browser_score, server_score, "candidate chosen");

        let chosen = match chosen {
            CandidateSource::BrowserCaptured => browser,
            CandidateSource::ServerFetched => server,
        };
        self.finish(&url, captured_at, chosen, diag)
    }

    fn short_content(&self, server_len: usize) -> Option<ShortContent> {
        if server_len < self.config.very_thin_chars {
            Some(ShortContent::VeryThin)
        } else if server_len < self.config.suspicious_chars {
            Some(ShortContent::Suspicious)
        } else {
            None
        }
    }

    /// Run the prober under the probe budget. `None` if there is no prober or it failed.
    async fn probe(&self, url: &str, diag: &mut Diagnostics) -> Option<ProbeReport> {
        let prober = self.prober.as_ref()?;
        diag.enter(Phase::BlockerCheck);
        diag.probe_invoked = true;

        let budget = self.config.probe_timeout;
        match timeout(budget, prober.probe(url, budget)).await {
            Ok(Ok(report)) => {
                info!(verdict = %report.verdict, notes = report.notes.len(), "blocker probe finished");
                Some(report)
            }
            Ok(Err(e)) => {
                diag.absorb("probe", &e);
                None
            }
            Err(_) => {
                let e = MarkdownizerError::Timeout {
                    operation: "probe",
                    secs: budget.as_secs(),
                };
                diag.absorb("probe", &e);
                None
            }
        }
    }

    fn fast_accept(
        &self,
        url: &str,
        captured_at: Option<&str>,
        browser: Candidate,
        reason: FastAcceptReason,
        mut diag: Diagnostics,
    ) -> Result<ReconciliationResult> {
        info!(?reason, "fast-accepting browser capture");
        diag.fast_accept = Some(reason);
        diag.enter(Phase::FastAccept);
        self.finish(url, captured_at, browser, diag)
    }

    fn finish(
        &self,
        url: &str,
        captured_at: Option<&str>,
        chosen: Candidate,
        mut diag: Diagnostics,
    ) -> Result<ReconciliationResult> {
        let opts = ConvertOptions {
            source_url: url.to_string(),
            title: Some(chosen.title().to_string()).filter(|t| !t.trim().is_empty()),
            captured_at: captured_at.map(str::to_string),
            chosen: Some(chosen.source().to_string()),
        };
        let converted = self.converter.convert(chosen.html_body(), &opts)?;

        diag.code_blocks = converted.code_blocks;
        diag.content_hash = content_hash(&converted.markdown);
        diag.enter(Phase::Done);

        Ok(ReconciliationResult {
            chosen,
            markdown: converted.markdown,
            diagnostics: diag,
        })
    }
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("config", &self.config)
            .field("probing", &self.prober.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
