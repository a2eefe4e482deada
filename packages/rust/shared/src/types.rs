//! Core domain types shared by the reconciliation engine and its collaborators.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MarkdownizerError, Result};

// ---------------------------------------------------------------------------
// CandidateSource / ExtractionMethod
// ---------------------------------------------------------------------------

/// Where a candidate rendering came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Captured inside the user's (possibly authenticated) browser session.
    BrowserCaptured,
    /// Fetched independently over the network and extracted server-side.
    ServerFetched,
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BrowserCaptured => f.write_str("browser"),
            Self::ServerFetched => f.write_str("server"),
        }
    }
}

/// Which reader produced a candidate.
///
/// Browser-side readers are listed in priority order: structured data beats
/// semantic landmarks, which beat the generic readability fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    /// Schema.org / JSON-LD article body.
    StructuredData,
    /// `<article>`, `<main>`, `[role=main]` landmarks.
    SemanticLandmark,
    /// Readability-style generic content extraction in the browser.
    GenericReadability,
    /// Generic extraction performed on the independently fetched HTML.
    ServerGeneric,
}

impl ExtractionMethod {
    /// Rank among browser readers (lower is preferred).
    pub fn priority(self) -> u8 {
        match self {
            Self::StructuredData => 0,
            Self::SemanticLandmark => 1,
            Self::GenericReadability => 2,
            Self::ServerGeneric => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// One extracted rendering of a page.
///
/// Fields are private so a candidate cannot change after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    source: CandidateSource,
    title: String,
    html_body: String,
    plain_text: String,
    extraction_method: ExtractionMethod,
    confidence: f64,
}

impl Candidate {
    /// Build a candidate. `plain_text` must be the markup-stripped form of `html_body`.
    pub fn new(
        source: CandidateSource,
        title: impl Into<String>,
        html_body: impl Into<String>,
        plain_text: impl Into<String>,
        extraction_method: ExtractionMethod,
    ) -> Self {
        Self {
            source,
            title: title.into(),
            html_body: html_body.into(),
            plain_text: plain_text.into(),
            extraction_method,
            confidence: 1.0,
        }
    }

    /// Attach an informational confidence value (clamped to `[0, 1]`).
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn source(&self) -> CandidateSource {
        self.source
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn html_body(&self) -> &str {
        &self.html_body
    }

    pub fn plain_text(&self) -> &str {
        &self.plain_text
    }

    pub fn extraction_method(&self) -> ExtractionMethod {
        self.extraction_method
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Plain-text length in characters (not bytes).
    pub fn text_len(&self) -> usize {
        self.plain_text.chars().count()
    }

    /// `true` when either the markup or the text is blank.
    pub fn is_empty(&self) -> bool {
        self.html_body.trim().is_empty() || self.plain_text.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Inbound capture payload
// ---------------------------------------------------------------------------

/// Information about an iframe present in the captured page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IframeInfo {
    pub src: String,
    #[serde(rename = "sameOrigin", default)]
    pub same_origin: bool,
}

/// Structural statistics reported by the browser reader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureStats {
    #[serde(default)]
    pub char_count: usize,
    #[serde(default)]
    pub headings: usize,
    #[serde(default)]
    pub lists: usize,
}

/// Capture metadata attached by the browser side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureMeta {
    /// ISO 8601 capture timestamp.
    #[serde(default)]
    pub captured_at: Option<String>,
    #[serde(default)]
    pub stats: CaptureStats,
    #[serde(default)]
    pub iframe_info: Vec<IframeInfo>,
}

/// The record the browser-side collaborator hands us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Best extraction HTML from the browser.
    #[serde(default)]
    pub html: String,
    /// Best extraction text from the browser.
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_browser_method")]
    pub extraction_method: ExtractionMethod,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub meta: CaptureMeta,
}

fn default_browser_method() -> ExtractionMethod {
    ExtractionMethod::GenericReadability
}

impl CaptureRequest {
    /// Parse a capture payload from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| MarkdownizerError::parse(format!("invalid capture payload: {e}")))
    }

    /// Turn the payload into the browser candidate.
    pub fn to_candidate(&self) -> Candidate {
        let candidate = Candidate::new(
            CandidateSource::BrowserCaptured,
            self.title.clone(),
            self.html.clone(),
            self.text.clone(),
            self.extraction_method,
        );
        match self.confidence {
            Some(c) => candidate.with_confidence(c),
            None => candidate,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Compute the SHA-256 hash of content as lowercase hex.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
