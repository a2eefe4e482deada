//! Seams to the I/O the engine depends on but does not own.
//!
//! Implementations live in `markdownizer-fetch`; tests use in-memory doubles.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use markdownizer_shared::{Candidate, Result};

/// What the independent fetch brought back.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after following redirects.
    pub final_url: String,
    pub status: u16,
    pub html: String,
}

/// Fetches a page independently of the user's browser session.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// Turns a fetched page into the server candidate.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, page: &FetchedPage) -> Result<Candidate>;
}

/// What a blocker probe concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockerVerdict {
    None,
    LoginWall,
    Paywall,
    Captcha,
}

impl BlockerVerdict {
    pub fn is_blocked(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for BlockerVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::LoginWall => "login-wall",
            Self::Paywall => "paywall",
            Self::Captcha => "captcha",
        })
    }
}

/// Verdict plus free-form observations for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub verdict: BlockerVerdict,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl ProbeReport {
    pub fn clear() -> Self {
        Self {
            verdict: BlockerVerdict::None,
            notes: Vec::new(),
        }
    }
}

/// Checks whether a URL sits behind a login wall, paywall, or CAPTCHA.
///
/// `budget` is the time the caller will wait; the engine enforces it anyway.
#[async_trait]
pub trait BlockerProber: Send + Sync {
    async fn probe(&self, url: &str, budget: Duration) -> Result<ProbeReport>;
}
