//! Application configuration for Markdownizer.
//!
//! User config lives at `~/.markdownizer/markdownizer.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MarkdownizerError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "markdownizer.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".markdownizer";

// ---------------------------------------------------------------------------
// Config structs (matching markdownizer.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scoring policy selection.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Short-content thresholds that trigger a blocker probe.
    #[serde(default)]
    pub thresholds: ThresholdsConfig,

    /// Independent fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Blocker probe settings.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Code block pipeline settings.
    #[serde(default)]
    pub code_blocks: CodeBlocksConfig,

    /// Freshness signal settings.
    #[serde(default)]
    pub freshness: FreshnessConfig,
}

/// `[scoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Versioned policy table name (only `"v1"` exists today).
    #[serde(default = "default_policy")]
    pub policy: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
        }
    }
}

fn default_policy() -> String {
    "v1".into()
}

/// `[thresholds]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    /// Server text shorter than this is "very thin".
    #[serde(default = "default_very_thin")]
    pub very_thin_chars: usize,

    /// Server text shorter than this is "suspicious". Both trigger a probe.
    #[serde(default = "default_suspicious")]
    pub suspicious_chars: usize,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            very_thin_chars: default_very_thin(),
            suspicious_chars: default_suspicious(),
        }
    }
}

fn default_very_thin() -> usize {
    200
}
fn default_suspicious() -> usize {
    500
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Hard timeout for the independent fetch, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Maximum redirects followed before giving up.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// User-Agent header sent with the fetch and the probe.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    8
}
fn default_max_redirects() -> usize {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .into()
}

/// `[probe]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Whether short server content triggers a blocker probe at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hard timeout for one probe, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_probe_timeout() -> u64 {
    30
}

/// `[code_blocks]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBlocksConfig {
    /// Fraction of digit-prefixed lines at which a block is treated as line-numbered.
    #[serde(default = "default_line_number_ratio")]
    pub line_number_ratio: f64,

    /// Extra `alias = "canonical"` entries layered over the built-in table.
    #[serde(default)]
    pub language_aliases: BTreeMap<String, String>,
}

impl Default for CodeBlocksConfig {
    fn default() -> Self {
        Self {
            line_number_ratio: default_line_number_ratio(),
            language_aliases: BTreeMap::new(),
        }
    }
}

fn default_line_number_ratio() -> f64 {
    0.70
}

/// `[freshness]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessConfig {
    /// A date within this many days of "now" counts as recent.
    #[serde(default = "default_recency_days")]
    pub recency_days: i64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            recency_days: default_recency_days(),
        }
    }
}

fn default_recency_days() -> i64 {
    730
}

impl AppConfig {
    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.thresholds.very_thin_chars > self.thresholds.suspicious_chars {
            return Err(MarkdownizerError::config(format!(
                "thresholds.very_thin_chars ({}) must not exceed thresholds.suspicious_chars ({})",
                self.thresholds.very_thin_chars, self.thresholds.suspicious_chars
            )));
        }
        let ratio = self.code_blocks.line_number_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(MarkdownizerError::config(format!(
                "code_blocks.line_number_ratio must be in (0, 1], got {ratio}"
            )));
        }
        if self.fetch.timeout_secs == 0 || self.probe.timeout_secs == 0 {
            return Err(MarkdownizerError::config("timeouts must be at least 1 second"));
        }
        if self.freshness.recency_days <= 0 {
            return Err(MarkdownizerError::config(
                "freshness.recency_days must be positive",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.markdownizer/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MarkdownizerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.markdownizer/markdownizer.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MarkdownizerError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        MarkdownizerError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MarkdownizerError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MarkdownizerError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MarkdownizerError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
