//! Shared types, error model, and configuration for Markdownizer.
//!
//! This crate is the foundation depended on by all other Markdownizer crates.
//! It provides:
//! - [`MarkdownizerError`], the unified error type, and its [`ErrorKind`]
//! - Domain types ([`Candidate`], [`CandidateSource`], [`CaptureRequest`])
//! - Configuration ([`AppConfig`], config loading)
//! - URL hygiene helpers ([`strip_tracking`], [`redact_tokens`])

pub mod config;
pub mod error;
pub mod links;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CodeBlocksConfig, FetchConfig, FreshnessConfig, ProbeConfig, ScoringConfig,
    ThresholdsConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{ErrorKind, MarkdownizerError, Result};
pub use links::{is_tracking_param, redact_tokens, strip_tracking};
pub use types::{
    Candidate, CandidateSource, CaptureMeta, CaptureRequest, CaptureStats, ExtractionMethod,
    IframeInfo, content_hash,
};
