//! Error types for Markdownizer.
//!
//! Library crates use [`MarkdownizerError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only two kinds ever escape a reconciliation: [`ErrorKind::Input`] (the user
//! has no usable capture) and [`ErrorKind::Pipeline`] (our conversion broke).
//! Collaborator failures are absorbed by the engine and show up in diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Markdownizer operations.
#[derive(Debug, thiserror::Error)]
pub enum MarkdownizerError {
    /// The browser capture is missing or has no content.
    #[error("input error: {message}")]
    Input { message: String },

    /// A placeholder was dropped or duplicated by the Markdown renderer.
    #[error("placeholder {id} appeared {occurrences} times after conversion (expected exactly 1)")]
    PlaceholderMismatch { id: usize, occurrences: usize },

    /// The language alias table contains an entry that cannot be used as a fence tag.
    #[error("language table error: {message}")]
    LanguageTable { message: String },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Network/HTTP error during the independent fetch or the blocker probe.
    #[error("network error: {0}")]
    Network(String),

    /// Server-side content extraction produced nothing usable.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// A collaborator exceeded its time budget.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Parsing error for inbound payloads.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MarkdownizerError>;

/// Coarse classification used by callers to tell "no content" from "we broke".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied nothing we can work with.
    Input,
    /// The conversion pipeline is defective.
    Pipeline,
    /// A collaborator (fetcher, extractor, prober) failed.
    Collaborator,
    /// Bad configuration.
    Config,
    /// Local I/O or payload parsing.
    Io,
}

impl MarkdownizerError {
    /// Create an input error from any displayable message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a language table error from any displayable message.
    pub fn language_table(msg: impl Into<String>) -> Self {
        Self::LanguageTable {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input { .. } => ErrorKind::Input,
            Self::PlaceholderMismatch { .. } | Self::LanguageTable { .. } | Self::Conversion(_) => {
                ErrorKind::Pipeline
            }
            Self::Network(_) | Self::Extraction(_) | Self::Timeout { .. } => {
                ErrorKind::Collaborator
            }
            Self::Config { .. } => ErrorKind::Config,
            Self::Parse { .. } | Self::Io { .. } => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = MarkdownizerError::input("browser capture has no HTML");
        assert_eq!(err.to_string(), "input error: browser capture has no HTML");

        let err = MarkdownizerError::PlaceholderMismatch {
            id: 3,
            occurrences: 0,
        };
        assert!(err.to_string().contains("placeholder 3 appeared 0 times"));

        let err = MarkdownizerError::Timeout {
            operation: "blocker probe",
            secs: 30,
        };
        assert_eq!(err.to_string(), "blocker probe timed out after 30s");
    }

    #[test]
    fn kinds_separate_input_from_pipeline() {
        assert_eq!(MarkdownizerError::input("x").kind(), ErrorKind::Input);
        assert_eq!(
            MarkdownizerError::Conversion("htmd".into()).kind(),
            ErrorKind::Pipeline
        );
        assert_eq!(
            MarkdownizerError::language_table("bad alias").kind(),
            ErrorKind::Pipeline
        );
        assert_eq!(
            MarkdownizerError::Network("reset".into()).kind(),
            ErrorKind::Collaborator
        );
    }
}
