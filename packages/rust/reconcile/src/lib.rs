//! Content reconciliation: pick between the browser capture and an
//! independently fetched server candidate, then convert the winner.
//!
//! The pieces compose bottom-up:
//! - [`redirect`] decides whether the fetch landed on the same resource
//! - [`signals`] derives per-candidate metrics
//! - [`scorer`] weighs them under a pinned [`ScoringPolicy`]
//! - [`engine`] runs the state machine and owns the fallbacks
//!
//! I/O lives behind the traits in [`collaborators`].

pub mod collaborators;
pub mod engine;
pub mod redirect;
pub mod scorer;
pub mod signals;

pub use collaborators::{
    BlockerProber, BlockerVerdict, ContentExtractor, FetchedPage, PageFetcher, ProbeReport,
};
pub use engine::{
    Diagnostics, EngineConfig, FastAcceptReason, Phase, ReconcileRequest, ReconciliationEngine,
    ReconciliationResult, Scores, ShortContent, SignalPair,
};
pub use redirect::{RedirectOutcome, classify};
pub use scorer::{ScoringPolicy, decide, score};
pub use signals::{SignalContext, Signals, compute_signals};
