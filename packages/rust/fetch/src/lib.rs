//! Network-facing collaborators for the reconciliation engine.
//!
//! - [`ReqwestFetcher`] performs the independent fetch
//! - [`ReadabilityExtractor`] turns fetched markup into the server candidate
//! - [`HttpBlockerProber`] checks short pages for login walls, paywalls and CAPTCHAs

mod client;
mod extract;
mod probe;

pub use client::ReqwestFetcher;
pub use extract::ReadabilityExtractor;
pub use probe::{HttpBlockerProber, analyze_blocker_page};
