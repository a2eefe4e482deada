//! Weighted scoring and the tie-break between candidates.

use serde::Serialize;

use markdownizer_shared::CandidateSource;

use crate::signals::Signals;

/// A pinned, versioned table of scoring constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringPolicy {
    pub version: &'static str,
    pub length_weight: f64,
    pub density_weight: f64,
    pub overlap_weight: f64,
    pub structure_weight: f64,
    pub freshness_weight: f64,
    pub link_weight: f64,
    /// Score gap below which the browser capture wins regardless.
    pub tie_tolerance: f64,
    /// Subtracted from the server score when a blocker is confirmed.
    pub blocker_penalty: f64,
    /// Text length (chars) at which the length signal saturates.
    pub length_saturation: f64,
}

impl ScoringPolicy {
    pub const V1: Self = Self {
        version: "v1",
        length_weight: 0.35,
        density_weight: 0.20,
        overlap_weight: 0.20,
        structure_weight: 0.10,
        freshness_weight: 0.10,
        link_weight: 0.05,
        tie_tolerance: 0.05,
        blocker_penalty: 0.30,
        length_saturation: 2000.0,
    };

    /// Look up a policy by the name used in config.
    pub fn by_version(version: &str) -> Option<Self> {
        match version.trim().to_ascii_lowercase().as_str() {
            "v1" => Some(Self::V1),
            _ => None,
        }
    }

    /// Weighted sum of `signals`, minus the blocker penalty when `blocked`, clamped to `[0, 1]`.
    pub fn score(&self, signals: &Signals, blocked: bool) -> f64 {
        let raw = self.length_weight * signals.normalized_length
            + self.density_weight * signals.density
            + self.overlap_weight * signals.overlap
            + self.structure_weight * signals.structure_richness
            + self.freshness_weight * signals.freshness
            + self.link_weight * signals.link_quality;
        let penalty = if blocked { self.blocker_penalty } else { 0.0 };
        (raw - penalty).clamp(0.0, 1.0)
    }

    /// Pick a source. Within the tie tolerance the browser capture wins.
    pub fn decide(&self, browser_score: f64, server_score: f64) -> CandidateSource {
        if (browser_score - server_score).abs() < self.tie_tolerance {
            CandidateSource::BrowserCaptured
        } else if server_score > browser_score {
            CandidateSource::ServerFetched
        } else {
            CandidateSource::BrowserCaptured
        }
    }
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self::V1
    }
}

/// [`ScoringPolicy::score`] under the current default policy.
pub fn score(signals: &Signals, blocked: bool) -> f64 {
    ScoringPolicy::V1.score(signals, blocked)
}

/// [`ScoringPolicy::decide`] under the current default policy.
pub fn decide(browser_score: f64, server_score: f64) -> CandidateSource {
    ScoringPolicy::V1.decide(browser_score, server_score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(v: f64) -> Signals {
        Signals {
            normalized_length: v,
            density: v,
            overlap: v,
            structure_richness: v,
            freshness: v,
            link_quality: v,
        }
    }

    #[test]
    fn v1_weights_are_pinned() {
        let p = ScoringPolicy::V1;
        assert_eq!(p.version, "v1");
        assert_eq!(
            [
                p.length_weight,
                p.density_weight,
                p.overlap_weight,
                p.structure_weight,
                p.freshness_weight,
                p.link_weight
            ],
            [0.35, 0.20, 0.20, 0.10, 0.10, 0.05]
        );
        assert_eq!(p.tie_tolerance, 0.05);
        assert_eq!(p.blocker_penalty, 0.30);
        assert_eq!(p.length_saturation, 2000.0);
    }

    #[test]
    fn weights_sum_to_one() {
        assert!((score(&signals(1.0), false) - 1.0).abs() < 1e-9);
        assert_eq!(score(&signals(0.0), false), 0.0);
    }

    #[test]
    fn single_signal_contributes_its_weight() {
        let s = Signals {
            normalized_length: 1.0,
            ..signals(0.0)
        };
        assert!((score(&s, false) - 0.35).abs() < 1e-9);
    }

    #[test]
    fn penalty_applies_and_clamps() {
        assert!((score(&signals(1.0), true) - 0.70).abs() < 1e-9);
        assert_eq!(score(&signals(0.1), true), 0.0);
    }

    #[test]
    fn close_scores_favor_browser() {
        assert_eq!(decide(0.80, 0.82), CandidateSource::BrowserCaptured);
        assert_eq!(decide(0.82, 0.80), CandidateSource::BrowserCaptured);
    }

    #[test]
    fn clear_winner_is_chosen() {
        assert_eq!(decide(0.60, 0.90), CandidateSource::ServerFetched);
        assert_eq!(decide(0.90, 0.60), CandidateSource::BrowserCaptured);
    }

    #[test]
    fn higher_score_wins_in_either_order_outside_tie_band() {
        let pairs = [(0.1, 0.5), (0.3, 0.36), (0.0, 1.0), (0.7, 0.2)];
        for (a, b) in pairs {
            let higher_first = if a > b {
                CandidateSource::BrowserCaptured
            } else {
                CandidateSource::ServerFetched
            };
            let higher_second = if b > a {
                CandidateSource::BrowserCaptured
            } else {
                CandidateSource::ServerFetched
            };
            assert_eq!(decide(a, b), higher_first, "decide({a}, {b})");
            assert_eq!(decide(b, a), higher_second, "decide({b}, {a})");
        }
    }

    #[test]
    fn policy_lookup() {
        assert_eq!(ScoringPolicy::by_version("V1"), Some(ScoringPolicy::V1));
        assert_eq!(ScoringPolicy::by_version("v2"), None);
    }
}
