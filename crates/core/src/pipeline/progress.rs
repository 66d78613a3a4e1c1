//! # Progress Estimator
//!
//! Blends a structural signal (what the outline already contains) with a
//! temporal signal (how long the outline has been streaming). The outline
//! phase owns the first 70 points; the completing phase owns the rest.
//! Every estimate is floored at the previous one, so progress never moves
//! backwards within a session.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::segmenter::Segmenter;

/// Tuning knobs for the estimator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressConfig {
    /// Assumed total duration of the outline phase
    pub nominal_duration_ms: u64,
    /// Buffer length that earns the last structural step
    pub length_threshold: usize,
    /// Progress once the outline stream has closed
    pub completing_checkpoint: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            nominal_duration_ms: 20_000,
            length_threshold: 500,
            completing_checkpoint: 75.0,
        }
    }
}

const STEP: f64 = 20.0;
const BASE: f64 = 10.0;
const TEMPORAL_CAP: f64 = 80.0;
const OUTLINE_RAW_CAP: f64 = 90.0;
const OUTLINE_WEIGHT: f64 = 0.7;
const OUTLINE_SHARE: f64 = 70.0;
/// Highest value reachable before every task has resolved
const COMPLETING_CAP: f64 = 99.0;

fn heading_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s+\S").ok())
        .as_ref()
}

fn bullet_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(?:[-*+•]|\d+[.)])\s+\S").ok())
        .as_ref()
}

fn count_matches(re: Option<&Regex>, buffer: &str) -> usize {
    re.map_or(0, |re| re.find_iter(buffer).count())
}

/// Estimates session progress in the range 0-100
#[derive(Debug, Clone, Default)]
pub struct ProgressEstimator {
    config: ProgressConfig,
    segmenter: Segmenter,
}

impl ProgressEstimator {
    pub fn new(config: ProgressConfig, segmenter: Segmenter) -> Self {
        Self { config, segmenter }
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Structural score, 0-100 in steps of 20
    pub fn structural_score(&self, buffer: &str) -> f64 {
        let headings = count_matches(heading_re(), buffer);
        let bullets = count_matches(bullet_re(), buffer);
        let delimiters = self.segmenter.count_delimiters(buffer);

        let mut score = 0.0;
        if headings >= 1 {
            score += STEP;
        }
        if headings >= 3 {
            score += STEP;
        }
        if bullets >= 5 {
            score += STEP;
        }
        if delimiters >= 2 {
            score += STEP;
        }
        if buffer.chars().count() > self.config.length_threshold {
            score += STEP;
        }
        score
    }

    /// Temporal score, 0-80
    pub fn temporal_score(&self, elapsed: Duration) -> f64 {
        let nominal = self.config.nominal_duration_ms.max(1) as f64;
        (elapsed.as_millis() as f64 / nominal * TEMPORAL_CAP).min(TEMPORAL_CAP)
    }

    /// Outline-phase estimate measured from `started_at`
    pub fn estimate(&self, buffer: &str, started_at: Instant, last_progress: f64) -> f64 {
        self.estimate_at(buffer, started_at.elapsed(), last_progress)
    }

    /// Outline-phase estimate for an explicit elapsed time
    pub fn estimate_at(&self, buffer: &str, elapsed: Duration, last_progress: f64) -> f64 {
        let structural = self.structural_score(buffer);
        let temporal = self.temporal_score(elapsed);
        let raw = (BASE + structural.max(temporal)).min(OUTLINE_RAW_CAP);
        let outline = (raw * OUTLINE_WEIGHT).min(OUTLINE_SHARE);
        outline.max(last_progress)
    }

    /// Progress while section tasks resolve after the outline closed.
    ///
    /// Starts at the completing checkpoint and only reaches 100 once
    /// `resolved == total`.
    pub fn completing(&self, resolved: usize, total: usize, last_progress: f64) -> f64 {
        let checkpoint = self.config.completing_checkpoint;
        let value = if total == 0 || resolved >= total {
            100.0
        } else {
            let span = COMPLETING_CAP - checkpoint;
            checkpoint + span * resolved as f64 / total as f64
        };
        value.max(last_progress).min(100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> ProgressEstimator {
        ProgressEstimator::default()
    }

    #[test]
    fn test_patterns_compile() {
        assert!(heading_re().is_some());
        assert!(bullet_re().is_some());
    }

    #[test]
    fn test_empty_buffer_at_start() {
        let p = estimator().estimate_at("", Duration::ZERO, 0.0);
        assert!((p - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_structural_steps() {
        let e = estimator();
        assert_eq!(e.structural_score("# One\n"), 20.0);
        assert_eq!(e.structural_score("# One\n# Two\n## Three\n"), 40.0);

        let bullets = "# A\n- a\n- b\n* c\n1. d\n2) e\n";
        assert_eq!(e.structural_score(bullets), 40.0);

        let delimited = "# A\n---\n# B\n---\n# C\n";
        assert_eq!(e.structural_score(delimited), 60.0);

        let long = format!("# A\n{}", "x".repeat(600));
        assert_eq!(e.structural_score(&long), 40.0);
    }

    #[test]
    fn test_hash_without_space_is_not_heading() {
        assert_eq!(estimator().structural_score("#hashtag\n"), 0.0);
    }

    #[test]
    fn test_temporal_caps_at_eighty() {
        let e = estimator();
        assert_eq!(e.temporal_score(Duration::from_millis(10_000)), 40.0);
        assert_eq!(e.temporal_score(Duration::from_secs(120)), 80.0);
    }

    #[test]
    fn test_outline_phase_never_exceeds_share() {
        let e = estimator();
        let full = format!(
            "# A\n# B\n# C\n- 1\n- 2\n- 3\n- 4\n- 5\n---\n---\n{}",
            "x".repeat(600)
        );
        let p = e.estimate_at(&full, Duration::from_secs(600), 0.0);
        assert!(p <= 70.0);
        assert!((p - 63.0).abs() < 1e-9);
    }

    #[test]
    fn test_never_regresses() {
        let e = estimator();
        let p = e.estimate_at("", Duration::ZERO, 42.0);
        assert_eq!(p, 42.0);

        let mut last = 0.0;
        let mut buffer = String::new();
        for i in 0..40 {
            buffer.push_str(if i % 7 == 0 { "---\n" } else { "- point\n" });
            let next = e.estimate_at(&buffer, Duration::from_millis(i * 300), last);
            assert!(next >= last);
            last = next;
        }
    }

    #[test]
    fn test_completing_reaches_100_only_when_all_resolved() {
        let e = estimator();
        assert_eq!(e.completing(0, 4, 60.0), 75.0);
        let partial = e.completing(3, 4, 75.0);
        assert!(partial > 75.0 && partial < 100.0);
        assert_eq!(e.completing(4, 4, partial), 100.0);
        assert_eq!(e.completing(0, 0, 75.0), 100.0);
        assert_eq!(e.completing(1, 4, 90.0), 90.0);
    }
}
