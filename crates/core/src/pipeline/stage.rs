//! # Pipeline Stages
//!
//! Lifecycle of one generation session.
//!
//! ```text
//! Idle ─▶ Connecting ─▶ Generating ─▶ Completing ─▶ Idle
//!            │              │              │
//!            └──────────────┴──────────────┴──▶ Error
//! ```

use serde::{Deserialize, Serialize};

/// Stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Waiting for input, or finished
    #[default]
    Idle,
    /// Opening the outline stream
    Connecting,
    /// Outline stream is delivering text
    Generating,
    /// Outline closed, waiting for section tasks
    Completing,
    /// Session failed; only `retry()` or `reset()` leave this stage
    Error,
}

impl Stage {
    /// The stage that follows on success
    pub fn next(self) -> Stage {
        match self {
            Stage::Idle => Stage::Connecting,
            Stage::Connecting => Stage::Generating,
            Stage::Generating => Stage::Completing,
            Stage::Completing => Stage::Idle,
            Stage::Error => Stage::Error,
        }
    }

    /// Whether a session is currently running
    pub fn is_active(self) -> bool {
        matches!(self, Stage::Connecting | Stage::Generating | Stage::Completing)
    }

    /// Whether the outline stream may still be open
    pub fn is_streaming(self) -> bool {
        matches!(self, Stage::Connecting | Stage::Generating)
    }

    /// `generate()` is only accepted from Idle
    pub fn accepts_generate(self) -> bool {
        self == Stage::Idle
    }

    /// Check a transition against the lifecycle diagram
    pub fn can_transition_to(self, to: Stage) -> bool {
        if to == Stage::Error {
            return self.is_active();
        }
        self.next() == to && self != Stage::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_advance() {
        let mut stage = Stage::Idle;
        stage = stage.next();
        assert_eq!(stage, Stage::Connecting);
        stage = stage.next();
        assert_eq!(stage, Stage::Generating);
        stage = stage.next();
        assert_eq!(stage, Stage::Completing);
        stage = stage.next();
        assert_eq!(stage, Stage::Idle);
    }

    #[test]
    fn test_error_reachable_from_active_stages_only() {
        assert!(Stage::Connecting.can_transition_to(Stage::Error));
        assert!(Stage::Generating.can_transition_to(Stage::Error));
        assert!(Stage::Completing.can_transition_to(Stage::Error));
        assert!(!Stage::Idle.can_transition_to(Stage::Error));
        assert!(!Stage::Error.can_transition_to(Stage::Connecting));
    }

    #[test]
    fn test_generate_only_from_idle() {
        assert!(Stage::Idle.accepts_generate());
        assert!(!Stage::Error.accepts_generate());
        assert!(!Stage::Generating.accepts_generate());
    }
}
