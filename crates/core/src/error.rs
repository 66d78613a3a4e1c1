//! # Pipeline Errors
//!
//! Error taxonomy for the outline-to-section pipeline.
//!
//! Primary-stream errors (`Connection`, `Upstream`, `NoSections`) end a session
//! in the `Error` stage. The same variants raised by a section stream stay
//! local to that section and are recorded on it as a message.

use thiserror::Error;

use crate::pipeline::Stage;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced by the pipeline
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// Request rejected before any I/O
    #[error("invalid request: {0}")]
    Validation(String),

    /// Stream failed to open (transport error or non-success status)
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        status: Option<u16>,
    },

    /// A single malformed event inside a stream
    #[error("malformed stream event: {0}")]
    StreamProtocol(String),

    /// Explicit error event embedded in a stream
    #[error("upstream error: {message}")]
    Upstream {
        message: String,
        code: Option<String>,
    },

    /// Outline stream finished without any recognizable section
    #[error("outline produced no sections")]
    NoSections,

    /// Authorization collaborator refused the request
    #[error("request not authorized: {0}")]
    Unauthorized(String),

    /// Credential collaborator could not supply a key
    #[error("credentials unavailable: {0}")]
    Credentials(String),

    /// Operation not accepted in the current stage
    #[error("cannot {operation} while pipeline is {stage:?}")]
    InvalidState {
        operation: &'static str,
        stage: Stage,
    },

    /// Section has a generation task in flight
    #[error("section {index} is still generating")]
    Busy { index: usize },

    #[error("section index {index} out of range (have {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// A section task died without producing a result
    #[error("section task failed: {0}")]
    TaskFailed(String),

    /// The running session was discarded by `reset()`
    #[error("session was reset")]
    SessionDiscarded,

    #[error("no previous request to retry")]
    NothingToRetry,
}

impl PipelineError {
    /// Build a connection error without a status code
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            status: None,
        }
    }

    /// Whether this error was raised before any state was touched
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Unauthorized(_)
                | Self::InvalidState { .. }
                | Self::Busy { .. }
                | Self::IndexOutOfRange { .. }
                | Self::NothingToRetry
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PipelineError::Upstream {
            message: "rate limited".to_string(),
            code: Some("429".to_string()),
        };
        assert_eq!(err.to_string(), "upstream error: rate limited");

        let err = PipelineError::Busy { index: 2 };
        assert_eq!(err.to_string(), "section 2 is still generating");
    }

    #[test]
    fn test_rejection_classification() {
        assert!(PipelineError::Validation("empty".into()).is_rejection());
        assert!(!PipelineError::NoSections.is_rejection());
        assert!(!PipelineError::connection("refused").is_rejection());
    }
}
