//! Event framing for upstream streams.
//!
//! Each event is one `data: <json>` line. The JSON carries either a content
//! delta or an error payload; `data: [DONE]` terminates the stream.

use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// Termination sentinel carried in a `data:` line
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental content
    Delta(String),
    /// Explicit error event (rate limiting, moderation, ...)
    Error {
        message: String,
        code: Option<String>,
    },
    /// Termination sentinel
    Done,
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Decode one line of the stream.
///
/// Returns `Ok(None)` for lines that carry no event (blank lines, comments,
/// other SSE fields) and `Err(StreamProtocol)` for a `data:` line whose
/// payload cannot be understood.
pub fn parse_line(line: &str) -> Result<Option<StreamEvent>> {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim_start();

    if data == DONE_SENTINEL {
        return Ok(Some(StreamEvent::Done));
    }

    let payload: WirePayload = serde_json::from_str(data)
        .map_err(|e| PipelineError::StreamProtocol(format!("{}: {}", e, preview(data))))?;

    if let Some(error) = payload.error {
        let code = error.code.map(|c| match c {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
        return Ok(Some(StreamEvent::Error {
            message: error.message,
            code,
        }));
    }

    match payload.content {
        Some(content) => Ok(Some(StreamEvent::Delta(content))),
        None => Err(PipelineError::StreamProtocol(format!(
            "event has neither content nor error: {}",
            preview(data)
        ))),
    }
}

fn preview(data: &str) -> String {
    data.chars().take(80).collect()
}
