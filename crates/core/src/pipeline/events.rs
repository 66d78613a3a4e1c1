//! # Pipeline Events
//!
//! Notifications emitted while a session runs. Observers receive them over
//! the coordinator's event channel; the server relays them as SSE.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of pipeline event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventKind {
    /// `generate()` accepted, outline stream opening
    SessionStarted,
    /// A new section appeared in the outline
    SectionDiscovered,
    /// A section generation task was created
    SectionDispatched,
    /// A section artifact is ready
    SectionReady,
    /// A section generation failed
    SectionFailed,
    /// A section was removed and later ones reindexed
    SectionDeleted,
    /// A section artifact was overwritten directly
    SectionUpdated,
    /// Progress moved forward
    ProgressUpdated,
    /// All sections resolved
    SessionCompleted,
    /// Primary stream or validation failure
    SessionFailed,
    /// Session discarded
    SessionReset,
}

/// An event in the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Unique event ID
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: PipelineEventKind,
    /// Session token the event belongs to
    pub token: u64,
    /// Section index if applicable
    #[serde(default)]
    pub section: Option<usize>,
    /// Associated data (JSON)
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl PipelineEvent {
    /// Create a new event
    pub fn new(kind: PipelineEventKind, token: u64) -> Self {
        Self {
            id: event_id(),
            timestamp: Utc::now(),
            kind,
            token,
            section: None,
            data: None,
        }
    }

    /// Attach a section index
    pub fn with_section(mut self, index: usize) -> Self {
        self.section = Some(index);
        self
    }

    /// Add data to the event
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Time-ordered, collision-resistant event id (not cryptographic)
fn event_id() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    let salt = RandomState::new().build_hasher().finish() as u32;
    format!("{:x}-{:x}", nanos, salt)
}
