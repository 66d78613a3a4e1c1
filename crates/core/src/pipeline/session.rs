//! # Session State
//!
//! All mutable state of one `generate()` invocation lives here and is owned
//! by the coordinator behind a single lock. Section tasks never hold a copy
//! of the collections; they address the store and the dispatcher by index.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::dispatcher::TaskDispatcher;
use super::stage::Stage;
use super::store::{ResultStore, Section};
use crate::error::{PipelineError, Result};
use crate::models::GenerationRequest;

/// Observable state of the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    /// Token of the live session
    pub token: u64,
    pub is_generating: bool,
    /// 0-100
    pub progress: f64,
    pub stage: Stage,
    pub sections: Vec<Section>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// One generation session
#[derive(Debug)]
pub struct Session {
    /// Increases with every new or reset session
    pub token: u64,
    pub stage: Stage,
    /// Accumulated outline text
    pub buffer: String,
    pub store: ResultStore,
    pub dispatcher: TaskDispatcher,
    /// High-water mark of discovered sections
    pub expected_count: usize,
    pub progress: f64,
    pub started_at: Instant,
    pub error_message: Option<String>,
    pub request: Option<GenerationRequest>,
    /// Fires on reset; aborts the outline reader and wakes waiters
    pub cancel: CancellationToken,
}

impl Session {
    /// An empty, idle session
    pub fn new(token: u64) -> Self {
        Self {
            token,
            stage: Stage::Idle,
            buffer: String::new(),
            store: ResultStore::new(),
            dispatcher: TaskDispatcher::new(),
            expected_count: 0,
            progress: 0.0,
            started_at: Instant::now(),
            error_message: None,
            request: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A session about to open the outline stream
    pub fn start(token: u64, request: GenerationRequest) -> Self {
        Self {
            stage: Stage::Connecting,
            request: Some(request),
            ..Self::new(token)
        }
    }

    /// Move along the lifecycle, rejecting transitions it does not allow
    pub fn transition(&mut self, to: Stage) -> Result<()> {
        if !self.stage.can_transition_to(to) {
            return Err(PipelineError::InvalidState {
                operation: "transition",
                stage: self.stage,
            });
        }
        tracing::info!(token = self.token, from = ?self.stage, to = ?to, "stage transition");
        self.stage = to;
        Ok(())
    }

    /// Reconcile the store with a fresh segmentation.
    ///
    /// Appends newly discovered sections, refreshes the text of sections not
    /// yet dispatched, and drops a pending tail that disappeared. Returns the
    /// indices that were newly discovered.
    pub fn apply_segments(&mut self, sections: &[String]) -> Vec<usize> {
        let removed = self.store.truncate_pending(sections.len());
        if removed > 0 {
            tracing::debug!(token = self.token, removed, "pending tail withdrawn");
        }

        for (index, text) in sections.iter().enumerate().take(self.store.len()) {
            self.store.update_source(index, text);
        }

        let mut discovered = Vec::new();
        for text in sections.iter().skip(self.store.len()) {
            discovered.push(self.store.append(text.clone()));
        }

        self.expected_count = self.expected_count.max(self.store.len());
        discovered
    }

    /// Raise progress to `value`; returns whether it moved
    pub fn raise_progress(&mut self, value: f64) -> bool {
        let value = value.clamp(0.0, 100.0);
        if value > self.progress {
            self.progress = value;
            true
        } else {
            false
        }
    }

    /// Mark the session failed
    pub fn fail(&mut self, error: &PipelineError) {
        tracing::warn!(token = self.token, stage = ?self.stage, error = %error, "session failed");
        self.stage = Stage::Error;
        self.progress = 0.0;
        self.error_message = Some(error.to_string());
        self.dispatcher.abort_all();
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            token: self.token,
            is_generating: self.stage.is_active(),
            progress: self.progress,
            stage: self.stage,
            sections: self.store.sections().to_vec(),
            error_message: self.error_message.clone(),
        }
    }
}
