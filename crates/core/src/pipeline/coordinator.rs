//! # Pipeline Coordinator
//!
//! Drives one outline stream, dispatches a section task for every section
//! as soon as it is closed, and keeps the observable state current.
//!
//! ```text
//! outline delta ─▶ buffer ─▶ segment ─▶ discover ─▶ claim ─▶ spawn section task
//!                                 │                                 │
//!                                 └──▶ progress          result ◀───┘ (by index, token-checked)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use deckforge_core::backend::HttpBackend;
//! use deckforge_core::models::{GenerationRequest, UpstreamConfig};
//! use deckforge_core::pipeline::{Coordinator, PipelineConfig};
//!
//! let backend = Arc::new(HttpBackend::new(UpstreamConfig::default())?);
//! let coordinator = Coordinator::new(PipelineConfig::default(), backend);
//! let snapshot = coordinator.generate(GenerationRequest::new("Quarterly Review")).await?;
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::dispatcher::{Claim, IndexCell, PendingTask};
use super::events::{PipelineEvent, PipelineEventKind};
use super::generator::SectionGenerator;
use super::progress::{ProgressConfig, ProgressEstimator};
use super::segmenter::{Segmenter, DEFAULT_DELIMITER};
use super::session::{PipelineSnapshot, Session};
use super::stage::Stage;
use super::store::{placeholder_text, SectionStatus, SectionValue};
use crate::auth::{AllowAll, Authorizer};
use crate::backend::GenerationBackend;
use crate::error::{PipelineError, Result};
use crate::models::GenerationRequest;
use crate::prompts::{self, DefaultTemplates, PromptTemplates};
use crate::stream::StreamReader;

/// Configuration for the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Line token separating outline sections
    pub delimiter: String,
    pub progress: ProgressConfig,
    /// Cap on concurrent section streams (None = unbounded)
    pub max_concurrent_sections: Option<usize>,
    /// Abort in-flight section tasks on reset instead of letting them
    /// finish and discarding their results
    pub cancel_on_reset: bool,
    /// Buffer size for event channels created by embedders
    pub event_channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            progress: ProgressConfig::default(),
            max_concurrent_sections: None,
            cancel_on_reset: false,
            event_channel_capacity: 256,
        }
    }
}

struct State {
    session: Session,
    /// Survives reset so `retry()` can replay it
    last_request: Option<GenerationRequest>,
}

/// Shared by the coordinator and every section task
/// Claim on a session installed by [`Coordinator::begin`].
///
/// Consumed by [`Coordinator::drive`], so a session is run at most once.
#[derive(Debug)]
#[must_use = "a claimed session does nothing until driven"]
pub struct SessionTicket {
    token: u64,
    request: GenerationRequest,
    cancel: CancellationToken,
}

impl SessionTicket {
    pub fn token(&self) -> u64 {
        self.token
    }
}

#[derive(Clone)]
struct TaskContext {
    state: Arc<Mutex<State>>,
    generator: Arc<SectionGenerator>,
    estimator: ProgressEstimator,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl TaskContext {
    async fn emit(&self, events: Vec<PipelineEvent>) {
        if let Some(tx) = &self.event_tx {
            for event in events {
                let _ = tx.send(event).await;
            }
        }
    }

    /// Record a section result, dropping it if its session or attempt is gone
    async fn finish_section(
        &self,
        token: u64,
        cell: &IndexCell,
        attempt: u64,
        result: Result<String>,
    ) {
        let events = {
            let mut state = self.state.lock().await;
            let session = &mut state.session;
            let index = cell.load(Ordering::SeqCst);

            if session.token != token {
                tracing::debug!(token, live = session.token, index, "dropping stale section result");
                return;
            }
            if !session.dispatcher.is_current(index, attempt) {
                tracing::debug!(token, index, attempt, "dropping superseded section result");
                return;
            }

            let elapsed_ms = session
                .dispatcher
                .get(index)
                .map_or(0, |handle| handle.dispatched_at().elapsed().as_millis() as u64);

            let mut events = Vec::new();
            let written = match result {
                Ok(artifact) => {
                    let bytes = artifact.len();
                    tracing::debug!(token, index, bytes, elapsed_ms, "section ready");
                    let written = session.store.upsert(index, SectionValue::Artifact(artifact));
                    events.push(
                        PipelineEvent::new(PipelineEventKind::SectionReady, token)
                            .with_section(index)
                            .with_data(serde_json::json!({ "bytes": bytes, "elapsed_ms": elapsed_ms })),
                    );
                    written
                }
                Err(e) => {
                    tracing::warn!(token, index, elapsed_ms, error = %e, "section generation failed");
                    let message = e.to_string();
                    let written = session.store.upsert(index, SectionValue::Error(message.clone()));
                    events.push(
                        PipelineEvent::new(PipelineEventKind::SectionFailed, token)
                            .with_section(index)
                            .with_data(serde_json::json!({ "error": message })),
                    );
                    written
                }
            };
            if let Err(e) = written {
                tracing::warn!(token, index, error = %e, "section result had no slot");
                return;
            }

            if session.stage == Stage::Completing {
                let value = self.estimator.completing(
                    session.store.resolved_count(),
                    session.store.len(),
                    session.progress,
                );
                // 100 is reserved for the completion step
                if session.raise_progress(value.min(99.0)) {
                    events.push(progress_event(session));
                }
            }
            events
        };
        self.emit(events).await;
    }
}

fn progress_event(session: &Session) -> PipelineEvent {
    PipelineEvent::new(PipelineEventKind::ProgressUpdated, session.token)
        .with_data(serde_json::json!({ "progress": session.progress }))
}

/// Orchestrates generation sessions
pub struct Coordinator {
    config: PipelineConfig,
    backend: Arc<dyn GenerationBackend>,
    authorizer: Arc<dyn Authorizer>,
    templates: Arc<dyn PromptTemplates>,
    segmenter: Segmenter,
    ctx: TaskContext,
}

impl Coordinator {
    /// Create a coordinator with default authorization and templates
    pub fn new(config: PipelineConfig, backend: Arc<dyn GenerationBackend>) -> Self {
        let segmenter = Segmenter::new(config.delimiter.clone());
        let estimator = ProgressEstimator::new(config.progress.clone(), segmenter.clone());

        let mut generator = SectionGenerator::new(backend.clone());
        if let Some(max) = config.max_concurrent_sections {
            generator = generator.with_max_concurrency(max);
        }

        Self {
            config,
            backend,
            authorizer: Arc::new(AllowAll),
            templates: Arc::new(DefaultTemplates),
            segmenter,
            ctx: TaskContext {
                state: Arc::new(Mutex::new(State {
                    session: Session::new(0),
                    last_request: None,
                })),
                generator: Arc::new(generator),
                estimator,
                event_tx: None,
            },
        }
    }

    /// Set event channel for streaming events
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.ctx.event_tx = Some(tx);
        self
    }

    /// Set the collaborator that approves requests
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Set the instruction templates merged into upstream requests
    pub fn with_templates(mut self, templates: Arc<dyn PromptTemplates>) -> Self {
        self.templates = templates;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current observable state
    pub async fn snapshot(&self) -> PipelineSnapshot {
        self.ctx.state.lock().await.session.snapshot()
    }

    /// Request retained for `retry()`
    pub async fn last_request(&self) -> Option<GenerationRequest> {
        self.ctx.state.lock().await.last_request.clone()
    }

    /// Run one session to completion.
    ///
    /// Returns the final snapshot once every section is Ready or Failed.
    /// Section failures do not fail the call; only outline-stream failures,
    /// an outline without sections, or a concurrent `reset()` do.
    pub async fn generate(&self, request: GenerationRequest) -> Result<PipelineSnapshot> {
        let ticket = self.begin(request).await?;
        self.drive(ticket).await
    }

    /// Validate, authorize and install a new session without running it.
    ///
    /// Of several concurrent callers at most one receives a ticket; the
    /// others fail with `InvalidState`. Hand the ticket to [`Coordinator::drive`].
    #[tracing::instrument(skip(self, request), fields(subject = %request.subject))]
    pub async fn begin(&self, request: GenerationRequest) -> Result<SessionTicket> {
        request.validate()?;
        self.ensure_idle().await?;

        self.authorizer
            .authorize(&request)
            .await
            .map_err(PipelineError::Unauthorized)?;

        let ticket = {
            let mut state = self.ctx.state.lock().await;
            // re-check: another caller may have started while we were authorizing
            if !state.session.stage.accepts_generate() {
                return Err(PipelineError::InvalidState {
                    operation: "generate",
                    stage: state.session.stage,
                });
            }
            let token = state.session.token + 1;
            self.retire(&mut state.session);
            state.session = Session::start(token, request.clone());
            state.last_request = Some(request.clone());
            SessionTicket {
                token,
                cancel: state.session.cancel.clone(),
                request,
            }
        };

        self.ctx
            .emit(vec![PipelineEvent::new(PipelineEventKind::SessionStarted, ticket.token)
                .with_data(serde_json::to_value(&ticket.request).unwrap_or_default())])
            .await;
        Ok(ticket)
    }

    /// Run the session claimed by `ticket` until every section resolves
    #[tracing::instrument(skip_all, fields(token = ticket.token))]
    pub async fn drive(&self, ticket: SessionTicket) -> Result<PipelineSnapshot> {
        let SessionTicket {
            token,
            request,
            cancel,
        } = ticket;

        match self.run_session(token, &request, cancel).await {
            Ok(snapshot) => Ok(snapshot),
            Err(PipelineError::SessionDiscarded) => Err(PipelineError::SessionDiscarded),
            Err(e) => {
                let failed = {
                    let mut state = self.ctx.state.lock().await;
                    if state.session.token == token {
                        state.session.fail(&e);
                        true
                    } else {
                        false
                    }
                };
                if failed {
                    self.ctx
                        .emit(vec![PipelineEvent::new(PipelineEventKind::SessionFailed, token)
                            .with_data(serde_json::json!({ "error": e.to_string() }))])
                        .await;
                    Err(e)
                } else {
                    Err(PipelineError::SessionDiscarded)
                }
            }
        }
    }

    async fn ensure_idle(&self) -> Result<()> {
        let stage = self.ctx.state.lock().await.session.stage;
        if stage.accepts_generate() {
            Ok(())
        } else {
            Err(PipelineError::InvalidState {
                operation: "generate",
                stage,
            })
        }
    }

    async fn run_session(
        &self,
        token: u64,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<PipelineSnapshot> {
        let outline_request = prompts::outline_request(self.templates.as_ref(), request);
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::SessionDiscarded),
            body = self.backend.open_outline(&outline_request) => body?,
        };

        {
            let mut state = self.ctx.state.lock().await;
            live(&state.session, token)?;
            state.session.transition(Stage::Generating)?;
        }

        let mut reader = StreamReader::new(body)
            .with_label("outline")
            .with_cancellation(cancel.child_token());

        while let Some(delta) = reader.next_delta().await {
            let delta = delta?;
            let events = {
                let mut state = self.ctx.state.lock().await;
                live(&state.session, token)?;
                state.session.buffer.push_str(&delta);
                self.absorb(&mut state.session, request, true)
            };
            self.ctx.emit(events).await;
        }

        let events = {
            let mut state = self.ctx.state.lock().await;
            live(&state.session, token)?;
            let session = &mut state.session;

            if self.segmenter.segment(&session.buffer).is_empty() {
                return Err(PipelineError::NoSections);
            }
            let mut events = self.absorb(session, request, false);
            session.transition(Stage::Completing)?;

            let value = self.ctx.estimator.completing(
                session.store.resolved_count(),
                session.store.len(),
                session
                    .progress
                    .max(self.ctx.estimator.config().completing_checkpoint),
            );
            if session.raise_progress(value.min(99.0)) {
                events.push(progress_event(session));
            }
            tracing::info!(token, sections = session.store.len(), "outline complete");
            events
        };
        self.ctx.emit(events).await;

        self.await_tasks(token, &cancel).await?;

        let (snapshot, events) = {
            let mut state = self.ctx.state.lock().await;
            live(&state.session, token)?;
            let session = &mut state.session;
            session.transition(Stage::Idle)?;
            session.raise_progress(100.0);

            let failed = session
                .store
                .sections()
                .iter()
                .filter(|s| s.status == SectionStatus::Failed)
                .count();
            let events = vec![
                progress_event(session),
                PipelineEvent::new(PipelineEventKind::SessionCompleted, token).with_data(
                    serde_json::json!({ "sections": session.store.len(), "failed": failed }),
                ),
            ];
            (session.snapshot(), events)
        };
        self.ctx.emit(events).await;

        Ok(snapshot)
    }

    /// Re-segment the buffer, record discoveries, dispatch eligible
    /// sections and refresh progress
    fn absorb(
        &self,
        session: &mut Session,
        request: &GenerationRequest,
        stream_open: bool,
    ) -> Vec<PipelineEvent> {
        let token = session.token;
        let sections = self.segmenter.segment(&session.buffer);
        let mut events: Vec<PipelineEvent> = session
            .apply_segments(&sections)
            .into_iter()
            .map(|index| {
                PipelineEvent::new(PipelineEventKind::SectionDiscovered, token).with_section(index)
            })
            .collect();

        let total = session.expected_count.max(sections.len());
        for claim in session.dispatcher.claim(sections.len(), stream_open) {
            let text = &sections[claim.index];
            events.push(self.dispatch(session, request, &claim, text, total));
        }

        if stream_open {
            let value =
                self.ctx
                    .estimator
                    .estimate(&session.buffer, session.started_at, session.progress);
            if session.raise_progress(value) {
                events.push(progress_event(session));
            }
        }
        events
    }

    /// Back a claim with a running section task
    fn dispatch(
        &self,
        session: &mut Session,
        request: &GenerationRequest,
        claim: &Claim,
        text: &str,
        total: usize,
    ) -> PipelineEvent {
        let token = session.token;
        let index = claim.index;
        if let Err(e) = session
            .store
            .upsert(index, SectionValue::Placeholder(placeholder_text(index, total)))
        {
            tracing::warn!(token, index, error = %e, "claimed section has no slot");
        }

        let section_request =
            prompts::section_request(self.templates.as_ref(), request, text, index, total);
        let ctx = self.ctx.clone();
        let cell = claim.cell.clone();
        let attempt = claim.attempt;
        let join = tokio::spawn(async move {
            let result = ctx.generator.generate(&section_request).await;
            ctx.finish_section(token, &cell, attempt, result).await;
        });
        session.dispatcher.attach(claim, join);

        tracing::debug!(token, index, attempt, total, "section dispatched");
        PipelineEvent::new(PipelineEventKind::SectionDispatched, token)
            .with_section(index)
            .with_data(serde_json::json!({ "total": total, "attempt": attempt }))
    }

    /// Wait until no task of session `token` is outstanding
    async fn await_tasks(&self, token: u64, cancel: &CancellationToken) -> Result<()> {
        loop {
            let pending: Vec<PendingTask> = {
                let mut state = self.ctx.state.lock().await;
                live(&state.session, token)?;
                state.session.dispatcher.take_pending()
            };
            if pending.is_empty() {
                return Ok(());
            }

            for task in pending {
                let joined = tokio::select! {
                    _ = cancel.cancelled() => return Err(PipelineError::SessionDiscarded),
                    joined = task.join => joined,
                };
                if let Err(e) = joined {
                    if e.is_panic() {
                        self.ctx
                            .finish_section(
                                token,
                                &task.cell,
                                task.attempt,
                                Err(PipelineError::TaskFailed("section task panicked".to_string())),
                            )
                            .await;
                    }
                }
            }
        }
    }

    /// Wait until every section task of the live session has resolved
    pub async fn settle(&self) {
        let (token, cancel) = {
            let state = self.ctx.state.lock().await;
            (state.session.token, state.session.cancel.clone())
        };
        if let Err(e) = self.await_tasks(token, &cancel).await {
            tracing::debug!(token, error = %e, "settle interrupted");
        }
    }

    /// Discard the current session and return to Idle.
    ///
    /// The outline stream is aborted immediately. Section tasks already in
    /// flight are aborted when `cancel_on_reset` is set; otherwise they run
    /// to completion and their results are dropped on arrival.
    pub async fn reset(&self) {
        let token = {
            let mut state = self.ctx.state.lock().await;
            let token = state.session.token + 1;
            self.retire(&mut state.session);
            state.session = Session::new(token);
            token
        };
        tracing::info!(token, "pipeline reset");
        self.ctx
            .emit(vec![PipelineEvent::new(PipelineEventKind::SessionReset, token)])
            .await;
    }

    fn retire(&self, session: &mut Session) {
        session.cancel.cancel();
        if self.config.cancel_on_reset {
            let aborted = session.dispatcher.abort_all();
            if aborted > 0 {
                tracing::info!(token = session.token, aborted, "aborted section tasks of retired session");
            }
        }
    }

    /// Reset and replay the last request
    pub async fn retry(&self) -> Result<PipelineSnapshot> {
        let ticket = self.begin_retry().await?;
        self.drive(ticket).await
    }

    /// Reset and claim a session for the last request without running it
    pub async fn begin_retry(&self) -> Result<SessionTicket> {
        let request = self
            .last_request()
            .await
            .ok_or(PipelineError::NothingToRetry)?;
        self.reset().await;
        self.begin(request).await
    }

    /// Overwrite a section's artifact directly, bypassing generation
    pub async fn update_section_content(&self, index: usize, content: impl Into<String>) -> Result<()> {
        let token = {
            let mut state = self.ctx.state.lock().await;
            let session = &mut state.session;
            let status = section_status(session, index)?;
            if matches!(status, SectionStatus::Pending | SectionStatus::Dispatched) {
                return Err(PipelineError::Busy { index });
            }
            session.store.upsert(index, SectionValue::Artifact(content.into()))?;
            session.token
        };
        self.ctx
            .emit(vec![PipelineEvent::new(PipelineEventKind::SectionUpdated, token).with_section(index)])
            .await;
        Ok(())
    }

    /// Generate one section again, replacing its current result.
    ///
    /// Stage and progress are left untouched. A still-running previous task
    /// for the index is superseded.
    pub async fn regenerate_chapter(&self, index: usize, request: GenerationRequest) -> Result<()> {
        request.validate()?;
        let event = {
            let mut state = self.ctx.state.lock().await;
            let session = &mut state.session;
            let status = section_status(session, index)?;
            if status == SectionStatus::Pending {
                return Err(PipelineError::Busy { index });
            }
            let text = session
                .store
                .get(index)
                .map(|s| s.source_text.clone())
                .unwrap_or_default();
            let total = session.store.len();
            let claim = session.dispatcher.reclaim(index);
            tracing::info!(token = session.token, index, "regenerating section");
            self.dispatch(session, &request, &claim, &text, total)
        };
        self.ctx.emit(vec![event]).await;
        Ok(())
    }

    /// Remove a section and shift later ones down by one.
    ///
    /// Rejected while the outline is still streaming, and with `Busy` when
    /// the section itself is still generating. Tasks of later sections keep
    /// running and land on their new index.
    pub async fn delete_chapter(&self, index: usize) -> Result<()> {
        let token = {
            let mut state = self.ctx.state.lock().await;
            let session = &mut state.session;
            if session.stage.is_streaming() {
                return Err(PipelineError::InvalidState {
                    operation: "delete a section",
                    stage: session.stage,
                });
            }
            if section_status(session, index)? == SectionStatus::Dispatched {
                return Err(PipelineError::Busy { index });
            }
            session.store.delete(index)?;
            session.dispatcher.remove_and_shift(index);
            session.expected_count = session.expected_count.saturating_sub(1);
            session.token
        };
        self.ctx
            .emit(vec![PipelineEvent::new(PipelineEventKind::SectionDeleted, token).with_section(index)])
            .await;
        Ok(())
    }
}

fn live(session: &Session, token: u64) -> Result<()> {
    if session.token == token {
        Ok(())
    } else {
        Err(PipelineError::SessionDiscarded)
    }
}

fn section_status(session: &Session, index: usize) -> Result<SectionStatus> {
    session
        .store
        .get(index)
        .map(|s| s.status)
        .ok_or(PipelineError::IndexOutOfRange {
            index,
            len: session.store.len(),
        })
}
