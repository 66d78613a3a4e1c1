//! Scripted in-memory backend shared by the scenario tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deckforge_core::backend::GenerationBackend;
use deckforge_core::error::{PipelineError, Result};
use deckforge_core::models::{OutlineRequest, SectionRequest};
use deckforge_core::pipeline::{Coordinator, PipelineSnapshot};
use deckforge_core::stream::ByteStream;
use tokio::sync::mpsc;

/// `data:` line carrying one content delta
pub fn data(text: &str) -> String {
    format!("data: {}\n", serde_json::json!({ "content": text }))
}

pub fn error_line(message: &str) -> String {
    format!(
        "data: {}\n",
        serde_json::json!({ "error": { "message": message, "code": "upstream" } })
    )
}

pub const DONE: &str = "data: [DONE]\n";

/// Outline body delivering `chunks` one after another
pub fn outline_body(chunks: Vec<String>) -> ByteStream {
    let items: Vec<Result<Vec<u8>>> = chunks.into_iter().map(|c| Ok(c.into_bytes())).collect();
    Box::pin(futures::stream::iter(items))
}

/// Outline body fed by the test; closing the sender ends the stream
pub fn channel_body() -> (mpsc::UnboundedSender<String>, ByteStream) {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let body = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok(chunk.into_bytes()), rx))
    });
    (tx, Box::pin(body))
}

/// Outline text with one `# Title` section per entry, delta per line
pub fn outline_deltas(titles: &[&str]) -> Vec<String> {
    let mut chunks = Vec::new();
    for (i, title) in titles.iter().enumerate() {
        if i > 0 {
            chunks.push(data("---\n"));
        }
        chunks.push(data(&format!("# {title}\n")));
        chunks.push(data(&format!("- point about {title}\n")));
    }
    chunks.push(DONE.to_string());
    chunks
}

/// How the backend answers a section request
#[derive(Clone)]
pub enum SectionScript {
    /// Echo the section title after `delay`
    Echo { delay: Duration },
    /// Fail to open the stream
    Refuse(PipelineError),
    /// Open, then emit an error event
    ErrorEvent(String),
}

impl Default for SectionScript {
    fn default() -> Self {
        Self::Echo {
            delay: Duration::from_millis(5),
        }
    }
}

pub struct ScriptedBackend {
    outlines: Mutex<VecDeque<ByteStream>>,
    scripts: Mutex<HashMap<usize, SectionScript>>,
    default_script: SectionScript,
    open_delay: Duration,
    pub outline_calls: AtomicUsize,
    pub section_calls: Mutex<Vec<SectionRequest>>,
    /// Per-index count of section opens, used for versioned artifacts
    versions: Mutex<HashMap<usize, usize>>,
    pub completed: Arc<AtomicUsize>,
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            outlines: Mutex::new(VecDeque::new()),
            scripts: Mutex::new(HashMap::new()),
            default_script: SectionScript::default(),
            open_delay: Duration::ZERO,
            outline_calls: AtomicUsize::new(0),
            section_calls: Mutex::new(Vec::new()),
            versions: Mutex::new(HashMap::new()),
            completed: Arc::new(AtomicUsize::new(0)),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_outline(self, body: ByteStream) -> Self {
        self.outlines.lock().unwrap().push_back(body);
        self
    }

    pub fn with_section_delay(mut self, delay: Duration) -> Self {
        self.default_script = SectionScript::Echo { delay };
        self
    }

    /// Hold every section open call for `delay`
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn script(self, index: usize, script: SectionScript) -> Self {
        self.scripts.lock().unwrap().insert(index, script);
        self
    }

    /// Fall back to the default script for `index`
    pub fn clear_script(&self, index: usize) {
        self.scripts.lock().unwrap().remove(&index);
    }

    pub fn push_outline(&self, body: ByteStream) {
        self.outlines.lock().unwrap().push_back(body);
    }

    /// Indices of every section request received so far
    pub fn requested_indices(&self) -> Vec<usize> {
        self.section_calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.section_index)
            .collect()
    }
}

fn title_of(section_text: &str) -> String {
    section_text
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim_start_matches('#')
        .trim()
        .to_string()
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn open_outline(&self, _request: &OutlineRequest) -> Result<ByteStream> {
        self.outline_calls.fetch_add(1, Ordering::SeqCst);
        self.outlines
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PipelineError::connection("no outline scripted"))
    }

    async fn open_section(&self, request: &SectionRequest) -> Result<ByteStream> {
        self.section_calls.lock().unwrap().push(request.clone());
        let version = {
            let mut versions = self.versions.lock().unwrap();
            let v = versions.entry(request.section_index).or_insert(0);
            *v += 1;
            *v
        };
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&request.section_index)
            .cloned()
            .unwrap_or_else(|| self.default_script.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        match script {
            SectionScript::Refuse(err) => Err(err),
            SectionScript::ErrorEvent(message) => {
                let items: Vec<Result<Vec<u8>>> = vec![Ok(error_line(&message).into_bytes())];
                Ok(Box::pin(futures::stream::iter(items)))
            }
            SectionScript::Echo { delay } => {
                let title = title_of(&request.section_text);
                let completed = self.completed.clone();
                let body = futures::stream::once(async move {
                    tokio::time::sleep(delay).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    let text = format!(
                        "{}{}{}",
                        data(&format!("<section><h1>{title}</h1>")),
                        data(&format!("<p>v{version}</p></section>")),
                        DONE
                    );
                    Ok(text.into_bytes())
                });
                Ok(Box::pin(body))
            }
        }
    }
}

/// Poll the coordinator until `check` holds, panicking after two seconds
pub async fn wait_for<F>(coordinator: &Coordinator, mut check: F) -> PipelineSnapshot
where
    F: FnMut(&PipelineSnapshot) -> bool,
{
    for _ in 0..400 {
        let snapshot = coordinator.snapshot().await;
        if check(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached: {:?}", coordinator.snapshot().await);
}
