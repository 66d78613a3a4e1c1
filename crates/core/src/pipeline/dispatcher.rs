//! # Task Dispatcher
//!
//! Decides which discovered sections may start generating and guarantees at
//! most one task per index within a session.
//!
//! While the outline stream is open the last discovered section is held back
//! (its text may still grow): with `N` sections only `0..N-1` are eligible.
//! Once the stream has closed every index is eligible.
//!
//! Claiming reserves the map entry before the caller spawns anything, so two
//! back-to-back calls can never claim the same index twice.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;

/// Shared cell holding the current index of an in-flight task.
///
/// Deleting an earlier section shifts the value down so the task writes its
/// result to the slot its section moved to.
pub type IndexCell = Arc<AtomicUsize>;

/// A reserved dispatch, to be backed by a spawned task
#[derive(Debug, Clone)]
pub struct Claim {
    pub index: usize,
    pub attempt: u64,
    pub cell: IndexCell,
}

/// In-flight or completed generation task for one index
#[derive(Debug)]
pub struct TaskHandle {
    cell: IndexCell,
    attempt: u64,
    join: Option<JoinHandle<()>>,
    dispatched_at: Instant,
}

impl TaskHandle {
    pub fn dispatched_at(&self) -> Instant {
        self.dispatched_at
    }
}

/// Join handle taken out of the map for awaiting
#[derive(Debug)]
pub struct PendingTask {
    pub cell: IndexCell,
    pub attempt: u64,
    pub join: JoinHandle<()>,
}

/// Map from section index to its task
#[derive(Debug, Default)]
pub struct TaskDispatcher {
    tasks: BTreeMap<usize, TaskHandle>,
    next_attempt: u64,
}

impl TaskDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices eligible for dispatch given `count` discovered sections
    pub fn eligible(count: usize, stream_open: bool) -> Range<usize> {
        if stream_open {
            0..count.saturating_sub(1)
        } else {
            0..count
        }
    }

    /// Reserve every eligible index that has no task yet
    pub fn claim(&mut self, count: usize, stream_open: bool) -> Vec<Claim> {
        let mut claims = Vec::new();
        for index in Self::eligible(count, stream_open) {
            if self.tasks.contains_key(&index) {
                continue;
            }
            claims.push(self.reserve(index));
        }
        claims
    }

    /// Reserve `index` even if it already has a task, replacing it.
    ///
    /// A still-running previous task is aborted; its attempt id no longer
    /// matches, so a late completion is ignored.
    pub fn reclaim(&mut self, index: usize) -> Claim {
        if let Some(previous) = self.tasks.remove(&index) {
            if let Some(join) = previous.join {
                join.abort();
            }
        }
        self.reserve(index)
    }

    fn reserve(&mut self, index: usize) -> Claim {
        self.next_attempt += 1;
        let claim = Claim {
            index,
            attempt: self.next_attempt,
            cell: Arc::new(AtomicUsize::new(index)),
        };
        self.tasks.insert(
            index,
            TaskHandle {
                cell: claim.cell.clone(),
                attempt: claim.attempt,
                join: None,
                dispatched_at: Instant::now(),
            },
        );
        claim
    }

    /// Attach the spawned task to its reservation
    pub fn attach(&mut self, claim: &Claim, join: JoinHandle<()>) {
        let index = claim.cell.load(Ordering::SeqCst);
        match self.tasks.get_mut(&index) {
            Some(handle) if handle.attempt == claim.attempt => handle.join = Some(join),
            _ => join.abort(),
        }
    }

    /// Whether `attempt` is still the live task for `index`
    pub fn is_current(&self, index: usize, attempt: u64) -> bool {
        self.tasks
            .get(&index)
            .is_some_and(|handle| handle.attempt == attempt)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.tasks.contains_key(&index)
    }

    pub fn get(&self, index: usize) -> Option<&TaskHandle> {
        self.tasks.get(&index)
    }

    /// Number of indices that ever received a task
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Take every outstanding join handle, leaving the entries in place
    pub fn take_pending(&mut self) -> Vec<PendingTask> {
        self.tasks
            .values_mut()
            .filter_map(|handle| {
                handle.join.take().map(|join| PendingTask {
                    cell: handle.cell.clone(),
                    attempt: handle.attempt,
                    join,
                })
            })
            .collect()
    }

    /// Forget `index` and shift every later task down by one
    pub fn remove_and_shift(&mut self, index: usize) {
        if let Some(removed) = self.tasks.remove(&index) {
            if let Some(join) = removed.join {
                join.abort();
            }
        }
        let shifted: Vec<usize> = self.tasks.range(index + 1..).map(|(k, _)| *k).collect();
        for old in shifted {
            if let Some(handle) = self.tasks.remove(&old) {
                handle.cell.store(old - 1, Ordering::SeqCst);
                self.tasks.insert(old - 1, handle);
            }
        }
    }

    /// Abort every running task
    pub fn abort_all(&mut self) -> usize {
        let mut aborted = 0;
        for handle in self.tasks.values_mut() {
            if let Some(join) = handle.join.take() {
                if !join.is_finished() {
                    aborted += 1;
                }
                join.abort();
            }
        }
        aborted
    }
}
