//! Job lifecycle management: cooperative cancellation, partial results,
//! and rate-limited progress emission.
//!
//! A job is transient state around one harvest run, keyed by a
//! caller-assigned id (typically the progress-message identity in the host
//! UI). The [`JobRegistry`] is the single authority over live jobs; the
//! running task holds a [`JobHandle`] and polls its token at every loop
//! boundary. Cancellation is cooperative — there is no preemption and no
//! built-in timeout.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::Member;

/// Lifecycle state of a harvest job.
///
/// `Running` transitions exactly once, to one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

impl FromStr for JobState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "cancelled" => Ok(JobState::Cancelled),
            "failed" => Ok(JobState::Failed),
            _ => Err(AppError::Generic(format!("Unknown job state: {}", s))),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct JobInner {
    state: JobState,
    /// Append-only, first-discovery order. Frozen once the state is terminal.
    partial: Vec<Member>,
}

/// Handle held by the task running a job.
///
/// Cloning shares the same underlying job entry.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: i64,
    token: CancellationToken,
    inner: Arc<Mutex<JobInner>>,
}

impl JobHandle {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn state(&self) -> JobState {
        self.inner.lock().expect("job lock poisoned").state
    }

    /// Appends newly discovered members to the partial buffer.
    ///
    /// No-op once the job is terminal; the buffer observed by a cancelled
    /// job's exporter never grows afterwards.
    pub fn append_partial(&self, members: &[Member]) {
        let mut inner = self.inner.lock().expect("job lock poisoned");
        if inner.state == JobState::Running {
            inner.partial.extend_from_slice(members);
        }
    }

    pub fn partial_len(&self) -> usize {
        self.inner.lock().expect("job lock poisoned").partial.len()
    }
}

/// Registry of live jobs, keyed by caller-assigned id.
///
/// Replaces ad-hoc per-job global maps: every transition goes through here.
/// The internal mutex guards only map entries; two jobs never contend over
/// the same entry.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<i64, JobHandle>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new running job. A stale entry under the same id (e.g. a
    /// cancelled job whose partial export was never claimed) is discarded.
    pub fn start(&self, job_id: i64) -> JobHandle {
        let handle = JobHandle {
            id: job_id,
            token: CancellationToken::new(),
            inner: Arc::new(Mutex::new(JobInner {
                state: JobState::Running,
                partial: Vec::new(),
            })),
        };
        self.jobs
            .lock()
            .expect("registry lock poisoned")
            .insert(job_id, handle.clone());
        handle
    }

    /// Requests cancellation. Idempotent; returns true when a live running
    /// job was found.
    pub fn cancel(&self, job_id: i64) -> bool {
        let jobs = self.jobs.lock().expect("registry lock poisoned");
        match jobs.get(&job_id) {
            Some(handle) => {
                let was_running = handle.state() == JobState::Running;
                handle.token.cancel();
                was_running
            }
            None => false,
        }
    }

    /// Current state of a job, if registered.
    pub fn state(&self, job_id: i64) -> Option<JobState> {
        self.jobs
            .lock()
            .expect("registry lock poisoned")
            .get(&job_id)
            .map(|h| h.state())
    }

    /// Finalizes a job.
    ///
    /// `Completed` and `Failed` entries are removed immediately, their
    /// buffers discarded. A `Cancelled` entry is retained so the partial
    /// buffer can be claimed once via [`export_partial`](Self::export_partial).
    pub fn finish(&self, job_id: i64, state: JobState) {
        debug_assert!(state.is_terminal());
        let mut jobs = self.jobs.lock().expect("registry lock poisoned");
        if let Some(handle) = jobs.get(&job_id) {
            handle.inner.lock().expect("job lock poisoned").state = state;
            if state != JobState::Cancelled {
                jobs.remove(&job_id);
            }
        }
    }

    /// Consumes the partial buffer of a cancelled job.
    ///
    /// Returns the buffered members exactly once; the entry is removed, so
    /// a second call (or a call for a non-cancelled job) returns `None`.
    pub fn export_partial(&self, job_id: i64) -> Option<Vec<Member>> {
        let mut jobs = self.jobs.lock().expect("registry lock poisoned");
        let cancelled = jobs
            .get(&job_id)
            .is_some_and(|h| h.state() == JobState::Cancelled);
        if !cancelled {
            return None;
        }
        let handle = jobs.remove(&job_id)?;
        let mut inner = handle.inner.lock().expect("job lock poisoned");
        Some(std::mem::take(&mut inner.partial))
    }

    pub fn running_count(&self) -> usize {
        self.jobs
            .lock()
            .expect("registry lock poisoned")
            .values()
            .filter(|h| h.state() == JobState::Running)
            .count()
    }
}

/// Rate limiter for progress emission.
///
/// Admits an update when either the time window or the item-count threshold
/// has elapsed since the last admitted update, whichever fires first.
#[derive(Debug)]
pub struct ProgressGate {
    interval: Duration,
    every: usize,
    last_emit: Option<Instant>,
    items_since: usize,
}

impl ProgressGate {
    pub fn new(interval: Duration, every: usize) -> Self {
        Self {
            interval,
            every: every.max(1),
            last_emit: None,
            items_since: 0,
        }
    }

    /// Records `new_items` and decides whether an update may be emitted now.
    ///
    /// The very first update always passes.
    pub fn admit(&mut self, new_items: usize) -> bool {
        self.items_since += new_items;
        let due = match self.last_emit {
            None => true,
            Some(last) => self.items_since >= self.every || last.elapsed() >= self.interval,
        };
        if due {
            self.last_emit = Some(Instant::now());
            self.items_since = 0;
        }
        due
    }
}
