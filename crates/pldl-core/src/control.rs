//! Job registry: id → cancellation token, lifecycle state and task handle.
//!
//! The orchestrator registers each accepted job here. A cancel request only
//! flips the job's token; the worker polls it between items and stops at the
//! next boundary. The owning worker removes its entry when it terminates.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Opaque job identifier (UUID v4), never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Lifecycle of a job. Only the first three are ever observed in the
/// registry; terminal states are reported through the event bus as the
/// entry is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Resolving,
    Downloading,
    Cancelled,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Cancelled | JobState::Completed | JobState::Failed
        )
    }
}

/// Shared cancellation flag. Goes false → true once and never back.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Point-in-time view of a registered job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub source_url: String,
    pub state: JobState,
    pub cancel_requested: bool,
}

struct JobEntry {
    source_url: String,
    state: JobState,
    cancel: CancelToken,
    task: Option<JoinHandle<()>>,
}

/// Process-wide registry of active jobs. The map is never exposed; all
/// access goes through these methods under the lock.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new Pending job; returns its id and the token its worker polls.
    pub fn create(&self, source_url: &str) -> (JobId, CancelToken) {
        let id = JobId::new();
        let cancel = CancelToken::new();
        self.write().insert(
            id,
            JobEntry {
                source_url: source_url.to_string(),
                state: JobState::Pending,
                cancel: cancel.clone(),
                task: None,
            },
        );
        tracing::debug!(job_id = %id, "job registered");
        (id, cancel)
    }

    /// Request cancellation. Returns false if the id is unknown (never
    /// registered or already terminated).
    pub fn request_cancel(&self, id: JobId) -> bool {
        match self.read().get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove a job. Removing an unknown id is a no-op.
    pub fn remove(&self, id: JobId) {
        if self.write().remove(&id).is_some() {
            tracing::debug!(job_id = %id, "job unregistered");
        }
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn state(&self, id: JobId) -> Option<JobState> {
        self.read().get(&id).map(|e| e.state)
    }

    /// Record a lifecycle transition made by the job's worker.
    pub fn set_state(&self, id: JobId, state: JobState) {
        if let Some(entry) = self.write().get_mut(&id) {
            entry.state = state;
        }
    }

    /// Store the job's supervising task. If the job already terminated the
    /// handle is dropped, which detaches the (finished) task.
    pub fn attach_task(&self, id: JobId, handle: JoinHandle<()>) {
        if let Some(entry) = self.write().get_mut(&id) {
            entry.task = Some(handle);
        }
    }

    /// Cancel every active job and hand back their task handles.
    pub fn cancel_all(&self) -> Vec<JoinHandle<()>> {
        let mut jobs = self.write();
        jobs.values_mut()
            .filter_map(|entry| {
                entry.cancel.cancel();
                entry.task.take()
            })
            .collect()
    }

    /// Active jobs, in no particular order.
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        self.read()
            .iter()
            .map(|(id, entry)| JobSnapshot {
                id: *id,
                source_url: entry.source_url.clone(),
                state: entry.state,
                cancel_requested: entry.cancel.is_cancelled(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Removes the job from the registry when dropped, so cleanup runs on every
/// exit path of the supervising task, unwinding included.
pub(crate) struct RegistrationGuard {
    registry: Arc<JobRegistry>,
    id: JobId,
}

impl RegistrationGuard {
    pub(crate) fn new(registry: Arc<JobRegistry>, id: JobId) -> Self {
        Self { registry, id }
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Default path for the control socket (XDG state dir, next to the log).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("pldl")?.get_state_home();
    Ok(dir.join("control.sock"))
}
