//! Process-wide event bus for job progress and lifecycle events.
//!
//! Built on a `tokio::sync::broadcast` channel. Observers only see events
//! published after they subscribed: there is no replay buffer, so a client
//! that attaches mid-job misses everything before that point. Publishing
//! never blocks; an observer that falls more than `capacity` events behind
//! loses the oldest ones instead of stalling the worker.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::control::JobId;

/// One failed item in a job's `complete` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub title: String,
    pub reason: String,
}

/// Point-in-time snapshot of one item's transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub title: String,
    pub downloaded_bytes: u64,
    /// None when the backend does not know the size up front.
    pub total_bytes: Option<u64>,
    /// Transfer rate in bytes per second.
    pub speed: Option<f64>,
    /// Estimated seconds remaining.
    pub eta: Option<u64>,
    pub filename: String,
}

/// Events pushed to observers. Each job produces exactly one terminal event
/// (`Stopped`, `Complete` or `Error`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Item `current` of `total` is about to be attempted.
    Status {
        job_id: JobId,
        current: usize,
        total: usize,
        title: String,
    },
    Progress {
        job_id: JobId,
        #[serde(flatten)]
        progress: ProgressEvent,
    },
    ItemFinished {
        job_id: JobId,
        title: String,
        filename: String,
    },
    Stopped {
        job_id: JobId,
        message: String,
    },
    Complete {
        job_id: JobId,
        message: String,
        failed: Vec<ItemFailure>,
    },
    Error {
        job_id: JobId,
        error: String,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Status { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::ItemFinished { job_id, .. }
            | JobEvent::Stopped { job_id, .. }
            | JobEvent::Complete { job_id, .. }
            | JobEvent::Error { job_id, .. } => *job_id,
        }
    }

    /// True for the event that ends a job's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::Stopped { .. } | JobEvent::Complete { .. } | JobEvent::Error { .. }
        )
    }
}

/// Cheaply cloneable handle to the broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Deliver `event` to every current observer. Having no observers is not an error.
    pub fn publish(&self, event: JobEvent) {
        let receivers = self.tx.receiver_count();
        if self.tx.send(event).is_err() {
            tracing::trace!("event dropped: no observers");
        } else {
            tracing::trace!(receivers, "event published");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
