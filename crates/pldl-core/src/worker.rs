//! Per-job background task: resolve the playlist, download items in order,
//! forward progress, honour cancellation between items.
//!
//! `spawn_job` runs the worker inside a supervising task. The supervisor
//! owns the registry entry (removed through `RegistrationGuard` on every
//! exit path) and publishes the single terminal event, including for a
//! worker that panicked.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::backend::{MediaBackend, PlaylistItem, TransferObserver, TransferProgress};
use crate::control::{CancelToken, JobId, JobRegistry, JobState, RegistrationGuard};
use crate::events::{EventBus, ItemFailure, JobEvent, ProgressEvent};

pub const NO_ITEMS_MESSAGE: &str = "No videos found in playlist";
pub const STOPPED_MESSAGE: &str = "Download stopped by user";
pub const COMPLETED_MESSAGE: &str = "Download completed";

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { failed: Vec<ItemFailure> },
    Cancelled,
    Failed(String),
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed { .. } => JobState::Completed,
            JobOutcome::Cancelled => JobState::Cancelled,
            JobOutcome::Failed(_) => JobState::Failed,
        }
    }

    fn into_event(self, job_id: JobId) -> JobEvent {
        match self {
            JobOutcome::Completed { failed } => JobEvent::Complete {
                job_id,
                message: COMPLETED_MESSAGE.to_string(),
                failed,
            },
            JobOutcome::Cancelled => JobEvent::Stopped {
                job_id,
                message: STOPPED_MESSAGE.to_string(),
            },
            JobOutcome::Failed(error) => JobEvent::Error { job_id, error },
        }
    }
}

pub(crate) struct DownloadWorker {
    pub(crate) id: JobId,
    pub(crate) source_url: String,
    pub(crate) output_dir: PathBuf,
    pub(crate) backend: Arc<dyn MediaBackend>,
    pub(crate) registry: Arc<JobRegistry>,
    pub(crate) events: EventBus,
    pub(crate) cancel: CancelToken,
}

impl DownloadWorker {
    async fn run(self) -> JobOutcome {
        let id = self.id;
        self.registry.set_state(id, JobState::Resolving);
        tracing::info!(job_id = %id, url = %self.source_url, "resolving playlist");

        let items = match self.backend.resolve_playlist(&self.source_url).await {
            Ok(items) if items.is_empty() => {
                tracing::warn!(job_id = %id, "playlist resolved to no items");
                return JobOutcome::Failed(NO_ITEMS_MESSAGE.to_string());
            }
            Ok(items) => items,
            Err(e) => {
                tracing::error!(job_id = %id, "playlist resolution failed: {}", e);
                return JobOutcome::Failed(e.to_string());
            }
        };

        let total = items.len();
        tracing::info!(job_id = %id, total, "playlist resolved");
        self.registry.set_state(id, JobState::Downloading);

        let mut failed = Vec::new();
        for (index, item) in items.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::info!(job_id = %id, attempted = index, total, "download stopped by user");
                return JobOutcome::Cancelled;
            }

            let title = item.display_title().to_string();
            tracing::info!(job_id = %id, "downloading item {}/{}: {}", index + 1, total, title);
            self.events.publish(JobEvent::Status {
                job_id: id,
                current: index + 1,
                total,
                title: title.clone(),
            });

            if let Err(reason) = self.download_one(item, &title).await {
                tracing::warn!(job_id = %id, item = index + 1, "item failed: {}", reason);
                failed.push(ItemFailure { title, reason });
            }
        }

        // A cancel accepted during the last item still ends the job as stopped.
        if self.cancel.is_cancelled() {
            tracing::info!(job_id = %id, attempted = total, total, "download stopped by user");
            return JobOutcome::Cancelled;
        }

        tracing::info!(job_id = %id, total, failed = failed.len(), "playlist finished");
        JobOutcome::Completed { failed }
    }

    async fn download_one(&self, item: &PlaylistItem, title: &str) -> Result<(), String> {
        let forwarder = ProgressForwarder::new(self.id, title, self.events.clone());
        self.backend
            .download_item(item, &self.output_dir, &forwarder)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Forwards one item's transfer ticks to the bus. Bytes reported to
/// observers never go backwards within the item.
struct ProgressForwarder {
    job_id: JobId,
    title: String,
    events: EventBus,
    high_water: AtomicU64,
}

impl ProgressForwarder {
    fn new(job_id: JobId, title: &str, events: EventBus) -> Self {
        Self {
            job_id,
            title: title.to_string(),
            events,
            high_water: AtomicU64::new(0),
        }
    }
}

impl TransferObserver for ProgressForwarder {
    fn on_progress(&self, progress: TransferProgress) {
        let previous = self
            .high_water
            .fetch_max(progress.downloaded_bytes, Ordering::AcqRel);
        self.events.publish(JobEvent::Progress {
            job_id: self.job_id,
            progress: ProgressEvent {
                title: self.title.clone(),
                downloaded_bytes: progress.downloaded_bytes.max(previous),
                total_bytes: progress.total_bytes,
                speed: progress.speed,
                eta: progress.eta,
                filename: progress.filename,
            },
        });
    }

    fn on_finished(&self, filename: &str) {
        let filename = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());
        self.events.publish(JobEvent::ItemFinished {
            job_id: self.job_id,
            title: self.title.clone(),
            filename,
        });
    }
}

/// Start the worker for an already registered job. The returned handle
/// resolves after the registry entry is gone and the terminal event is out.
pub(crate) fn spawn_job(worker: DownloadWorker) -> JoinHandle<()> {
    let id = worker.id;
    let events = worker.events.clone();
    let guard = RegistrationGuard::new(Arc::clone(&worker.registry), id);

    tokio::spawn(async move {
        let outcome = match tokio::spawn(worker.run()).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                tracing::error!(job_id = %id, "download task panicked: {}", message);
                JobOutcome::Failed(format!("internal error: {message}"))
            }
            Err(e) => {
                tracing::error!(job_id = %id, "download task ended unexpectedly: {}", e);
                JobOutcome::Failed(format!("internal error: {e}"))
            }
        };

        tracing::info!(job_id = %id, state = ?outcome.state(), "job terminated");
        drop(guard);
        events.publish(outcome.into_event(id));
    })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarder_keeps_bytes_monotonic() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let fwd = ProgressForwarder::new(JobId::new(), "A", bus.clone());
        for bytes in [10, 50, 30, 60] {
            fwd.on_progress(TransferProgress {
                downloaded_bytes: bytes,
                ..TransferProgress::default()
            });
        }
        let mut seen = Vec::new();
        while let Ok(JobEvent::Progress { progress, .. }) = rx.try_recv() {
            seen.push(progress.downloaded_bytes);
        }
        assert_eq!(seen, vec![10, 50, 50, 60]);
    }

    #[test]
    fn forwarder_reports_base_name_on_finish() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let fwd = ProgressForwarder::new(JobId::new(), "A", bus.clone());
        fwd.on_finished("/srv/downloads/A.m4a");
        match rx.try_recv().unwrap() {
            JobEvent::ItemFinished { title, filename, .. } => {
                assert_eq!(title, "A");
                assert_eq!(filename, "A.m4a");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn outcome_maps_to_terminal_events() {
        let id = JobId::new();
        assert!(matches!(
            JobOutcome::Cancelled.into_event(id),
            JobEvent::Stopped { .. }
        ));
        assert!(matches!(
            JobOutcome::Failed("x".into()).into_event(id),
            JobEvent::Error { ref error, .. } if error == "x"
        ));
        assert_eq!(
            JobOutcome::Completed { failed: vec![] }.state(),
            JobState::Completed
        );
    }

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7u8)), "worker panicked");
    }
}
