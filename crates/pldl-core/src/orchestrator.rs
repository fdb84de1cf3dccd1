//! Facade the request layer talks to: start, cancel, observe, list artifacts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::artifacts::{self, Artifact};
use crate::backend::MediaBackend;
use crate::config::PldlConfig;
use crate::control::{JobId, JobRegistry, JobSnapshot};
use crate::error::OrchestratorError;
use crate::events::{EventBus, JobEvent};
use crate::worker::{spawn_job, DownloadWorker};

/// Starts jobs as independent tasks and never waits on their progress.
pub struct JobOrchestrator {
    registry: Arc<JobRegistry>,
    events: EventBus,
    backend: Arc<dyn MediaBackend>,
    output_dir: PathBuf,
    audio_extension: String,
}

impl JobOrchestrator {
    /// Build an orchestrator writing into `output_dir`, creating it if needed.
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        output_dir: impl Into<PathBuf>,
        audio_extension: impl Into<String>,
        event_capacity: usize,
    ) -> Result<Self, OrchestratorError> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|source| OrchestratorError::Io {
            path: output_dir.clone(),
            source,
        })?;
        Ok(Self {
            registry: Arc::new(JobRegistry::new()),
            events: EventBus::new(event_capacity),
            backend,
            output_dir,
            audio_extension: audio_extension.into(),
        })
    }

    pub fn from_config(
        backend: Arc<dyn MediaBackend>,
        cfg: &PldlConfig,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, OrchestratorError> {
        Self::new(backend, output_dir, &cfg.audio_extension, cfg.event_capacity)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Accept a playlist reference and launch its worker. Returns as soon as
    /// the job is registered. Must be called within a Tokio runtime.
    pub fn start(&self, source_url: &str) -> Result<JobId, OrchestratorError> {
        let source_url = source_url.trim();
        if source_url.is_empty() {
            return Err(OrchestratorError::EmptySourceUrl);
        }

        let (id, cancel) = self.registry.create(source_url);
        let handle = spawn_job(DownloadWorker {
            id,
            source_url: source_url.to_string(),
            output_dir: self.output_dir.clone(),
            backend: Arc::clone(&self.backend),
            registry: Arc::clone(&self.registry),
            events: self.events.clone(),
            cancel,
        });
        self.registry.attach_task(id, handle);
        tracing::info!(job_id = %id, url = %source_url, "download started");
        Ok(id)
    }

    /// Request cooperative cancellation. Returns whether the job was active.
    pub fn cancel(&self, id: JobId) -> bool {
        let found = self.registry.request_cancel(id);
        if found {
            tracing::info!(job_id = %id, "stop signal sent");
        } else {
            tracing::debug!(job_id = %id, "stop requested for unknown job");
        }
        found
    }

    /// New observer. Sees only events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn jobs(&self) -> Vec<JobSnapshot> {
        self.registry.snapshot()
    }

    pub fn is_active(&self, id: JobId) -> bool {
        self.registry.contains(id)
    }

    pub async fn list_completed_artifacts(&self) -> Result<Vec<Artifact>, OrchestratorError> {
        artifacts::list_completed(&self.output_dir, &self.audio_extension).await
    }

    /// Resolve a requested artifact name to a file in the output directory.
    pub async fn open_artifact(&self, requested: &str) -> Result<(PathBuf, u64), OrchestratorError> {
        artifacts::locate(&self.output_dir, requested).await
    }

    /// Cancel every active job and wait for each to reach its terminal event.
    pub async fn shutdown(&self) {
        let handles = self.registry.cancel_all();
        tracing::info!(jobs = handles.len(), "shutting down active jobs");
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("job task join: {}", e);
            }
        }
    }
}
