//! Error taxonomy for the orchestrator, playlist resolution and item transfers.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced synchronously to the request layer. None of these start
/// or affect a job.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No URL provided")]
    EmptySourceUrl,
    #[error("invalid artifact name: {0:?}")]
    InvalidArtifactName(String),
    #[error("File not found: {0}")]
    ArtifactNotFound(String),
    #[error("output directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A playlist reference could not be turned into an item list. Terminates
/// the job as failed.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Invalid playlist URL format")]
    InvalidPlaylistUrl,
    #[error("{0}")]
    Backend(String),
    #[error("malformed playlist listing: {0}")]
    Malformed(String),
}

/// A single item's transfer failed. Recorded in the job's failure list; the
/// job keeps going.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("{0}")]
    Failed(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
