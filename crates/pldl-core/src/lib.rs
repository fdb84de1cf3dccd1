pub mod config;
pub mod logging;

pub mod artifacts;
pub mod backend;
pub mod control;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod worker;
pub mod ytdlp;

pub use backend::{MediaBackend, PlaylistItem, TransferObserver, TransferProgress};
pub use control::{JobId, JobState};
pub use error::{ItemError, OrchestratorError, ResolveError};
pub use events::{EventBus, ItemFailure, JobEvent, ProgressEvent};
pub use orchestrator::JobOrchestrator;
