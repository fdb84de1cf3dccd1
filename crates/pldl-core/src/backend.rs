//! Contract between the orchestrator and the media resolution/download backend.
//!
//! The worker only depends on this trait. `ytdlp::YtDlpBackend` is the
//! production implementation; tests plug in scripted fakes.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{ItemError, ResolveError};

/// Title used when the backend does not report one.
pub const UNKNOWN_TITLE: &str = "Unknown";

/// One resolved media unit within a playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistItem {
    /// Backend-specific reference used to fetch the item.
    pub item_ref: String,
    pub title: Option<String>,
}

impl PlaylistItem {
    pub fn new(item_ref: impl Into<String>, title: Option<String>) -> Self {
        Self {
            item_ref: item_ref.into(),
            title,
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNKNOWN_TITLE)
    }
}

/// One progress tick reported by the backend during a transfer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Bytes per second.
    pub speed: Option<f64>,
    /// Seconds remaining.
    pub eta: Option<u64>,
    /// Target file the backend is writing.
    pub filename: String,
}

/// Receives progress from a single item's transfer.
pub trait TransferObserver: Send + Sync {
    fn on_progress(&self, progress: TransferProgress);

    /// Called once when the item's file is in place. `filename` is the
    /// path the backend reported; observers keep only the base name.
    fn on_finished(&self, filename: &str);
}

/// Resolution and per-item transfer capability.
#[async_trait]
pub trait MediaBackend: Send + Sync + 'static {
    /// Resolve a playlist reference into its items, in playlist order.
    /// An empty list means nothing was found.
    async fn resolve_playlist(&self, url: &str) -> Result<Vec<PlaylistItem>, ResolveError>;

    /// Download one item into `output_dir`, reporting to `observer`.
    async fn download_item(
        &self,
        item: &PlaylistItem,
        output_dir: &Path,
        observer: &dyn TransferObserver,
    ) -> Result<(), ItemError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_title_falls_back_to_unknown() {
        assert_eq!(PlaylistItem::new("v1", None).display_title(), "Unknown");
        assert_eq!(
            PlaylistItem::new("v1", Some("A".into())).display_title(),
            "A"
        );
    }
}
