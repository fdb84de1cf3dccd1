//! Scripted `MediaBackend` for driving the worker without yt-dlp.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pldl_core::ytdlp::extract_playlist_id;
use pldl_core::{ItemError, MediaBackend, PlaylistItem, ResolveError, TransferObserver, TransferProgress};
use tokio::sync::Notify;

pub const ITEM_SIZE: u64 = 300;

/// What `download_item` does for a given item ref.
#[derive(Debug, Clone)]
pub enum ItemScript {
    Succeed,
    Fail(String),
    Panic,
}

/// Resolution behaviour.
#[derive(Debug, Clone)]
pub enum Resolution {
    Items(Vec<PlaylistItem>),
    Error(String),
}

/// Pauses a transfer until the test releases it.
#[derive(Default)]
pub struct Gate {
    pub started: Notify,
    pub release: Notify,
}

pub struct FakeBackend {
    resolution: Resolution,
    scripts: HashMap<String, ItemScript>,
    gates: HashMap<String, Arc<Gate>>,
    resolve_gate: Option<Arc<Gate>>,
    attempts: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn with_items(items: &[(&str, &str)]) -> Self {
        Self::new(Resolution::Items(
            items
                .iter()
                .map(|(id, title)| PlaylistItem::new(*id, Some(title.to_string())))
                .collect(),
        ))
    }

    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            scripts: HashMap::new(),
            gates: HashMap::new(),
            resolve_gate: None,
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn script(mut self, item_ref: &str, script: ItemScript) -> Self {
        self.scripts.insert(item_ref.to_string(), script);
        self
    }

    /// Make the transfer of `item_ref` wait on the returned gate.
    pub fn gate(&mut self, item_ref: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates.insert(item_ref.to_string(), Arc::clone(&gate));
        gate
    }

    /// Make resolution wait on the returned gate.
    pub fn gate_resolution(&mut self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.resolve_gate = Some(Arc::clone(&gate));
        gate
    }

    /// Item refs in the order their transfers were attempted.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    async fn resolve_playlist(&self, url: &str) -> Result<Vec<PlaylistItem>, ResolveError> {
        if let Some(gate) = &self.resolve_gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        if extract_playlist_id(url).is_none() {
            return Err(ResolveError::InvalidPlaylistUrl);
        }
        match &self.resolution {
            Resolution::Items(items) => Ok(items.clone()),
            Resolution::Error(msg) => Err(ResolveError::Backend(msg.clone())),
        }
    }

    async fn download_item(
        &self,
        item: &PlaylistItem,
        output_dir: &Path,
        observer: &dyn TransferObserver,
    ) -> Result<(), ItemError> {
        self.attempts.lock().unwrap().push(item.item_ref.clone());
        if let Some(gate) = self.gates.get(&item.item_ref) {
            gate.started.notify_one();
            gate.release.notified().await;
        }

        let target = output_dir.join(format!("{}.m4a", item.display_title()));
        let partial = target.to_string_lossy().into_owned() + ".part";
        match self.scripts.get(&item.item_ref).cloned().unwrap_or(ItemScript::Succeed) {
            ItemScript::Succeed => {
                for step in 1..=3u64 {
                    observer.on_progress(TransferProgress {
                        downloaded_bytes: step * ITEM_SIZE / 3,
                        total_bytes: Some(ITEM_SIZE),
                        speed: Some(1000.0),
                        eta: Some(3 - step),
                        filename: partial.clone(),
                    });
                    tokio::task::yield_now().await;
                }
                tokio::fs::write(&target, vec![0u8; ITEM_SIZE as usize]).await?;
                observer.on_finished(&target.to_string_lossy());
                Ok(())
            }
            ItemScript::Fail(reason) => {
                observer.on_progress(TransferProgress {
                    downloaded_bytes: 10,
                    total_bytes: None,
                    speed: None,
                    eta: None,
                    filename: partial,
                });
                Err(ItemError::Failed(reason))
            }
            ItemScript::Panic => panic!("transfer crashed for {}", item.item_ref),
        }
    }
}
