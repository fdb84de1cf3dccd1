//! `MediaBackend` backed by the external `yt-dlp` program.
//!
//! Resolution runs a flat playlist dump and parses its JSON. Each item is
//! fetched by a separate `yt-dlp` process; its progress and final path are
//! read from machine-readable lines requested via `--progress-template` and
//! `--print`.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::backend::{MediaBackend, PlaylistItem, TransferObserver, TransferProgress};
use crate::config::PldlConfig;
use crate::error::{ItemError, ResolveError};

const PROGRESS_PREFIX: &str = "pldl-progress";
const FILEPATH_PREFIX: &str = "pldl-file";
const PLAYLIST_BASE: &str = "https://www.youtube.com/playlist?list=";
const WATCH_BASE: &str = "https://www.youtube.com/watch?v=";

/// Drives `yt-dlp` as a child process for resolution and transfers.
#[derive(Debug, Clone)]
pub struct YtDlpBackend {
    program: String,
    audio_format: String,
    playlist_limit: usize,
}

impl YtDlpBackend {
    pub fn new(program: impl Into<String>, audio_format: impl Into<String>, playlist_limit: usize) -> Self {
        Self {
            program: program.into(),
            audio_format: audio_format.into(),
            playlist_limit: playlist_limit.max(1),
        }
    }

    pub fn from_config(cfg: &PldlConfig) -> Self {
        Self::new(&cfg.yt_dlp_program, &cfg.audio_format, cfg.playlist_limit)
    }

    fn resolve_args(&self, playlist_id: &str) -> Vec<String> {
        vec![
            "--flat-playlist".to_string(),
            "--dump-single-json".to_string(),
            "--no-warnings".to_string(),
            "--playlist-items".to_string(),
            format!("1-{}", self.playlist_limit),
            format!("{PLAYLIST_BASE}{playlist_id}"),
        ]
    }

    fn download_args(&self, item: &PlaylistItem, output_dir: &Path) -> Vec<String> {
        let template = output_dir.join("%(title)s.%(ext)s");
        vec![
            "-f".to_string(),
            self.audio_format.clone(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{PROGRESS_PREFIX}\t%(progress.downloaded_bytes)s\t\
                 %(progress.total_bytes,progress.total_bytes_estimate)s\t\
                 %(progress.speed)s\t%(progress.eta)s\t%(progress.filename)s"
            ),
            "--print".to_string(),
            format!("after_move:{FILEPATH_PREFIX}\t%(filepath)s"),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            format!("{WATCH_BASE}{}", item.item_ref),
        ]
    }
}

/// Extract the playlist id from the `list` query parameter.
pub fn extract_playlist_id(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url.trim()).ok()?;
    let (_, value) = parsed.query_pairs().find(|(k, _)| k == "list")?;
    let id: String = value
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

#[derive(Debug, Deserialize)]
struct FlatPlaylist {
    #[serde(default)]
    entries: Option<Vec<Option<FlatEntry>>>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    title: Option<String>,
}

/// Parse `--dump-single-json` output into items, skipping null or id-less entries.
pub fn parse_flat_playlist(json: &[u8]) -> Result<Vec<PlaylistItem>, ResolveError> {
    let playlist: FlatPlaylist =
        serde_json::from_slice(json).map_err(|e| ResolveError::Malformed(e.to_string()))?;
    let Some(entries) = playlist.entries else {
        tracing::warn!("playlist listing has no entries field");
        return Ok(Vec::new());
    };
    Ok(entries
        .into_iter()
        .flatten()
        .filter_map(|e| e.id.map(|id| PlaylistItem::new(id, e.title)))
        .collect())
}

/// One interpreted line of yt-dlp output.
#[derive(Debug, Clone, PartialEq)]
enum OutputLine {
    Progress(TransferProgress),
    FinalPath(String),
    Error(String),
}

fn parse_field<T: std::str::FromStr>(raw: &str) -> Option<T> {
    match raw.trim() {
        "" | "NA" | "None" => None,
        s => s.parse().ok(),
    }
}

fn parse_output_line(line: &str) -> Option<OutputLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX).and_then(|r| r.strip_prefix('\t')) {
        let mut fields = rest.splitn(5, '\t');
        let downloaded: Option<f64> = parse_field(fields.next()?);
        let total: Option<f64> = parse_field(fields.next()?);
        let speed: Option<f64> = parse_field(fields.next()?);
        let eta: Option<f64> = parse_field(fields.next()?);
        let filename = fields.next().unwrap_or_default().to_string();
        return Some(OutputLine::Progress(TransferProgress {
            downloaded_bytes: downloaded.unwrap_or(0.0).max(0.0) as u64,
            total_bytes: total.map(|t| t.max(0.0) as u64),
            speed,
            eta: eta.map(|e| e.max(0.0).round() as u64),
            filename,
        }));
    }
    if let Some(path) = line.strip_prefix(FILEPATH_PREFIX).and_then(|r| r.strip_prefix('\t')) {
        return Some(OutputLine::FinalPath(path.to_string()));
    }
    if let Some(msg) = line.strip_prefix("ERROR:") {
        return Some(OutputLine::Error(msg.trim().to_string()));
    }
    None
}

fn last_error_line(stderr: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .filter_map(|l| match parse_output_line(l) {
            Some(OutputLine::Error(msg)) => Some(msg),
            _ => None,
        })
        .last()
}

#[async_trait]
impl MediaBackend for YtDlpBackend {
    async fn resolve_playlist(&self, url: &str) -> Result<Vec<PlaylistItem>, ResolveError> {
        let playlist_id = extract_playlist_id(url).ok_or(ResolveError::InvalidPlaylistUrl)?;
        tracing::info!("extracted playlist id: {}", playlist_id);

        let output = Command::new(&self.program)
            .args(self.resolve_args(&playlist_id))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ResolveError::Backend(format!("{} could not start: {}", self.program, e)))?;

        if !output.status.success() {
            let reason = last_error_line(&output.stderr)
                .unwrap_or_else(|| format!("{} exited with {}", self.program, output.status));
            return Err(ResolveError::Backend(reason));
        }

        let items = parse_flat_playlist(&output.stdout)?;
        tracing::info!("found {} items in playlist", items.len());
        Ok(items)
    }

    async fn download_item(
        &self,
        item: &PlaylistItem,
        output_dir: &Path,
        observer: &dyn TransferObserver,
    ) -> Result<(), ItemError> {
        let mut child = Command::new(&self.program)
            .args(self.download_args(item, output_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ItemError::Failed("yt-dlp stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ItemError::Failed("yt-dlp stderr not captured".to_string()))?;
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let (mut out_done, mut err_done) = (false, false);
        let mut final_path: Option<String> = None;
        let mut last_error: Option<String> = None;

        // Quiet mode routes progress to stderr, so both streams are scanned.
        while !(out_done && err_done) {
            let line = tokio::select! {
                line = out_lines.next_line(), if !out_done => match line? {
                    Some(l) => l,
                    None => { out_done = true; continue; }
                },
                line = err_lines.next_line(), if !err_done => match line? {
                    Some(l) => l,
                    None => { err_done = true; continue; }
                },
            };
            match parse_output_line(&line) {
                Some(OutputLine::Progress(p)) => observer.on_progress(p),
                Some(OutputLine::FinalPath(p)) => final_path = Some(p),
                Some(OutputLine::Error(msg)) => last_error = Some(msg),
                None => tracing::trace!("yt-dlp: {}", line),
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(ItemError::Failed(
                last_error.unwrap_or_else(|| format!("{} exited with {}", self.program, status)),
            ));
        }

        match final_path {
            Some(path) => observer.on_finished(&path),
            None => tracing::warn!(item = %item.item_ref, "yt-dlp did not report an output file"),
        }
        Ok(())
    }
}
