//! `pldl watch` – print events as they happen; shared rendering for `start --watch` and `download`.

use anyhow::Result;
use pldl_core::{JobEvent, JobId};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::cli::control_socket::{self, WatchConnection};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Where events come from: a server's watch stream or an in-process bus.
pub enum WatchStream<'a> {
    Socket(&'a mut WatchConnection),
    Local(&'a mut broadcast::Receiver<JobEvent>),
}

impl WatchStream<'_> {
    async fn next(&mut self) -> Result<Option<JobEvent>> {
        match self {
            WatchStream::Socket(conn) => conn.next_event().await,
            WatchStream::Local(rx) => loop {
                match rx.recv().await {
                    Ok(event) => return Ok(Some(event)),
                    Err(RecvError::Lagged(n)) => tracing::debug!("watch lagged, {} events dropped", n),
                    Err(RecvError::Closed) => return Ok(None),
                }
            },
        }
    }
}

pub async fn run_watch(socket_path: &Path) -> Result<()> {
    let mut conn = control_socket::open_watch(socket_path).await?;
    println!("Watching downloads (Ctrl-C to stop).");
    follow_job(&mut WatchStream::Socket(&mut conn), None).await?;
    Ok(())
}

/// Prints events until `job`'s terminal event (or forever when `job` is None).
/// Returns that terminal event.
pub async fn follow_job(stream: &mut WatchStream<'_>, job: Option<JobId>) -> Result<Option<JobEvent>> {
    let mut last_progress: Option<Instant> = None;
    while let Some(event) = stream.next().await? {
        if job.is_some_and(|id| id != event.job_id()) {
            continue;
        }
        if let JobEvent::Progress { .. } = event {
            let now = Instant::now();
            if last_progress.is_some_and(|t| now.duration_since(t) < PROGRESS_INTERVAL) {
                continue;
            }
            last_progress = Some(now);
        } else {
            last_progress = None;
        }
        println!("{}", render_event(&event, job.is_none()));
        if job.is_some() && event.is_terminal() {
            return Ok(Some(event));
        }
    }
    Ok(None)
}

fn mib(bytes: f64) -> f64 {
    bytes / 1_048_576.0
}

/// One human-readable line per event.
pub fn render_event(event: &JobEvent, with_id: bool) -> String {
    let body = match event {
        JobEvent::Status {
            current,
            total,
            title,
            ..
        } => format!("[{current}/{total}] {title}"),
        JobEvent::Progress { progress, .. } => {
            let done = mib(progress.downloaded_bytes as f64);
            let total = progress
                .total_bytes
                .map(|t| format!("{:.1} MiB", mib(t as f64)))
                .unwrap_or_else(|| "?".to_string());
            let rate = progress
                .speed
                .map(|s| format!("{:.2} MiB/s", mib(s)))
                .unwrap_or_else(|| "-".to_string());
            let eta = progress
                .eta
                .map(|s| format!("{s}s"))
                .unwrap_or_else(|| "?".to_string());
            format!("  {done:.1} / {total}  {rate}  ETA {eta}")
        }
        JobEvent::ItemFinished { filename, .. } => format!("  done: {filename}"),
        JobEvent::Stopped { message, .. } => message.clone(),
        JobEvent::Complete { message, failed, .. } => {
            if failed.is_empty() {
                message.clone()
            } else {
                let list: Vec<String> = failed
                    .iter()
                    .map(|f| format!("  failed: {} ({})", f.title, f.reason))
                    .collect();
                format!("{message}, {} failed:\n{}", failed.len(), list.join("\n"))
            }
        }
        JobEvent::Error { error, .. } => format!("error: {error}"),
    };
    if with_id {
        format!("{} {}", event.job_id(), body)
    } else {
        body
    }
}
