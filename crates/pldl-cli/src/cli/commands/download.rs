//! `pldl download <url>` – run one playlist download in this process.

use anyhow::{bail, Context, Result};
use pldl_core::config::PldlConfig;
use pldl_core::ytdlp::YtDlpBackend;
use pldl_core::{JobEvent, JobOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::commands::watch::{follow_job, WatchStream};

pub async fn run_download(cfg: &PldlConfig, output_dir: Option<PathBuf>, url: &str) -> Result<()> {
    let output_dir = match output_dir {
        Some(dir) => dir,
        None => cfg.resolve_output_dir()?,
    };
    let backend = Arc::new(YtDlpBackend::from_config(cfg));
    let orchestrator =
        JobOrchestrator::from_config(backend, cfg, &output_dir).context("prepare output directory")?;

    let mut rx = orchestrator.subscribe();
    let id = orchestrator.start(url)?;
    println!("Downloading into {}", output_dir.display());

    let mut stream = WatchStream::Local(&mut rx);
    let terminal = tokio::select! {
        end = follow_job(&mut stream, Some(id)) => end?,
        _ = tokio::signal::ctrl_c() => {
            println!("Stopping after the current item...");
            orchestrator.cancel(id);
            follow_job(&mut stream, Some(id)).await?
        }
    };

    match terminal {
        Some(JobEvent::Error { error, .. }) => bail!("{error}"),
        Some(_) => Ok(()),
        None => bail!("event stream closed before the download finished"),
    }
}
