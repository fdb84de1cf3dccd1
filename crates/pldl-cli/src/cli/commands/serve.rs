//! `pldl serve` – run the orchestrator behind the control socket until Ctrl-C.

use anyhow::{Context, Result};
use pldl_core::config::PldlConfig;
use pldl_core::ytdlp::YtDlpBackend;
use pldl_core::JobOrchestrator;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::control_socket;

pub async fn run_serve(cfg: &PldlConfig, output_dir: Option<PathBuf>, socket_path: &Path) -> Result<()> {
    let output_dir = match output_dir {
        Some(dir) => dir,
        None => cfg.resolve_output_dir()?,
    };
    let backend = Arc::new(YtDlpBackend::from_config(cfg));
    let orchestrator = Arc::new(
        JobOrchestrator::from_config(backend, cfg, &output_dir).context("prepare output directory")?,
    );

    let listener = control_socket::spawn_control_listener(Arc::clone(&orchestrator), socket_path)?;
    tracing::info!(
        socket = %socket_path.display(),
        output_dir = %output_dir.display(),
        "control socket listening"
    );
    println!(
        "Serving on {} (downloads in {})",
        socket_path.display(),
        output_dir.display()
    );

    tokio::signal::ctrl_c().await.context("wait for Ctrl-C")?;
    println!("Shutting down; active downloads stop after their current item.");
    listener.abort();
    orchestrator.shutdown().await;
    if let Err(e) = std::fs::remove_file(socket_path) {
        tracing::debug!("remove control socket: {}", e);
    }
    Ok(())
}
