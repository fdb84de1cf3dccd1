//! `pldl jobs` – downloads currently active on the server.

use anyhow::{bail, Result};
use std::path::Path;

use crate::cli::control_socket::{self, Reply};

pub async fn run_jobs(socket_path: &Path) -> Result<()> {
    let jobs = match control_socket::send_command(socket_path, "jobs").await? {
        Reply::Jobs { jobs } => jobs,
        Reply::Error { error } => bail!("{error}"),
        other => bail!("unexpected reply: {other:?}"),
    };
    if jobs.is_empty() {
        println!("No active downloads.");
    } else {
        println!("{:<36} {:<12} {}", "ID", "STATE", "URL");
        for j in jobs {
            let state = if j.cancel_requested {
                "stopping".to_string()
            } else {
                format!("{:?}", j.state).to_lowercase()
            };
            println!("{:<36} {:<12} {}", j.id, state, j.source_url);
        }
    }
    Ok(())
}
