//! `pldl list` – completed files in the server's output directory.

use anyhow::{bail, Result};
use std::path::Path;

use crate::cli::control_socket::{self, Reply};

pub async fn run_list(socket_path: &Path) -> Result<()> {
    let files = match control_socket::send_command(socket_path, "list").await? {
        Reply::Files { files } => files,
        Reply::Error { error } => bail!("{error}"),
        other => bail!("unexpected reply: {other:?}"),
    };
    if files.is_empty() {
        println!("No completed downloads.");
        return Ok(());
    }
    println!("{:<12} {}", "SIZE", "FILE");
    for f in files {
        println!("{:<12} {}", f.size, f.filename);
    }
    Ok(())
}
