//! `pldl fetch <file>` – copy a completed download out of the server's directory.

use anyhow::Result;
use std::path::Path;

use crate::cli::control_socket;

pub async fn run_fetch(socket_path: &Path, filename: &str, dest_dir: &Path) -> Result<()> {
    let (path, size) = control_socket::fetch(socket_path, filename, dest_dir).await?;
    println!("Saved {} ({} bytes)", path.display(), size);
    Ok(())
}
