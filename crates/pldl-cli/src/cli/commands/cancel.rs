//! `pldl cancel <id>` – stop a download after its in-flight item.

use anyhow::{bail, Result};
use std::path::Path;

use crate::cli::control_socket::{self, Reply};

pub async fn run_cancel(socket_path: &Path, id: &str) -> Result<()> {
    match control_socket::send_command(socket_path, &format!("cancel {}", id.trim())).await? {
        Reply::Message { message } => println!("{message}"),
        Reply::Error { error } => bail!("{error}"),
        other => bail!("unexpected reply: {other:?}"),
    }
    Ok(())
}
