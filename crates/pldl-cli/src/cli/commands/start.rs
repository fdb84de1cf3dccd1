//! `pldl start <url>` – queue a playlist on the server, optionally following it.

use anyhow::{bail, Result};
use std::path::Path;

use crate::cli::commands::watch::{follow_job, WatchStream};
use crate::cli::control_socket::{self, Reply};

pub async fn run_start(socket_path: &Path, url: &str, watch: bool) -> Result<()> {
    // Subscribe first: events are not replayed for late observers.
    let stream = if watch {
        Some(control_socket::open_watch(socket_path).await?)
    } else {
        None
    };

    let id = match control_socket::send_command(socket_path, &format!("start {url}")).await? {
        Reply::Started { download_id, .. } => download_id,
        Reply::Error { error } => bail!("{error}"),
        other => bail!("unexpected reply: {other:?}"),
    };
    println!("Download started: {id}");

    if let Some(mut conn) = stream {
        follow_job(&mut WatchStream::Socket(&mut conn), Some(id)).await?;
    }
    Ok(())
}
