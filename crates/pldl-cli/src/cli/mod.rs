//! CLI for the PLDL playlist downloader.

mod commands;
mod control_socket;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pldl_core::config;
use std::path::PathBuf;

use commands::{
    run_cancel, run_download, run_fetch, run_jobs, run_list, run_serve, run_start, run_watch,
};

/// Top-level CLI for the PLDL playlist downloader.
#[derive(Debug, Parser)]
#[command(name = "pldl")]
#[command(about = "PLDL: download a playlist's audio tracks in the background", long_about = None)]
pub struct Cli {
    /// Control socket path (default: ~/.local/state/pldl/control.sock).
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the download server and listen on the control socket.
    Serve {
        /// Directory for downloaded files (overrides config).
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Start downloading a playlist on the running server.
    Start {
        /// Playlist URL.
        url: String,
        /// Follow the job's events until it ends.
        #[arg(long)]
        watch: bool,
    },

    /// Stop a running download after its current item.
    Cancel {
        /// Download identifier printed by `start`.
        id: String,
    },

    /// List completed audio files on the server.
    List,

    /// Show active downloads on the server.
    Jobs,

    /// Print events from all downloads as they happen.
    Watch,

    /// Copy a completed file from the server's output directory.
    Fetch {
        /// File name as shown by `list`.
        filename: String,
        /// Destination directory (default: current directory).
        #[arg(long, value_name = "DIR")]
        dest: Option<PathBuf>,
    },

    /// Download a playlist in this process, without a server.
    Download {
        /// Playlist URL.
        url: String,
        /// Directory for downloaded files (overrides config).
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let socket = match cli.socket {
            Some(path) => path,
            None => pldl_core::control::default_control_socket_path()
                .context("locate control socket")?,
        };

        match cli.command {
            CliCommand::Serve { output_dir } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_serve(&cfg, output_dir, &socket).await?;
            }
            CliCommand::Download { url, output_dir } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_download(&cfg, output_dir, &url).await?;
            }
            CliCommand::Start { url, watch } => run_start(&socket, &url, watch).await?,
            CliCommand::Cancel { id } => run_cancel(&socket, &id).await?,
            CliCommand::List => run_list(&socket).await?,
            CliCommand::Jobs => run_jobs(&socket).await?,
            CliCommand::Watch => run_watch(&socket).await?,
            CliCommand::Fetch { filename, dest } => {
                let dest = match dest {
                    Some(dir) => dir,
                    None => std::env::current_dir()?,
                };
                run_fetch(&socket, &filename, &dest).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
