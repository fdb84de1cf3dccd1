//! Control socket: server (during `pldl serve`) and client (for the other commands).
//!
//! Protocol: one command per line, one JSON reply per line.
//! `start <url>`, `cancel <id>`, `list`, `jobs` answer once. `watch` answers
//! `{"message":"watching"}` and then streams events as JSON lines. `fetch
//! <name>` answers `{"filename":..,"size":n}` followed by exactly n raw bytes.

use anyhow::{bail, Context, Result};
use pldl_core::artifacts::Artifact;
use pldl_core::control::JobSnapshot;
use pldl_core::{JobEvent, JobId, JobOrchestrator};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;

pub const WATCHING: &str = "watching";

/// A parsed control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Start(String),
    Cancel(JobId),
    List,
    Jobs,
    Watch,
    Fetch(String),
}

/// One JSON reply line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Started { message: String, download_id: JobId },
    Files { files: Vec<Artifact> },
    Jobs { jobs: Vec<JobSnapshot> },
    Fetch { filename: String, size: u64 },
    Error { error: String },
    Message { message: String },
}

impl Reply {
    fn error(error: impl Into<String>) -> Self {
        Reply::Error {
            error: error.into(),
        }
    }

    fn message(message: impl Into<String>) -> Self {
        Reply::Message {
            message: message.into(),
        }
    }
}

pub fn parse_command(line: &str) -> Result<ControlCommand, String> {
    let line = line.trim();
    let (verb, arg) = match line.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (line, ""),
    };
    match (verb, arg) {
        ("start", "") => Err("No URL provided".to_string()),
        ("start", url) => Ok(ControlCommand::Start(url.to_string())),
        ("cancel", id) => id
            .parse()
            .map(ControlCommand::Cancel)
            .map_err(|_| "Download not found".to_string()),
        ("list", "") => Ok(ControlCommand::List),
        ("jobs", "") => Ok(ControlCommand::Jobs),
        ("watch", "") => Ok(ControlCommand::Watch),
        ("fetch", "") => Err("No filename provided".to_string()),
        ("fetch", name) => Ok(ControlCommand::Fetch(name.to_string())),
        _ => Err(format!("unknown command: {line}")),
    }
}

async fn write_json<W, T>(w: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    w.write_all(&line).await?;
    w.flush().await?;
    Ok(())
}

/// Binds `path` (replacing a stale socket) and spawns the accept loop.
pub fn spawn_control_listener(
    orchestrator: Arc<JobOrchestrator>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create socket dir: {}", parent.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket: {}", path.display()))?;

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let orch = Arc::clone(&orchestrator);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(orch, stream).await {
                            tracing::debug!("control connection ended: {:#}", e);
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Handles one client until it disconnects, or until a `watch`/`fetch`
/// takes over the stream.
pub async fn serve_connection<S>(orch: Arc<JobOrchestrator>, stream: S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                write_json(&mut write, &Reply::error(e)).await?;
                continue;
            }
        };
        tracing::debug!(?command, "control command");

        let reply = match command {
            ControlCommand::Start(url) => match orch.start(&url) {
                Ok(download_id) => Reply::Started {
                    message: "Download started".to_string(),
                    download_id,
                },
                Err(e) => Reply::error(e.to_string()),
            },
            ControlCommand::Cancel(id) => {
                if orch.cancel(id) {
                    Reply::message("Stop signal sent")
                } else {
                    Reply::error("Download not found")
                }
            }
            ControlCommand::List => match orch.list_completed_artifacts().await {
                Ok(files) => Reply::Files { files },
                Err(e) => Reply::error(e.to_string()),
            },
            ControlCommand::Jobs => Reply::Jobs { jobs: orch.jobs() },
            ControlCommand::Watch => return stream_events(&orch, &mut lines, &mut write).await,
            ControlCommand::Fetch(name) => match orch.open_artifact(&name).await {
                Ok((path, size)) => return send_file(&path, size, &mut write).await,
                Err(pldl_core::OrchestratorError::ArtifactNotFound(_)) => {
                    Reply::error("File not found")
                }
                Err(e) => Reply::error(e.to_string()),
            },
        };
        write_json(&mut write, &reply).await?;
    }
    Ok(())
}

/// Streams events until the bus closes or the watcher hangs up. The read
/// side is polled only to notice EOF; anything the watcher sends is ignored.
async fn stream_events<R, W>(orch: &JobOrchestrator, lines: &mut Lines<R>, w: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut rx = orch.subscribe();
    write_json(w, &Reply::message(WATCHING)).await?;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => write_json(w, &event).await?,
                Err(RecvError::Lagged(n)) => tracing::debug!("watcher lagged, {} events dropped", n),
                Err(RecvError::Closed) => return Ok(()),
            },
            line = lines.next_line() => match line {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => {
                    tracing::debug!("watcher disconnected");
                    return Ok(());
                }
            },
        }
    }
}

async fn send_file<W: AsyncWrite + Unpin>(path: &Path, size: u64, w: &mut W) -> Result<()> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("open artifact: {}", path.display()))?;
    tracing::info!(path = %path.display(), size, "sending artifact");
    write_json(w, &Reply::Fetch { filename, size }).await?;
    tokio::io::copy(&mut tokio::io::AsyncReadExt::take(&mut file, size), w).await?;
    w.flush().await?;
    Ok(())
}

async fn connect(socket_path: &Path) -> Result<UnixStream> {
    UnixStream::connect(socket_path).await.with_context(|| {
        format!(
            "connect to {} (is `pldl serve` running?)",
            socket_path.display()
        )
    })
}

async fn read_reply(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Result<Reply> {
    let line = lines
        .next_line()
        .await?
        .context("server closed the connection")?;
    Ok(serde_json::from_str(&line).with_context(|| format!("bad reply: {line}"))?)
}

/// Sends one command line and returns the server's reply.
pub async fn send_command(socket_path: &Path, command: &str) -> Result<Reply> {
    let stream = connect(socket_path).await?;
    let (read, mut write) = stream.into_split();
    write.write_all(format!("{command}\n").as_bytes()).await?;
    let mut lines = BufReader::new(read).lines();
    read_reply(&mut lines).await
}

/// An open `watch` connection. The write half is held so the server does
/// not see EOF and drop the watcher.
pub struct WatchConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    _write: OwnedWriteHalf,
}

/// Opens an event stream. Events published after this returns are delivered.
pub async fn open_watch(socket_path: &Path) -> Result<WatchConnection> {
    let stream = connect(socket_path).await?;
    let (read, mut write) = stream.into_split();
    write.write_all(b"watch\n").await?;
    let mut lines = BufReader::new(read).lines();
    match read_reply(&mut lines).await? {
        Reply::Message { message } if message == WATCHING => {}
        Reply::Error { error } => bail!("{error}"),
        other => bail!("unexpected reply to watch: {other:?}"),
    }
    Ok(WatchConnection {
        lines,
        _write: write,
    })
}

impl WatchConnection {
    /// Next event, or None when the server goes away.
    pub async fn next_event(&mut self) -> Result<Option<JobEvent>> {
        match self.lines.next_line().await? {
            Some(line) => Ok(Some(
                serde_json::from_str(&line).with_context(|| format!("bad event: {line}"))?,
            )),
            None => Ok(None),
        }
    }
}

/// Downloads `name` into `dest_dir`; returns the written path and size.
pub async fn fetch(socket_path: &Path, name: &str, dest_dir: &Path) -> Result<(std::path::PathBuf, u64)> {
    let stream = connect(socket_path).await?;
    let (read, mut write) = stream.into_split();
    write.write_all(format!("fetch {name}\n").as_bytes()).await?;

    let mut reader = BufReader::new(read);
    let mut header = String::new();
    reader.read_line(&mut header).await?;
    let reply: Reply = serde_json::from_str(header.trim())
        .with_context(|| format!("bad reply: {}", header.trim()))?;
    let (filename, size) = match reply {
        Reply::Fetch { filename, size } => (filename, size),
        Reply::Error { error } => bail!("{error}"),
        other => bail!("unexpected reply to fetch: {other:?}"),
    };

    let filename = pldl_core::artifacts::sanitize_artifact_name(&filename)
        .map_err(|e| anyhow::anyhow!("server sent an unusable file name: {e}"))?;
    let target = dest_dir.join(filename);
    let mut file = tokio::fs::File::create(&target)
        .await
        .with_context(|| format!("create {}", target.display()))?;
    let copied = tokio::io::copy(&mut tokio::io::AsyncReadExt::take(reader, size), &mut file).await?;
    file.flush().await?;
    if copied != size {
        bail!("transfer truncated: expected {size} bytes, got {copied}");
    }
    Ok((target, copied))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_command("start https://x/playlist?list=A"),
            Ok(ControlCommand::Start("https://x/playlist?list=A".into()))
        );
        assert_eq!(parse_command("  list  "), Ok(ControlCommand::List));
        assert_eq!(parse_command("jobs"), Ok(ControlCommand::Jobs));
        assert_eq!(parse_command("watch"), Ok(ControlCommand::Watch));
        assert_eq!(
            parse_command("fetch My Song.m4a"),
            Ok(ControlCommand::Fetch("My Song.m4a".into()))
        );
        let id = JobId::new();
        assert_eq!(
            parse_command(&format!("cancel {id}")),
            Ok(ControlCommand::Cancel(id))
        );
    }

    #[test]
    fn rejects_bad_commands() {
        assert_eq!(parse_command("start"), Err("No URL provided".into()));
        assert_eq!(parse_command("cancel 42"), Err("Download not found".into()));
        assert!(parse_command("pause 1").is_err());
        assert!(parse_command("list extra").is_err());
    }

    #[test]
    fn replies_round_trip_untagged() {
        let id = JobId::new();
        let replies = vec![
            Reply::Started {
                message: "Download started".into(),
                download_id: id,
            },
            Reply::Files {
                files: vec![Artifact {
                    filename: "A.m4a".into(),
                    size: 3,
                }],
            },
            Reply::Fetch {
                filename: "A.m4a".into(),
                size: 3,
            },
            Reply::error("File not found"),
            Reply::message("Stop signal sent"),
        ];
        for reply in replies {
            let json = serde_json::to_string(&reply).unwrap();
            let back: Reply = serde_json::from_str(&json).unwrap();
            assert_eq!(back, reply, "{json}");
        }
    }

    fn offline_orchestrator(dir: &Path) -> Arc<JobOrchestrator> {
        let backend = Arc::new(pldl_core::ytdlp::YtDlpBackend::new(
            "/nonexistent/yt-dlp",
            "bestaudio",
            5,
        ));
        Arc::new(JobOrchestrator::new(backend, dir, "m4a", 64).unwrap())
    }

    async fn request<S>(client: &mut S, line: &str) -> Reply
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        client.write_all(format!("{line}\n").as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            tokio::io::AsyncReadExt::read_exact(client, &mut byte)
                .await
                .unwrap();
            if byte[0] == b'\n' {
                break;
            }
            buf.push(byte[0]);
        }
        serde_json::from_slice(&buf).unwrap()
    }

    #[tokio::test]
    async fn connection_answers_requests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.m4a"), b"abc").unwrap();
        let orch = offline_orchestrator(dir.path());
        let (mut client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve_connection(Arc::clone(&orch), server));

        assert_eq!(
            request(&mut client, "list").await,
            Reply::Files {
                files: vec![Artifact {
                    filename: "A.m4a".into(),
                    size: 3
                }]
            }
        );
        assert_eq!(
            request(&mut client, &format!("cancel {}", JobId::new())).await,
            Reply::error("Download not found")
        );
        assert_eq!(
            request(&mut client, "fetch B.m4a").await,
            Reply::error("File not found")
        );
        assert_eq!(
            request(&mut client, "start").await,
            Reply::error("No URL provided")
        );
        assert_eq!(
            request(&mut client, "jobs").await,
            Reply::Jobs { jobs: Vec::new() }
        );
    }

    #[tokio::test]
    async fn watcher_sees_error_for_bad_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let orch = offline_orchestrator(dir.path());

        let (mut watcher, watch_side) = tokio::io::duplex(4096);
        tokio::spawn(serve_connection(Arc::clone(&orch), watch_side));
        assert_eq!(
            request(&mut watcher, "watch").await,
            Reply::message(WATCHING)
        );

        let (mut client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve_connection(Arc::clone(&orch), server));
        let id = match request(&mut client, "start https://x/notaplaylist").await {
            Reply::Started { download_id, .. } => download_id,
            other => panic!("unexpected {other:?}"),
        };

        let mut lines = BufReader::new(watcher).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let event: JobEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(
            event,
            JobEvent::Error {
                job_id: id,
                error: "Invalid playlist URL format".into()
            }
        );
    }

    #[tokio::test]
    async fn idle_watcher_hangup_ends_the_connection() {
        let dir = tempfile::tempdir().unwrap();
        let orch = offline_orchestrator(dir.path());
        let (mut watcher, watch_side) = tokio::io::duplex(4096);
        let served = tokio::spawn(serve_connection(Arc::clone(&orch), watch_side));
        assert_eq!(
            request(&mut watcher, "watch").await,
            Reply::message(WATCHING)
        );

        drop(watcher);
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), served)
            .await
            .expect("watch connection outlived its client");
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn fetch_streams_header_then_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.m4a"), b"abcdef").unwrap();
        let orch = offline_orchestrator(dir.path());
        let (mut client, server) = tokio::io::duplex(4096);
        tokio::spawn(serve_connection(orch, server));

        assert_eq!(
            request(&mut client, "fetch ../../A.m4a").await,
            Reply::Fetch {
                filename: "A.m4a".into(),
                size: 6
            }
        );
        let mut body = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut client, &mut body)
            .await
            .unwrap();
        assert_eq!(body, b"abcdef");
    }
}
