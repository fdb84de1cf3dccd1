//! Completed artifacts: plain files in the output directory.
//!
//! Listing has no coupling to job state; a file may be left over from an
//! earlier process run.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

/// A completed file and its size in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub filename: String,
    pub size: u64,
}

fn io_error(path: &Path, source: std::io::Error) -> OrchestratorError {
    OrchestratorError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Regular files in `dir` whose extension is `extension`, sorted by name.
pub async fn list_completed(dir: &Path, extension: &str) -> Result<Vec<Artifact>, OrchestratorError> {
    let extension = extension.trim_start_matches('.');
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| io_error(dir, e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(dir, e))? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let meta = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(path = %path.display(), "skip unreadable artifact: {}", e);
                continue;
            }
        };
        files.push(Artifact {
            filename: entry.file_name().to_string_lossy().into_owned(),
            size: meta.len(),
        });
    }
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}

/// Reduce a requested name to its final path component. Both `/` and `\`
/// count as separators so no traversal survives.
pub fn sanitize_artifact_name(requested: &str) -> Result<String, OrchestratorError> {
    let base = requested
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
        return Err(OrchestratorError::InvalidArtifactName(requested.to_string()));
    }
    Ok(base.to_string())
}

/// Resolve a requested artifact to an existing regular file inside `dir`.
pub async fn locate(dir: &Path, requested: &str) -> Result<(PathBuf, u64), OrchestratorError> {
    let name = sanitize_artifact_name(requested)?;
    let path = dir.join(&name);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok((path, meta.len())),
        Ok(_) => Err(OrchestratorError::ArtifactNotFound(name)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(OrchestratorError::ArtifactNotFound(name)),
        Err(e) => Err(io_error(&path, e)),
    }
}
