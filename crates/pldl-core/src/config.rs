use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Global configuration loaded from `~/.config/pldl/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PldlConfig {
    /// Directory completed artifacts are written to (None = `~/.local/share/pldl/downloads`).
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Extension (without dot) of the audio files listed as completed artifacts.
    #[serde(default = "default_audio_extension")]
    pub audio_extension: String,
    /// yt-dlp format selector used for each item.
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
    /// Maximum number of playlist entries resolved per job.
    #[serde(default = "default_playlist_limit")]
    pub playlist_limit: usize,
    /// Program name or path of the yt-dlp executable.
    #[serde(default = "default_yt_dlp_program")]
    pub yt_dlp_program: String,
    /// Events buffered per observer before a slow observer starts losing the oldest ones.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_audio_extension() -> String {
    "m4a".to_string()
}

fn default_audio_format() -> String {
    "bestaudio[ext=m4a]/bestaudio".to_string()
}

fn default_playlist_limit() -> usize {
    50
}

fn default_yt_dlp_program() -> String {
    "yt-dlp".to_string()
}

fn default_event_capacity() -> usize {
    256
}

impl Default for PldlConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            audio_extension: default_audio_extension(),
            audio_format: default_audio_format(),
            playlist_limit: default_playlist_limit(),
            yt_dlp_program: default_yt_dlp_program(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl PldlConfig {
    /// Output directory from config, or the XDG data dir default.
    pub fn resolve_output_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.output_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("pldl")?;
        Ok(xdg_dirs.get_data_home().join("downloads"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pldl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PldlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PldlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: PldlConfig = toml::from_str(&data)?;
    Ok(cfg)
}
