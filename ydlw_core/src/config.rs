use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::ParamOverrides;
use crate::error::DownloadError;

/// Overrides the engine executable.
pub const ENV_YTDLP: &str = "YDLW_YTDLP";
/// `1`/`true`/`yes` turns on verbose engine output.
pub const ENV_DEBUG: &str = "YDLW_DEBUG";

/// Settings applied when the engine wrapper is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapperConfig {
    pub verbose: bool,
    /// Extractor names that are never registered.
    pub blacklist: Vec<String>,
    /// Re-applied by `clear_download_params` before each download.
    pub override_params: ParamOverrides,
    pub ytdlp_path: Option<PathBuf>,
    /// Replaces the built-in `std_headers()` set when present.
    pub default_headers: Option<BTreeMap<String, String>>,
}

impl WrapperConfig {
    /// Reads a JSON config file, then applies environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, DownloadError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&text)?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(ENV_YTDLP) {
            if !path.is_empty() {
                self.ytdlp_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(flag) = std::env::var(ENV_DEBUG) {
            self.verbose = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// The configured executable, or `yt-dlp` from `PATH`.
    pub fn ytdlp_binary(&self) -> PathBuf {
        self.ytdlp_path.clone().unwrap_or_else(|| {
            let bin = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };
            PathBuf::from(bin)
        })
    }
}
