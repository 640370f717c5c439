use std::{
    num::NonZeroU32,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Values read from `tsumugi.toml`. Every field can also be given as a flag.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub token: Option<String>,
    /// Locale of catalog titles
    pub locale: Option<String>,
    pub audio_locale: Option<String>,
    pub subtitle_locale: Option<String>,
    pub output: Option<PathBuf>,
    pub concurrency: Option<NonZeroU32>,
    /// HTTP timeout, in seconds
    pub timeout: Option<u64>,
    pub ffmpeg: Option<PathBuf>,
    pub cdm: CdmConfig,
}

/// A local device (`wvd`, or `client_id` with `private_key`) is used when
/// configured. Otherwise the remote CDM at `host` is.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CdmConfig {
    pub wvd: Option<PathBuf>,
    pub client_id: Option<PathBuf>,
    pub private_key: Option<PathBuf>,

    pub host: Option<String>,
    pub device: Option<String>,
    pub secret: Option<String>,
}

impl Config {
    /// A missing file is an empty configuration.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("{} not found, using flags only", path.display());
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let config = toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
        Ok(config)
    }
}
