use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::ingest::{AudioOptions, VideoOptions};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub archive_dir: Option<String>,
    pub working_dir: Option<String>,
    pub download_dir: Option<String>,
    pub destination_host: Option<String>,
    pub device_identifier: Option<String>,
    pub connect_timeout_sec: Option<u64>,
    pub process_timeout_sec: Option<u64>,

    // Feature configs
    pub transfer: Option<TransferConfig>,
    pub video: Option<VideoOptions>,
    pub audio: Option<AudioOptions>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TransferConfig {
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
