mod file_config;

pub use file_config::{FileConfig, TransferConfig};

use crate::archive::{ArchiveSettings, RetryPolicy};
use crate::ingest::{AudioOptions, IngestOptions, VideoOptions};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub archive_dir: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    pub destination_host: Option<String>,
    pub device_identifier: Option<String>,
    pub connect_timeout_sec: u64,
    pub process_timeout_sec: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub archive_dir: PathBuf,
    pub working_dir: PathBuf,
    pub download_dir: PathBuf,
    pub destination_host: String,
    pub device_identifier: String,
    pub connect_timeout: Duration,
    /// No timeout when `None`.
    pub process_timeout: Option<Duration>,

    // Feature configs (with defaults)
    pub retry_policy: RetryPolicy,
    pub video: VideoOptions,
    pub audio: AudioOptions,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let archive_dir = file
            .archive_dir
            .map(PathBuf::from)
            .or_else(|| cli.archive_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("archive_dir must be specified via --archive-dir or in config file")
            })?;

        let working_dir = file
            .working_dir
            .map(PathBuf::from)
            .or_else(|| cli.working_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));

        let download_dir = file
            .download_dir
            .map(PathBuf::from)
            .or_else(|| cli.download_dir.clone())
            .unwrap_or_else(|| working_dir.join("downloads"));

        if working_dir.exists() && !working_dir.is_dir() {
            bail!("working_dir is not a directory: {:?}", working_dir);
        }
        if download_dir.exists() && !download_dir.is_dir() {
            bail!("download_dir is not a directory: {:?}", download_dir);
        }

        let destination_host = file
            .destination_host
            .or_else(|| cli.destination_host.clone())
            .unwrap_or_default();

        let device_identifier = file
            .device_identifier
            .or_else(|| cli.device_identifier.clone())
            .unwrap_or_else(|| {
                archive_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "archive".to_string())
            });

        let connect_timeout_sec = file.connect_timeout_sec.unwrap_or(cli.connect_timeout_sec);
        if connect_timeout_sec == 0 {
            bail!("connect_timeout_sec must be greater than 0");
        }
        let process_timeout = file
            .process_timeout_sec
            .or(cli.process_timeout_sec)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        // Transfer retry settings - merge file config with defaults
        let defaults = RetryPolicy::default();
        let transfer = file.transfer.unwrap_or_default();
        let retry_policy = RetryPolicy {
            max_retries: transfer.max_retries.unwrap_or(defaults.max_retries),
            initial_backoff_ms: transfer
                .initial_backoff_ms
                .unwrap_or(defaults.initial_backoff_ms),
            max_backoff_ms: transfer.max_backoff_ms.unwrap_or(defaults.max_backoff_ms),
            backoff_multiplier: transfer
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
        };
        if retry_policy.backoff_multiplier < 1.0 {
            bail!(
                "transfer.backoff_multiplier must be at least 1.0, got {}",
                retry_policy.backoff_multiplier
            );
        }

        let video = file.video.unwrap_or_default();
        if ![0, 90, 180, 270].contains(&video.rotation) {
            bail!("video.rotation must be 0, 90, 180 or 270, got {}", video.rotation);
        }

        Ok(Self {
            archive_dir,
            working_dir,
            download_dir,
            destination_host,
            device_identifier,
            connect_timeout: Duration::from_secs(connect_timeout_sec),
            process_timeout,
            retry_policy,
            video,
            audio: file.audio.unwrap_or_default(),
        })
    }

    pub fn archive_settings(&self) -> ArchiveSettings {
        ArchiveSettings {
            archive_dir: self.archive_dir.clone(),
            identifier: self.device_identifier.clone(),
            retry_policy: self.retry_policy.clone(),
        }
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            working_directory: self.working_dir.clone(),
            download_directory: self.download_dir.clone(),
            video: self.video.clone(),
            audio: self.audio.clone(),
            upload_host_name: self.destination_host.clone(),
        }
    }
}
