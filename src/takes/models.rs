//! Take data models.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a take within one device's registry, allocated from 0.
pub type TakeId = u32;

/// Device-defined description of one recorded take.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeMetadata {
    pub slate_name: String,
    pub take_number: u32,
    pub date: Option<DateTime<Utc>>,
    pub thumbnail: Option<PathBuf>,
    pub video_files: Vec<PathBuf>,
    pub audio_files: Vec<PathBuf>,
    pub num_frames: Option<u32>,
    pub frame_rate: Option<f32>,
    /// Width x height in pixels.
    pub resolution: Option<(u32, u32)>,
    pub device_model: Option<String>,
    /// Anything else the device wants to keep alongside the take.
    pub attributes: BTreeMap<String, String>,
    /// Where the take lives on the device, for devices that store takes as
    /// directories. Distinguishes takes that share a display name.
    pub source_dir: Option<PathBuf>,
}

impl TakeMetadata {
    pub fn new(slate_name: impl Into<String>, take_number: u32) -> Self {
        Self {
            slate_name: slate_name.into(),
            take_number,
            ..Default::default()
        }
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// `<slate>_<take>`, used for directory and display names.
    pub fn display_name(&self) -> String {
        format!("{}_{}", self.slate_name, self.take_number)
    }

    /// Name of the directory the take is staged under: the source
    /// directory's name if known, the display name otherwise.
    pub fn storage_name(&self) -> String {
        self.source_dir
            .as_deref()
            .and_then(|dir| dir.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.display_name())
    }

    pub fn media_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.video_files.iter().chain(self.audio_files.iter())
    }
}

/// Read-only view of a take shown to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TakeInfo {
    pub slate_name: String,
    pub take_number: u32,
    pub date: Option<DateTime<Utc>>,
    pub num_frames: Option<u32>,
    pub frame_rate: Option<f32>,
    pub resolution: Option<(u32, u32)>,
    pub device_model: Option<String>,
}

impl From<&TakeMetadata> for TakeInfo {
    fn from(metadata: &TakeMetadata) -> Self {
        Self {
            slate_name: metadata.slate_name.clone(),
            take_number: metadata.take_number,
            date: metadata.date,
            num_frames: metadata.num_frames,
            frame_rate: metadata.frame_rate,
            resolution: metadata.resolution,
            device_model: metadata.device_model.clone(),
        }
    }
}

impl std::fmt::Display for TakeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} take {}", self.slate_name, self.take_number)?;
        if let Some(date) = self.date {
            write!(f, " ({})", date.format("%Y-%m-%d %H:%M:%S"))?;
        }
        Ok(())
    }
}
