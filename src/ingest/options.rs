//! Plain configuration records handed to device backends for each step.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoOptions {
    /// Output container, e.g. `mov` or `mp4`.
    pub format: String,
    pub file_name_prefix: String,
    /// Pixel format requested from the converter, e.g. `yuv420p`.
    pub pixel_format: String,
    /// Clockwise rotation in degrees. One of 0, 90, 180, 270.
    pub rotation: u16,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            format: "mov".to_string(),
            file_name_prefix: "video".to_string(),
            pixel_format: "yuv420p".to_string(),
            rotation: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioOptions {
    pub format: String,
    pub file_name_prefix: String,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            format: "wav".to_string(),
            file_name_prefix: "audio".to_string(),
        }
    }
}

/// Everything a backend needs to run the steps of one process.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    pub working_directory: PathBuf,
    pub download_directory: PathBuf,
    pub video: VideoOptions,
    pub audio: AudioOptions,
    /// Host the converted take is uploaded to.
    pub upload_host_name: String,
}
