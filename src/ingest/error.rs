//! Error taxonomy attached to failed ingest steps.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of failure codes a step can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestErrorCode {
    AbortedByUser,
    InternalError,
    InvalidArgument,
    DownloaderError,
    DestinationNotFound,
    DestinationConnectionTimedOut,
    DestinationUploadError,
    ConversionError,
}

impl IngestErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestErrorCode::AbortedByUser => "aborted_by_user",
            IngestErrorCode::InternalError => "internal_error",
            IngestErrorCode::InvalidArgument => "invalid_argument",
            IngestErrorCode::DownloaderError => "downloader_error",
            IngestErrorCode::DestinationNotFound => "destination_not_found",
            IngestErrorCode::DestinationConnectionTimedOut => "destination_connection_timed_out",
            IngestErrorCode::DestinationUploadError => "destination_upload_error",
            IngestErrorCode::ConversionError => "conversion_error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "aborted_by_user" => Some(IngestErrorCode::AbortedByUser),
            "internal_error" => Some(IngestErrorCode::InternalError),
            "invalid_argument" => Some(IngestErrorCode::InvalidArgument),
            "downloader_error" => Some(IngestErrorCode::DownloaderError),
            "destination_not_found" => Some(IngestErrorCode::DestinationNotFound),
            "destination_connection_timed_out" => {
                Some(IngestErrorCode::DestinationConnectionTimedOut)
            }
            "destination_upload_error" => Some(IngestErrorCode::DestinationUploadError),
            "conversion_error" => Some(IngestErrorCode::ConversionError),
            _ => None,
        }
    }
}

impl std::fmt::Display for IngestErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed step: one code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct IngestError {
    pub code: IngestErrorCode,
    pub message: String,
}

impl IngestError {
    pub fn new(code: IngestErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn aborted_by_user() -> Self {
        Self::new(IngestErrorCode::AbortedByUser, "Ingest aborted by user")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(IngestErrorCode::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(IngestErrorCode::InternalError, message)
    }

    pub fn is_aborted(&self) -> bool {
        self.code == IngestErrorCode::AbortedByUser
    }
}

/// Outcome of a step or of a whole process.
pub type IngestResult = Result<(), IngestError>;
