use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::ingest::{IngestError, IngestErrorCode, ProcessStep};
use crate::takes::TakeId;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive directory not found: {0:?}")]
    ArchiveNotFound(PathBuf),

    #[error("Take {0} is not in the catalog")]
    UnknownTake(TakeId),

    #[error("Take {0} has no media files")]
    NoMedia(String),

    #[error("No upload destination configured")]
    NoDestination,

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid take manifest {path:?}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to write upload manifest: {0}")]
    UploadManifest(#[from] toml::ser::Error),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Archive device needs a tokio runtime")]
    NoRuntime,
}

impl ArchiveError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether another attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ArchiveError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// Map to the ingest error reported for `step`.
    pub fn into_ingest_error(self, step: ProcessStep) -> IngestError {
        let code = match (&self, step) {
            (ArchiveError::Cancelled, _) => IngestErrorCode::AbortedByUser,
            (ArchiveError::UnknownTake(_), _) => IngestErrorCode::InvalidArgument,
            (ArchiveError::NoDestination, _) => IngestErrorCode::DestinationNotFound,
            (ArchiveError::NoRuntime, _) => IngestErrorCode::InternalError,
            (ArchiveError::UploadManifest(_), _) => IngestErrorCode::ConversionError,
            (_, ProcessStep::Download) => IngestErrorCode::DownloaderError,
            (_, ProcessStep::ConvertAndUpload) => IngestErrorCode::DestinationUploadError,
        };
        IngestError::new(code, self.to_string())
    }
}
