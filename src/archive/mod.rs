//! Reference backend: takes stored as directories in a local archive.

mod device;
mod error;
mod retry_policy;
mod scanner;
mod transfer;

pub use device::{ArchiveDevice, ArchiveSettings, UPLOAD_MANIFEST_FILE_NAME};
pub use error::ArchiveError;
pub use retry_policy::RetryPolicy;
pub use scanner::{parse_take_dir_name, scan_archive, MediaKind, MANIFEST_FILE_NAME};
pub use transfer::{FileCopy, Transfer};
