//! Device-agnostic ingest engine.
//!
//! An ingest runs up to two steps for one take:
//! 1. DOWNLOAD: fetch the raw take data from the device
//! 2. CONVERT_AND_UPLOAD: transcode it and push it to the destination
//!
//! Backends implement [`IngestDevice`]; callers drive processes through
//! [`IngestCapability`].

mod capability;
mod configuration;
mod error;
mod options;
mod process;
mod progress;

pub use capability::{IngestCapability, IngestDevice, TakeListCallback};
pub use configuration::{ProcessConfiguration, ProcessStep};
pub use error::{IngestError, IngestErrorCode, IngestResult};
pub use options::{AudioOptions, IngestOptions, VideoOptions};
pub use process::{
    FinishCallback, ProcessHandle, ProcessId, ProcessState, ProgressCallback, StepContext,
};
pub use progress::{ProgressAggregator, ProgressReporter, TaskHandle};
