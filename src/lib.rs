//! Take Ingest Library
//!
//! Device-agnostic engine for pulling recorded takes off capture devices:
//! take registry, connection state, and the two-step ingest process.

pub mod archive;
pub mod config;
pub mod connection;
pub mod ingest;
pub mod notify;
pub mod takes;

// Re-export commonly used types for convenience
pub use archive::{ArchiveDevice, ArchiveSettings};
pub use connection::{ConnectionCapability, ConnectionState, ConnectionStatus};
pub use ingest::{
    IngestCapability, IngestDevice, IngestError, IngestErrorCode, IngestOptions,
    ProcessConfiguration, ProcessHandle,
};
pub use takes::{TakeCatalog, TakeId, TakeMetadata};
