//! Ingest backend that reads takes from a local archive directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::ArchiveError;
use super::retry_policy::RetryPolicy;
use super::scanner::{self, MediaKind};
use super::transfer::{FileCopy, Transfer};
use crate::connection::{
    update_identifier, ConnectionCapability, ConnectionError, ConnectionState, ConnectionStatus,
};
use crate::ingest::{
    IngestCapability, IngestDevice, IngestOptions, ProcessId, StepContext, TakeListCallback,
};
use crate::takes::{TakeCatalog, TakeId, TakeMetadata};

pub const UPLOAD_MANIFEST_FILE_NAME: &str = "upload.toml";

#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub archive_dir: PathBuf,
    pub identifier: String,
    pub retry_policy: RetryPolicy,
}

/// Written next to the uploaded files for the converter downstream.
#[derive(Debug, Serialize)]
struct UploadManifest<'a> {
    take: String,
    slate_name: &'a str,
    take_number: u32,
    pixel_format: &'a str,
    rotation: u16,
    video_files: Vec<String>,
    audio_files: Vec<String>,
}

pub struct ArchiveDevice {
    archive_dir: PathBuf,
    retry_policy: RetryPolicy,
    identifier: Mutex<String>,
    catalog: Arc<TakeCatalog>,
    connection: Arc<ConnectionState>,
    transfers: Arc<Mutex<HashMap<ProcessId, CancellationToken>>>,
    runtime: Handle,
}

impl ArchiveDevice {
    /// Must be called from within a tokio runtime; transfers run on its
    /// blocking pool.
    pub fn new(settings: ArchiveSettings) -> Result<Arc<Self>, ArchiveError> {
        let runtime = Handle::try_current().map_err(|_| ArchiveError::NoRuntime)?;
        Ok(Arc::new(Self {
            archive_dir: settings.archive_dir,
            retry_policy: settings.retry_policy,
            identifier: Mutex::new(settings.identifier),
            catalog: Arc::new(TakeCatalog::new()),
            connection: Arc::new(ConnectionState::new()),
            transfers: Arc::new(Mutex::new(HashMap::new())),
            runtime,
        }))
    }

    /// Capability sharing this device's catalog.
    pub fn capability(self: &Arc<Self>) -> IngestCapability {
        IngestCapability::with_catalog(self.clone(), self.catalog.clone())
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn identifier(&self) -> String {
        self.identifier
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_identifier(&self, identifier: &str) -> Result<(), ConnectionError> {
        update_identifier(self, &self.identifier, identifier)
    }

    /// Number of transfers currently running.
    pub fn active_transfers(&self) -> usize {
        self.transfers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn take(&self, take_id: TakeId) -> Result<TakeMetadata, ArchiveError> {
        self.catalog
            .registry()
            .get(take_id)
            .ok_or(ArchiveError::UnknownTake(take_id))
    }

    /// Run `work` on the blocking pool and finish `step` with its result.
    fn spawn_step<F>(&self, step: StepContext, work: F)
    where
        F: FnOnce(&Transfer<'_>, &dyn Fn(f32)) -> Result<(), ArchiveError> + Send + 'static,
    {
        let process_id = step.process_id();
        let token = step.cancellation_token();
        self.transfers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(process_id, token.clone());

        let transfers = self.transfers.clone();
        let policy = self.retry_policy.clone();
        self.runtime.spawn_blocking(move || {
            let kind = step.step();
            let transfer = Transfer::new(&policy, &token);
            let result = work(&transfer, &|p| step.report_progress(p));

            transfers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&process_id);
            step.finish(result.map_err(|e| e.into_ingest_error(kind)));
        });
    }

    fn reconcile(catalog: &TakeCatalog, scanned: Vec<TakeMetadata>) {
        let mut known: HashMap<PathBuf, (TakeId, TakeMetadata)> = HashMap::new();
        for (id, metadata) in catalog.registry().entries() {
            if known.contains_key(&take_key(&metadata)) {
                warn!("Dropping duplicate take {} ({})", id, metadata.display_name());
                catalog.remove_take(id);
                continue;
            }
            known.insert(take_key(&metadata), (id, metadata));
        }

        for metadata in scanned {
            match known.remove(&take_key(&metadata)) {
                Some((id, existing)) => {
                    if existing != metadata {
                        catalog.update_take(id, metadata);
                    }
                }
                None => {
                    catalog.add_take(metadata);
                }
            }
        }
        for (id, _) in known.into_values() {
            catalog.remove_take(id);
        }
    }
}

/// Takes are matched across scans by the directory they were read from.
fn take_key(metadata: &TakeMetadata) -> PathBuf {
    metadata
        .source_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(metadata.display_name()))
}

/// Download destination for `source`, keeping its place below the take
/// directory so files sharing a name in different subfolders stay apart.
fn download_destination(take: &TakeMetadata, target: &Path, source: &Path) -> Option<PathBuf> {
    let relative = take
        .source_dir
        .as_deref()
        .and_then(|dir| source.strip_prefix(dir).ok())
        .filter(|relative| !relative.as_os_str().is_empty());
    match relative {
        Some(relative) => Some(target.join(relative)),
        None => Some(target.join(source.file_name()?)),
    }
}

fn destination_name(prefix: &str, index: usize, format: &str) -> String {
    format!("{}_{}.{}", prefix, index, format)
}

fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl IngestDevice for ArchiveDevice {
    fn perform_download(&self, step: StepContext, options: Arc<IngestOptions>) {
        let take = match self.take(step.take_id()) {
            Ok(take) => take,
            Err(e) => {
                let kind = step.step();
                step.finish(Err(e.into_ingest_error(kind)));
                return;
            }
        };

        let target = options.download_directory.join(take.storage_name());
        info!("Downloading {} to {:?}", take.display_name(), target);
        self.spawn_step(step, move |transfer, progress| {
            let jobs: Vec<FileCopy> = take
                .media_files()
                .filter_map(|source| {
                    Some(FileCopy {
                        source: source.clone(),
                        destination: download_destination(&take, &target, source)?,
                    })
                })
                .collect();
            if jobs.is_empty() {
                return Err(ArchiveError::NoMedia(take.display_name()));
            }
            transfer.run(&jobs, progress)?;
            Ok(())
        });
    }

    fn perform_convert_and_upload(&self, step: StepContext, options: Arc<IngestOptions>) {
        let kind = step.step();
        let take = match self.take(step.take_id()) {
            Ok(take) => take,
            Err(e) => return step.finish(Err(e.into_ingest_error(kind))),
        };
        if options.upload_host_name.trim().is_empty() {
            return step.finish(Err(ArchiveError::NoDestination.into_ingest_error(kind)));
        }

        let name = take.display_name();
        let downloaded = options.download_directory.join(take.storage_name());
        let target = options
            .working_directory
            .join(&options.upload_host_name)
            .join(take.storage_name());
        info!("Uploading {} to {:?}", name, target);

        self.spawn_step(step, move |transfer, progress| {
            // Prefer the downloaded copy, fall back to the archive itself.
            let sources: Vec<PathBuf> = if downloaded.is_dir() {
                scanner::list_files(&downloaded)
            } else {
                take.media_files().cloned().collect()
            };

            let mut jobs = Vec::new();
            let mut video_files = Vec::new();
            let mut audio_files = Vec::new();
            for source in sources {
                let file_name = match MediaKind::of(&source) {
                    Some(MediaKind::Video) => {
                        let n = destination_name(
                            &options.video.file_name_prefix,
                            video_files.len() + 1,
                            &options.video.format,
                        );
                        video_files.push(n.clone());
                        n
                    }
                    Some(MediaKind::Audio) => {
                        let n = destination_name(
                            &options.audio.file_name_prefix,
                            audio_files.len() + 1,
                            &options.audio.format,
                        );
                        audio_files.push(n.clone());
                        n
                    }
                    None => {
                        debug!("Skipping non-media file {:?}", file_name_string(&source));
                        continue;
                    }
                };
                jobs.push(FileCopy {
                    source,
                    destination: target.join(file_name),
                });
            }
            if jobs.is_empty() {
                return Err(ArchiveError::NoMedia(name));
            }

            transfer.run(&jobs, progress)?;

            let manifest = UploadManifest {
                take: name,
                slate_name: &take.slate_name,
                take_number: take.take_number,
                pixel_format: &options.video.pixel_format,
                rotation: options.video.rotation,
                video_files,
                audio_files,
            };
            let path = target.join(UPLOAD_MANIFEST_FILE_NAME);
            std::fs::write(&path, toml::to_string(&manifest)?)
                .map_err(|e| ArchiveError::io(&path, e))?;
            Ok(())
        });
    }

    fn cancel(&self, process_id: ProcessId) {
        let token = self
            .transfers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&process_id)
            .cloned();
        match token {
            Some(token) => {
                info!("Cancelling transfer for process {}", process_id);
                token.cancel();
            }
            None => debug!("No transfer running for process {}", process_id),
        }
    }

    fn update_take_list(&self, catalog: Arc<TakeCatalog>, on_settled: TakeListCallback) {
        let root = self.archive_dir.clone();
        self.runtime.spawn(async move {
            let scan_root = root.clone();
            let scanned = tokio::task::spawn_blocking(move || scanner::scan_archive(&scan_root))
                .await
                .map_err(|e| warn!("Archive scan task failed: {}", e))
                .ok();

            match scanned {
                Some(Ok(takes)) => {
                    info!("Found {} takes in {:?}", takes.len(), root);
                    Self::reconcile(&catalog, takes);
                }
                Some(Err(e)) => warn!("Failed to scan archive: {}", e),
                None => {}
            }
            on_settled(catalog.registry().list_ids());
        });
    }
}

impl ConnectionCapability for ArchiveDevice {
    fn connection_state(&self) -> &ConnectionState {
        &self.connection
    }

    fn connect(&self) {
        let state = self.connection.clone();
        let root = self.archive_dir.clone();
        state.set_status(ConnectionStatus::Connecting);
        self.runtime.spawn(async move {
            let reachable = tokio::fs::metadata(&root)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if reachable {
                state.set_status(ConnectionStatus::Connected);
            } else {
                warn!("Archive directory {:?} is not reachable", root);
                state.set_status(ConnectionStatus::Disconnected);
            }
        });
    }

    fn disconnect(&self) {
        let tokens: Vec<CancellationToken> = self
            .transfers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        self.connection.set_status(ConnectionStatus::Disconnecting);
        for token in tokens {
            token.cancel();
        }
        self.connection.set_status(ConnectionStatus::Disconnected);
    }

    fn can_set_identifier(&self) -> bool {
        true
    }
}
