//! Device-facing ingest contract and the caller-facing surface built on it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info};

use super::configuration::ProcessConfiguration;
use super::error::{IngestError, IngestErrorCode, IngestResult};
use super::options::IngestOptions;
use super::process::{ProcessHandle, ProcessId, StepContext};
use crate::takes::{TakeCatalog, TakeEvents, TakeId, TakeInfo, TakeMetadata};

/// Called once a take list refresh has settled, with the resulting ids.
pub type TakeListCallback = Box<dyn FnOnce(Vec<TakeId>) + Send>;

/// What a device backend implements to take part in ingest.
///
/// Every `perform_*` call must eventually end with [`StepContext::finish`],
/// on any thread. Cancellation is cooperative: after [`cancel`](Self::cancel)
/// the backend should finish the in-flight step with `AbortedByUser`.
pub trait IngestDevice: Send + Sync {
    /// Begin fetching the raw data of `step.take_id()`.
    fn perform_download(&self, step: StepContext, options: Arc<IngestOptions>);

    /// Begin converting and uploading previously downloaded data.
    fn perform_convert_and_upload(&self, step: StepContext, options: Arc<IngestOptions>);

    /// Best-effort abort of whatever step `process_id` has in flight.
    fn cancel(&self, process_id: ProcessId);

    /// Re-enumerate takes into `catalog`, then call `on_settled` with the ids.
    ///
    /// May complete synchronously or on a background task. Changes must go
    /// through the catalog so subscribers see the matching take events.
    fn update_take_list(&self, catalog: Arc<TakeCatalog>, on_settled: TakeListCallback);
}

/// Caller-facing ingest surface of one device.
///
/// Owns the take catalog of the device and creates processes bound to its
/// backend. Cheap to share behind an `Arc`.
pub struct IngestCapability {
    device: Arc<dyn IngestDevice>,
    catalog: Arc<TakeCatalog>,
}

impl IngestCapability {
    pub fn new(device: Arc<dyn IngestDevice>) -> Self {
        Self::with_catalog(device, Arc::new(TakeCatalog::new()))
    }

    pub fn with_catalog(device: Arc<dyn IngestDevice>, catalog: Arc<TakeCatalog>) -> Self {
        Self { device, catalog }
    }

    pub fn catalog(&self) -> &Arc<TakeCatalog> {
        &self.catalog
    }

    /// Take added / updated / removed / list reset events.
    pub fn events(&self) -> &TakeEvents {
        self.catalog.events()
    }

    /// Create a process for a known take. Nothing runs until
    /// [`run_process`](Self::run_process).
    pub fn create_process(
        &self,
        take_id: TakeId,
        configuration: ProcessConfiguration,
    ) -> Result<ProcessHandle, IngestError> {
        if !self.catalog.registry().contains(take_id) {
            return Err(IngestError::invalid_argument(format!(
                "Unknown take id {}",
                take_id
            )));
        }
        ProcessHandle::new(take_id, configuration, self.device.clone())
    }

    pub fn run_process(&self, handle: &ProcessHandle, options: IngestOptions) {
        handle.run(options);
    }

    pub fn cancel_process(&self, handle: &ProcessHandle) {
        handle.cancel();
    }

    /// Ask the backend to refresh the take list.
    pub fn update_take_list<F>(&self, callback: F)
    where
        F: FnOnce(Vec<TakeId>) + Send + 'static,
    {
        debug!("Updating take list");
        self.device
            .update_take_list(self.catalog.clone(), Box::new(callback));
    }

    /// Refresh the take list and wait for it to settle.
    pub async fn refresh_takes(&self) -> Result<Vec<TakeId>, IngestError> {
        let (tx, rx) = oneshot::channel();
        self.update_take_list(move |ids| {
            let _ = tx.send(ids);
        });
        rx.await
            .map_err(|_| IngestError::internal("Take list update ended without a result"))
    }

    pub fn get_take_metadata(&self, take_id: TakeId) -> Option<TakeMetadata> {
        self.catalog.registry().get(take_id)
    }

    pub fn get_take_identifiers(&self) -> Vec<TakeId> {
        self.catalog.registry().list_ids()
    }

    pub fn get_take_info(&self, take_id: TakeId) -> Option<TakeInfo> {
        self.get_take_metadata(take_id).map(|m| TakeInfo::from(&m))
    }

    /// Run a whole process for `take_id` and wait for its result.
    ///
    /// `on_progress` receives the aggregate progress. With a `timeout`, the
    /// process is cancelled once the deadline passes and the call returns
    /// after the backend acknowledges the cancellation.
    pub async fn ingest_take<F>(
        &self,
        take_id: TakeId,
        configuration: ProcessConfiguration,
        options: IngestOptions,
        on_progress: F,
        timeout: Option<Duration>,
    ) -> IngestResult
    where
        F: Fn(f32) + Send + Sync + 'static,
    {
        let handle = self.create_process(take_id, configuration)?;
        let (tx, mut rx) = oneshot::channel();
        handle.on_finished(move |result| {
            let _ = tx.send(result);
        });
        handle.on_progress(on_progress);

        info!(
            "Ingesting take {} with {:?} (process {})",
            take_id,
            configuration,
            handle.id()
        );
        self.run_process(&handle, options);

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                Ok(received) => received,
                Err(_) => {
                    info!(
                        "Process {} did not finish within {:?}, cancelling",
                        handle.id(),
                        limit
                    );
                    self.cancel_process(&handle);
                    rx.await
                }
            },
            None => rx.await,
        };

        received.unwrap_or_else(|_| {
            Err(IngestError::new(
                IngestErrorCode::InternalError,
                "Process ended without reporting a result",
            ))
        })
    }
}
