//! In-memory backend whose step outcomes are set up front.

use std::sync::{Arc, Mutex};

use take_ingest::ingest::{
    IngestCapability, IngestDevice, IngestError, IngestErrorCode, IngestOptions, ProcessId,
    ProcessStep, StepContext, TakeListCallback,
};
use take_ingest::takes::{TakeCatalog, TakeId, TakeMetadata};

use super::fixtures::take_fixtures;

/// What a scripted step does once dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepScript {
    /// Report 0.5, then succeed.
    Succeed,
    /// Report 0.5, then fail with the given code.
    Fail(IngestErrorCode),
    /// Report 0.5, then wait for cancellation and report `AbortedByUser`.
    Hang,
}

pub struct ScriptedDevice {
    download: Mutex<StepScript>,
    convert: Mutex<StepScript>,
    takes: Vec<TakeMetadata>,
    calls: Mutex<Vec<(ProcessStep, TakeId)>>,
    cancels: Mutex<Vec<ProcessId>>,
    last_options: Mutex<Option<IngestOptions>>,
}

impl ScriptedDevice {
    pub fn new(takes: Vec<TakeMetadata>) -> Arc<Self> {
        Arc::new(Self {
            download: Mutex::new(StepScript::Succeed),
            convert: Mutex::new(StepScript::Succeed),
            takes,
            calls: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            last_options: Mutex::new(None),
        })
    }

    /// Device with `count` takes, already listed in a fresh capability.
    pub async fn with_takes(count: u32) -> (Arc<Self>, IngestCapability) {
        let device = Self::new(take_fixtures(count));
        let capability = IngestCapability::new(device.clone());
        capability
            .refresh_takes()
            .await
            .expect("take list refresh failed");
        (device, capability)
    }

    pub fn script(&self, step: ProcessStep, script: StepScript) {
        let slot = match step {
            ProcessStep::Download => &self.download,
            ProcessStep::ConvertAndUpload => &self.convert,
        };
        *slot.lock().unwrap() = script;
    }

    pub fn calls(&self) -> Vec<(ProcessStep, TakeId)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> Vec<ProcessId> {
        self.cancels.lock().unwrap().clone()
    }

    pub fn last_options(&self) -> Option<IngestOptions> {
        self.last_options.lock().unwrap().clone()
    }

    fn dispatch(&self, step: StepContext, options: Arc<IngestOptions>) {
        let script = match step.step() {
            ProcessStep::Download => *self.download.lock().unwrap(),
            ProcessStep::ConvertAndUpload => *self.convert.lock().unwrap(),
        };
        self.calls.lock().unwrap().push((step.step(), step.take_id()));
        *self.last_options.lock().unwrap() = Some(options.as_ref().clone());

        tokio::spawn(async move {
            step.report_progress(0.5);
            tokio::task::yield_now().await;
            match script {
                StepScript::Succeed => step.finish(Ok(())),
                StepScript::Fail(code) => {
                    step.finish(Err(IngestError::new(code, "scripted failure")))
                }
                StepScript::Hang => {
                    step.cancellation_token().cancelled().await;
                    step.finish(Err(IngestError::aborted_by_user()));
                }
            }
        });
    }
}

impl IngestDevice for ScriptedDevice {
    fn perform_download(&self, step: StepContext, options: Arc<IngestOptions>) {
        self.dispatch(step, options);
    }

    fn perform_convert_and_upload(&self, step: StepContext, options: Arc<IngestOptions>) {
        self.dispatch(step, options);
    }

    fn cancel(&self, process_id: ProcessId) {
        self.cancels.lock().unwrap().push(process_id);
    }

    fn update_take_list(&self, catalog: Arc<TakeCatalog>, on_settled: TakeListCallback) {
        for take in &self.takes {
            let name = take.display_name();
            if catalog
                .find_take(|existing| existing.display_name() == name)
                .is_none()
            {
                catalog.add_take(take.clone());
            }
        }
        on_settled(catalog.registry().list_ids());
    }
}
