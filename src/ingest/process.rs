//! Per-take ingest state machine.
//!
//! A process walks its [`ProcessConfiguration`] lowest bit first: each step
//! is dispatched to the device backend together with a [`StepContext`], and
//! the next step is only started from the success path of the previous
//! step's [`StepContext::finish`]. A failed step ends the process; so does a
//! cancellation once the backend acknowledges it.
//!
//! No internal lock is held while calling into the backend or into caller
//! callbacks, so backends may finish a step synchronously from inside
//! `perform_*`.

use std::sync::{Arc, Mutex, Weak};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::capability::IngestDevice;
use super::configuration::{ProcessConfiguration, ProcessStep};
use super::error::{IngestError, IngestErrorCode, IngestResult};
use super::options::IngestOptions;
use super::progress::{ProgressAggregator, TaskHandle};
use crate::takes::TakeId;

/// Identifies one process handle, e.g. when a backend matches a cancel request.
pub type ProcessId = Uuid;

pub type FinishCallback = Box<dyn FnOnce(IngestResult) + Send>;
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    RunningDownload,
    RunningConvertAndUpload,
    Done,                     // terminal
    Errored(IngestErrorCode), // terminal
}

impl ProcessState {
    fn running(step: ProcessStep) -> Self {
        match step {
            ProcessStep::Download => ProcessState::RunningDownload,
            ProcessStep::ConvertAndUpload => ProcessState::RunningConvertAndUpload,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Done | ProcessState::Errored(_))
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ProcessState::RunningDownload | ProcessState::RunningConvertAndUpload
        )
    }
}

struct Machine {
    state: ProcessState,
    remaining: ProcessConfiguration,
    /// Step handed to the backend and not yet finished.
    current_step: Option<ProcessStep>,
    options: Option<Arc<IngestOptions>>,
    error: Option<IngestError>,
}

/// What to do once the machine lock is released.
enum Next {
    Dispatch(StepContext, Arc<IngestOptions>),
    Finish(IngestResult),
    Nothing,
}

pub(crate) struct ProcessContext {
    id: ProcessId,
    take_id: TakeId,
    configuration: ProcessConfiguration,
    device: Arc<dyn IngestDevice>,
    machine: Mutex<Machine>,
    progress: Arc<ProgressAggregator>,
    on_progress: Arc<Mutex<Option<ProgressCallback>>>,
    on_finished: Mutex<Option<FinishCallback>>,
    cancellation: CancellationToken,
}

impl ProcessContext {
    fn lock(&self) -> std::sync::MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run(self: &Arc<Self>, options: IngestOptions) {
        {
            let mut machine = self.lock();
            if machine.options.is_none() {
                machine.options = Some(Arc::new(options));
            }
        }
        self.start_next_step();
    }

    fn start_next_step(self: &Arc<Self>) {
        let next = {
            let mut machine = self.lock();
            if machine.state.is_terminal() {
                debug!(
                    "Process {} for take {} already finished ({:?}), not running",
                    self.id, self.take_id, machine.state
                );
                Next::Nothing
            } else if let Some(step) = machine.current_step {
                warn!(
                    "Process {} for take {} is still running {}, ignoring run request",
                    self.id, self.take_id, step
                );
                Next::Nothing
            } else if self.cancellation.is_cancelled() {
                let error = IngestError::aborted_by_user();
                machine.state = ProcessState::Errored(error.code);
                machine.error = Some(error.clone());
                Next::Finish(Err(error))
            } else {
                match machine.remaining.next_step() {
                    Some(step) => {
                        machine.current_step = Some(step);
                        machine.state = ProcessState::running(step);
                        let options = machine.options.clone().unwrap_or_default();
                        let context = StepContext {
                            process: Arc::downgrade(self),
                            process_id: self.id,
                            take_id: self.take_id,
                            step,
                            task: self.progress.start_task(),
                            cancellation: self.cancellation.clone(),
                            finished: false,
                        };
                        Next::Dispatch(context, options)
                    }
                    None if machine.remaining.is_empty() => {
                        machine.state = ProcessState::Done;
                        Next::Finish(Ok(()))
                    }
                    None => {
                        let error = IngestError::internal(format!(
                            "No runnable step left in {:?}",
                            machine.remaining
                        ));
                        machine.state = ProcessState::Errored(error.code);
                        machine.error = Some(error.clone());
                        Next::Finish(Err(error))
                    }
                }
            }
        };

        match next {
            Next::Dispatch(context, options) => {
                info!(
                    "Starting {} step of process {} for take {}",
                    context.step, self.id, self.take_id
                );
                match context.step {
                    ProcessStep::Download => self.device.perform_download(context, options),
                    ProcessStep::ConvertAndUpload => {
                        self.device.perform_convert_and_upload(context, options)
                    }
                }
            }
            Next::Finish(result) => self.finish(result),
            Next::Nothing => {}
        }
    }

    fn on_step_finished(self: &Arc<Self>, step: ProcessStep, result: IngestResult) {
        let next = {
            let mut machine = self.lock();
            if machine.state.is_terminal() || machine.current_step != Some(step) {
                debug!(
                    "Ignoring late {} result for process {} in state {:?}",
                    step, self.id, machine.state
                );
                return;
            }
            machine.current_step = None;

            match result {
                Ok(()) => {
                    machine.remaining.remove(step.flag());
                    if machine.remaining.is_empty() {
                        machine.state = ProcessState::Done;
                        Next::Finish(Ok(()))
                    } else {
                        Next::Nothing
                    }
                }
                Err(error) => {
                    machine.state = ProcessState::Errored(error.code);
                    machine.error = Some(error.clone());
                    Next::Finish(Err(error))
                }
            }
        };

        match next {
            Next::Finish(result) => self.finish(result),
            _ => self.start_next_step(),
        }
    }

    fn finish(&self, result: IngestResult) {
        match &result {
            Ok(()) => info!("Process {} for take {} done", self.id, self.take_id),
            Err(e) if e.is_aborted() => {
                info!("Process {} for take {} aborted", self.id, self.take_id)
            }
            Err(e) => warn!(
                "Process {} for take {} failed: {}",
                self.id, self.take_id, e
            ),
        }

        let callback = self
            .on_finished
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(callback) = callback {
            callback(result);
        }
    }

    fn cancel(self: &Arc<Self>) {
        self.cancellation.cancel();

        let abort_idle = {
            let mut machine = self.lock();
            match machine.state {
                ProcessState::Idle => {
                    let error = IngestError::aborted_by_user();
                    machine.state = ProcessState::Errored(error.code);
                    machine.error = Some(error.clone());
                    Some(error)
                }
                ProcessState::Done | ProcessState::Errored(_) => return,
                _ => None,
            }
        };

        match abort_idle {
            Some(error) => self.finish(Err(error)),
            None => {
                info!(
                    "Requesting cancellation of process {} for take {}",
                    self.id, self.take_id
                );
                self.device.cancel(self.id);
            }
        }
    }
}

/// Caller-owned token for one ingest operation on one take.
///
/// Not `Clone`: exactly one owner, typically whoever called
/// [`IngestCapability::create_process`](super::IngestCapability::create_process).
/// Dropping a handle whose process is still running requests cancellation.
pub struct ProcessHandle {
    inner: Arc<ProcessContext>,
}

impl ProcessHandle {
    /// Build a process for `take_id`. Fails if `configuration` names no step
    /// or carries bits that are not a known step.
    pub fn new(
        take_id: TakeId,
        configuration: ProcessConfiguration,
        device: Arc<dyn IngestDevice>,
    ) -> Result<Self, IngestError> {
        if configuration.is_empty() {
            return Err(IngestError::invalid_argument(
                "Process configuration must contain at least one step",
            ));
        }
        if ProcessConfiguration::from_bits(configuration.bits()).is_none() {
            return Err(IngestError::invalid_argument(format!(
                "Process configuration has unknown step bits: {:#x}",
                configuration.bits()
            )));
        }

        let on_progress: Arc<Mutex<Option<ProgressCallback>>> = Arc::new(Mutex::new(None));
        let slot = on_progress.clone();
        let progress = ProgressAggregator::new(
            configuration.step_count(),
            Box::new(move |value| {
                let callback = slot.lock().unwrap_or_else(|e| e.into_inner()).clone();
                if let Some(callback) = callback {
                    callback(value);
                }
            }),
        )?;

        let id = Uuid::new_v4();
        debug!(
            "Created process {} for take {} with {:?}",
            id, take_id, configuration
        );

        Ok(Self {
            inner: Arc::new(ProcessContext {
                id,
                take_id,
                configuration,
                device,
                machine: Mutex::new(Machine {
                    state: ProcessState::Idle,
                    remaining: configuration,
                    current_step: None,
                    options: None,
                    error: None,
                }),
                progress,
                on_progress,
                on_finished: Mutex::new(None),
                cancellation: CancellationToken::new(),
            }),
        })
    }

    pub fn id(&self) -> ProcessId {
        self.inner.id
    }

    pub fn take_id(&self) -> TakeId {
        self.inner.take_id
    }

    pub fn configuration(&self) -> ProcessConfiguration {
        self.inner.configuration
    }

    /// Steps not yet completed successfully.
    pub fn remaining(&self) -> ProcessConfiguration {
        self.inner.lock().remaining
    }

    pub fn state(&self) -> ProcessState {
        self.inner.lock().state
    }

    pub fn current_step(&self) -> Option<ProcessStep> {
        self.inner.lock().current_step
    }

    /// True once every configured step has succeeded.
    ///
    /// An errored process keeps its remaining bits, so this stays false after
    /// a failure; use [`is_errored`](Self::is_errored) or
    /// [`is_terminal`](Self::is_terminal) to detect that case.
    pub fn is_done(&self) -> bool {
        self.inner.lock().remaining.is_empty()
    }

    pub fn is_errored(&self) -> bool {
        matches!(self.state(), ProcessState::Errored(_))
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// The error the process ended with, if it failed.
    pub fn error(&self) -> Option<IngestError> {
        self.inner.lock().error.clone()
    }

    /// Aggregate progress over all configured steps.
    pub fn progress(&self) -> f32 {
        self.inner.progress.total_progress()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancellation.is_cancelled()
    }

    /// Set the callback fired exactly once when the process ends.
    pub fn on_finished<F>(&self, callback: F)
    where
        F: FnOnce(IngestResult) + Send + 'static,
    {
        *self
            .inner
            .on_finished
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Box::new(callback));
    }

    /// Set the callback receiving the aggregate progress after each update.
    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(f32) + Send + Sync + 'static,
    {
        *self
            .inner
            .on_progress
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(callback));
    }

    /// Start the next remaining step. Options are captured on the first call.
    ///
    /// No-op on a finished process or while a step is in flight.
    pub fn run(&self, options: IngestOptions) {
        self.inner.run(options);
    }

    /// Request cancellation. A process that has not started yet ends
    /// immediately; a running one ends when the backend reports back.
    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.inner.lock().state.is_running() {
            debug!("Process {} dropped while running", self.inner.id);
            self.inner.cancellation.cancel();
            self.inner.device.cancel(self.inner.id);
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let machine = self.inner.lock();
        f.debug_struct("ProcessHandle")
            .field("id", &self.inner.id)
            .field("take_id", &self.inner.take_id)
            .field("state", &machine.state)
            .field("remaining", &machine.remaining)
            .finish()
    }
}

/// Backend-side view of one running step.
///
/// Handed to [`IngestDevice::perform_download`] and
/// [`IngestDevice::perform_convert_and_upload`]. The backend reports progress
/// through it and must eventually call [`finish`](Self::finish). A context
/// dropped without a result finishes the step with `InternalError`.
pub struct StepContext {
    process: Weak<ProcessContext>,
    process_id: ProcessId,
    take_id: TakeId,
    step: ProcessStep,
    task: TaskHandle,
    cancellation: CancellationToken,
    finished: bool,
}

impl StepContext {
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn take_id(&self) -> TakeId {
        self.take_id
    }

    pub fn step(&self) -> ProcessStep {
        self.step
    }

    /// Report this step's own progress in `[0, 1]`.
    pub fn report_progress(&self, fraction: f32) {
        self.task.update(fraction);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Token cancelled when the caller cancels the process.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Report the step outcome. Safe to call from any thread.
    pub fn finish(mut self, result: IngestResult) {
        self.finished = true;
        self.deliver(result);
    }

    fn deliver(&self, result: IngestResult) {
        if result.is_ok() {
            self.task.complete();
        }
        match self.process.upgrade() {
            Some(process) => process.on_step_finished(self.step, result),
            None => debug!(
                "Process {} is gone, dropping {} result",
                self.process_id, self.step
            ),
        }
    }
}

impl Drop for StepContext {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                "{} step of process {} dropped without a result",
                self.step, self.process_id
            );
            self.deliver(Err(IngestError::internal(format!(
                "{} step ended without reporting a result",
                self.step
            ))));
        }
    }
}

impl std::fmt::Debug for StepContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("process_id", &self.process_id)
            .field("take_id", &self.take_id)
            .field("step", &self.step)
            .finish()
    }
}
