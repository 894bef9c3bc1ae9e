//! Averaged progress over a fixed number of sub-tasks.
//!
//! Each ingest process owns one aggregator sized to the number of steps it
//! runs. Steps write their own slot through a [`TaskHandle`]; the average of
//! all slots is published to the reporter after every write.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use super::error::IngestError;

/// Receives the aggregate value after each update.
pub type ProgressReporter = Box<dyn Fn(f32) + Send + Sync>;

struct Slots {
    values: Vec<f32>,
    started: usize,
}

pub struct ProgressAggregator {
    slots: Mutex<Slots>,
    /// Serializes reporting so the reporter sees updates in order.
    reporting: Mutex<()>,
    /// Last published aggregate, stored as `f32` bits so reads never take the lock.
    total: AtomicU32,
    reporter: ProgressReporter,
}

impl ProgressAggregator {
    /// Create an aggregator for `task_count` sub-tasks.
    pub fn new(task_count: usize, reporter: ProgressReporter) -> Result<Arc<Self>, IngestError> {
        if task_count == 0 {
            return Err(IngestError::invalid_argument(
                "Progress aggregator needs at least one task",
            ));
        }

        Ok(Arc::new(Self {
            slots: Mutex::new(Slots {
                values: vec![0.0; task_count],
                started: 0,
            }),
            reporting: Mutex::new(()),
            total: AtomicU32::new(0f32.to_bits()),
            reporter,
        }))
    }

    /// Aggregator that only tracks the value, without reporting anywhere.
    pub fn silent(task_count: usize) -> Result<Arc<Self>, IngestError> {
        Self::new(task_count, Box::new(|_| {}))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the next unused slot.
    ///
    /// # Panics
    ///
    /// Panics when more tasks are started than the aggregator was sized for;
    /// that means the declared step count and the steps actually run disagree.
    pub fn start_task(self: &Arc<Self>) -> TaskHandle {
        let mut slots = self.lock();
        let index = slots.started;
        assert!(
            index < slots.values.len(),
            "started task #{} on a progress aggregator sized for {} tasks",
            index + 1,
            slots.values.len()
        );
        slots.started += 1;

        TaskHandle {
            aggregator: Arc::downgrade(self),
            index,
        }
    }

    pub fn task_count(&self) -> usize {
        self.lock().values.len()
    }

    pub fn started_tasks(&self) -> usize {
        self.lock().started
    }

    /// Current average over all slots, in `[0, 1]`.
    pub fn total_progress(&self) -> f32 {
        f32::from_bits(self.total.load(Ordering::Acquire))
    }

    fn set(&self, index: usize, value: f32) {
        let value = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        };

        let _reporting = self.reporting.lock().unwrap_or_else(|e| e.into_inner());
        let total = {
            let slots = &mut *self.lock();
            slots.values[index] = value;
            let sum: f32 = slots.values.iter().sum();
            (sum / slots.values.len() as f32).clamp(0.0, 1.0)
        };
        self.total.store(total.to_bits(), Ordering::Release);

        // The slot lock is released here, so the reporter may query the
        // owning process.
        (self.reporter)(total);
    }
}

/// Write access to one slot of a [`ProgressAggregator`].
///
/// Holds only a weak reference, so updates after the aggregator is gone are
/// silently ignored.
#[derive(Clone)]
pub struct TaskHandle {
    aggregator: Weak<ProgressAggregator>,
    index: usize,
}

impl TaskHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Store `value` (clamped to `[0, 1]`) and republish the aggregate.
    pub fn update(&self, value: f32) {
        if let Some(aggregator) = self.aggregator.upgrade() {
            aggregator.set(self.index, value);
        }
    }

    pub fn complete(&self) {
        self.update(1.0);
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("index", &self.index)
            .field("alive", &(self.aggregator.strong_count() > 0))
            .finish()
    }
}
