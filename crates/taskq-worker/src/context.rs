use std::sync::Arc;

use taskq_broker::TrackingStore;
use taskq_core::{TaskId, Transition};
use tracing::debug;

/// Per-execution handle passed into a task body.
///
/// This is the task body's only channel back to the system: progress goes
/// out through [`report_progress`](RunContext::report_progress), and
/// cancellation comes in through
/// [`is_cancelled`](RunContext::is_cancelled). Task bodies are required to
/// poll `is_cancelled` between logical steps — the runtime never preempts
/// a body mid-step, so an implementation that skips the check simply runs
/// to completion against a revoked record.
pub struct RunContext {
    task_id: TaskId,
    store: Arc<TrackingStore>,
}

impl RunContext {
    pub(crate) fn new(task_id: TaskId, store: Arc<TrackingStore>) -> Self {
        RunContext { task_id, store }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Report incremental progress (0-100, clamped non-decreasing) with a
    /// human-readable status line. Reports against a task that has
    /// meanwhile reached a terminal state are dropped by the store.
    pub fn report_progress(&self, percent: u8, message: &str) {
        match self.store.mark_progress(&self.task_id, percent, message) {
            Ok((Transition::Applied, _)) => {}
            Ok((Transition::Ignored, _)) => {
                debug!(
                    "Dropped progress report for task {} (no longer active)",
                    self.task_id
                );
            }
            Err(e) => {
                debug!("Progress report for task {} failed: {}", self.task_id, e);
            }
        }
    }

    /// Non-blocking cooperative cancellation check-point.
    pub fn is_cancelled(&self) -> bool {
        self.store.is_revoked(&self.task_id)
    }
}
