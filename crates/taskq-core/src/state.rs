use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Priority, TaskDescriptor, TaskId, TaskType, MAX_PROGRESS};

/// Lifecycle state of a task.
///
/// `Pending → Started → Progress* → {Success | Failed | Revoked}`. A
/// retryable failure returns the record to `Pending` with an incremented
/// attempt counter; the terminal states admit no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Enqueued, not yet picked up by a worker
    Pending,
    /// A worker has claimed the task and begun execution
    Started,
    /// The worker has reported incremental progress
    Progress,
    /// Completed normally
    Success,
    /// Unrecoverable error or exhausted retries
    Failed,
    /// Cancelled by an external request
    Revoked,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Started => "STARTED",
            TaskStatus::Progress => "PROGRESS",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Revoked => "REVOKED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TaskStatus::Pending),
            "STARTED" => Some(TaskStatus::Started),
            "PROGRESS" => Some(TaskStatus::Progress),
            "SUCCESS" => Some(TaskStatus::Success),
            "FAILED" => Some(TaskStatus::Failed),
            "REVOKED" => Some(TaskStatus::Revoked),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Revoked
        )
    }

    /// A worker currently owns the task.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Started | TaskStatus::Progress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a requested state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The record was already terminal (or the transition was otherwise
    /// out of order); logged as an inconsistency, nothing raised.
    Ignored,
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// Mutable tracking record for one task, keyed by `task_id`.
///
/// All mutation goes through the transition methods below; the tracking
/// store serializes calls per record.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub queue: String,
    pub priority: Priority,
    pub description: Option<String>,
    pub status: TaskStatus,
    /// 0-100, non-decreasing while the task is active
    pub progress: u8,
    /// Human-readable line accompanying the last progress report
    pub status_message: Option<String>,
    /// Set only on SUCCESS
    pub result: Option<serde_json::Value>,
    /// Set only on FAILED
    pub error: Option<String>,
    /// Dispatch attempts so far (incremented when a worker starts the task)
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Touched on every transition; drives staleness detection and retention
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create the record for a freshly submitted task, status PENDING.
    pub fn new(descriptor: &TaskDescriptor, queue: impl Into<String>) -> Self {
        let now = Utc::now();
        TaskRecord {
            task_id: descriptor.task_id,
            task_type: descriptor.task_type,
            queue: queue.into(),
            priority: descriptor.priority,
            description: descriptor.description.clone(),
            status: TaskStatus::Pending,
            progress: 0,
            status_message: None,
            result: None,
            error: None,
            attempts: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// PENDING → STARTED: a worker has dequeued the task and begun
    /// execution. Counts one dispatch attempt.
    pub fn start(&mut self) -> Transition {
        if self.status != TaskStatus::Pending {
            return self.inconsistent("STARTED");
        }
        let now = Utc::now();
        self.status = TaskStatus::Started;
        self.attempts += 1;
        self.progress = 0;
        self.status_message = None;
        self.started_at = Some(now);
        self.updated_at = now;
        Transition::Applied
    }

    /// STARTED/PROGRESS → PROGRESS: incremental progress report. Values
    /// below the last reported percentage are clamped up; values above
    /// 100 are clamped down.
    pub fn report_progress(&mut self, percent: u8, message: impl Into<String>) -> Transition {
        if !self.status.is_active() {
            return self.inconsistent("PROGRESS");
        }
        self.status = TaskStatus::Progress;
        self.progress = percent.min(MAX_PROGRESS).max(self.progress);
        self.status_message = Some(message.into());
        self.updated_at = Utc::now();
        Transition::Applied
    }

    /// Non-terminal → SUCCESS: normal return from the task body.
    pub fn succeed(&mut self, result: serde_json::Value) -> Transition {
        if self.status.is_terminal() {
            return self.inconsistent("SUCCESS");
        }
        let now = Utc::now();
        self.status = TaskStatus::Success;
        self.progress = MAX_PROGRESS;
        self.result = Some(result);
        self.completed_at = Some(now);
        self.updated_at = now;
        Transition::Applied
    }

    /// Non-terminal → FAILED: unrecoverable error or exhausted retries.
    /// Progress stays at its last reported value.
    pub fn fail(&mut self, error: impl Into<String>) -> Transition {
        if self.status.is_terminal() {
            return self.inconsistent("FAILED");
        }
        let now = Utc::now();
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(now);
        self.updated_at = now;
        Transition::Applied
    }

    /// Non-terminal → REVOKED: external cancellation. Workers observe the
    /// new status at their next cooperative check-point.
    pub fn revoke(&mut self) -> Transition {
        if self.status.is_terminal() {
            return self.inconsistent("REVOKED");
        }
        let now = Utc::now();
        self.status = TaskStatus::Revoked;
        self.completed_at = Some(now);
        self.updated_at = now;
        Transition::Applied
    }

    /// Retryable failure: back to PENDING for redelivery. The attempt
    /// counter was already bumped by [`TaskRecord::start`]; the failure
    /// stays out of `error` since retries are invisible to callers.
    pub fn retry(&mut self, reason: &str) -> Transition {
        if self.status.is_terminal() {
            return self.inconsistent("PENDING (retry)");
        }
        self.status = TaskStatus::Pending;
        self.progress = 0;
        self.status_message = Some(format!("Retry scheduled: {reason}"));
        self.updated_at = Utc::now();
        Transition::Applied
    }

    fn inconsistent(&mut self, attempted: &str) -> Transition {
        warn!(
            "Ignoring transition to {} for task {} already in state {}",
            attempted, self.task_id, self.status
        );
        Transition::Ignored
    }
}
