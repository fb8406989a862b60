use chrono::{Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use taskq_core::{
    Result, TaskDescriptor, TaskError, TaskId, TaskRecord, TaskStatus, TaskType, Transition,
};

/// Filters for the listing query.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilter {
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
}

/// One page of task records plus the total match count.
#[derive(Debug, Clone)]
pub struct TaskPage {
    pub tasks: Vec<TaskRecord>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Shared record of task state, keyed by task id — the single source of
/// truth for status queries.
///
/// Readers run concurrently; writers are serialized per record by the
/// map's entry locks, so a progress report and a cancellation racing on
/// the same task cannot lose updates. Listing is a full scan: O(records),
/// bounded by the retention sweep.
pub struct TrackingStore {
    records: DashMap<TaskId, TaskRecord>,
}

impl TrackingStore {
    pub fn new() -> Self {
        TrackingStore {
            records: DashMap::new(),
        }
    }

    /// Create the record for a submitted task, atomically with submission.
    pub fn create(&self, descriptor: &TaskDescriptor, queue: &str) -> TaskRecord {
        let record = TaskRecord::new(descriptor, queue);
        self.records.insert(descriptor.task_id, record.clone());
        debug!("Created tracking record for task {}", descriptor.task_id);
        record
    }

    /// Read a point-in-time snapshot of a record.
    pub fn snapshot(&self, task_id: &TaskId) -> Result<TaskRecord> {
        self.records
            .get(task_id)
            .map(|r| r.clone())
            .ok_or(TaskError::NotFound(*task_id))
    }

    fn transition<F>(&self, task_id: &TaskId, apply: F) -> Result<(Transition, TaskRecord)>
    where
        F: FnOnce(&mut TaskRecord) -> Transition,
    {
        let mut entry = self
            .records
            .get_mut(task_id)
            .ok_or(TaskError::NotFound(*task_id))?;
        let transition = apply(&mut entry);
        Ok((transition, entry.clone()))
    }

    /// PENDING → STARTED.
    pub fn mark_started(&self, task_id: &TaskId) -> Result<(Transition, TaskRecord)> {
        self.transition(task_id, |record| record.start())
    }

    /// STARTED/PROGRESS → PROGRESS with a clamped percentage.
    pub fn mark_progress(
        &self,
        task_id: &TaskId,
        percent: u8,
        message: &str,
    ) -> Result<(Transition, TaskRecord)> {
        self.transition(task_id, |record| record.report_progress(percent, message))
    }

    /// Non-terminal → SUCCESS.
    pub fn mark_success(
        &self,
        task_id: &TaskId,
        result: serde_json::Value,
    ) -> Result<(Transition, TaskRecord)> {
        self.transition(task_id, |record| record.succeed(result))
    }

    /// Non-terminal → FAILED.
    pub fn mark_failed(&self, task_id: &TaskId, error: &str) -> Result<(Transition, TaskRecord)> {
        self.transition(task_id, |record| record.fail(error))
    }

    /// Non-terminal → REVOKED.
    pub fn mark_revoked(&self, task_id: &TaskId) -> Result<(Transition, TaskRecord)> {
        self.transition(task_id, |record| record.revoke())
    }

    /// Retryable failure: back to PENDING for redelivery.
    pub fn mark_retry(&self, task_id: &TaskId, reason: &str) -> Result<(Transition, TaskRecord)> {
        self.transition(task_id, |record| record.retry(reason))
    }

    /// Whether a worker should still run this task; REVOKED before claim
    /// means the task is skipped without ever starting.
    pub fn is_revoked(&self, task_id: &TaskId) -> bool {
        self.records
            .get(task_id)
            .map(|r| r.status == TaskStatus::Revoked)
            .unwrap_or(false)
    }

    /// Filtered, paginated listing (page is 1-based). Full scan with an
    /// in-memory sort, newest first.
    pub fn list(&self, filter: ListFilter, page: usize, page_size: usize) -> TaskPage {
        let mut matches: Vec<TaskRecord> = self
            .records
            .iter()
            .filter(|record| {
                filter.status.map_or(true, |s| record.status == s)
                    && filter.task_type.map_or(true, |t| record.task_type == t)
            })
            .map(|record| record.clone())
            .collect();

        matches.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });

        let total = matches.len();
        let page = page.max(1);
        let start = (page - 1).saturating_mul(page_size);
        let tasks = matches
            .into_iter()
            .skip(start)
            .take(page_size)
            .collect();

        TaskPage {
            tasks,
            total,
            page,
            page_size,
        }
    }

    /// Remove a record whose submission could not be completed (the
    /// publish failed after the record was created). Not part of the
    /// normal lifecycle; live records are only removed by the sweep.
    pub fn discard(&self, task_id: &TaskId) {
        self.records.remove(task_id);
    }

    /// Active records with no update inside `window`; candidates for
    /// requeue-or-fail by the staleness supervisor.
    pub fn stale_active(&self, window: Duration) -> Vec<TaskId> {
        let cutoff = Utc::now() - window;
        self.records
            .iter()
            .filter(|record| record.status.is_active() && record.updated_at < cutoff)
            .map(|record| record.task_id)
            .collect()
    }

    /// Remove terminal records whose completion is older than the
    /// retention window. Active records are never removed.
    pub fn sweep_expired(&self, retention: Duration) -> usize {
        let cutoff = Utc::now() - retention;
        let expired: Vec<TaskId> = self
            .records
            .iter()
            .filter(|record| {
                record.status.is_terminal()
                    && record.completed_at.map_or(false, |at| at < cutoff)
            })
            .map(|record| record.task_id)
            .collect();

        for task_id in &expired {
            self.records.remove(task_id);
        }

        if !expired.is_empty() {
            info!("Swept {} expired task records", expired.len());
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.records
            .iter()
            .filter(|record| record.status == status)
            .count()
    }
}

impl Default for TrackingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskq_core::{Priority, SubmitRequest};

    fn descriptor(task_type: TaskType) -> TaskDescriptor {
        TaskDescriptor::from_request(
            SubmitRequest {
                task_type,
                parameters: match task_type {
                    TaskType::FileProcessing => json!({"file_url": "s3://bucket/input.csv"}),
                    TaskType::Notification => json!({
                        "recipient": "user@example.com",
                        "subject": "hello",
                        "message": "hi",
                    }),
                    _ => json!({}),
                },
                description: None,
                priority: None,
            },
            Priority::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_then_snapshot() {
        let store = TrackingStore::new();
        let descriptor = descriptor(TaskType::DataProcessing);

        store.create(&descriptor, "data_processing");
        let snapshot = store.snapshot(&descriptor.task_id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Pending);
        assert_eq!(snapshot.queue, "data_processing");
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let store = TrackingStore::new();
        match store.snapshot(&uuid::Uuid::new_v4()) {
            Err(TaskError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_transitions_are_recorded() {
        let store = TrackingStore::new();
        let descriptor = descriptor(TaskType::DataProcessing);
        let task_id = descriptor.task_id;
        store.create(&descriptor, "data_processing");

        let (t, record) = store.mark_started(&task_id).unwrap();
        assert!(t.applied());
        assert_eq!(record.status, TaskStatus::Started);

        let (_, record) = store.mark_progress(&task_id, 50, "halfway").unwrap();
        assert_eq!(record.progress, 50);

        let (_, record) = store.mark_success(&task_id, json!({"ok": true})).unwrap();
        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.progress, 100);
    }

    #[test]
    fn test_revoked_terminal_is_sticky() {
        let store = TrackingStore::new();
        let descriptor = descriptor(TaskType::DataProcessing);
        let task_id = descriptor.task_id;
        store.create(&descriptor, "data_processing");

        let (t, _) = store.mark_revoked(&task_id).unwrap();
        assert!(t.applied());
        assert!(store.is_revoked(&task_id));

        let (t, record) = store.mark_started(&task_id).unwrap();
        assert_eq!(t, Transition::Ignored);
        assert_eq!(record.status, TaskStatus::Revoked);
    }

    #[test]
    fn test_list_filters_and_paginates() {
        let store = TrackingStore::new();
        for _ in 0..3 {
            store.create(&descriptor(TaskType::DataProcessing), "data_processing");
        }
        let notification = descriptor(TaskType::Notification);
        store.create(&notification, "notifications");
        store.mark_started(&notification.task_id).unwrap();
        store
            .mark_success(&notification.task_id, json!({}))
            .unwrap();

        let all = store.list(ListFilter::default(), 1, 10);
        assert_eq!(all.total, 4);

        let pending = store.list(
            ListFilter {
                status: Some(TaskStatus::Pending),
                task_type: None,
            },
            1,
            10,
        );
        assert_eq!(pending.total, 3);

        let notifications = store.list(
            ListFilter {
                status: None,
                task_type: Some(TaskType::Notification),
            },
            1,
            10,
        );
        assert_eq!(notifications.total, 1);
        assert_eq!(notifications.tasks[0].status, TaskStatus::Success);

        let page2 = store.list(ListFilter::default(), 2, 3);
        assert_eq!(page2.tasks.len(), 1);
        assert_eq!(page2.total, 4);
    }

    #[test]
    fn test_sweep_removes_only_expired_terminals() {
        let store = TrackingStore::new();

        let active = descriptor(TaskType::DataProcessing);
        store.create(&active, "data_processing");
        store.mark_started(&active.task_id).unwrap();

        let finished = descriptor(TaskType::DataProcessing);
        store.create(&finished, "data_processing");
        store.mark_started(&finished.task_id).unwrap();
        store.mark_success(&finished.task_id, json!({})).unwrap();

        // Nothing is old enough yet.
        assert_eq!(store.sweep_expired(Duration::hours(1)), 0);

        // With a zero-width window the finished record is expired; the
        // active one must survive regardless.
        assert_eq!(store.sweep_expired(Duration::zero()), 1);
        assert!(store.snapshot(&active.task_id).is_ok());
        assert!(store.snapshot(&finished.task_id).is_err());
    }

    #[test]
    fn test_stale_active_detection() {
        let store = TrackingStore::new();
        let descriptor = descriptor(TaskType::DataProcessing);
        store.create(&descriptor, "data_processing");
        store.mark_started(&descriptor.task_id).unwrap();

        assert!(store.stale_active(Duration::minutes(5)).is_empty());
        let stale = store.stale_active(Duration::zero());
        assert_eq!(stale, vec![descriptor.task_id]);
    }
}
