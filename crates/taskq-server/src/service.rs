use std::sync::Arc;

use tracing::info;

use taskq_broker::{Broker, Envelope, ListFilter, QueueMetrics, RouteTable, TaskPage, TrackingStore};
use taskq_core::{Result, SubmitRequest, TaskDescriptor, TaskId, TaskRecord, TaskStatus};

/// Core facade handed to the HTTP layer: submission, status, cancellation
/// and listing over the routing table, tracking store and broker.
pub struct TaskService {
    table: RouteTable,
    store: Arc<TrackingStore>,
    broker: Arc<Broker>,
    metrics: Arc<QueueMetrics>,
}

impl TaskService {
    pub fn new(
        table: RouteTable,
        store: Arc<TrackingStore>,
        broker: Arc<Broker>,
        metrics: Arc<QueueMetrics>,
    ) -> Self {
        TaskService {
            table,
            store,
            broker,
            metrics,
        }
    }

    /// Validate, record, route and publish a submission. Returns the
    /// PENDING snapshot as soon as the message is queued; execution is
    /// never awaited here.
    pub fn submit(&self, request: SubmitRequest) -> Result<TaskRecord> {
        let route = self.table.route(request.task_type).clone();
        let descriptor = TaskDescriptor::from_request(request, route.default_priority)?;
        let task_id = descriptor.task_id;
        let task_type = descriptor.task_type;

        let record = self.store.create(&descriptor, &route.queue);

        if let Err(e) = self.broker.publish(Envelope::new(descriptor, route.queue)) {
            // The record must not outlive a submission that was never
            // queued.
            self.store.discard(&task_id);
            return Err(e);
        }

        info!("Submitted task {} (type: {})", task_id, task_type);
        Ok(record)
    }

    /// Snapshot of a tracked task, or NotFound for an unknown id.
    pub fn status(&self, task_id: &TaskId) -> Result<TaskRecord> {
        self.store.snapshot(task_id)
    }

    /// Revoke a task. Non-terminal tasks are marked REVOKED and their
    /// queued message dropped; running bodies observe the flag at their
    /// next check-point. Cancelling an already finished task is a no-op
    /// that returns the existing terminal snapshot.
    pub fn cancel(&self, task_id: &TaskId) -> Result<TaskRecord> {
        let (transition, record) = self.store.mark_revoked(task_id)?;

        if transition.applied() {
            self.broker.forget(&record.queue, task_id);
            self.metrics
                .record_outcome(TaskStatus::Revoked.as_str(), record.task_type.as_str());
            info!("Task {} revoked", task_id);
        } else {
            info!(
                "Cancel for task {} ignored, already {}",
                task_id, record.status
            );
        }

        Ok(record)
    }

    /// Filtered, paginated listing of tracked tasks.
    pub fn list(&self, filter: ListFilter, page: usize, page_size: usize) -> TaskPage {
        self.store.list(filter, page, page_size)
    }

    pub fn store(&self) -> &Arc<TrackingStore> {
        &self.store
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskq_core::{TaskError, TaskType};

    fn service() -> TaskService {
        let table = RouteTable::standard();
        let broker = Arc::new(Broker::new(&table));
        TaskService::new(
            table,
            Arc::new(TrackingStore::new()),
            broker,
            Arc::new(QueueMetrics::new().unwrap()),
        )
    }

    fn request(parameters: serde_json::Value) -> SubmitRequest {
        SubmitRequest {
            task_type: TaskType::DataProcessing,
            parameters,
            description: None,
            priority: None,
        }
    }

    #[test]
    fn test_submit_returns_pending_snapshot() {
        let service = service();
        let record = service.submit(request(json!({"data_size": 10}))).unwrap();

        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.queue, "data_processing");
        assert_eq!(service.broker().depth("data_processing"), 1);
        assert!(service.status(&record.task_id).is_ok());
    }

    #[test]
    fn test_invalid_parameters_create_no_record() {
        let service = service();
        let result = service.submit(request(json!({"data_size": 0})));

        assert!(matches!(result, Err(TaskError::Validation { .. })));
        assert!(service.store().is_empty());
        assert_eq!(service.broker().depth("data_processing"), 0);
    }

    #[test]
    fn test_failed_publish_rolls_back_the_record() {
        let service = service();
        service.broker().shutdown();

        let result = service.submit(request(json!({})));
        assert!(matches!(result, Err(TaskError::QueueClosed)));
        assert!(service.store().is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let service = service();
        let record = service.submit(request(json!({}))).unwrap();

        let first = service.cancel(&record.task_id).unwrap();
        assert_eq!(first.status, TaskStatus::Revoked);

        let second = service.cancel(&record.task_id).unwrap();
        assert_eq!(second.status, TaskStatus::Revoked);
        assert_eq!(first.completed_at, second.completed_at);

        // The queued message is gone too.
        assert_eq!(service.broker().depth("data_processing"), 0);
    }

    #[test]
    fn test_cancel_unknown_task_is_not_found() {
        let service = service();
        assert!(matches!(
            service.cancel(&uuid::Uuid::new_v4()),
            Err(TaskError::NotFound(_))
        ));
    }
}
