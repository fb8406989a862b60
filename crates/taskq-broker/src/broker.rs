use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

use taskq_core::{Result, TaskDescriptor, TaskError, TaskId};

use crate::queue::Lane;
use crate::router::RouteTable;

/// A routed task message travelling from the submission path to a worker.
#[derive(Clone, Debug)]
pub struct Envelope {
    descriptor: Arc<TaskDescriptor>,
    queue: String,
}

impl Envelope {
    pub fn new(descriptor: TaskDescriptor, queue: impl Into<String>) -> Self {
        Envelope {
            descriptor: Arc::new(descriptor),
            queue: queue.into(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.descriptor.task_id
    }

    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

/// A claimed message. The claim is only considered delivered once the
/// worker acknowledges it; dropping the claim without an ack makes the
/// message eligible for redelivery.
pub type Delivery = Envelope;

/// In-process message broker: independent named FIFO lanes with priority
/// dispatch and late acknowledgment. Cross-queue ordering is unspecified.
pub struct Broker {
    lanes: HashMap<String, Arc<Lane>>,
    seq: AtomicU64,
    notify: Notify,
    closed: AtomicBool,
}

impl Broker {
    /// Create one lane per distinct queue in the routing table.
    pub fn new(table: &RouteTable) -> Self {
        let lanes = table
            .queues()
            .into_iter()
            .map(|queue| (queue.clone(), Arc::new(Lane::new(queue))))
            .collect();

        Broker {
            lanes,
            seq: AtomicU64::new(0),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn lane(&self, queue: &str, task_id: &TaskId) -> Result<&Arc<Lane>> {
        // Lanes are built from the same route table that produced the
        // queue name, so a miss means the broker and router went out of
        // sync at startup.
        self.lanes.get(queue).ok_or_else(|| {
            tracing::error!("No lane for queue {} (task {})", queue, task_id);
            TaskError::QueueClosed
        })
    }

    /// Enqueue a message. Returns as soon as the message is queued; never
    /// blocks on execution.
    pub fn publish(&self, envelope: Envelope) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TaskError::QueueClosed);
        }

        let task_id = envelope.task_id();
        let priority = envelope.descriptor().priority;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let lane = self.lane(envelope.queue(), &task_id)?;

        lane.push(envelope, priority, seq);
        debug!("Published task {} to queue {}", task_id, lane.name());
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next eligible message across `queues`: priority first,
    /// FIFO within a priority band. Returns `QueueClosed` after shutdown.
    pub async fn claim(&self, queues: &[String]) -> Result<Delivery> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(TaskError::QueueClosed);
            }

            for queue in queues {
                if let Some(lane) = self.lanes.get(queue) {
                    if let Some(envelope) = lane.pop() {
                        // More work may remain; keep the next waiter moving.
                        self.notify.notify_one();
                        return Ok(envelope);
                    }
                }
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            }
        }
    }

    /// Late acknowledgment: the message is delivered only once the worker
    /// has finished with it.
    pub fn ack(&self, delivery: &Delivery) {
        if let Ok(lane) = self.lane(delivery.queue(), &delivery.task_id()) {
            lane.ack(&delivery.task_id());
        }
    }

    /// Return an unacknowledged message; with `requeue` it re-enters its
    /// lane for redelivery (at-least-once).
    pub fn nack(&self, delivery: &Delivery, requeue: bool) {
        if let Ok(lane) = self.lane(delivery.queue(), &delivery.task_id()) {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            if lane.nack(&delivery.task_id(), requeue, seq) && requeue {
                self.notify.notify_one();
            }
        }
    }

    /// Return a claimed-but-unacknowledged message to its lane without a
    /// `Delivery` handle; used when a stalled execution is recovered.
    pub fn requeue_in_flight(&self, queue: &str, task_id: &TaskId) -> bool {
        match self.lanes.get(queue) {
            Some(lane) => {
                let seq = self.seq.fetch_add(1, Ordering::Relaxed);
                let requeued = lane.nack(task_id, true, seq);
                if requeued {
                    self.notify.notify_one();
                }
                requeued
            }
            None => false,
        }
    }

    /// Discard a claimed-but-unacknowledged message; used when a stalled
    /// execution has exhausted its attempts.
    pub fn drop_in_flight(&self, queue: &str, task_id: &TaskId) -> bool {
        match self.lanes.get(queue) {
            Some(lane) => lane.nack(task_id, false, 0),
            None => false,
        }
    }

    /// Drop a message that is still pending (cancellation before claim).
    /// Returns false when the message was already claimed or delivered.
    pub fn forget(&self, queue: &str, task_id: &TaskId) -> bool {
        match self.lanes.get(queue) {
            Some(lane) => lane.forget(task_id),
            None => false,
        }
    }

    /// Pending depth of one queue.
    pub fn depth(&self, queue: &str) -> usize {
        self.lanes.get(queue).map(|l| l.depth()).unwrap_or(0)
    }

    /// Pending depth of every queue.
    pub fn depths(&self) -> Vec<(String, usize)> {
        let mut depths: Vec<(String, usize)> = self
            .lanes
            .values()
            .map(|lane| (lane.name().to_string(), lane.depth()))
            .collect();
        depths.sort();
        depths
    }

    /// Stop delivering: pending claims and future publishes fail with
    /// `QueueClosed`.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskq_core::{Priority, SubmitRequest, TaskType};

    fn descriptor(priority: u8) -> TaskDescriptor {
        TaskDescriptor::from_request(
            SubmitRequest {
                task_type: TaskType::DataProcessing,
                parameters: json!({}),
                description: None,
                priority: Some(Priority::new(priority).unwrap()),
            },
            Priority::default(),
        )
        .unwrap()
    }

    fn test_broker() -> (Broker, Vec<String>) {
        let table = RouteTable::standard();
        let queues = table.queues();
        (Broker::new(&table), queues)
    }

    #[tokio::test]
    async fn test_publish_then_claim() {
        let (broker, queues) = test_broker();
        let descriptor = descriptor(5);
        let task_id = descriptor.task_id;

        broker
            .publish(Envelope::new(descriptor, "data_processing"))
            .unwrap();

        let delivery = broker.claim(&queues).await.unwrap();
        assert_eq!(delivery.task_id(), task_id);
        broker.ack(&delivery);
        assert_eq!(broker.depth("data_processing"), 0);
    }

    #[tokio::test]
    async fn test_claim_wakes_on_publish() {
        let (broker, queues) = test_broker();
        let broker = Arc::new(broker);

        let claimer = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.claim(&queues).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker
            .publish(Envelope::new(descriptor(5), "reports"))
            .unwrap();

        let delivery = claimer.await.unwrap().unwrap();
        assert_eq!(delivery.queue(), "reports");
    }

    #[tokio::test]
    async fn test_priority_dispatch_order() {
        let (broker, queues) = test_broker();

        let low = descriptor(3);
        let high = descriptor(8);
        broker
            .publish(Envelope::new(low.clone(), "data_processing"))
            .unwrap();
        broker
            .publish(Envelope::new(high.clone(), "data_processing"))
            .unwrap();

        assert_eq!(broker.claim(&queues).await.unwrap().task_id(), high.task_id);
        assert_eq!(broker.claim(&queues).await.unwrap().task_id(), low.task_id);
    }

    #[tokio::test]
    async fn test_nack_redelivers() {
        let (broker, queues) = test_broker();
        let descriptor = descriptor(5);
        let task_id = descriptor.task_id;

        broker
            .publish(Envelope::new(descriptor, "data_processing"))
            .unwrap();

        let first = broker.claim(&queues).await.unwrap();
        broker.nack(&first, true);

        let second = broker.claim(&queues).await.unwrap();
        assert_eq!(second.task_id(), task_id);
    }

    #[tokio::test]
    async fn test_shutdown_fails_pending_claims() {
        let (broker, queues) = test_broker();
        let broker = Arc::new(broker);

        let claimer = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.claim(&queues).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.shutdown();

        match claimer.await.unwrap() {
            Err(TaskError::QueueClosed) => {}
            other => panic!("expected QueueClosed, got {other:?}"),
        }
    }
}
