use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use parking_lot::Mutex;
use taskq_core::{Priority, TaskId};

use crate::broker::Envelope;

/// Heap entry: higher priority first, FIFO by submission sequence within a
/// priority band.
struct QueuedMessage {
    envelope: Envelope,
    priority: Priority,
    seq: u64,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            // Lower sequence number first within the same priority
            Ordering::Equal => other.seq.cmp(&self.seq),
            ordering => ordering,
        }
    }
}

#[derive(Default)]
struct LaneInner {
    heap: BinaryHeap<QueuedMessage>,
    /// Ids still eligible for delivery; a forgotten id is skipped lazily
    /// when it surfaces from the heap.
    pending: HashSet<TaskId>,
    /// Claimed but not yet acknowledged (late acknowledgment).
    in_flight: HashMap<TaskId, (Envelope, Priority)>,
}

/// One independent FIFO lane of the broker.
pub(crate) struct Lane {
    name: String,
    inner: Mutex<LaneInner>,
}

impl Lane {
    pub fn new(name: impl Into<String>) -> Self {
        Lane {
            name: name.into(),
            inner: Mutex::new(LaneInner::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&self, envelope: Envelope, priority: Priority, seq: u64) {
        let mut inner = self.inner.lock();
        inner.pending.insert(envelope.task_id());
        inner.heap.push(QueuedMessage {
            envelope,
            priority,
            seq,
        });
    }

    /// Claim the next eligible message, moving it to the in-flight table.
    pub fn pop(&self) -> Option<Envelope> {
        let mut inner = self.inner.lock();
        while let Some(message) = inner.heap.pop() {
            let task_id = message.envelope.task_id();
            if inner.pending.remove(&task_id) {
                inner
                    .in_flight
                    .insert(task_id, (message.envelope.clone(), message.priority));
                return Some(message.envelope);
            }
            // Forgotten while queued; drop it and keep looking.
        }
        None
    }

    /// Acknowledge a claimed message: delivery is complete.
    pub fn ack(&self, task_id: &TaskId) -> bool {
        self.inner.lock().in_flight.remove(task_id).is_some()
    }

    /// Negative acknowledgment. With `requeue`, the message re-enters the
    /// lane (behind its priority band) for redelivery.
    pub fn nack(&self, task_id: &TaskId, requeue: bool, seq: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.in_flight.remove(task_id) {
            Some((envelope, priority)) => {
                if requeue {
                    inner.pending.insert(*task_id);
                    inner.heap.push(QueuedMessage {
                        envelope,
                        priority,
                        seq,
                    });
                }
                true
            }
            None => false,
        }
    }

    /// Drop a still-pending message (cancellation before any worker claim).
    pub fn forget(&self, task_id: &TaskId) -> bool {
        self.inner.lock().pending.remove(task_id)
    }

    /// Messages awaiting delivery.
    pub fn depth(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskq_core::{Priority, SubmitRequest, TaskDescriptor, TaskType};

    fn envelope() -> Envelope {
        let descriptor = TaskDescriptor::from_request(
            SubmitRequest {
                task_type: TaskType::DataProcessing,
                parameters: serde_json::json!({}),
                description: None,
                priority: None,
            },
            Priority::default(),
        )
        .unwrap();
        Envelope::new(descriptor, "data_processing")
    }

    #[test]
    fn test_priority_before_fifo() {
        let lane = Lane::new("test");
        let low = envelope();
        let high = envelope();

        lane.push(low.clone(), Priority::new(3).unwrap(), 1);
        lane.push(high.clone(), Priority::new(8).unwrap(), 2);

        assert_eq!(lane.pop().unwrap().task_id(), high.task_id());
        assert_eq!(lane.pop().unwrap().task_id(), low.task_id());
        assert!(lane.pop().is_none());
    }

    #[test]
    fn test_fifo_within_priority() {
        let lane = Lane::new("test");
        let first = envelope();
        let second = envelope();

        lane.push(first.clone(), Priority::normal(), 10);
        lane.push(second.clone(), Priority::normal(), 11);

        assert_eq!(lane.pop().unwrap().task_id(), first.task_id());
        assert_eq!(lane.pop().unwrap().task_id(), second.task_id());
    }

    #[test]
    fn test_forgotten_message_is_skipped() {
        let lane = Lane::new("test");
        let dropped = envelope();
        let kept = envelope();

        lane.push(dropped.clone(), Priority::high(), 1);
        lane.push(kept.clone(), Priority::low(), 2);

        assert!(lane.forget(&dropped.task_id()));
        assert_eq!(lane.pop().unwrap().task_id(), kept.task_id());
        assert!(lane.pop().is_none());
    }

    #[test]
    fn test_nack_requeues_for_redelivery() {
        let lane = Lane::new("test");
        let message = envelope();
        let task_id = message.task_id();

        lane.push(message, Priority::normal(), 1);
        let claimed = lane.pop().unwrap();
        assert_eq!(lane.depth(), 0);
        assert_eq!(lane.in_flight(), 1);

        assert!(lane.nack(&claimed.task_id(), true, 2));
        assert_eq!(lane.in_flight(), 0);
        assert_eq!(lane.pop().unwrap().task_id(), task_id);
    }

    #[test]
    fn test_ack_completes_delivery() {
        let lane = Lane::new("test");
        let message = envelope();

        lane.push(message, Priority::normal(), 1);
        let claimed = lane.pop().unwrap();
        assert!(lane.ack(&claimed.task_id()));
        assert!(!lane.ack(&claimed.task_id()));
        assert_eq!(lane.in_flight(), 0);
    }
}
