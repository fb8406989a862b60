use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use taskq_broker::{Broker, Delivery, QueueMetrics, TrackingStore};
use taskq_core::{TaskError, TaskStatus};

use crate::context::RunContext;
use crate::handler::{HandlerRegistry, TaskFailure};

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Concurrent executors; each handles at most one task at a time.
    pub worker_count: usize,
    /// Dispatch attempts before a transiently failing task becomes FAILED.
    pub max_attempts: u32,
    /// Wall-clock bound per execution; `None` disables the bound.
    pub task_timeout: Option<Duration>,
    /// A running task with no progress update inside this window is
    /// considered stale and recovered by the supervisor.
    pub heartbeat_timeout: Duration,
    /// How often the supervisor scans for stale tasks.
    pub supervise_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        WorkerPoolConfig {
            worker_count: 4,
            max_attempts: 3,
            task_timeout: Some(Duration::from_secs(300)),
            heartbeat_timeout: Duration::from_secs(600),
            supervise_interval: Duration::from_secs(10),
        }
    }
}

/// A pool of long-lived executors bound to the routing table's queues.
///
/// Each worker loops: claim the next eligible message (priority first,
/// FIFO within a band), transition the record to STARTED, run the task
/// body with a [`RunContext`], then acknowledge and record the terminal
/// outcome. Messages are acknowledged late, so an execution that stalls
/// is redelivered by the supervisor rather than lost.
pub struct WorkerPool {
    store: Arc<TrackingStore>,
    broker: Arc<Broker>,
    registry: Arc<HandlerRegistry>,
    metrics: Arc<QueueMetrics>,
    config: WorkerPoolConfig,
    queues: Vec<String>,
    stopping: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        store: Arc<TrackingStore>,
        broker: Arc<Broker>,
        registry: HandlerRegistry,
        metrics: Arc<QueueMetrics>,
        config: WorkerPoolConfig,
        queues: Vec<String>,
    ) -> Self {
        WorkerPool {
            store,
            broker,
            registry: Arc::new(registry),
            metrics,
            config,
            queues,
            stopping: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the workers and the staleness supervisor.
    pub fn start(&self) {
        let mut handles = self.handles.lock();

        for worker_index in 0..self.config.worker_count {
            let worker = WorkerLoop {
                store: self.store.clone(),
                broker: self.broker.clone(),
                registry: self.registry.clone(),
                metrics: self.metrics.clone(),
                config: self.config.clone(),
                queues: self.queues.clone(),
                stopping: self.stopping.clone(),
                shutdown: self.shutdown.clone(),
            };
            handles.push(tokio::spawn(async move {
                worker.run(worker_index).await;
            }));
        }

        handles.push(tokio::spawn(supervise(
            self.store.clone(),
            self.broker.clone(),
            self.metrics.clone(),
            self.config.clone(),
            self.stopping.clone(),
            self.shutdown.clone(),
        )));

        info!(
            "Worker pool started: {} workers on queues {:?}",
            self.config.worker_count, self.queues
        );
    }

    /// Stop claiming new work and wait for in-flight executions to finish.
    pub async fn shutdown(&self) {
        self.stopping.store(true, Ordering::Release);
        self.shutdown.notify_waiters();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Worker task ended abnormally: {}", e);
            }
        }
        info!("Worker pool stopped");
    }
}

struct WorkerLoop {
    store: Arc<TrackingStore>,
    broker: Arc<Broker>,
    registry: Arc<HandlerRegistry>,
    metrics: Arc<QueueMetrics>,
    config: WorkerPoolConfig,
    queues: Vec<String>,
    stopping: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl WorkerLoop {
    async fn run(&self, worker_index: usize) {
        debug!("Worker {} started", worker_index);

        loop {
            if self.stopping.load(Ordering::Acquire) {
                break;
            }

            let delivery = tokio::select! {
                claimed = self.broker.claim(&self.queues) => match claimed {
                    Ok(delivery) => delivery,
                    Err(TaskError::QueueClosed) => break,
                    Err(e) => {
                        error!("Worker {} claim failed: {}", worker_index, e);
                        continue;
                    }
                },
                _ = self.shutdown.notified() => break,
            };

            self.execute(delivery).await;
        }

        debug!("Worker {} stopped", worker_index);
    }

    async fn execute(&self, delivery: Delivery) {
        let task_id = delivery.task_id();
        let descriptor = delivery.descriptor();
        let task_type = descriptor.task_type;

        // Cancelled while queued: acknowledge and skip without ever
        // passing through STARTED.
        if self.store.is_revoked(&task_id) {
            debug!("Skipping revoked task {}", task_id);
            self.broker.ack(&delivery);
            return;
        }

        let attempts = match self.store.mark_started(&task_id) {
            Ok((transition, record)) => {
                if !transition.applied() {
                    // A cancellation won the race between claim and start.
                    debug!(
                        "Task {} no longer startable (status {}), dropping delivery",
                        task_id, record.status
                    );
                    self.broker.ack(&delivery);
                    return;
                }
                record.attempts
            }
            Err(e) => {
                warn!("Claimed task {} has no tracking record: {}", task_id, e);
                self.broker.ack(&delivery);
                return;
            }
        };

        info!(
            "Executing task {} (type: {}, attempt {})",
            task_id, task_type, attempts
        );

        let handler = match self.registry.get(task_type) {
            Some(handler) => handler,
            None => {
                let message = format!("No handler registered for task type: {task_type}");
                error!("{}", message);
                self.finish_failed(&delivery, &message);
                return;
            }
        };

        let ctx = RunContext::new(task_id, self.store.clone());
        let started = Instant::now();

        let outcome = match self.config.task_timeout {
            Some(limit) if !limit.is_zero() => {
                match tokio::time::timeout(limit, handler.run(&descriptor.params, &ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(TaskFailure::Terminal(format!(
                        "Task execution timed out after {limit:?}"
                    ))),
                }
            }
            _ => handler.run(&descriptor.params, &ctx).await,
        };

        self.metrics
            .observe_duration(task_type.as_str(), started.elapsed().as_secs_f64());

        match outcome {
            Ok(result) => {
                match self.store.mark_success(&task_id, result) {
                    Ok((transition, _)) if transition.applied() => {
                        info!("Task {} completed successfully", task_id);
                        self.metrics
                            .record_outcome(TaskStatus::Success.as_str(), task_type.as_str());
                    }
                    Ok(_) => debug!("Task {} finished after reaching a terminal state", task_id),
                    Err(e) => warn!("Failed to record success for task {}: {}", task_id, e),
                }
                self.broker.ack(&delivery);
            }
            Err(TaskFailure::Cancelled) => {
                info!("Task {} aborted at a cancellation check-point", task_id);
                self.broker.ack(&delivery);
            }
            Err(TaskFailure::Transient(reason)) => {
                if attempts < self.config.max_attempts {
                    info!(
                        "Task {} failed transiently ({}), retrying (attempt {}/{})",
                        task_id, reason, attempts, self.config.max_attempts
                    );
                    if let Err(e) = self.store.mark_retry(&task_id, &reason) {
                        warn!("Failed to record retry for task {}: {}", task_id, e);
                    }
                    self.broker.nack(&delivery, true);
                } else {
                    self.finish_failed(
                        &delivery,
                        &format!("{reason} (retries exhausted after {attempts} attempts)"),
                    );
                }
            }
            Err(TaskFailure::Terminal(reason)) => {
                self.finish_failed(&delivery, &reason);
            }
        }
    }

    fn finish_failed(&self, delivery: &Delivery, error: &str) {
        let task_id = delivery.task_id();
        let task_type = delivery.descriptor().task_type;

        match self.store.mark_failed(&task_id, error) {
            Ok((transition, _)) if transition.applied() => {
                warn!("Task {} failed: {}", task_id, error);
                self.metrics
                    .record_outcome(TaskStatus::Failed.as_str(), task_type.as_str());
            }
            Ok(_) => debug!("Task {} already terminal, failure not recorded", task_id),
            Err(e) => warn!("Failed to record failure for task {}: {}", task_id, e),
        }
        self.broker.ack(delivery);
    }
}

/// Recover tasks whose worker died mid-execution: no progress update
/// within the heartbeat window means the message is requeued (attempts
/// remaining) or failed (retries exhausted). Also refreshes the gauges.
async fn supervise(
    store: Arc<TrackingStore>,
    broker: Arc<Broker>,
    metrics: Arc<QueueMetrics>,
    config: WorkerPoolConfig,
    stopping: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    let window = chrono::Duration::from_std(config.heartbeat_timeout)
        .unwrap_or_else(|_| chrono::Duration::seconds(600));
    let mut interval = tokio::time::interval(config.supervise_interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.notified() => break,
        }
        if stopping.load(Ordering::Acquire) {
            break;
        }

        for task_id in store.stale_active(window) {
            let record = match store.snapshot(&task_id) {
                Ok(record) => record,
                Err(_) => continue,
            };

            if record.attempts < config.max_attempts {
                warn!(
                    "Task {} stalled (no progress within {:?}), requeueing",
                    task_id, config.heartbeat_timeout
                );
                if store.mark_retry(&task_id, "no progress within heartbeat window")
                    .map(|(t, _)| t.applied())
                    .unwrap_or(false)
                {
                    broker.requeue_in_flight(&record.queue, &task_id);
                }
            } else {
                warn!("Task {} stalled with retries exhausted, failing", task_id);
                if store
                    .mark_failed(&task_id, "Stalled: no progress within heartbeat window")
                    .map(|(t, _)| t.applied())
                    .unwrap_or(false)
                {
                    metrics.record_outcome(
                        TaskStatus::Failed.as_str(),
                        record.task_type.as_str(),
                    );
                }
                broker.drop_in_flight(&record.queue, &task_id);
            }
        }

        metrics
            .tasks_pending
            .set(store.count_by_status(TaskStatus::Pending) as i64);
        metrics.tasks_running.set(
            (store.count_by_status(TaskStatus::Started)
                + store.count_by_status(TaskStatus::Progress)) as i64,
        );
        for (queue, depth) in broker.depths() {
            metrics.set_queue_depth(&queue, depth as i64);
        }
    }
}
