use prometheus::{
    CounterVec, HistogramOpts, HistogramVec, IntGauge, IntGaugeVec, Opts, Registry,
};

/// Prometheus metrics for the task queue.
pub struct QueueMetrics {
    pub registry: Registry,

    /// Terminal outcomes by status and task type
    pub tasks_total: CounterVec,

    pub tasks_pending: IntGauge,
    pub tasks_running: IntGauge,

    /// Wall-clock duration from claim to terminal state
    pub task_duration: HistogramVec,

    /// Pending depth per queue
    pub queue_depth: IntGaugeVec,
}

impl QueueMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let tasks_total = CounterVec::new(
            Opts::new("taskq_tasks_total", "Tasks by terminal status and type"),
            &["status", "task_type"],
        )?;
        registry.register(Box::new(tasks_total.clone()))?;

        let tasks_pending = IntGauge::new("taskq_tasks_pending", "Number of pending tasks")?;
        registry.register(Box::new(tasks_pending.clone()))?;

        let tasks_running = IntGauge::new("taskq_tasks_running", "Number of running tasks")?;
        registry.register(Box::new(tasks_running.clone()))?;

        let task_duration = HistogramVec::new(
            HistogramOpts::new(
                "taskq_task_duration_seconds",
                "Task execution duration in seconds",
            ),
            &["task_type"],
        )?;
        registry.register(Box::new(task_duration.clone()))?;

        let queue_depth = IntGaugeVec::new(
            Opts::new("taskq_queue_depth", "Pending depth per queue"),
            &["queue"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(QueueMetrics {
            registry,
            tasks_total,
            tasks_pending,
            tasks_running,
            task_duration,
            queue_depth,
        })
    }

    pub fn record_outcome(&self, status: &str, task_type: &str) {
        self.tasks_total
            .with_label_values(&[status, task_type])
            .inc();
    }

    pub fn observe_duration(&self, task_type: &str, seconds: f64) {
        self.task_duration
            .with_label_values(&[task_type])
            .observe(seconds);
    }

    pub fn set_queue_depth(&self, queue: &str, depth: i64) {
        self.queue_depth.with_label_values(&[queue]).set(depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_cleanly() {
        let metrics = QueueMetrics::new().unwrap();
        metrics.record_outcome("SUCCESS", "data_processing");
        metrics.tasks_pending.inc();
        metrics.observe_duration("data_processing", 0.5);
        metrics.set_queue_depth("reports", 3);

        let families = metrics.registry.gather();
        assert!(!families.is_empty());
    }
}
