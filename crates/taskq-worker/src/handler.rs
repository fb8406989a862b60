use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;

use taskq_core::{TaskParams, TaskType};

use crate::context::RunContext;

/// How a task body failed.
#[derive(Debug, Clone)]
pub enum TaskFailure {
    /// Eligible for retry up to the configured maximum attempts.
    Transient(String),
    /// Not retried; surfaced as FAILED with this error text.
    Terminal(String),
    /// The body observed a cancellation at a check-point and aborted.
    Cancelled,
}

pub type HandlerResult = Result<serde_json::Value, TaskFailure>;

/// One task body. Implementations receive the typed parameters and the
/// per-execution [`RunContext`], and are contractually required to poll
/// `ctx.is_cancelled()` between logical steps.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, params: &TaskParams, ctx: &RunContext) -> HandlerResult;
}

/// Registry of task bodies by task type.
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry {
            handlers: HashMap::new(),
        }
    }

    /// The built-in handlers for every task type, pacing simulated work
    /// at one second per unit.
    pub fn standard() -> Self {
        Self::standard_paced(Duration::from_secs(1))
    }

    /// Built-in handlers with an explicit pace unit; tests pass
    /// `Duration::ZERO` to run the simulations instantly.
    pub fn standard_paced(pace: Duration) -> Self {
        let mut registry = Self::new();
        registry.register(TaskType::DataProcessing, DataProcessingHandler);
        registry.register(TaskType::FileProcessing, FileProcessingHandler { pace });
        registry.register(TaskType::Notification, NotificationHandler { pace });
        registry.register(TaskType::ReportGeneration, ReportGenerationHandler { pace });
        registry
    }

    pub fn register<H: TaskHandler + 'static>(&mut self, task_type: TaskType, handler: H) {
        self.handlers.insert(task_type, Arc::new(handler));
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&task_type).cloned()
    }

    pub fn task_types(&self) -> Vec<TaskType> {
        self.handlers.keys().copied().collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn simulate(pace: Duration, units: u32) {
    let delay = pace * units;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn wrong_params(task_type: TaskType) -> TaskFailure {
    TaskFailure::Terminal(format!("Unexpected parameter payload for {task_type}"))
}

/// Simulated data processing: ten timed steps with per-step progress,
/// paced by the `processing_time` parameter.
pub struct DataProcessingHandler;

#[async_trait]
impl TaskHandler for DataProcessingHandler {
    async fn run(&self, params: &TaskParams, ctx: &RunContext) -> HandlerResult {
        let TaskParams::DataProcessing {
            data_size,
            processing_time,
            include_error,
        } = params
        else {
            return Err(wrong_params(TaskType::DataProcessing));
        };

        const TOTAL_STEPS: u32 = 10;
        let step = Duration::from_secs_f64((processing_time / TOTAL_STEPS as f64).max(0.0));

        for i in 0..TOTAL_STEPS {
            if ctx.is_cancelled() {
                return Err(TaskFailure::Cancelled);
            }
            if *include_error && i == 7 {
                return Err(TaskFailure::Terminal(
                    "Simulated processing error".to_string(),
                ));
            }

            if !step.is_zero() {
                tokio::time::sleep(step).await;
            }

            let progress = ((i + 1) * 100 / TOTAL_STEPS) as u8;
            ctx.report_progress(
                progress,
                &format!("Processing step {}/{}", i + 1, TOTAL_STEPS),
            );
        }

        let mut rng = rand::thread_rng();
        Ok(json!({
            "data_processed": data_size,
            "processing_time": processing_time,
            "records_created": rng.gen_range(100..=1000),
            "records_updated": rng.gen_range(50..=500),
            "summary": format!("Successfully processed {data_size} data items"),
        }))
    }
}

/// Simulated file processing: download, transform, publish.
pub struct FileProcessingHandler {
    pub pace: Duration,
}

#[async_trait]
impl TaskHandler for FileProcessingHandler {
    async fn run(&self, params: &TaskParams, ctx: &RunContext) -> HandlerResult {
        let TaskParams::FileProcessing {
            file_url,
            operation,
        } = params
        else {
            return Err(wrong_params(TaskType::FileProcessing));
        };

        simulate(self.pace, 2).await;
        if ctx.is_cancelled() {
            return Err(TaskFailure::Cancelled);
        }
        ctx.report_progress(25, "File downloaded");

        simulate(self.pace, 3).await;
        if ctx.is_cancelled() {
            return Err(TaskFailure::Cancelled);
        }
        ctx.report_progress(75, &format!("Performing {operation}"));

        simulate(self.pace, 1).await;

        let mut rng = rand::thread_rng();
        Ok(json!({
            "file_url": file_url,
            "operation": operation,
            "file_size": rng.gen_range(1000..=10000),
            "output_url": format!("/processed/{}.json", rng.gen_range(1000..=9999)),
        }))
    }
}

/// Simulated notification delivery, with an optional initial delay.
pub struct NotificationHandler {
    pub pace: Duration,
}

#[async_trait]
impl TaskHandler for NotificationHandler {
    async fn run(&self, params: &TaskParams, ctx: &RunContext) -> HandlerResult {
        let TaskParams::Notification {
            recipient,
            subject,
            message,
            delay_seconds,
        } = params
        else {
            return Err(wrong_params(TaskType::Notification));
        };

        if *delay_seconds > 0 {
            tokio::time::sleep(Duration::from_secs(*delay_seconds)).await;
        }
        if ctx.is_cancelled() {
            return Err(TaskFailure::Cancelled);
        }
        ctx.report_progress(0, "Preparing notification");

        simulate(self.pace, 1).await;
        if ctx.is_cancelled() {
            return Err(TaskFailure::Cancelled);
        }
        ctx.report_progress(50, "Sending notification");

        simulate(self.pace, 2).await;

        let mut rng = rand::thread_rng();
        Ok(json!({
            "recipient": recipient,
            "subject": subject,
            "message_length": message.len(),
            "message_id": format!("msg_{}", rng.gen_range(10000..=99999)),
        }))
    }
}

/// Simulated report generation: collect, process, render.
pub struct ReportGenerationHandler {
    pub pace: Duration,
}

#[async_trait]
impl TaskHandler for ReportGenerationHandler {
    async fn run(&self, params: &TaskParams, ctx: &RunContext) -> HandlerResult {
        let TaskParams::ReportGeneration {
            report_type,
            format,
            data_range,
        } = params
        else {
            return Err(wrong_params(TaskType::ReportGeneration));
        };

        simulate(self.pace, 3).await;
        if ctx.is_cancelled() {
            return Err(TaskFailure::Cancelled);
        }
        ctx.report_progress(30, "Collecting data");

        simulate(self.pace, 4).await;
        if ctx.is_cancelled() {
            return Err(TaskFailure::Cancelled);
        }
        ctx.report_progress(70, "Processing data");

        simulate(self.pace, 2).await;
        if ctx.is_cancelled() {
            return Err(TaskFailure::Cancelled);
        }
        ctx.report_progress(90, "Generating report");

        simulate(self.pace, 1).await;

        let mut rng = rand::thread_rng();
        Ok(json!({
            "report_type": report_type,
            "format": format,
            "data_range": data_range,
            "report_url": format!("/reports/{}.pdf", rng.gen_range(1000..=9999)),
            "page_count": rng.gen_range(5..=50),
            "data_points": rng.gen_range(100..=1000),
        }))
    }
}
