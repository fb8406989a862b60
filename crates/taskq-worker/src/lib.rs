mod context;
mod handler;
mod pool;

pub use context::RunContext;
pub use handler::{
    DataProcessingHandler, FileProcessingHandler, HandlerRegistry, HandlerResult,
    NotificationHandler, ReportGenerationHandler, TaskFailure, TaskHandler,
};
pub use pool::{WorkerPool, WorkerPoolConfig};
