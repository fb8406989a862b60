use thiserror::Error;

use crate::{TaskId, TaskType};

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Invalid parameters for {task_type}: {}", .fields.join(", "))]
    Validation {
        task_type: TaskType,
        fields: Vec<String>,
    },

    #[error("Invalid priority value: {0} (must be 0-10)")]
    InvalidPriority(u8),

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("No queue route configured for task type: {0}")]
    UnroutedTaskType(TaskType),

    #[error("Broker is shut down")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, TaskError>;
