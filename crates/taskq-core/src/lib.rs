mod error;
mod priority;
mod state;
mod task;

pub use error::{Result, TaskError};
pub use priority::Priority;
pub use state::{TaskRecord, TaskStatus, Transition};
pub use task::{SubmitRequest, TaskDescriptor, TaskId, TaskParams, TaskType};

/// Progress values are percentages.
pub const MAX_PROGRESS: u8 = 100;
