use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::TaskError;

/// Dispatch priority for a task.
/// Higher numerical values are dispatched first within a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 10;

    /// Create a priority, rejecting values outside 0-10.
    pub fn new(value: u8) -> Result<Self, TaskError> {
        if value > Self::MAX {
            return Err(TaskError::InvalidPriority(value));
        }
        Ok(Priority(value))
    }

    /// Highest priority (10)
    pub fn high() -> Self {
        Priority(Self::MAX)
    }

    /// Mid-band priority (5), the routing default
    pub fn normal() -> Self {
        Priority(5)
    }

    /// Lowest priority (0)
    pub fn low() -> Self {
        Priority(Self::MIN)
    }

    /// Get the raw priority value
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority(Self::MIN)
    }
}

impl TryFrom<u8> for Priority {
    type Error = TaskError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Priority::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}
