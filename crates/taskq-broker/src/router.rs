use std::collections::HashMap;

use taskq_core::{Priority, Result, TaskError, TaskType};

/// Where a task type is dispatched: a named queue and the priority used
/// when the submitter does not supply one.
#[derive(Debug, Clone)]
pub struct Route {
    pub queue: String,
    pub default_priority: Priority,
}

/// Static task-type → queue routing table.
///
/// Routing is total: construction fails unless every [`TaskType`] has a
/// route, so an unmapped type is a startup configuration error and can
/// never surface at runtime. The same table value is handed to the
/// submission path and the worker pool.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: HashMap<TaskType, Route>,
}

impl RouteTable {
    /// Build a table from explicit routes, checking totality.
    pub fn new(routes: HashMap<TaskType, Route>) -> Result<Self> {
        for task_type in TaskType::ALL {
            if !routes.contains_key(&task_type) {
                return Err(TaskError::UnroutedTaskType(task_type));
            }
        }
        Ok(RouteTable { routes })
    }

    /// The standard routing: one queue per task type.
    pub fn standard() -> Self {
        let default_priority = Priority::normal();
        let mut routes = HashMap::new();
        for (task_type, queue) in [
            (TaskType::DataProcessing, "data_processing"),
            (TaskType::FileProcessing, "file_processing"),
            (TaskType::Notification, "notifications"),
            (TaskType::ReportGeneration, "reports"),
        ] {
            routes.insert(
                task_type,
                Route {
                    queue: queue.to_string(),
                    default_priority,
                },
            );
        }
        RouteTable { routes }
    }

    /// Resolve the route for a task type. Total by construction.
    pub fn route(&self, task_type: TaskType) -> &Route {
        self.routes
            .get(&task_type)
            .expect("route table is total by construction")
    }

    /// Distinct queue names, in deterministic order.
    pub fn queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self.routes.values().map(|r| r.queue.clone()).collect();
        queues.sort();
        queues.dedup();
        queues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_is_total() {
        let table = RouteTable::standard();
        for task_type in TaskType::ALL {
            let route = table.route(task_type);
            assert!(!route.queue.is_empty());
        }
    }

    #[test]
    fn test_partial_table_fails_fast() {
        let mut routes = HashMap::new();
        routes.insert(
            TaskType::DataProcessing,
            Route {
                queue: "data_processing".to_string(),
                default_priority: Priority::default(),
            },
        );

        match RouteTable::new(routes) {
            Err(TaskError::UnroutedTaskType(_)) => {}
            other => panic!("expected UnroutedTaskType, got {other:?}"),
        }
    }

    #[test]
    fn test_queue_names_are_distinct() {
        let table = RouteTable::standard();
        assert_eq!(table.queues().len(), 4);
    }
}
