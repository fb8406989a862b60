use crate::{Priority, Result, TaskError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task
pub type TaskId = Uuid;

/// The closed set of task types the system executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    DataProcessing,
    FileProcessing,
    Notification,
    ReportGeneration,
}

impl TaskType {
    /// Every variant, so routing tables can be checked for totality.
    pub const ALL: [TaskType; 4] = [
        TaskType::DataProcessing,
        TaskType::FileProcessing,
        TaskType::Notification,
        TaskType::ReportGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::DataProcessing => "data_processing",
            TaskType::FileProcessing => "file_processing",
            TaskType::Notification => "notification",
            TaskType::ReportGeneration => "report_generation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "data_processing" => Some(TaskType::DataProcessing),
            "file_processing" => Some(TaskType::FileProcessing),
            "notification" => Some(TaskType::Notification),
            "report_generation" => Some(TaskType::ReportGeneration),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_data_size() -> u64 {
    1000
}

fn default_processing_time() -> f64 {
    10.0
}

fn default_operation() -> String {
    "analyze".to_string()
}

fn default_report_type() -> String {
    "monthly".to_string()
}

fn default_report_format() -> String {
    "pdf".to_string()
}

fn default_data_range() -> String {
    "last_30_days".to_string()
}

/// Typed parameter payloads, one variant per task type.
/// Deserialization goes through [`TaskParams::parse`], keyed by the task
/// type, so the variants stay unambiguous on the wire.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TaskParams {
    DataProcessing {
        #[serde(default = "default_data_size")]
        data_size: u64,
        #[serde(default = "default_processing_time")]
        processing_time: f64,
        #[serde(default)]
        include_error: bool,
    },
    FileProcessing {
        file_url: String,
        #[serde(default = "default_operation")]
        operation: String,
    },
    Notification {
        recipient: String,
        subject: String,
        message: String,
        #[serde(default)]
        delay_seconds: u64,
    },
    ReportGeneration {
        #[serde(default = "default_report_type")]
        report_type: String,
        #[serde(default = "default_report_format")]
        format: String,
        #[serde(default = "default_data_range")]
        data_range: String,
    },
}

impl TaskParams {
    /// Parse and validate a raw parameter object against the schema for
    /// `task_type`. Returns every offending field, not just the first.
    pub fn parse(task_type: TaskType, raw: serde_json::Value) -> Result<Self> {
        let invalid = |fields: Vec<String>| TaskError::Validation { task_type, fields };

        let params = match task_type {
            TaskType::DataProcessing => {
                #[derive(Deserialize)]
                struct Raw {
                    #[serde(default = "default_data_size")]
                    data_size: u64,
                    #[serde(default = "default_processing_time")]
                    processing_time: f64,
                    #[serde(default)]
                    include_error: bool,
                }
                let raw: Raw = serde_json::from_value(raw)
                    .map_err(|e| invalid(vec![e.to_string()]))?;
                TaskParams::DataProcessing {
                    data_size: raw.data_size,
                    processing_time: raw.processing_time,
                    include_error: raw.include_error,
                }
            }
            TaskType::FileProcessing => {
                #[derive(Deserialize)]
                struct Raw {
                    file_url: String,
                    #[serde(default = "default_operation")]
                    operation: String,
                }
                let raw: Raw = serde_json::from_value(raw)
                    .map_err(|e| invalid(vec![e.to_string()]))?;
                TaskParams::FileProcessing {
                    file_url: raw.file_url,
                    operation: raw.operation,
                }
            }
            TaskType::Notification => {
                #[derive(Deserialize)]
                struct Raw {
                    recipient: String,
                    subject: String,
                    message: String,
                    #[serde(default)]
                    delay_seconds: u64,
                }
                let raw: Raw = serde_json::from_value(raw)
                    .map_err(|e| invalid(vec![e.to_string()]))?;
                TaskParams::Notification {
                    recipient: raw.recipient,
                    subject: raw.subject,
                    message: raw.message,
                    delay_seconds: raw.delay_seconds,
                }
            }
            TaskType::ReportGeneration => {
                #[derive(Deserialize)]
                struct Raw {
                    #[serde(default = "default_report_type")]
                    report_type: String,
                    #[serde(default = "default_report_format")]
                    format: String,
                    #[serde(default = "default_data_range")]
                    data_range: String,
                }
                let raw: Raw = serde_json::from_value(raw)
                    .map_err(|e| invalid(vec![e.to_string()]))?;
                TaskParams::ReportGeneration {
                    report_type: raw.report_type,
                    format: raw.format,
                    data_range: raw.data_range,
                }
            }
        };

        let offending = params.offending_fields();
        if !offending.is_empty() {
            return Err(invalid(offending));
        }

        Ok(params)
    }

    /// Field-level checks beyond shape: empty required strings, zero sizes.
    fn offending_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        match self {
            TaskParams::DataProcessing {
                data_size,
                processing_time,
                ..
            } => {
                if *data_size == 0 {
                    fields.push("data_size must be at least 1".to_string());
                }
                if *processing_time < 0.0 || !processing_time.is_finite() {
                    fields.push("processing_time must be non-negative".to_string());
                }
            }
            TaskParams::FileProcessing { file_url, .. } => {
                if file_url.trim().is_empty() {
                    fields.push("file_url must not be empty".to_string());
                }
            }
            TaskParams::Notification {
                recipient, subject, ..
            } => {
                if recipient.trim().is_empty() {
                    fields.push("recipient must not be empty".to_string());
                }
                if subject.trim().is_empty() {
                    fields.push("subject must not be empty".to_string());
                }
            }
            TaskParams::ReportGeneration { report_type, .. } => {
                if report_type.trim().is_empty() {
                    fields.push("report_type must not be empty".to_string());
                }
            }
        }
        fields
    }
}

/// A submission candidate as received from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub task_type: TaskType,
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// Immutable definition of one submitted unit of work.
/// Created only by the submission path; never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDescriptor {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub params: TaskParams,
    pub priority: Priority,
    pub description: Option<String>,
}

impl TaskDescriptor {
    /// Validate a submission candidate and mint a descriptor with a fresh id.
    pub fn from_request(request: SubmitRequest, default_priority: Priority) -> Result<Self> {
        let params = TaskParams::parse(request.task_type, request.parameters)?;

        Ok(TaskDescriptor {
            task_id: Uuid::new_v4(),
            task_type: request.task_type,
            params,
            priority: request.priority.unwrap_or(default_priority),
            description: request.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_type_wire_names() {
        let ty: TaskType = serde_json::from_value(json!("data_processing")).unwrap();
        assert_eq!(ty, TaskType::DataProcessing);
        assert_eq!(
            serde_json::to_value(TaskType::ReportGeneration).unwrap(),
            json!("report_generation")
        );
    }

    #[test]
    fn test_data_processing_defaults() {
        let params = TaskParams::parse(TaskType::DataProcessing, json!({})).unwrap();
        assert_eq!(
            params,
            TaskParams::DataProcessing {
                data_size: 1000,
                processing_time: 10.0,
                include_error: false,
            }
        );
    }

    #[test]
    fn test_file_processing_requires_url() {
        let err = TaskParams::parse(TaskType::FileProcessing, json!({})).unwrap_err();
        match err {
            TaskError::Validation { task_type, fields } => {
                assert_eq!(task_type, TaskType::FileProcessing);
                assert!(!fields.is_empty());
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_notification_rejects_blank_fields() {
        let err = TaskParams::parse(
            TaskType::Notification,
            json!({"recipient": " ", "subject": "", "message": "hi"}),
        )
        .unwrap_err();
        match err {
            TaskError::Validation { fields, .. } => {
                assert_eq!(fields.len(), 2);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_descriptor_from_request() {
        let request = SubmitRequest {
            task_type: TaskType::DataProcessing,
            parameters: json!({"data_size": 100, "processing_time": 0, "include_error": false}),
            description: Some("smoke".to_string()),
            priority: None,
        };

        let descriptor =
            TaskDescriptor::from_request(request, Priority::new(5).unwrap()).unwrap();
        assert_eq!(descriptor.task_type, TaskType::DataProcessing);
        assert_eq!(descriptor.priority.value(), 5);
    }

    #[test]
    fn test_descriptor_ids_are_unique() {
        let request = || SubmitRequest {
            task_type: TaskType::ReportGeneration,
            parameters: json!({}),
            description: None,
            priority: None,
        };

        let a = TaskDescriptor::from_request(request(), Priority::default()).unwrap();
        let b = TaskDescriptor::from_request(request(), Priority::default()).unwrap();
        assert_ne!(a.task_id, b.task_id);
    }
}
