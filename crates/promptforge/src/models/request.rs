use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The task families the engine knows how to prompt for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    DataAnalysis,
    ImageRecognition,
    TextProcessing,
    RequirementsAnalysis,
    ApiTesting,
    GeneralPoc,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::DataAnalysis => "data_analysis",
            TaskType::ImageRecognition => "image_recognition",
            TaskType::TextProcessing => "text_processing",
            TaskType::RequirementsAnalysis => "requirements_analysis",
            TaskType::ApiTesting => "api_testing",
            TaskType::GeneralPoc => "general_poc",
        }
    }
}

/// A single refinement request. Immutable once constructed; the caller
/// creates it and the engine never mutates it.
///
/// `context` is a `BTreeMap` so fingerprinting iterates keys in a stable
/// order regardless of insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub request_id: Uuid,
    pub task_type: TaskType,
    pub requirements: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    #[serde(default)]
    pub constraints: Option<String>,
}

impl Request {
    pub fn new(task_type: TaskType, requirements: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            task_type,
            requirements: requirements.into(),
            context: BTreeMap::new(),
            constraints: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_constraints(mut self, constraints: impl Into<String>) -> Self {
        self.constraints = Some(constraints.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_serializes_snake_case() {
        let json = serde_json::to_string(&TaskType::DataAnalysis).unwrap();
        assert_eq!(json, "\"data_analysis\"");
    }

    #[test]
    fn test_request_roundtrip() {
        let request = Request::new(TaskType::ApiTesting, "exercise the login endpoint")
            .with_context("base_url", "https://api.example.com")
            .with_constraints("no destructive calls");

        let json = serde_json::to_string(&request).unwrap();
        let recovered: Request = serde_json::from_str(&json).unwrap();

        assert_eq!(recovered.request_id, request.request_id);
        assert_eq!(recovered.task_type, TaskType::ApiTesting);
        assert_eq!(recovered.context.get("base_url").unwrap(), "https://api.example.com");
        assert_eq!(recovered.constraints.as_deref(), Some("no destructive calls"));
    }

    #[test]
    fn test_request_without_optional_fields_deserializes() {
        let json = serde_json::json!({
            "request_id": Uuid::new_v4(),
            "task_type": "general_poc",
            "requirements": "prototype a chat summarizer"
        });
        let request: Request = serde_json::from_value(json).unwrap();
        assert!(request.context.is_empty());
        assert!(request.constraints.is_none());
    }
}
