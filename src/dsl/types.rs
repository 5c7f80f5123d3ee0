//! Workflow document type definitions.
//!
//! Field names follow the wire shape of the DSL document, so camelCase keys
//! (`taskReferenceName`, `inputParameters`, ...) sit next to snake_case ones
//! (`next_task_ref_name`, `task_ref_name`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A complete workflow definition.
///
/// # Example
///
/// ```json
/// {
///   "name": "order-approval",
///   "inputParameters": ["order_id", "amount"],
///   "tasks": [
///     {
///       "taskReferenceName": "check_amount",
///       "type": "DECISION",
///       "input": {
///         "param_value": "${inputParameters.amount}",
///         "decision_cases": { "> 1000": ["approve"] },
///         "default_case": ["notify"]
///       }
///     },
///     { "taskReferenceName": "approve", "type": "APPROVAL" },
///     { "taskReferenceName": "notify", "type": "SET_VARIABLE",
///       "input": { "variables": { "notified_at": "$NOW" } } }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name
    pub name: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Free-form version label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Tasks in declaration order
    pub tasks: Vec<TaskDefinition>,

    /// Names of the workflow-level input parameters
    #[serde(
        rename = "inputParameters",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub input_parameters: Option<Vec<String>>,

    /// Workflow outputs, usually placeholders over task outputs
    #[serde(
        rename = "outputParameters",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub output_parameters: Option<Map<String, Value>>,

    /// Actual values for the declared input parameters
    #[serde(rename = "inputValues", default, skip_serializing_if = "Option::is_none")]
    pub input_values: Option<Map<String, Value>>,
}

impl WorkflowDefinition {
    /// Declared parameters bound to their values.
    ///
    /// A declared parameter without a value is bound to `null`.
    pub fn workflow_inputs(&self) -> Map<String, Value> {
        let values = self.input_values.as_ref();
        self.input_parameters
            .iter()
            .flatten()
            .map(|name| {
                let value = values
                    .and_then(|v| v.get(name))
                    .cloned()
                    .unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect()
    }

    /// Merge override values into `inputValues`, replacing existing keys.
    pub fn merge_input_values(&mut self, overrides: Map<String, Value>) {
        let values = self.input_values.get_or_insert_with(Map::new);
        for (key, value) in overrides {
            values.insert(key, value);
        }
    }

    /// Task types used by this workflow, in declaration order.
    pub fn task_types(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.task_type.as_str()).collect()
    }
}

/// A task (step) in the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Unique reference name within this workflow
    #[serde(rename = "taskReferenceName")]
    pub task_reference_name: String,

    /// Task type tag (HTTP, SET_VARIABLE, DECISION, ...)
    #[serde(rename = "type")]
    pub task_type: String,

    /// Raw task input, may contain `${...}` placeholders
    #[serde(default)]
    pub input: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,

    /// Result of the execution, absent until the task ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<TaskResult>,

    /// Failure reason copied from the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default)]
    pub status: TaskStatus,

    /// Static successor, used when the result does not pick one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_task_ref_name: Option<String>,
}

impl TaskDefinition {
    /// Create a pending task with the given input.
    pub fn new(
        task_reference_name: impl Into<String>,
        task_type: impl Into<String>,
        input: Map<String, Value>,
    ) -> Self {
        Self {
            task_reference_name: task_reference_name.into(),
            task_type: task_type.into(),
            input,
            description: None,
            optional: None,
            output: None,
            reason: None,
            status: TaskStatus::Pending,
            next_task_ref_name: None,
        }
    }

    /// Set the static successor.
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next_task_ref_name = Some(next.into());
        self
    }

    /// Whether the orchestrator already committed a result for this task.
    pub fn has_executed(&self) -> bool {
        self.output.is_some() || self.status != TaskStatus::Pending
    }
}

/// Lifecycle status of a task definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Terminated,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "PENDING"),
            TaskStatus::InProgress => write!(f, "IN_PROGRESS"),
            TaskStatus::Completed => write!(f, "COMPLETED"),
            TaskStatus::Failed => write!(f, "FAILED"),
            TaskStatus::Terminated => write!(f, "TERMINATED"),
        }
    }
}

impl From<ResultStatus> for TaskStatus {
    fn from(status: ResultStatus) -> Self {
        match status {
            ResultStatus::Completed => TaskStatus::Completed,
            ResultStatus::Failed => TaskStatus::Failed,
            ResultStatus::InProgress => TaskStatus::InProgress,
            ResultStatus::Terminated => TaskStatus::Terminated,
        }
    }
}

/// Status a handler may report. There is no PENDING: a result always
/// describes something that ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Completed,
    Failed,
    InProgress,
    Terminated,
}

/// Outcome of one task execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_ref_name: String,
    pub status: ResultStatus,
    #[serde(default)]
    pub output: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TaskResult {
    /// A COMPLETED result.
    pub fn completed(task_ref_name: impl Into<String>, output: Map<String, Value>) -> Self {
        Self {
            task_ref_name: task_ref_name.into(),
            status: ResultStatus::Completed,
            output,
            reason: None,
        }
    }

    /// A FAILED result carrying the reason both as `reason` and `output.error`.
    pub fn failed(task_ref_name: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut output = Map::new();
        output.insert("error".to_string(), Value::String(reason.clone()));
        Self {
            task_ref_name: task_ref_name.into(),
            status: ResultStatus::Failed,
            output,
            reason: Some(reason),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ResultStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_status_defaults_to_pending() {
        let task: TaskDefinition = serde_json::from_value(json!({
            "taskReferenceName": "t1",
            "type": "HTTP"
        }))
        .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.input.is_empty());
        assert!(!task.has_executed());
    }

    #[test]
    fn test_task_status_rejects_unknown_value() {
        let result: std::result::Result<TaskDefinition, _> = serde_json::from_value(json!({
            "taskReferenceName": "t1",
            "type": "HTTP",
            "status": "SLEEPING"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_result_status_has_no_pending() {
        let result: std::result::Result<TaskResult, _> = serde_json::from_value(json!({
            "task_ref_name": "t1",
            "status": "PENDING",
            "output": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_workflow_inputs_binds_declared_parameters() {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "name": "wf",
            "tasks": [],
            "inputParameters": ["order_id", "amount"],
            "inputValues": {"amount": 250, "ignored": true}
        }))
        .unwrap();

        let inputs = def.workflow_inputs();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs["amount"], json!(250));
        assert_eq!(inputs["order_id"], Value::Null);
        assert!(!inputs.contains_key("ignored"));
    }

    #[test]
    fn test_merge_input_values_creates_map() {
        let mut def: WorkflowDefinition = serde_json::from_value(json!({
            "name": "wf",
            "tasks": []
        }))
        .unwrap();
        let mut overrides = Map::new();
        overrides.insert("order_id".into(), json!(42));
        def.merge_input_values(overrides);

        assert_eq!(def.input_values.unwrap()["order_id"], json!(42));
    }

    #[test]
    fn test_failed_result_carries_reason() {
        let result = TaskResult::failed("mail", "connection refused");
        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.reason.as_deref(), Some("connection refused"));
        assert_eq!(result.output["error"], "connection refused");
    }

    #[test]
    fn test_task_result_wire_shape() {
        let mut output = Map::new();
        output.insert("foo".into(), json!(1));
        let value = serde_json::to_value(TaskResult::completed("t1", output)).unwrap();
        assert_eq!(
            value,
            json!({"task_ref_name": "t1", "status": "COMPLETED", "output": {"foo": 1}})
        );
    }
}
