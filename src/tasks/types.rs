//! Task handler contract and task kinds.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::dsl::TaskResult;
use crate::error::{Error, Result};

/// Kind of a task, parsed from the document's `type` tag.
///
/// The tag is matched case-insensitively. Anything that is not a built-in
/// kind is kept as `Custom` and dispatched to the substrate under its own
/// activity name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Http,
    SetVariable,
    Decision,
    SendMail,
    Approval,
    Custom(String),
}

impl TaskKind {
    /// Parse a `type` tag.
    pub fn parse(tag: &str) -> Self {
        let upper = tag.trim().to_uppercase();
        match upper.as_str() {
            "HTTP" => TaskKind::Http,
            "SET_VARIABLE" => TaskKind::SetVariable,
            "DECISION" => TaskKind::Decision,
            "SEND_MAIL" => TaskKind::SendMail,
            "APPROVAL" => TaskKind::Approval,
            _ => TaskKind::Custom(upper),
        }
    }

    /// Canonical upper-case tag.
    pub fn as_str(&self) -> &str {
        match self {
            TaskKind::Http => "HTTP",
            TaskKind::SetVariable => "SET_VARIABLE",
            TaskKind::Decision => "DECISION",
            TaskKind::SendMail => "SEND_MAIL",
            TaskKind::Approval => "APPROVAL",
            TaskKind::Custom(tag) => tag,
        }
    }

    /// Activity name used when the task is dispatched through the substrate.
    pub fn activity_name(&self) -> String {
        format!("{}_TASK", self.as_str())
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait implemented by every task type.
///
/// `validate` turns the resolved task input into a typed value and is the
/// only place a handler may reject its input. `execute` never fails: problems
/// met while running are reported as a FAILED [`TaskResult`].
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Typed input. Every input carries the `task_ref_name` it runs for.
    type Input: Send;

    /// Kind this handler serves.
    fn kind(&self) -> TaskKind;

    /// Get a description of this task type.
    fn description(&self) -> &str {
        "A workflow task"
    }

    /// Validate raw input.
    fn validate(&self, raw: &Value) -> Result<Self::Input>;

    /// Execute the task with validated input.
    async fn execute(&self, input: Self::Input) -> TaskResult;
}

/// Object-safe view of a [`TaskHandler`], used by registries.
#[async_trait]
pub trait DynHandler: Send + Sync {
    fn kind(&self) -> TaskKind;

    fn description(&self) -> &str;

    /// Validate and execute in one step.
    async fn run(&self, payload: &Value) -> Result<TaskResult>;
}

#[async_trait]
impl<H: TaskHandler> DynHandler for H {
    fn kind(&self) -> TaskKind {
        TaskHandler::kind(self)
    }

    fn description(&self) -> &str {
        TaskHandler::description(self)
    }

    async fn run(&self, payload: &Value) -> Result<TaskResult> {
        let input = self.validate(payload)?;
        Ok(self.execute(input).await)
    }
}

/// Deserialize a task input, reporting failures as validation errors.
pub(crate) fn parse_input<T: DeserializeOwned>(kind: &TaskKind, raw: &Value) -> Result<T> {
    serde_json::from_value(raw.clone())
        .map_err(|e| Error::Validation(format!("Invalid {} task input: {}", kind, e)))
}

/// Accept either a single string or a list of strings.
pub(crate) fn string_or_list(field: &str, value: Option<&Value>) -> Result<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(Error::Validation(format!(
                    "'{}' must contain strings, got {}",
                    field, other
                ))),
            })
            .collect(),
        Some(other) => Err(Error::Validation(format!(
            "'{}' must be a string or a list of strings, got {}",
            field, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parse_is_case_insensitive() {
        assert_eq!(TaskKind::parse("http"), TaskKind::Http);
        assert_eq!(TaskKind::parse("Set_Variable"), TaskKind::SetVariable);
        assert_eq!(TaskKind::parse(" DECISION "), TaskKind::Decision);
        assert_eq!(TaskKind::parse("send_mail"), TaskKind::SendMail);
        assert_eq!(TaskKind::parse("approval"), TaskKind::Approval);
    }

    #[test]
    fn test_custom_kind_activity_name() {
        let kind = TaskKind::parse("ship_parcel");
        assert_eq!(kind, TaskKind::Custom("SHIP_PARCEL".into()));
        assert_eq!(kind.activity_name(), "SHIP_PARCEL_TASK");
        assert_eq!(TaskKind::Http.activity_name(), "HTTP_TASK");
    }

    #[test]
    fn test_string_or_list() {
        assert_eq!(
            string_or_list("to", Some(&json!("a@example.com"))).unwrap(),
            vec!["a@example.com"]
        );
        assert_eq!(
            string_or_list("to", Some(&json!(["a", "b"]))).unwrap(),
            vec!["a", "b"]
        );
        assert!(string_or_list("cc", None).unwrap().is_empty());
        assert!(string_or_list("to", Some(&json!(5))).is_err());
        assert!(string_or_list("to", Some(&json!(["a", 1]))).is_err());
    }
}
