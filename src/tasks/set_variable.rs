//! Set-variable task - publish values as task output.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::types::{parse_input, TaskHandler, TaskKind};
use crate::dsl::TaskResult;
use crate::error::Result;

const NOW_TOKEN: &str = "$NOW";

#[derive(Debug, Deserialize)]
pub struct SetVariableInput {
    pub task_ref_name: String,
    pub variables: Map<String, Value>,
}

/// Set-variable task handler.
pub struct SetVariableHandler;

impl SetVariableHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SetVariableHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskHandler for SetVariableHandler {
    type Input = SetVariableInput;

    fn kind(&self) -> TaskKind {
        TaskKind::SetVariable
    }

    fn description(&self) -> &str {
        "Set workflow variables ($NOW expands to the current UTC time)"
    }

    fn validate(&self, raw: &Value) -> Result<SetVariableInput> {
        parse_input(&TaskKind::SetVariable, raw)
    }

    async fn execute(&self, input: SetVariableInput) -> TaskResult {
        let output = input
            .variables
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(s) if s.eq_ignore_ascii_case(NOW_TOKEN) => {
                    (key, Value::String(Utc::now().to_rfc3339()))
                }
                other => (key, other),
            })
            .collect();

        TaskResult::completed(input.task_ref_name, output)
    }
}
