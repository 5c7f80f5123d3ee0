//! Decision task - pick the next task from guarded cases.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::expression::{Expression, Operand};
use super::types::{string_or_list, TaskHandler, TaskKind};
use crate::dsl::TaskResult;
use crate::error::{Error, Result};

/// Ordered decision cases plus the default targets.
#[derive(Debug, Clone)]
pub struct DecisionCases {
    cases: Vec<(Expression, Vec<String>)>,
    default_case: Vec<String>,
}

impl DecisionCases {
    /// Build from a decision task input (`decision_cases`, `default_case`).
    ///
    /// Case keys are parsed here, so a malformed key fails before anything
    /// is evaluated.
    pub fn from_input(raw: &Value) -> Result<Self> {
        let default_case = string_or_list("default_case", raw.get("default_case"))?;

        let cases_raw = match raw.get("decision_cases") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(Error::Validation(format!(
                    "'decision_cases' must be an object, got {}",
                    other
                )))
            }
        };

        let mut cases = Vec::with_capacity(cases_raw.len());
        for (key, targets) in &cases_raw {
            let expression = Expression::parse(key)?;
            let targets = string_or_list("decision_cases", Some(targets))?;
            cases.push((expression, targets));
        }

        if cases.is_empty() && default_case.is_empty() {
            return Err(Error::Validation(
                "Decision needs at least one case or a non-empty default_case".into(),
            ));
        }

        Ok(Self {
            cases,
            default_case,
        })
    }

    /// Targets of the first case that holds, else the default targets.
    pub fn select(&self, value: &Operand) -> &[String] {
        for (expression, targets) in &self.cases {
            if expression.evaluate(value) {
                debug!(case = expression.source(), "Decision case matched");
                return targets;
            }
        }
        &self.default_case
    }

    /// Every task reference a case or the default can route to.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.cases
            .iter()
            .flat_map(|(_, targets)| targets.iter())
            .chain(self.default_case.iter())
            .map(String::as_str)
    }
}

/// Validated decision input.
#[derive(Debug, Clone)]
pub struct DecisionInput {
    pub task_ref_name: String,
    /// `None` when the value is missing or null
    pub param_value: Option<Operand>,
    pub cases: DecisionCases,
}

/// Decision task handler.
pub struct DecisionHandler;

impl DecisionHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DecisionHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskHandler for DecisionHandler {
    type Input = DecisionInput;

    fn kind(&self) -> TaskKind {
        TaskKind::Decision
    }

    fn description(&self) -> &str {
        "Route to the next task by evaluating decision cases"
    }

    fn validate(&self, raw: &Value) -> Result<DecisionInput> {
        let task_ref_name = raw
            .get("task_ref_name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Validation("Invalid DECISION task input: missing task_ref_name".into())
            })?
            .to_string();

        let param_value = match raw.get("param_value") {
            None => None,
            // A placeholder over a null input renders as the text "null"
            Some(Value::String(s)) if s.trim() == "null" => None,
            Some(v @ (Value::Array(_) | Value::Object(_))) => {
                return Err(Error::Validation(format!(
                    "'param_value' must be a scalar, got {}",
                    v
                )))
            }
            Some(v) => Operand::from_value(v),
        };

        Ok(DecisionInput {
            task_ref_name,
            param_value,
            cases: DecisionCases::from_input(raw)?,
        })
    }

    async fn execute(&self, input: DecisionInput) -> TaskResult {
        let Some(value) = input.param_value else {
            warn!(task = %input.task_ref_name, "Decision has no param_value");
            return TaskResult::failed(&input.task_ref_name, "Missing inputParameter");
        };

        let chosen = input.cases.select(&value);
        debug!(task = %input.task_ref_name, value = %value, next = ?chosen, "Decision made");

        let mut output = Map::new();
        output.insert("next_task".to_string(), json!(chosen));
        TaskResult::completed(input.task_ref_name, output)
    }
}
