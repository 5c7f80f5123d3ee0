//! Approval task - suspend until a human decision is delivered.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::types::{parse_input, TaskHandler, TaskKind};
use crate::dsl::TaskResult;
use crate::engine::HumanInLoopSignal;
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct ApprovalInput {
    pub task_ref_name: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Approval task handler, bound to one instance's signal.
pub struct ApprovalHandler {
    signal: HumanInLoopSignal,
}

impl ApprovalHandler {
    pub fn new(signal: HumanInLoopSignal) -> Self {
        Self { signal }
    }
}

#[async_trait]
impl TaskHandler for ApprovalHandler {
    type Input = ApprovalInput;

    fn kind(&self) -> TaskKind {
        TaskKind::Approval
    }

    fn description(&self) -> &str {
        "Wait for a human approval decision"
    }

    fn validate(&self, raw: &Value) -> Result<ApprovalInput> {
        parse_input(&TaskKind::Approval, raw)
    }

    async fn execute(&self, input: ApprovalInput) -> TaskResult {
        match &input.message {
            Some(message) => info!(task = %input.task_ref_name, "Waiting for approval: {}", message),
            None => info!(task = %input.task_ref_name, "Waiting for approval"),
        }

        match self.signal.wait().await {
            Ok(decision) => {
                info!(task = %input.task_ref_name, decision = %decision, "Approval received");
                let mut output = Map::new();
                output.insert("approval_result".to_string(), json!(decision));
                TaskResult::completed(input.task_ref_name, output)
            }
            Err(e) => {
                warn!(task = %input.task_ref_name, "Approval wait aborted: {}", e);
                TaskResult::failed(input.task_ref_name, e.to_string())
            }
        }
    }
}
