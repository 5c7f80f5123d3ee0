//! Task executors - how the orchestrator gets a result for a task.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::substrate::Substrate;
use crate::dsl::{TaskDefinition, TaskResult};
use crate::error::{Error, Result};
use crate::tasks::{DynHandler, TaskKind};

/// Produces a result for one task from its resolved input.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &TaskDefinition, input: Map<String, Value>) -> Result<TaskResult>;
}

/// Handler payload: the resolved input plus the task's reference name.
fn payload(task: &TaskDefinition, mut input: Map<String, Value>) -> Value {
    input.insert(
        "task_ref_name".to_string(),
        Value::String(task.task_reference_name.clone()),
    );
    Value::Object(input)
}

/// Dispatches the task to the substrate as `<TYPE>_TASK`.
pub struct ActivityExecutor {
    substrate: Arc<dyn Substrate>,
}

impl ActivityExecutor {
    pub fn new(substrate: Arc<dyn Substrate>) -> Self {
        Self { substrate }
    }
}

#[async_trait]
impl TaskExecutor for ActivityExecutor {
    async fn execute(&self, task: &TaskDefinition, input: Map<String, Value>) -> Result<TaskResult> {
        let activity = TaskKind::parse(&task.task_type).activity_name();
        let raw = self.substrate.dispatch(&activity, payload(task, input)).await?;
        serde_json::from_value(raw).map_err(|e| {
            Error::Execution(format!(
                "Activity {} returned an invalid result: {}",
                activity, e
            ))
        })
    }
}

/// Runs a handler inside the workflow, without the substrate.
///
/// Used for handlers bound to instance state, such as approvals.
pub struct InlineExecutor {
    handler: Arc<dyn DynHandler>,
}

impl InlineExecutor {
    pub fn new(handler: Arc<dyn DynHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl TaskExecutor for InlineExecutor {
    async fn execute(&self, task: &TaskDefinition, input: Map<String, Value>) -> Result<TaskResult> {
        self.handler.run(&payload(task, input)).await
    }
}

/// Kind-to-executor table with an optional fallback.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<TaskKind, Arc<dyn TaskExecutor>>,
    default: Option<Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor used for kinds without a dedicated one.
    pub fn with_default(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.default = Some(executor);
        self
    }

    pub fn with(mut self, kind: TaskKind, executor: Arc<dyn TaskExecutor>) -> Self {
        self.register(kind, executor);
        self
    }

    pub fn register(&mut self, kind: TaskKind, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(kind, executor);
    }

    /// Executor for `kind`, falling back to the default.
    pub fn resolve(&self, kind: &TaskKind) -> Result<Arc<dyn TaskExecutor>> {
        self.executors
            .get(kind)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| Error::NoHandlerForType(kind.to_string()))
    }
}
