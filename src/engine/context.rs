//! Per-run execution context.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::dsl::{TaskDefinition, TaskResult, TaskStatus, WorkflowDefinition};
use crate::error::{Error, Result};

/// Tasks of one run, addressable by reference name and by position.
///
/// The orchestrator is the only writer. Each task is committed at most once.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    tasks: Vec<TaskDefinition>,
    index: HashMap<String, usize>,
    workflow_inputs: Map<String, Value>,
}

impl ExecutionContext {
    /// Build the context for a fresh run of `definition`.
    ///
    /// Status, output and reason carried by the document are dropped: only
    /// results committed during this run are visible.
    pub fn new(definition: &WorkflowDefinition) -> Self {
        let tasks: Vec<TaskDefinition> = definition
            .tasks
            .iter()
            .map(|task| {
                let mut task = task.clone();
                task.status = TaskStatus::Pending;
                task.output = None;
                task.reason = None;
                task
            })
            .collect();
        let index = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.task_reference_name.clone(), i))
            .collect();
        Self {
            tasks,
            index,
            workflow_inputs: definition.workflow_inputs(),
        }
    }

    pub fn get(&self, reference: &str) -> Option<&TaskDefinition> {
        self.position(reference).map(|i| &self.tasks[i])
    }

    /// Declaration index of a task.
    pub fn position(&self, reference: &str) -> Option<usize> {
        self.index.get(reference).copied()
    }

    pub fn task_at(&self, position: usize) -> Option<&TaskDefinition> {
        self.tasks.get(position)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Declared workflow inputs bound to their values.
    pub fn workflow_inputs(&self) -> &Map<String, Value> {
        &self.workflow_inputs
    }

    /// Record a task result: output, status and reason.
    pub fn commit(&mut self, reference: &str, result: TaskResult) -> Result<()> {
        let position = self
            .position(reference)
            .ok_or_else(|| Error::Execution(format!("Unknown task '{}'", reference)))?;
        let task = &mut self.tasks[position];
        if task.has_executed() {
            return Err(Error::Execution(format!(
                "Task '{}' already has a result",
                reference
            )));
        }

        task.status = result.status.into();
        task.reason = result.reason.clone();
        task.output = Some(result);
        Ok(())
    }

    pub fn tasks(&self) -> &[TaskDefinition] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<TaskDefinition> {
        self.tasks
    }
}
