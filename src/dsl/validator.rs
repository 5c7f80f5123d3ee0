//! Workflow validation.

use std::collections::HashSet;

use serde_json::Value;

use super::types::WorkflowDefinition;
use crate::error::{Error, Result};
use crate::tasks::{DecisionCases, TaskKind};

/// Validate a workflow definition.
///
/// Checks for:
/// - Non-blank workflow name
/// - Non-blank, unique task reference names
/// - Non-blank task types
pub fn validate_workflow(workflow: &WorkflowDefinition) -> Result<()> {
    if workflow.name.trim().is_empty() {
        return Err(Error::SchemaValidation(
            "Workflow name is required".into(),
        ));
    }

    let mut refs = HashSet::new();
    for task in &workflow.tasks {
        if task.task_reference_name.trim().is_empty() {
            return Err(Error::SchemaValidation(
                "Task reference name cannot be empty".into(),
            ));
        }
        if task.task_type.trim().is_empty() {
            return Err(Error::SchemaValidation(format!(
                "Task '{}' has an empty type",
                task.task_reference_name
            )));
        }
        if !refs.insert(task.task_reference_name.as_str()) {
            return Err(Error::SchemaValidation(format!(
                "Duplicate task reference name: {}",
                task.task_reference_name
            )));
        }
    }

    Ok(())
}

/// Collect non-fatal findings about a valid workflow.
///
/// Dangling successors only end a run early, and unknown types are routed to
/// the substrate, so neither is an error. Decision keys are checked here as
/// well so `dslflow validate` catches them before a run reaches the task.
pub fn lint_workflow(workflow: &WorkflowDefinition) -> Vec<String> {
    let refs: HashSet<&str> = workflow
        .tasks
        .iter()
        .map(|t| t.task_reference_name.as_str())
        .collect();
    let mut warnings = Vec::new();

    if workflow.tasks.is_empty() {
        warnings.push("Workflow has no tasks".to_string());
    }

    for task in &workflow.tasks {
        let name = &task.task_reference_name;

        if let Some(next) = &task.next_task_ref_name {
            if !refs.contains(next.as_str()) {
                warnings.push(format!(
                    "Task '{}' points to unknown next task '{}'; the run will end there",
                    name, next
                ));
            }
        }

        let kind = TaskKind::parse(&task.task_type);
        if let TaskKind::Custom(custom) = &kind {
            warnings.push(format!(
                "Task '{}' has type '{}' with no built-in handler; it will be dispatched as {}",
                name,
                custom,
                kind.activity_name()
            ));
        }

        if kind == TaskKind::Decision {
            let raw = Value::Object(task.input.clone());
            match DecisionCases::from_input(&raw) {
                Ok(cases) => {
                    for target in cases.targets() {
                        if !refs.contains(target) {
                            warnings.push(format!(
                                "Decision '{}' routes to unknown task '{}'; the run will end there",
                                name, target
                            ));
                        }
                    }
                }
                Err(e) => warnings.push(format!("Decision '{}': {}", name, e)),
            }
        }
    }

    warnings
}
