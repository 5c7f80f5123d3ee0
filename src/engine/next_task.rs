//! Successor selection after a task finished.

use serde_json::Value;

use crate::dsl::{TaskDefinition, TaskResult};

/// Reference of the task to run next, if the task or its result names one.
///
/// A `next_task` in the result output wins: a list contributes its first
/// element, a scalar is used as-is, empty values are ignored. Otherwise the
/// task's static `next_task_ref_name` applies.
pub fn next_task_ref(task: &TaskDefinition, result: &TaskResult) -> Option<String> {
    result
        .output
        .get("next_task")
        .and_then(routed_reference)
        .or_else(|| {
            task.next_task_ref_name
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
        })
}

fn routed_reference(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.first().and_then(routed_reference),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
