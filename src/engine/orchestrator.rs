//! Workflow run loop.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use super::context::ExecutionContext;
use super::executor::ExecutorRegistry;
use super::next_task::next_task_ref;
use super::resolver::PlaceholderResolver;
use crate::dsl::{TaskDefinition, TaskStatus, WorkflowDefinition};
use crate::error::Result;
use crate::tasks::TaskKind;

/// Outcome of a finished run.
///
/// A run can finish with FAILED tasks; inspect the per-task status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowRun {
    pub name: String,
    /// Final state of every task, in declaration order
    pub tasks: Vec<TaskDefinition>,
    /// Reference names in execution order
    pub visited: Vec<String>,
    /// Resolved `outputParameters`
    pub output: Map<String, Value>,
}

impl WorkflowRun {
    pub fn task(&self, reference: &str) -> Option<&TaskDefinition> {
        self.tasks
            .iter()
            .find(|t| t.task_reference_name == reference)
    }

    /// References of tasks that ended FAILED.
    pub fn failed_tasks(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| t.task_reference_name.as_str())
            .collect()
    }
}

/// Walks a workflow one task at a time.
pub struct WorkflowOrchestrator {
    executors: ExecutorRegistry,
}

impl WorkflowOrchestrator {
    pub fn new(executors: ExecutorRegistry) -> Self {
        Self { executors }
    }

    /// Run a workflow to completion.
    ///
    /// Errors abort the run: no executor for a kind, or a handler rejecting
    /// its input. A task FAILED by its handler does not stop the run.
    #[instrument(
        name = "workflow.run",
        skip(self, definition),
        fields(workflow_name = %definition.name, instance_id = %instance_id)
    )]
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        instance_id: &str,
    ) -> Result<WorkflowRun> {
        let mut ctx = ExecutionContext::new(definition);
        let mut visited = Vec::new();

        info!(
            "Starting workflow '{}' with {} task(s)",
            definition.name,
            ctx.len()
        );

        let mut current = if ctx.is_empty() { None } else { Some(0) };
        while let Some(position) = current {
            let Some(task) = ctx.task_at(position).cloned() else {
                break;
            };
            let reference = task.task_reference_name.clone();

            if task.has_executed() {
                warn!("Task '{}' already executed, ending run", reference);
                break;
            }

            let input = PlaceholderResolver::new(&ctx).resolve_map(&task.input);
            let kind = TaskKind::parse(&task.task_type);
            let executor = self.executors.resolve(&kind)?;

            info!("Executing task '{}' [{}]", reference, kind);
            let result = executor.execute(&task, input).await?;
            info!("Task '{}' finished with status {:?}", reference, result.status);

            let next = next_task_ref(&task, &result);
            ctx.commit(&reference, result)?;
            visited.push(reference);

            current = match next {
                Some(next_ref) => match ctx.position(&next_ref) {
                    Some(next_position) => Some(next_position),
                    None => {
                        warn!("Next task '{}' not found, ending run", next_ref);
                        None
                    }
                },
                None if position + 1 < ctx.len() => Some(position + 1),
                None => None,
            };
        }

        let output = definition
            .output_parameters
            .as_ref()
            .map(|params| PlaceholderResolver::new(&ctx).resolve_map(params))
            .unwrap_or_default();

        info!(
            "Workflow '{}' finished after {} task(s)",
            definition.name,
            visited.len()
        );

        Ok(WorkflowRun {
            name: definition.name.clone(),
            tasks: ctx.into_tasks(),
            visited,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubstrateConfig;
    use crate::dsl::ResultStatus;
    use crate::engine::{
        ActivityExecutor, HumanInLoopSignal, InlineExecutor, LocalSubstrate, TaskExecutor,
    };
    use crate::error::Error;
    use crate::tasks::{ApprovalHandler, ConsoleProvider, HandlerRegistry};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn executors() -> ExecutorRegistry {
        let handlers = HandlerRegistry::new(Arc::new(ConsoleProvider::new()));
        let substrate = Arc::new(LocalSubstrate::new(handlers, &SubstrateConfig::default()));
        ExecutorRegistry::new().with_default(Arc::new(ActivityExecutor::new(substrate)))
    }

    fn workflow(value: Value) -> WorkflowDefinition {
        serde_json::from_value(value).unwrap()
    }

    fn set_task(reference: &str, value: Value) -> Value {
        json!({
            "taskReferenceName": reference,
            "type": "SET_VARIABLE",
            "input": {"variables": {"value": value}}
        })
    }

    async fn run(definition: &WorkflowDefinition) -> Result<WorkflowRun> {
        WorkflowOrchestrator::new(executors())
            .run(definition, "workflow-test")
            .await
    }

    #[tokio::test]
    async fn test_linear_tasks_visited_in_order_once() {
        let def = workflow(json!({
            "name": "linear",
            "tasks": [set_task("a", json!(1)), set_task("b", json!(2)), set_task("c", json!(3))]
        }));
        let run = run(&def).await.unwrap();

        assert_eq!(run.visited, vec!["a", "b", "c"]);
        assert!(run.tasks.iter().all(|t| t.status == TaskStatus::Completed));
    }

    #[tokio::test]
    async fn test_empty_workflow() {
        let def = workflow(json!({"name": "empty", "tasks": []}));
        let run = run(&def).await.unwrap();
        assert!(run.visited.is_empty());
    }

    #[tokio::test]
    async fn test_decision_routes_and_outputs_flow() {
        let def = workflow(json!({
            "name": "routing",
            "inputParameters": ["amount"],
            "inputValues": {"amount": 150},
            "outputParameters": {"path": "${large.output.value}", "decision": "${check.output.next_task}"},
            "tasks": [
                {
                    "taskReferenceName": "check",
                    "type": "DECISION",
                    "input": {
                        "param_value": "${inputParameters.amount}",
                        "decision_cases": {"> 100": ["large"], "<= 100": ["small"]}
                    }
                },
                set_task("small", json!("small")),
                set_task("large", json!("large-${inputParameters.amount}"))
            ]
        }));
        let run = run(&def).await.unwrap();

        assert_eq!(run.visited, vec!["check", "large"]);
        assert_eq!(run.task("small").unwrap().status, TaskStatus::Pending);
        assert_eq!(run.output["path"], json!("large-150"));
        assert_eq!(run.output["decision"], json!(r#"["large"]"#));
    }

    #[tokio::test]
    async fn test_static_next_and_missing_target() {
        let mut first = set_task("a", json!(1));
        first["next_task_ref_name"] = json!("c");
        let mut third = set_task("c", json!(3));
        third["next_task_ref_name"] = json!("nowhere");
        let def = workflow(json!({
            "name": "jumps",
            "tasks": [first, set_task("b", json!(2)), third]
        }));
        let run = run(&def).await.unwrap();

        assert_eq!(run.visited, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_no_reentry_of_executed_task() {
        let mut second = set_task("b", json!(2));
        second["next_task_ref_name"] = json!("a");
        let def = workflow(json!({
            "name": "loop",
            "tasks": [set_task("a", json!(1)), second]
        }));
        let run = run(&def).await.unwrap();

        assert_eq!(run.visited, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_task_does_not_halt() {
        let def = workflow(json!({
            "name": "keeps-going",
            "tasks": [
                {
                    "taskReferenceName": "check",
                    "type": "DECISION",
                    "input": {"param_value": "${inputParameters.missing}", "default_case": ["x"]}
                },
                set_task("after", json!(1))
            ]
        }));
        let run = run(&def).await.unwrap();

        assert_eq!(run.visited, vec!["check", "after"]);
        let check = run.task("check").unwrap();
        assert_eq!(check.status, TaskStatus::Failed);
        assert_eq!(
            check.output.as_ref().unwrap().output["error"],
            "Missing inputParameter"
        );
        assert_eq!(run.failed_tasks(), vec!["check"]);
    }

    #[tokio::test]
    async fn test_grammar_error_aborts_run() {
        let def = workflow(json!({
            "name": "bad",
            "tasks": [{
                "taskReferenceName": "check",
                "type": "DECISION",
                "input": {"param_value": 1, "decision_cases": {"~ 1": ["x"]}}
            }]
        }));
        assert!(matches!(run(&def).await, Err(Error::ExpressionGrammar(_))));
    }

    #[tokio::test]
    async fn test_unregistered_kind_without_default() {
        let def = workflow(json!({
            "name": "nothing",
            "tasks": [set_task("a", json!(1))]
        }));
        let err = WorkflowOrchestrator::new(ExecutorRegistry::new())
            .run(&def, "workflow-test")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoHandlerForType(_)));
    }

    #[tokio::test]
    async fn test_unknown_type_through_substrate() {
        let def = workflow(json!({
            "name": "custom",
            "tasks": [{"taskReferenceName": "fax", "type": "FAX"}]
        }));
        let err = run(&def).await.unwrap_err();
        assert!(matches!(err, Error::NoHandlerForType(ref a) if a == "FAX_TASK"));
    }

    #[tokio::test]
    async fn test_approval_suspends_until_signal() {
        let signal = HumanInLoopSignal::new();
        let approval: Arc<dyn TaskExecutor> = Arc::new(InlineExecutor::new(Arc::new(
            ApprovalHandler::new(signal.clone()),
        )));
        let orchestrator =
            WorkflowOrchestrator::new(executors().with(TaskKind::Approval, approval));
        let def = workflow(json!({
            "name": "approve",
            "tasks": [
                {"taskReferenceName": "manager", "type": "APPROVAL", "input": {"message": "ok?"}},
                {
                    "taskReferenceName": "route",
                    "type": "DECISION",
                    "input": {
                        "param_value": "${manager.output.approval_result}",
                        "decision_cases": {"APPROVED": ["ship"]},
                        "default_case": ["cancel"]
                    }
                },
                set_task("cancel", json!("cancelled")),
                set_task("ship", json!("shipped"))
            ]
        }));

        let handle = tokio::spawn(async move { orchestrator.run(&def, "workflow-1").await });
        while !signal.is_waiting() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!handle.is_finished());
        signal.deliver("APPROVED");

        let run = handle.await.unwrap().unwrap();
        let manager = run.task("manager").unwrap().output.clone().unwrap();
        assert_eq!(manager.status, ResultStatus::Completed);
        assert_eq!(
            Value::Object(manager.output),
            json!({"approval_result": "APPROVED"})
        );
        assert_eq!(run.visited, vec!["manager", "route", "ship"]);
    }

    #[tokio::test]
    async fn test_document_status_does_not_skip_tasks() {
        let mut first = set_task("a", json!(1));
        first["status"] = json!("COMPLETED");
        let def = workflow(json!({"name": "preset", "tasks": [first, set_task("b", json!(2))]}));

        let run = run(&def).await.unwrap();
        assert_eq!(run.visited, vec!["a", "b"]);
        assert_eq!(run.task("a").unwrap().output.as_ref().unwrap().output["value"], 1);
    }

    #[tokio::test]
    async fn test_document_output_is_not_visible_before_task_runs() {
        let mut later = set_task("later", json!("fresh"));
        later["output"] = json!({
            "task_ref_name": "later",
            "status": "COMPLETED",
            "output": {"value": "stale"}
        });
        let def = workflow(json!({
            "name": "preset-output",
            "tasks": [set_task("first", json!("${later.output.value}")), later]
        }));

        let run = run(&def).await.unwrap();
        assert_eq!(run.visited, vec!["first", "later"]);
        assert_eq!(
            run.task("first").unwrap().output.as_ref().unwrap().output["value"],
            "<UNKNOWN:later.output.value>"
        );
        assert_eq!(
            run.task("later").unwrap().output.as_ref().unwrap().output["value"],
            "fresh"
        );
    }
}
