//! Execution engine for workflows.

mod context;
mod executor;
mod next_task;
mod orchestrator;
mod resolver;
mod runtime;
mod signal;
mod substrate;

pub use context::ExecutionContext;
pub use executor::{ActivityExecutor, ExecutorRegistry, InlineExecutor, TaskExecutor};
pub use next_task::next_task_ref;
pub use orchestrator::{WorkflowOrchestrator, WorkflowRun};
pub use resolver::PlaceholderResolver;
pub use runtime::{InstanceSnapshot, InstanceState, WorkflowInstance, WorkflowRuntime};
pub use signal::HumanInLoopSignal;
pub use substrate::{activity_kind, LocalSubstrate, Substrate};
