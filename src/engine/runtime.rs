//! Workflow instances.
//!
//! The runtime starts runs on the tokio executor, tracks their state and
//! routes approval decisions to the right instance.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info};

use super::executor::{ActivityExecutor, ExecutorRegistry, InlineExecutor};
use super::orchestrator::{WorkflowOrchestrator, WorkflowRun};
use super::signal::HumanInLoopSignal;
use super::substrate::Substrate;
use crate::config::RuntimeConfig;
use crate::dsl::WorkflowDefinition;
use crate::error::{Error, Result};
use crate::shutdown::ShutdownCoordinator;
use crate::tasks::{ApprovalHandler, TaskKind};

#[derive(Debug, Clone)]
enum Phase {
    Running,
    Completed(WorkflowRun),
    Failed { code: &'static str, message: String },
}

/// Externally visible state of an instance.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InstanceState {
    Running,
    AwaitingApproval,
    Completed { run: WorkflowRun },
    Failed { code: String, message: String },
}

impl InstanceState {
    pub fn is_finished(&self) -> bool {
        matches!(self, InstanceState::Completed { .. } | InstanceState::Failed { .. })
    }
}

/// Point-in-time view of an instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSnapshot {
    pub instance_id: String,
    pub workflow_name: String,
    #[serde(flatten)]
    pub state: InstanceState,
}

/// One started run and its approval slot.
#[derive(Debug)]
pub struct WorkflowInstance {
    id: String,
    workflow_name: String,
    signal: HumanInLoopSignal,
    phase: watch::Sender<Phase>,
    finished_at: OnceLock<Instant>,
}

impl WorkflowInstance {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn signal(&self) -> &HumanInLoopSignal {
        &self.signal
    }

    pub fn state(&self) -> InstanceState {
        match &*self.phase.borrow() {
            Phase::Running if self.signal.is_waiting() => InstanceState::AwaitingApproval,
            Phase::Running => InstanceState::Running,
            Phase::Completed(run) => InstanceState::Completed { run: run.clone() },
            Phase::Failed { code, message } => InstanceState::Failed {
                code: code.to_string(),
                message: message.clone(),
            },
        }
    }

    /// Wait until the run needs a decision or has finished.
    ///
    /// Returns `AwaitingApproval` only while no decision is pending, so each
    /// parked approval is reported once.
    pub async fn wait_for_decision_or_finish(&self) -> InstanceState {
        let mut phase = self.phase.subscribe();
        let mut waiting = self.signal.subscribe_waiting();
        loop {
            let state = self.state();
            let needs_decision = matches!(state, InstanceState::AwaitingApproval)
                && self.signal.pending_decision().is_none();
            if state.is_finished() || needs_decision {
                return state;
            }
            // Both senders live as long as `self`, so neither side can close
            tokio::select! {
                _ = phase.changed() => {}
                _ = waiting.changed() => {}
            }
        }
    }

    /// Wait until the run finishes.
    pub async fn wait(&self) -> Result<WorkflowRun> {
        let mut rx = self.phase.subscribe();
        let phase = rx
            .wait_for(|p| !matches!(p, Phase::Running))
            .await
            .map_err(|_| Error::Execution(format!("Instance {} vanished", self.id)))?
            .clone();

        match phase {
            Phase::Completed(run) => Ok(run),
            Phase::Failed { message, .. } => Err(Error::Execution(message)),
            Phase::Running => Err(Error::Execution(format!(
                "Instance {} is still running",
                self.id
            ))),
        }
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            instance_id: self.id.clone(),
            workflow_name: self.workflow_name.clone(),
            state: self.state(),
        }
    }
}

/// Starts and tracks workflow instances.
#[derive(Clone)]
pub struct WorkflowRuntime {
    substrate: Arc<dyn Substrate>,
    instances: Arc<RwLock<HashMap<String, Arc<WorkflowInstance>>>>,
    shutdown: Option<ShutdownCoordinator>,
    retention: Retention,
}

/// How long finished instances stay queryable.
#[derive(Debug, Clone, Copy)]
struct Retention {
    max_finished: usize,
    ttl: Duration,
}

impl From<&RuntimeConfig> for Retention {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            max_finished: config.max_finished_instances,
            ttl: Duration::from_secs(config.finished_instance_ttl_seconds),
        }
    }
}

impl WorkflowRuntime {
    pub fn new(substrate: Arc<dyn Substrate>) -> Self {
        Self {
            substrate,
            instances: Arc::new(RwLock::new(HashMap::new())),
            shutdown: None,
            retention: Retention::from(&RuntimeConfig::default()),
        }
    }

    /// Bound how many finished instances are kept, and for how long.
    pub fn with_retention(mut self, config: &RuntimeConfig) -> Self {
        self.retention = Retention::from(config);
        self
    }

    /// Refuse new instances once shutdown has been requested.
    pub fn with_shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Start a run in the background and return its instance id.
    pub async fn start(&self, definition: WorkflowDefinition) -> Result<String> {
        if self.is_shutting_down() {
            return Err(Error::Execution(
                "Shutdown in progress, not starting new workflows".into(),
            ));
        }

        let id = format!("workflow-{}", uuid::Uuid::new_v4());
        let signal = HumanInLoopSignal::new();
        let (phase, _) = watch::channel(Phase::Running);
        let instance = Arc::new(WorkflowInstance {
            id: id.clone(),
            workflow_name: definition.name.clone(),
            signal: signal.clone(),
            phase,
            finished_at: OnceLock::new(),
        });

        let executors = ExecutorRegistry::new()
            .with_default(Arc::new(ActivityExecutor::new(self.substrate.clone())))
            .with(
                TaskKind::Approval,
                Arc::new(InlineExecutor::new(Arc::new(ApprovalHandler::new(signal)))),
            );
        let orchestrator = WorkflowOrchestrator::new(executors);

        self.prune_finished().await;
        self.instances
            .write()
            .await
            .insert(id.clone(), instance.clone());
        info!("Started instance {} of workflow '{}'", id, definition.name);

        let runtime = self.clone();
        tokio::spawn(async move {
            let phase = match orchestrator.run(&definition, &instance.id).await {
                Ok(run) => Phase::Completed(run),
                Err(e) => {
                    error!("Instance {} failed: {}", instance.id, e);
                    Phase::Failed {
                        code: e.code(),
                        message: e.to_string(),
                    }
                }
            };
            let _ = instance.finished_at.set(Instant::now());
            runtime.prune_finished().await;
            instance.phase.send_replace(phase);
        });

        Ok(id)
    }

    /// Drop finished instances past the TTL, then the oldest beyond the cap.
    async fn prune_finished(&self) {
        let now = Instant::now();
        let mut instances = self.instances.write().await;
        let before = instances.len();

        instances.retain(|_, instance| match instance.finished_at.get() {
            Some(finished) => now.duration_since(*finished) < self.retention.ttl,
            None => true,
        });

        let mut finished: Vec<(Instant, String)> = instances
            .iter()
            .filter_map(|(id, instance)| instance.finished_at.get().map(|t| (*t, id.clone())))
            .collect();
        if finished.len() > self.retention.max_finished {
            finished.sort();
            let excess = finished.len() - self.retention.max_finished;
            for (_, id) in finished.into_iter().take(excess) {
                instances.remove(&id);
            }
        }

        let evicted = before - instances.len();
        if evicted > 0 {
            debug!("Evicted {} finished instance(s)", evicted);
        }
    }

    /// Look up an instance.
    pub async fn instance(&self, instance_id: &str) -> Result<Arc<WorkflowInstance>> {
        self.instances
            .read()
            .await
            .get(instance_id)
            .cloned()
            .ok_or_else(|| Error::InstanceNotFound(instance_id.to_string()))
    }

    pub async fn status(&self, instance_id: &str) -> Result<InstanceSnapshot> {
        Ok(self.instance(instance_id).await?.snapshot())
    }

    /// Snapshots of all known instances, sorted by id.
    pub async fn list(&self) -> Vec<InstanceSnapshot> {
        let mut snapshots: Vec<_> = self
            .instances
            .read()
            .await
            .values()
            .map(|i| i.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        snapshots
    }

    /// Deliver an approval decision to a running instance.
    pub async fn deliver_signal(&self, instance_id: &str, decision: &str) -> Result<()> {
        let decision = decision.trim();
        if decision.is_empty() {
            return Err(Error::Validation("Decision must not be empty".into()));
        }

        let instance = self.instance(instance_id).await?;
        if instance.state().is_finished() {
            return Err(Error::Validation(format!(
                "Instance {} has already finished",
                instance_id
            )));
        }

        info!("Delivering decision '{}' to instance {}", decision, instance_id);
        instance.signal.deliver(decision);
        Ok(())
    }

    /// Wait until an instance finishes.
    pub async fn wait(&self, instance_id: &str) -> Result<WorkflowRun> {
        self.instance(instance_id).await?.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubstrateConfig;
    use crate::dsl::TaskStatus;
    use crate::engine::LocalSubstrate;
    use crate::tasks::{ConsoleProvider, HandlerRegistry};
    use serde_json::json;
    use std::time::Duration;

    fn runtime() -> WorkflowRuntime {
        let handlers = HandlerRegistry::new(Arc::new(ConsoleProvider::new()));
        WorkflowRuntime::new(Arc::new(LocalSubstrate::new(
            handlers,
            &SubstrateConfig::default(),
        )))
    }

    fn approval_flow() -> WorkflowDefinition {
        serde_json::from_value(json!({
            "name": "approval-flow",
            "tasks": [
                {"taskReferenceName": "manager", "type": "APPROVAL"},
                {
                    "taskReferenceName": "record",
                    "type": "SET_VARIABLE",
                    "input": {"variables": {"decision": "${manager.output.approval_result}"}}
                }
            ]
        }))
        .unwrap()
    }

    async fn wait_for_approval(runtime: &WorkflowRuntime, id: &str) {
        loop {
            let snapshot = runtime.status(id).await.unwrap();
            if matches!(snapshot.state, InstanceState::AwaitingApproval) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_instance_runs_to_completion() {
        let runtime = runtime();
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "name": "simple",
            "tasks": [{"taskReferenceName": "a", "type": "SET_VARIABLE", "input": {"variables": {"x": 1}}}]
        }))
        .unwrap();

        let id = runtime.start(def).await.unwrap();
        assert!(id.starts_with("workflow-"));

        let run = runtime.wait(&id).await.unwrap();
        assert_eq!(run.visited, vec!["a"]);
        assert!(runtime.status(&id).await.unwrap().state.is_finished());
    }

    #[tokio::test]
    async fn test_deliver_signal_resumes_instance() {
        let runtime = runtime();
        let id = runtime.start(approval_flow()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), wait_for_approval(&runtime, &id))
            .await
            .unwrap();
        runtime.deliver_signal(&id, " APPROVED ").await.unwrap();

        let run = runtime.wait(&id).await.unwrap();
        let record = run.task("record").unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(
            record.output.as_ref().unwrap().output["decision"],
            "APPROVED"
        );
    }

    #[tokio::test]
    async fn test_signals_are_instance_scoped() {
        let runtime = runtime();
        let first = runtime.start(approval_flow()).await.unwrap();
        let second = runtime.start(approval_flow()).await.unwrap();

        wait_for_approval(&runtime, &first).await;
        wait_for_approval(&runtime, &second).await;
        runtime.deliver_signal(&second, "REJECTED").await.unwrap();

        let run = runtime.wait(&second).await.unwrap();
        assert_eq!(
            run.task("manager").unwrap().output.as_ref().unwrap().output["approval_result"],
            "REJECTED"
        );
        assert!(matches!(
            runtime.status(&first).await.unwrap().state,
            InstanceState::AwaitingApproval
        ));
        assert_eq!(runtime.list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_deliver_signal_errors() {
        let runtime = runtime();
        let err = runtime
            .deliver_signal("workflow-missing", "APPROVED")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InstanceNotFound(_)));

        let id = runtime.start(approval_flow()).await.unwrap();
        let err = runtime.deliver_signal(&id, "   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_failed_instance() {
        let runtime = runtime();
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "name": "broken",
            "tasks": [{"taskReferenceName": "fax", "type": "FAX"}]
        }))
        .unwrap();

        let id = runtime.start(def).await.unwrap();
        assert!(runtime.wait(&id).await.is_err());

        match runtime.status(&id).await.unwrap().state {
            InstanceState::Failed { code, .. } => assert_eq!(code, "NO_HANDLER_FOR_TYPE"),
            other => panic!("unexpected state {:?}", other),
        }
        assert!(runtime.deliver_signal(&id, "APPROVED").await.is_err());
    }

    #[tokio::test]
    async fn test_refuses_new_instances_during_shutdown() {
        let shutdown = ShutdownCoordinator::new();
        let runtime = runtime().with_shutdown(shutdown.clone());
        shutdown.request_shutdown();

        assert!(runtime.start(approval_flow()).await.is_err());
    }

    #[tokio::test]
    async fn test_finished_instances_capped() {
        let runtime = runtime().with_retention(&RuntimeConfig {
            max_finished_instances: 1,
            finished_instance_ttl_seconds: 3600,
        });
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "name": "short",
            "tasks": [{"taskReferenceName": "a", "type": "SET_VARIABLE", "input": {"variables": {"x": 1}}}]
        }))
        .unwrap();

        let first = runtime.start(def.clone()).await.unwrap();
        runtime.wait(&first).await.unwrap();
        let second = runtime.start(def).await.unwrap();
        runtime.wait(&second).await.unwrap();

        let remaining: Vec<_> = runtime
            .list()
            .await
            .into_iter()
            .map(|s| s.instance_id)
            .collect();
        assert_eq!(remaining, vec![second]);
        assert!(matches!(
            runtime.status(&first).await,
            Err(Error::InstanceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_instances_evicted_but_running_kept() {
        let runtime = runtime().with_retention(&RuntimeConfig {
            max_finished_instances: 100,
            finished_instance_ttl_seconds: 1,
        });
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "name": "short",
            "tasks": [{"taskReferenceName": "a", "type": "SET_VARIABLE", "input": {"variables": {"x": 1}}}]
        }))
        .unwrap();

        let done = runtime.start(def).await.unwrap();
        runtime.wait(&done).await.unwrap();
        let parked = runtime.start(approval_flow()).await.unwrap();
        wait_for_approval(&runtime, &parked).await;

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let fresh = runtime.start(approval_flow()).await.unwrap();

        assert!(runtime.status(&done).await.is_err());
        assert!(runtime.status(&parked).await.is_ok());
        assert!(runtime.status(&fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_decision_or_finish() {
        let runtime = runtime();
        let id = runtime.start(approval_flow()).await.unwrap();
        let instance = runtime.instance(&id).await.unwrap();

        let state = tokio::time::timeout(Duration::from_secs(2), instance.wait_for_decision_or_finish())
            .await
            .unwrap();
        assert!(matches!(state, InstanceState::AwaitingApproval));

        runtime.deliver_signal(&id, "APPROVED").await.unwrap();
        let state = tokio::time::timeout(Duration::from_secs(2), instance.wait_for_decision_or_finish())
            .await
            .unwrap();
        assert!(state.is_finished());
    }
}
