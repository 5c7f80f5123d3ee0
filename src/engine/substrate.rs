//! Activity substrate.
//!
//! Tasks without an in-workflow executor are dispatched as activities named
//! `<TYPE>_TASK`. [`LocalSubstrate`] runs them in-process against the handler
//! registry, with a per-attempt timeout and retry of timed-out attempts.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SubstrateConfig;
use crate::error::{Error, Result};
use crate::tasks::{HandlerRegistry, TaskKind};

/// Where activities run.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Run an activity and return the serialized `TaskResult`.
    async fn dispatch(&self, activity: &str, payload: Value) -> Result<Value>;
}

/// In-process substrate backed by a [`HandlerRegistry`].
pub struct LocalSubstrate {
    handlers: HandlerRegistry,
    timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
}

impl LocalSubstrate {
    pub fn new(handlers: HandlerRegistry, config: &SubstrateConfig) -> Self {
        Self {
            handlers,
            timeout: Duration::from_secs(config.activity_timeout_seconds.max(1)),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Override the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Task kind behind an activity name (`HTTP_TASK` -> `Http`).
pub fn activity_kind(activity: &str) -> Option<TaskKind> {
    activity
        .strip_suffix("_TASK")
        .filter(|tag| !tag.is_empty())
        .map(TaskKind::parse)
}

#[async_trait]
impl Substrate for LocalSubstrate {
    async fn dispatch(&self, activity: &str, payload: Value) -> Result<Value> {
        let handler = activity_kind(activity)
            .and_then(|kind| self.handlers.get(&kind))
            .ok_or_else(|| Error::NoHandlerForType(activity.to_string()))?;

        let mut attempt = 1;
        loop {
            debug!(activity, attempt, "Dispatching activity");
            match tokio::time::timeout(self.timeout, handler.run(&payload)).await {
                Ok(result) => return Ok(serde_json::to_value(result?)?),
                Err(_) if attempt < self.max_attempts => {
                    warn!(
                        activity,
                        attempt,
                        "Activity timed out after {:?}, retrying",
                        self.timeout
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(_) => {
                    return Err(Error::Execution(format!(
                        "Activity {} timed out after {:?} ({} attempt(s))",
                        activity, self.timeout, attempt
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::TaskResult;
    use crate::tasks::{ConsoleProvider, TaskHandler};
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct SlowHandler {
        calls: Arc<AtomicU32>,
        fast_after: u32,
    }

    #[async_trait]
    impl TaskHandler for SlowHandler {
        type Input = String;

        fn kind(&self) -> TaskKind {
            TaskKind::Custom("SLOW".into())
        }

        fn validate(&self, raw: &Value) -> Result<String> {
            raw.get("task_ref_name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::Validation("missing task_ref_name".into()))
        }

        async fn execute(&self, task_ref_name: String) -> TaskResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fast_after {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            TaskResult::completed(task_ref_name, Map::new())
        }
    }

    fn substrate(fast_after: u32, max_attempts: u32) -> (LocalSubstrate, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let mut handlers = HandlerRegistry::new(Arc::new(ConsoleProvider::new()));
        handlers.register(Arc::new(SlowHandler {
            calls: calls.clone(),
            fast_after,
        }));
        let config = SubstrateConfig {
            activity_timeout_seconds: 1,
            max_attempts,
            retry_delay_ms: 0,
        };
        let substrate =
            LocalSubstrate::new(handlers, &config).with_timeout(Duration::from_millis(50));
        (substrate, calls)
    }

    #[test]
    fn test_activity_kind() {
        assert_eq!(activity_kind("HTTP_TASK"), Some(TaskKind::Http));
        assert_eq!(
            activity_kind("SHIP_PARCEL_TASK"),
            Some(TaskKind::Custom("SHIP_PARCEL".into()))
        );
        assert_eq!(activity_kind("HTTP"), None);
        assert_eq!(activity_kind("_TASK"), None);
    }

    #[tokio::test]
    async fn test_dispatch_runs_handler() {
        let (substrate, _) = substrate(0, 1);
        let result = substrate
            .dispatch(
                "SET_VARIABLE_TASK",
                json!({"task_ref_name": "vars", "variables": {"x": 1}}),
            )
            .await
            .unwrap();
        assert_eq!(result["status"], "COMPLETED");
        assert_eq!(result["output"]["x"], 1);
    }

    #[tokio::test]
    async fn test_unknown_activity() {
        let (substrate, _) = substrate(0, 1);
        let err = substrate.dispatch("FAX_TASK", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::NoHandlerForType(ref a) if a == "FAX_TASK"));
    }

    #[tokio::test]
    async fn test_validation_error_is_not_retried() {
        let (substrate, calls) = substrate(0, 3);
        let err = substrate.dispatch("SLOW_TASK", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_retried_until_success() {
        let (substrate, calls) = substrate(1, 2);
        let result = substrate
            .dispatch("SLOW_TASK", json!({"task_ref_name": "slow"}))
            .await
            .unwrap();
        assert_eq!(result["status"], "COMPLETED");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_exhausts_attempts() {
        let (substrate, calls) = substrate(10, 2);
        let err = substrate
            .dispatch("SLOW_TASK", json!({"task_ref_name": "slow"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
