//! Handler registry - maps task kinds to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::email_provider::EmailProvider;
use super::types::{DynHandler, TaskKind};
use super::{DecisionHandler, HttpHandler, SendMailHandler, SetVariableHandler};
use crate::dsl::TaskResult;
use crate::error::{Error, Result};

/// Registry of available task handlers.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskKind, Arc<dyn DynHandler>>,
}

impl HandlerRegistry {
    /// Create a registry with the built-in handlers.
    ///
    /// Approval is not included: it is bound to a workflow instance and
    /// registered by the runtime.
    pub fn new(email: Arc<dyn EmailProvider>) -> Self {
        let mut registry = Self::empty();

        registry.register(Arc::new(HttpHandler::new()));
        registry.register(Arc::new(SetVariableHandler::new()));
        registry.register(Arc::new(DecisionHandler::new()));
        registry.register(Arc::new(SendMailHandler::new(email)));

        registry
    }

    /// Create an empty registry (for testing).
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its kind, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn DynHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: &TaskKind) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn has(&self, kind: &TaskKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Validate and execute a payload with the handler for `kind`.
    pub async fn run(&self, kind: &TaskKind, payload: &Value) -> Result<TaskResult> {
        let handler = self
            .get(kind)
            .ok_or_else(|| Error::NoHandlerForType(kind.to_string()))?;
        handler.run(payload).await
    }

    /// List all registered kinds.
    pub fn list(&self) -> Vec<&TaskKind> {
        self.handlers.keys().collect()
    }

    /// Descriptions of all registered handlers, sorted by kind.
    pub fn descriptions(&self) -> Vec<(String, String)> {
        let mut descriptions: Vec<_> = self
            .handlers
            .iter()
            .map(|(kind, handler)| (kind.to_string(), handler.description().to_string()))
            .collect();
        descriptions.sort();
        descriptions
    }
}
