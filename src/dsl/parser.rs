//! Workflow document parser.
//!
//! Documents are JSON. YAML is accepted too since it is easier to write by
//! hand; both go through the same typed model and validation.

use std::path::Path;

use serde_json::Value;

use super::types::{TaskDefinition, WorkflowDefinition};
use super::validator::validate_workflow;
use crate::error::{Error, Result};

/// Parse and validate a workflow from a JSON or YAML string.
pub fn parse_workflow(source: &str) -> Result<WorkflowDefinition> {
    let trimmed = source.trim_start();
    if trimmed.is_empty() {
        return Err(Error::SchemaValidation(
            "Empty workflow definition".to_string(),
        ));
    }

    let workflow: WorkflowDefinition = if trimmed.starts_with('{') {
        serde_json::from_str(source).map_err(|e| schema_error(&e.to_string(), "JSON"))?
    } else {
        serde_yaml::from_str(source).map_err(|e| schema_error(&e.to_string(), "YAML"))?
    };

    validate_workflow(&workflow)?;
    Ok(workflow)
}

/// Parse and validate a workflow from an already decoded JSON value.
pub fn parse_workflow_value(value: Value) -> Result<WorkflowDefinition> {
    let workflow: WorkflowDefinition =
        serde_json::from_value(value).map_err(|e| schema_error(&e.to_string(), "JSON"))?;
    validate_workflow(&workflow)?;
    Ok(workflow)
}

/// Parse a workflow from a file path.
pub fn parse_workflow_file(path: &Path) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow(&content)
}

fn schema_error(message: &str, format: &str) -> Error {
    if let Some(field) = extract_between(message, "missing field `") {
        Error::SchemaValidation(format!("Missing required field: {}", field))
    } else if let Some(variant) = extract_between(message, "unknown variant `") {
        Error::SchemaValidation(format!("Invalid status value: {}", variant))
    } else {
        Error::SchemaValidation(format!("Invalid {}: {}", format, message))
    }
}

fn extract_between<'a>(message: &'a str, marker: &str) -> Option<&'a str> {
    let start = message.find(marker)? + marker.len();
    let rest = &message[start..];
    let end = rest.find('`')?;
    Some(&rest[..end])
}

/// Validated workflow document.
#[derive(Debug, Clone)]
pub struct DslParser {
    definition: WorkflowDefinition,
}

impl DslParser {
    /// Parse and validate raw document text.
    pub fn parse(source: &str) -> Result<Self> {
        Ok(Self {
            definition: parse_workflow(source)?,
        })
    }

    /// Validate an already decoded document.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(Self {
            definition: parse_workflow_value(value)?,
        })
    }

    /// Tasks in declaration order.
    pub fn tasks(&self) -> &[TaskDefinition] {
        &self.definition.tasks
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }
}
