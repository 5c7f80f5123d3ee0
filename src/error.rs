//! Error types for dslflow.
//!
//! Every variant maps to a stable code so API clients and scripts can branch
//! on the failure class without parsing messages.

use thiserror::Error;

/// Result type alias for dslflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// dslflow error types.
///
/// Validation-class errors (`SchemaValidation`, `ExpressionGrammar`,
/// `Validation`, `NoHandlerForType`) abort a run. Failures inside a handler
/// never show up here: handlers fold them into a FAILED `TaskResult`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    #[error("Expression grammar error: {0}")]
    ExpressionGrammar(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No handler for task type: {0}")]
    NoHandlerForType(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Workflow instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            Error::SchemaValidation(_) => "SCHEMA_VALIDATION_ERROR",
            Error::ExpressionGrammar(_) => "EXPRESSION_GRAMMAR_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NoHandlerForType(_) => "NO_HANDLER_FOR_TYPE",
            Error::Execution(_) => "EXECUTION_ERROR",
            Error::InstanceNotFound(_) => "INSTANCE_NOT_FOUND",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Get a sanitized error message safe for external consumers.
    ///
    /// Document and expression problems are the caller's own input, so their
    /// messages are returned as-is. Transport and IO details are hidden.
    pub fn external_message(&self) -> String {
        match self {
            Error::SchemaValidation(_)
            | Error::ExpressionGrammar(_)
            | Error::Validation(_)
            | Error::NoHandlerForType(_)
            | Error::InstanceNotFound(_) => self.to_string(),

            Error::Execution(_) => "Workflow execution failed".to_string(),
            Error::Config(_) => "Server configuration error".to_string(),
            Error::Io(_) => "An I/O error occurred".to_string(),

            Error::Http(e) => {
                if let Some(status) = e.status() {
                    format!("HTTP request failed with status {}", status.as_u16())
                } else if e.is_timeout() {
                    "HTTP request timed out".to_string()
                } else {
                    "HTTP request failed".to_string()
                }
            }

            Error::Json(_) => "Invalid JSON format".to_string(),
            Error::Yaml(_) => "Invalid YAML format".to_string(),
        }
    }

    /// HTTP status code that best describes this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::SchemaValidation(_)
            | Error::ExpressionGrammar(_)
            | Error::Validation(_)
            | Error::NoHandlerForType(_)
            | Error::Json(_)
            | Error::Yaml(_) => 400,
            Error::InstanceNotFound(_) => 404,
            Error::Http(_) => 502,
            Error::Execution(_) | Error::Config(_) | Error::Io(_) => 500,
        }
    }

    /// Convert to a JSON response with the sanitized message.
    pub fn to_external_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.external_message(),
            }
        })
    }

    /// Convert to a JSON response including full error details.
    ///
    /// **Warning**: only for local output such as the CLI.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}
