//! Workflow document model, parsing and validation.

mod overrides;
mod parser;
mod types;
mod validator;

pub use overrides::{coerce_value, parse_override, parse_overrides};
pub use parser::{parse_workflow, parse_workflow_file, parse_workflow_value, DslParser};
pub use types::*;
pub use validator::{lint_workflow, validate_workflow};
