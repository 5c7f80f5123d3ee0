//! dslflow - declarative DSL workflow engine
//!
//! A workflow is a JSON (or YAML) document listing tasks in order. Tasks run
//! one at a time; each may pick its successor (decisions), reference earlier
//! outputs through `${...}` placeholders, or park until a person approves.
//!
//! ## Key Features
//!
//! - **Typed handlers**: HTTP, SET_VARIABLE, DECISION, SEND_MAIL and APPROVAL
//!   tasks, each validating its own input
//! - **Placeholders**: `${inputParameters.x}` and `${task.output.key}` resolved
//!   just before a task runs
//! - **Decisions**: small comparison expressions (`> 100`, `10 AND >5`) choose
//!   the next task
//! - **Human in the loop**: approval tasks suspend until a decision arrives
//!   from the CLI, the HTTP API or the approval form
//!
//! ## Example
//!
//! ```json
//! {
//!   "name": "order-approval",
//!   "inputParameters": ["amount"],
//!   "inputValues": {"amount": 1500},
//!   "tasks": [
//!     {
//!       "taskReferenceName": "check_amount",
//!       "type": "DECISION",
//!       "input": {
//!         "param_value": "${inputParameters.amount}",
//!         "decision_cases": {"> 1000": ["approve"]},
//!         "default_case": ["record"]
//!       }
//!     },
//!     {"taskReferenceName": "approve", "type": "APPROVAL", "next_task_ref_name": "record"},
//!     {
//!       "taskReferenceName": "record",
//!       "type": "SET_VARIABLE",
//!       "input": {"variables": {"recorded_at": "$NOW"}}
//!     }
//!   ]
//! }
//! ```

pub mod api;
pub mod config;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod shutdown;
pub mod tasks;

pub use error::{Error, Result};
