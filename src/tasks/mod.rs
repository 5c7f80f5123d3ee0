//! Task handlers.
//!
//! Each task type validates its resolved input into a typed value and then
//! executes it, reporting runtime problems as a FAILED result rather than an
//! error.

mod approval;
mod decision;
pub mod email_provider;
pub mod expression;
mod http;
mod registry;
mod send_mail;
mod set_variable;
mod types;

pub use approval::{ApprovalHandler, ApprovalInput};
pub use decision::{DecisionCases, DecisionHandler, DecisionInput};
pub use email_provider::{
    build_email_provider, ConsoleProvider, DeliveryReceipt, EmailMessage, EmailProvider,
    SendGridProvider,
};
pub use http::{HttpHandler, HttpInput};
pub use registry::HandlerRegistry;
pub use send_mail::{SendMailHandler, SendMailInput};
pub use set_variable::{SetVariableHandler, SetVariableInput};
pub use types::{DynHandler, TaskHandler, TaskKind};
