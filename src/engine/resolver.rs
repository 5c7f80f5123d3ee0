//! `${...}` placeholder resolution.
//!
//! Paths starting with `inputParameters` read workflow inputs, anything else
//! names a task and reads its committed result (`task_ref_name`, `status`,
//! `output`, `reason`). Resolution never fails: unresolvable paths become
//! `<UNKNOWN:path>` (task unknown or not run yet) or `<MISSING:path>` (key
//! absent).

use std::borrow::Cow;
use std::sync::OnceLock;

use regex_lite::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::warn;

use super::context::ExecutionContext;

const INPUT_PARAMETERS: &str = "inputParameters";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"))
}

/// Resolves placeholders against an execution context.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderResolver<'a> {
    ctx: &'a ExecutionContext,
}

impl<'a> PlaceholderResolver<'a> {
    pub fn new(ctx: &'a ExecutionContext) -> Self {
        Self { ctx }
    }

    /// Resolve every string inside `value`.
    pub fn resolve(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => match self.resolve_str(s) {
                Cow::Borrowed(_) => value.clone(),
                Cow::Owned(resolved) => Value::String(resolved),
            },
            Value::Array(items) => Value::Array(items.iter().map(|v| self.resolve(v)).collect()),
            Value::Object(map) => Value::Object(self.resolve_map(map)),
            other => other.clone(),
        }
    }

    pub fn resolve_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.resolve(v)))
            .collect()
    }

    /// Replace placeholders in one string; borrowed when there are none.
    pub fn resolve_str<'s>(&self, text: &'s str) -> Cow<'s, str> {
        if !text.contains("${") {
            return Cow::Borrowed(text);
        }
        placeholder_regex().replace_all(text, |caps: &Captures| {
            let expr = caps[1].trim();
            render(self.resolve_path(expr).unwrap_or_else(|sentinel| {
                warn!("Unresolved placeholder: {}", sentinel);
                Value::String(sentinel)
            }))
        })
    }

    /// Look up a placeholder path. `Err` carries the sentinel text.
    pub fn resolve_path(&self, expr: &str) -> std::result::Result<Value, String> {
        let mut segments = expr.split('.');
        let head = segments.next().unwrap_or_default();

        let root = if head == INPUT_PARAMETERS {
            match segments.next() {
                // Undeclared parameters resolve to null
                Some(name) => self
                    .ctx
                    .workflow_inputs()
                    .get(name)
                    .cloned()
                    .unwrap_or(Value::Null),
                None => Value::Object(self.ctx.workflow_inputs().clone()),
            }
        } else {
            let result = self
                .ctx
                .get(head)
                .and_then(|task| task.output.as_ref())
                .ok_or_else(|| format!("<UNKNOWN:{}>", expr))?;
            serde_json::to_value(result).map_err(|_| format!("<UNKNOWN:{}>", expr))?
        };

        let mut current = &root;
        for segment in segments {
            current = step(current, segment).ok_or_else(|| format!("<MISSING:{}>", expr))?;
        }
        Ok(current.clone())
    }
}

fn step<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Strings are inserted verbatim, everything else as compact JSON.
fn render(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
