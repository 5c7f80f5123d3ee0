//! Command-line input overrides.
//!
//! `dslflow run flow.json amount=250 customer=acme` merges the pairs into the
//! document's `inputValues`. Integers and floats are recognised, everything
//! else stays a string.

use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};

/// Split a `key=value` argument.
pub fn parse_override(arg: &str) -> Result<(String, String)> {
    let pos = arg.find('=').ok_or_else(|| {
        Error::Validation(format!(
            "Invalid override '{}'. Expected key=value",
            arg
        ))
    })?;
    let key = arg[..pos].trim();
    if key.is_empty() {
        return Err(Error::Validation(format!(
            "Invalid override '{}'. Key cannot be empty",
            arg
        )));
    }
    Ok((key.to_string(), arg[pos + 1..].to_string()))
}

/// Coerce a raw override value.
///
/// All-digit values become integers and anything `f64` accepts becomes a
/// float. Non-finite floats and everything else stay strings.
pub fn coerce_value(raw: &str) -> Value {
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<u64>() {
            return Value::Number(n.into());
        }
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

/// Parse a list of `key=value` arguments into an override map.
///
/// Later pairs win over earlier ones with the same key.
pub fn parse_overrides<S: AsRef<str>>(args: &[S]) -> Result<Map<String, Value>> {
    let mut overrides = Map::new();
    for arg in args {
        let (key, raw) = parse_override(arg.as_ref())?;
        overrides.insert(key, coerce_value(&raw));
    }
    Ok(overrides)
}
