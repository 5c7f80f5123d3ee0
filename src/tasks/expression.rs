//! Decision case expressions.
//!
//! A case key is a chain of atoms joined by `AND`/`OR`:
//!
//! ```text
//! expr  := atom (("AND" | "OR") atom)*
//! atom  := ["NOT"] [op] literal
//! op    := "<=" | ">=" | "==" | "=" | "<" | ">"
//! ```
//!
//! Keywords are case-insensitive and must be separated by whitespace. The
//! operator may be glued to the literal (`>5`) or stand alone (`> 5`).
//! Chains are folded strictly left to right, so `a OR b AND c` means
//! `(a OR b) AND c`.

use std::cmp::Ordering;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// A decision operand after coercion.
#[derive(Debug, Clone)]
pub enum Operand {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Operand {
    /// Coerce a string: trimmed, then integer when it has no `.`, float when
    /// it does, text otherwise.
    pub fn coerce(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.contains('.') {
            if let Ok(f) = trimmed.parse::<f64>() {
                return Operand::Float(f);
            }
        } else if let Ok(i) = trimmed.parse::<i64>() {
            return Operand::Int(i);
        }
        Operand::Text(trimmed.to_string())
    }

    /// Coerce a JSON scalar. `null` has no operand.
    ///
    /// Numbers stay numeric, booleans become text. Arrays and objects are
    /// compared through their JSON text.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Operand::Int(i),
                None => Operand::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Value::String(s) => Some(Operand::coerce(s)),
            Value::Bool(b) => Some(Operand::Text(b.to_string())),
            other => Some(Operand::Text(other.to_string())),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Operand::Int(i) => Some(*i as f64),
            Operand::Float(f) => Some(*f),
            Operand::Text(_) => None,
        }
    }

    /// Ordering between two operands; `None` for number against text.
    fn compare(&self, other: &Operand) -> Option<Ordering> {
        match (self, other) {
            (Operand::Int(a), Operand::Int(b)) => Some(a.cmp(b)),
            (Operand::Text(a), Operand::Text(b)) => Some(a.cmp(b)),
            (Operand::Text(_), _) | (_, Operand::Text(_)) => None,
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

impl PartialEq for Operand {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Int(i) => write!(f, "{}", i),
            // `{:?}` keeps the fractional part: 150.0 rather than 150
            Operand::Float(x) => write!(f, "{:?}", x),
            Operand::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Le,
    Ge,
    Eq,
    Lt,
    Gt,
}

impl Comparison {
    // Longest operators first so `<=` is not read as `<`.
    const TOKENS: [(&'static str, Comparison); 6] = [
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("==", Comparison::Eq),
        ("=", Comparison::Eq),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];

    fn split_prefix(token: &str) -> Option<(Comparison, &str)> {
        Self::TOKENS
            .iter()
            .find(|(op, _)| token.starts_with(op))
            .map(|(op, cmp)| (*cmp, &token[op.len()..]))
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Le => ordering != Ordering::Greater,
            Comparison::Ge => ordering != Ordering::Less,
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Gt => ordering == Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connective {
    And,
    Or,
}

#[derive(Debug, Clone)]
struct Atom {
    negated: bool,
    comparison: Option<Comparison>,
    literal: String,
}

impl Atom {
    fn evaluate(&self, value: &Operand) -> bool {
        let expected = Operand::coerce(&self.literal);
        let matched = match self.comparison {
            None => value.to_string() == self.literal || *value == expected,
            Some(cmp) => value
                .compare(&expected)
                .map(|ordering| cmp.holds(ordering))
                .unwrap_or(false),
        };
        matched != self.negated
    }
}

/// A parsed case expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    first: Atom,
    rest: Vec<(Connective, Atom)>,
}

impl Expression {
    /// Parse a case key.
    pub fn parse(source: &str) -> Result<Self> {
        let mut tokens = source.split_whitespace();

        let first = parse_atom(source, &mut tokens)?;
        let mut rest = Vec::new();
        while let Some(token) = tokens.next() {
            let connective = match token.to_uppercase().as_str() {
                "AND" => Connective::And,
                "OR" => Connective::Or,
                _ => {
                    return Err(grammar_error(
                        source,
                        format!("expected AND or OR, found '{}'", token),
                    ))
                }
            };
            rest.push((connective, parse_atom(source, &mut tokens)?));
        }

        Ok(Self {
            source: source.to_string(),
            first,
            rest,
        })
    }

    /// Case key as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against a value, left to right without precedence.
    pub fn evaluate(&self, value: &Operand) -> bool {
        let mut result = self.first.evaluate(value);
        for (connective, atom) in &self.rest {
            let next = atom.evaluate(value);
            result = match connective {
                Connective::And => result && next,
                Connective::Or => result || next,
            };
        }
        debug!(expression = %self.source, value = %value, result, "Evaluated decision case");
        result
    }
}

fn parse_atom<'a>(source: &str, tokens: &mut impl Iterator<Item = &'a str>) -> Result<Atom> {
    let mut token = tokens
        .next()
        .ok_or_else(|| grammar_error(source, "expected a condition".to_string()))?;

    let negated = token.eq_ignore_ascii_case("NOT");
    if negated {
        token = tokens
            .next()
            .ok_or_else(|| grammar_error(source, "NOT must be followed by a condition".into()))?;
    }

    let (comparison, literal) = match Comparison::split_prefix(token) {
        Some((cmp, "")) => {
            let literal = tokens.next().ok_or_else(|| {
                grammar_error(source, format!("operator '{}' has no operand", token))
            })?;
            (Some(cmp), literal)
        }
        Some((cmp, literal)) => (Some(cmp), literal),
        None => (None, token),
    };

    if !is_literal(literal) {
        return Err(grammar_error(
            source,
            format!("invalid operand '{}'", literal),
        ));
    }

    Ok(Atom {
        negated,
        comparison,
        literal: literal.to_string(),
    })
}

fn is_literal(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-')
}

fn grammar_error(source: &str, detail: String) -> Error {
    Error::ExpressionGrammar(format!("'{}': {}", source, detail))
}
