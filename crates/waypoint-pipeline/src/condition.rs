//! Condition expression language: parser and evaluator.
//!
//! Grammar:
//! ```text
//! ConditionExpr  ::= Clause ( '&&' Clause )*
//! Clause         ::= Key Operator Literal
//! Key            ::= 'outcome' | 'preferred_label' | 'context.' ident | ident
//! Operator       ::= '=' | '!='
//! Literal        ::= QuotedString | BareToken
//! ```
//!
//! A bare key reads from the context, the same as `context.<key>`.
//! Comparisons are case-insensitive. An empty condition is always true.

use waypoint_types::WaypointError;

/// A parsed condition expression consisting of one or more clauses joined by `&&`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionExpr {
    pub clauses: Vec<Clause>,
}

/// A single comparison clause: `key op value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub key: String,
    pub operator: Operator,
    pub value: String,
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
}

/// Parse a condition string into a [`ConditionExpr`].
///
/// An empty or whitespace-only input produces an expression with zero
/// clauses, which [`evaluate_condition`] treats as always true.
pub fn parse_condition(input: &str) -> Result<ConditionExpr, WaypointError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(ConditionExpr {
            clauses: Vec::new(),
        });
    }

    let mut clauses = Vec::new();
    for part in trimmed.split("&&") {
        clauses.push(parse_clause(part.trim())?);
    }

    Ok(ConditionExpr { clauses })
}

/// Validation-friendly surface: `None` on success, a readable error otherwise.
pub fn try_parse(input: &str) -> Option<String> {
    parse_condition(input).err().map(|e| e.to_string())
}

fn parse_clause(input: &str) -> Result<Clause, WaypointError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(make_error("empty clause"));
    }

    let (key_end, operator, op_len) = find_operator(input)?;

    let key = input[..key_end].trim().to_string();
    if key.is_empty() {
        return Err(make_error("missing key before operator"));
    }
    // Validate key: identifier segments separated by dots.
    for seg in key.split('.') {
        if seg.is_empty() || !seg.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(make_error(&format!("invalid key segment: '{seg}'")));
        }
    }

    let raw_value = input[key_end + op_len..].trim();
    if raw_value.is_empty() {
        return Err(make_error(&format!(
            "missing value after operator in '{input}'"
        )));
    }

    Ok(Clause {
        key,
        operator,
        value: strip_quotes(raw_value),
    })
}

fn find_operator(input: &str) -> Result<(usize, Operator, usize), WaypointError> {
    // Scan for `!=` or `=`, skipping quoted regions.
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1; // skip closing quote
            }
            b'!' if i + 1 < bytes.len() && bytes[i + 1] == b'=' => {
                return Ok((i, Operator::NotEq, 2));
            }
            b'=' => {
                return Ok((i, Operator::Eq, 1));
            }
            _ => {
                i += 1;
            }
        }
    }
    Err(make_error(&format!("no operator found in '{input}'")))
}

fn strip_quotes(s: &str) -> String {
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
        {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn make_error(msg: &str) -> WaypointError {
    WaypointError::ValidationError(format!("condition parse error: {msg}"))
}

/// Evaluate a condition expression against values provided by a resolver.
///
/// The `resolve` function maps a key (e.g. `"outcome"`, `"context.env"`) to
/// its string value; unknown keys resolve to the empty string. Comparisons
/// are case-insensitive. Zero clauses evaluate to `true`.
pub fn evaluate_condition(expr: &ConditionExpr, resolve: &dyn Fn(&str) -> String) -> bool {
    expr.clauses.iter().all(|clause| {
        let actual = resolve(&clause.key).to_lowercase();
        let expected = clause.value.to_lowercase();
        match clause.operator {
            Operator::Eq => actual == expected,
            Operator::NotEq => actual != expected,
        }
    })
}
