use std::collections::HashMap;
use std::time::Duration;

use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, opt, preceded, repeat};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::token::{literal, take_while};
use winnow::{ModalResult, Parser};

use crate::ast::*;

fn make_cut_error(desc: &'static str) -> ErrMode<ContextError<StrContext>> {
    let mut e = ContextError::new();
    e.push(StrContext::Expected(StrContextValue::Description(desc)));
    ErrMode::Cut(e)
}

/// Strip `//` and `#` line comments and `/* */` block comments from the input.
pub(crate) fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let len = bytes.len();
    let mut i = 0;

    while i < len {
        if (i + 1 < len && bytes[i] == b'/' && bytes[i + 1] == b'/') || bytes[i] == b'#' {
            // line comment — skip until newline
            while i < len && bytes[i] != b'\n' {
                i += 1;
            }
        } else if i + 1 < len && bytes[i] == b'/' && bytes[i + 1] == b'*' {
            // block comment — skip until */
            i += 2;
            while i + 1 < len && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                // preserve newlines so line numbers stay correct
                if bytes[i] == b'\n' {
                    out.push('\n');
                }
                i += 1;
            }
            if i + 1 < len {
                i += 2; // skip */
            }
        } else if bytes[i] == b'"' {
            // inside a string literal — copy verbatim, handling escapes
            out.push('"');
            i += 1;
            while i < len {
                if bytes[i] == b'\\' && i + 1 < len {
                    out.push(bytes[i] as char);
                    out.push(bytes[i + 1] as char);
                    i += 2;
                } else if bytes[i] == b'"' {
                    out.push('"');
                    i += 1;
                    break;
                } else {
                    out.push(bytes[i] as char);
                    i += 1;
                }
            }
        } else {
            out.push(bytes[i] as char);
            i += 1;
        }
    }
    out
}

/// Whitespace consumer (including newlines).
fn ws<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    multispace0.parse_next(input)
}

/// Parse an identifier: [A-Za-z_][A-Za-z0-9_]*
fn identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// Parse a node id: bare identifier or double-quoted string.
fn node_id(input: &mut &str) -> ModalResult<String> {
    alt((quoted_string, identifier.map(str::to_string))).parse_next(input)
}

/// Parse a qualified id: identifier ( '.' identifier )+  or plain identifier.
/// Returns the full dotted string.
fn qualified_or_plain_id(input: &mut &str) -> ModalResult<String> {
    let first = identifier.parse_next(input)?;
    let rest: Vec<&str> = repeat(0.., preceded('.', identifier)).parse_next(input)?;
    if rest.is_empty() {
        Ok(first.to_string())
    } else {
        let mut s = first.to_string();
        for part in rest {
            s.push('.');
            s.push_str(part);
        }
        Ok(s)
    }
}

/// Parse a double-quoted string with escape support.
fn quoted_string(input: &mut &str) -> ModalResult<String> {
    let _ = '"'.parse_next(input)?;
    let mut s = String::new();
    loop {
        let c = winnow::token::any.parse_next(input)?;
        match c {
            '"' => break,
            '\\' => {
                let esc = winnow::token::any.parse_next(input)?;
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    '\\' => s.push('\\'),
                    '"' => s.push('"'),
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            other => s.push(other),
        }
    }
    Ok(s)
}

/// Parse a duration value: integer + suffix (ms, s, m, h, d).
fn duration_value(input: &mut &str) -> ModalResult<Duration> {
    let digits: &str = digit1.parse_next(input)?;
    let val: u64 = digits
        .parse()
        .map_err(|_| ErrMode::Backtrack(ContextError::new()))?;
    let suffix = alt(("ms", "s", "m", "h", "d")).parse_next(input)?;
    let dur = match suffix {
        "ms" => Duration::from_millis(val),
        "s" => Duration::from_secs(val),
        "m" => Duration::from_secs(val * 60),
        "h" => Duration::from_secs(val * 3600),
        "d" => Duration::from_secs(val * 86400),
        _ => unreachable!(),
    };
    Ok(dur)
}

/// Parse a boolean value.
fn boolean_value(input: &mut &str) -> ModalResult<bool> {
    alt((literal("true").value(true), literal("false").value(false))).parse_next(input)
}

/// Parse a float: optional sign, digits, '.', digits.
fn float_value(input: &mut &str) -> ModalResult<f64> {
    let s: &str = (opt(alt(('-', '+'))), digit1, '.', digit1)
        .take()
        .parse_next(input)?;
    s.parse()
        .map_err(|_| ErrMode::Backtrack(ContextError::new()))
}

/// Parse an integer: optional sign + digits.
fn integer_value(input: &mut &str) -> ModalResult<i64> {
    let s: &str = (opt(alt(('-', '+'))), digit1).take().parse_next(input)?;
    s.parse()
        .map_err(|_| ErrMode::Backtrack(ContextError::new()))
}

/// Parse an attribute value. Bare identifiers read as strings, so
/// `shape=box` and `shape="box"` are equivalent.
fn attr_value(input: &mut &str) -> ModalResult<AttributeValue> {
    alt((
        quoted_string.map(AttributeValue::String),
        boolean_value.map(AttributeValue::Boolean),
        duration_value.map(AttributeValue::Duration),
        float_value.map(AttributeValue::Float),
        integer_value.map(AttributeValue::Integer),
        identifier.map(|s: &str| AttributeValue::String(s.to_string())),
    ))
    .parse_next(input)
}

/// Parse a single attribute: key '=' value.
fn attr(input: &mut &str) -> ModalResult<(String, AttributeValue)> {
    let key = qualified_or_plain_id.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = '='.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let value = attr_value
        .context(StrContext::Expected(StrContextValue::Description(
            "attribute value",
        )))
        .parse_next(input)?;
    Ok((key, value))
}

/// Parse an attribute block: '[' attr ( ','? attr )* ']'
fn attr_block(input: &mut &str) -> ModalResult<HashMap<String, AttributeValue>> {
    let _ = '['.parse_next(input)?;
    let _ = ws.parse_next(input)?;

    let mut attrs = HashMap::new();
    if let Some(first) = opt(attr).parse_next(input)? {
        attrs.insert(first.0, first.1);
        loop {
            let _ = ws.parse_next(input)?;
            // optional comma or semicolon separator
            let _ = opt(alt((',', ';'))).parse_next(input)?;
            let _ = ws.parse_next(input)?;
            if let Some(a) = opt(attr).parse_next(input)? {
                attrs.insert(a.0, a.1);
            } else {
                break;
            }
        }
    }

    let _ = ws.parse_next(input)?;
    let _ = ']'.parse_next(input)?;
    Ok(attrs)
}

/// Intermediate representation of a parsed statement, before merging into a DotGraph.
enum Statement {
    GraphAttrs(HashMap<String, AttributeValue>),
    NodeDefaults(HashMap<String, AttributeValue>),
    EdgeDefaults(HashMap<String, AttributeValue>),
    Node(String, HashMap<String, AttributeValue>),
    Edge(Vec<String>, HashMap<String, AttributeValue>),
    Subgraph(Vec<Statement>),
    GraphAttrDecl(String, AttributeValue),
}

/// Parse 'graph' '[' ... ']' ';'?
fn graph_attr_stmt(input: &mut &str) -> ModalResult<Statement> {
    let _ = literal("graph").parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let attrs = attr_block.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = opt(';').parse_next(input)?;
    Ok(Statement::GraphAttrs(attrs))
}

/// Parse 'node' '[' ... ']' ';'?
fn node_defaults_stmt(input: &mut &str) -> ModalResult<Statement> {
    let _ = literal("node").parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let attrs = attr_block.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = opt(';').parse_next(input)?;
    Ok(Statement::NodeDefaults(attrs))
}

/// Parse 'edge' '[' ... ']' ';'?
fn edge_defaults_stmt(input: &mut &str) -> ModalResult<Statement> {
    let _ = literal("edge").parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let attrs = attr_block.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = opt(';').parse_next(input)?;
    Ok(Statement::EdgeDefaults(attrs))
}

/// Parse 'subgraph' identifier? '{' statement* '}'
///
/// Subgraphs introduce no id scope; their contents flatten into the parent.
fn subgraph_stmt(input: &mut &str) -> ModalResult<Statement> {
    let _ = literal("subgraph").parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = opt(identifier).parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = '{'.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let stmts = statements.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = '}'.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = opt(';').parse_next(input)?;
    Ok(Statement::Subgraph(stmts))
}

/// Parse a node or edge statement. An edge starts as an id then has '->'.
fn node_or_edge_stmt(input: &mut &str) -> ModalResult<Statement> {
    let first = node_id.parse_next(input)?;
    let _ = ws.parse_next(input)?;

    // Check for edge: '->'
    let arrow = opt(literal("->")).parse_next(input)?;
    if arrow.is_some() {
        // Edge statement — collect chain
        let mut chain = vec![first];
        let _ = ws.parse_next(input)?;
        let next = node_id
            .context(StrContext::Expected(StrContextValue::Description(
                "edge target identifier",
            )))
            .parse_next(input)?;
        chain.push(next);

        loop {
            let _ = ws.parse_next(input)?;
            if opt(literal("->")).parse_next(input)?.is_some() {
                let _ = ws.parse_next(input)?;
                let n = node_id
                    .context(StrContext::Expected(StrContextValue::Description(
                        "edge target identifier",
                    )))
                    .parse_next(input)?;
                chain.push(n);
            } else {
                break;
            }
        }

        let _ = ws.parse_next(input)?;
        let attrs = opt(attr_block).parse_next(input)?.unwrap_or_default();
        let _ = ws.parse_next(input)?;
        let _ = opt(';').parse_next(input)?;
        return Ok(Statement::Edge(chain, attrs));
    }

    // Check for '--' to give a better error
    if opt(literal("--")).parse_next(input)?.is_some() {
        return Err(make_cut_error(
            "only directed edges (->); undirected edges (--) are not supported",
        ));
    }

    // An attr block means this is a node declaration with attrs.
    let attrs = opt(attr_block).parse_next(input)?.unwrap_or_default();
    let _ = ws.parse_next(input)?;

    if !attrs.is_empty() {
        let _ = opt(';').parse_next(input)?;
        return Ok(Statement::Node(first, attrs));
    }

    // Check for '=' which means this is a graph attr decl: key = value
    if opt('=').parse_next(input)?.is_some() {
        let _ = ws.parse_next(input)?;
        let val = attr_value.parse_next(input)?;
        let _ = ws.parse_next(input)?;
        let _ = opt(';').parse_next(input)?;
        return Ok(Statement::GraphAttrDecl(first, val));
    }

    let _ = opt(';').parse_next(input)?;
    Ok(Statement::Node(first, attrs))
}

/// Parse a single statement.
fn statement(input: &mut &str) -> ModalResult<Statement> {
    let _ = ws.parse_next(input)?;
    alt((
        graph_attr_stmt,
        node_defaults_stmt,
        edge_defaults_stmt,
        subgraph_stmt,
        node_or_edge_stmt,
    ))
    .parse_next(input)
}

/// Parse zero or more statements.
fn statements(input: &mut &str) -> ModalResult<Vec<Statement>> {
    let mut stmts = Vec::new();
    loop {
        let _ = ws.parse_next(input)?;
        if input.is_empty() || input.starts_with('}') {
            break;
        }
        let stmt = statement.parse_next(input)?;
        stmts.push(stmt);
    }
    Ok(stmts)
}

/// Mutable accumulation state while merging statements into a graph.
struct MergeState {
    graph_attrs: HashMap<String, AttributeValue>,
    nodes: HashMap<String, NodeDef>,
    edges: Vec<EdgeDef>,
}

/// Merge statements into the flat graph, applying node/edge defaults.
///
/// Subgraph statements recurse with a copy of the enclosing defaults so a
/// `node [...]` block inside a subgraph only affects that subgraph's nodes.
fn merge_statements(
    stmts: Vec<Statement>,
    state: &mut MergeState,
    node_defaults: &HashMap<String, AttributeValue>,
    edge_defaults: &HashMap<String, AttributeValue>,
) -> (HashMap<String, AttributeValue>, HashMap<String, AttributeValue>) {
    let mut node_defaults = node_defaults.clone();
    let mut edge_defaults = edge_defaults.clone();

    for stmt in stmts {
        match stmt {
            Statement::GraphAttrs(attrs) => {
                state.graph_attrs.extend(attrs);
            }
            Statement::NodeDefaults(attrs) => {
                node_defaults.extend(attrs);
            }
            Statement::EdgeDefaults(attrs) => {
                edge_defaults.extend(attrs);
            }
            Statement::Node(id, mut attrs) => {
                // Node defaults fill in keys the declaration did not set explicitly.
                for (k, v) in &node_defaults {
                    attrs.entry(k.clone()).or_insert_with(|| v.clone());
                }
                state.nodes.insert(id.clone(), NodeDef { id, attrs });
            }
            Statement::Edge(chain, attrs) => {
                // Expand chained edges: A -> B -> C => (A,B), (B,C)
                for pair in chain.windows(2) {
                    let mut merged = edge_defaults.clone();
                    merged.extend(attrs.clone());
                    state.edges.push(EdgeDef {
                        from: pair[0].clone(),
                        to: pair[1].clone(),
                        attrs: merged,
                    });
                }
                // Any id referenced only as an edge endpoint becomes an
                // implicit node with the current defaults.
                for id in &chain {
                    state.nodes.entry(id.clone()).or_insert_with(|| NodeDef {
                        id: id.clone(),
                        attrs: node_defaults.clone(),
                    });
                }
            }
            Statement::Subgraph(inner) => {
                merge_statements(inner, state, &node_defaults, &edge_defaults);
            }
            Statement::GraphAttrDecl(key, val) => {
                state.graph_attrs.insert(key, val);
            }
        }
    }

    (node_defaults, edge_defaults)
}

/// Top-level parser: 'digraph' identifier '{' statements '}'.
fn parse_digraph(input: &mut &str) -> ModalResult<DotGraph> {
    let _ = ws.parse_next(input)?;

    // Reject 'strict'
    if input.starts_with("strict") {
        return Err(make_cut_error(
            "'digraph' keyword (strict graphs are not supported)",
        ));
    }

    // Reject undirected 'graph'
    if input.starts_with("graph") && !input.starts_with("graph [") {
        let after = &input[5..];
        let trimmed = after.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(make_cut_error(
                "'digraph' keyword (undirected graphs are not supported)",
            ));
        }
    }

    let _ = literal("digraph")
        .context(StrContext::Expected(StrContextValue::StringLiteral(
            "digraph",
        )))
        .parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let name = identifier
        .context(StrContext::Expected(StrContextValue::Description(
            "graph name identifier",
        )))
        .parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = '{'.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let stmts = statements.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = '}'.parse_next(input)?;
    let _ = ws.parse_next(input)?;

    let mut state = MergeState {
        graph_attrs: HashMap::new(),
        nodes: HashMap::new(),
        edges: Vec::new(),
    };
    let empty = HashMap::new();
    let (node_defaults, edge_defaults) = merge_statements(stmts, &mut state, &empty, &empty);

    Ok(DotGraph {
        name: name.to_string(),
        attrs: state.graph_attrs,
        nodes: state.nodes,
        edges: state.edges,
        node_defaults,
        edge_defaults,
    })
}

/// Compute (line, col) from byte offset in the stripped text.
fn offset_to_line_col(stripped: &str, remaining_len: usize) -> (usize, usize) {
    let consumed = stripped.len() - remaining_len;
    let prefix = &stripped[..consumed.min(stripped.len())];
    let line = prefix.matches('\n').count() + 1;
    let col = match prefix.rfind('\n') {
        Some(pos) => consumed - pos,
        None => consumed + 1,
    };
    (line, col)
}

/// Public entry point.
pub fn parse(input: &str) -> std::result::Result<DotGraph, waypoint_types::WaypointError> {
    let stripped = strip_comments(input);
    let mut remaining = stripped.as_str();

    parse_digraph.parse_next(&mut remaining).map_err(|e| {
        let (line, col) = offset_to_line_col(&stripped, remaining.len());
        let message = format!("{}", e);

        // A short snippet around the error location helps pinpoint it
        let snippet = remaining.chars().take(40).collect::<String>();
        let source_snippet = if snippet.is_empty() {
            None
        } else {
            Some(snippet)
        };

        waypoint_types::WaypointError::ParseError {
            line,
            col,
            message,
            source_snippet,
        }
    })
}
