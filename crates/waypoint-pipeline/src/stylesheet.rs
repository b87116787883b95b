//! CSS-like model configuration for pipeline graphs.
//!
//! Parses stylesheet rules with selectors (`*`, shape name, `.class`,
//! `#id`) and declarations, then applies them to graph nodes in specificity
//! order. A declaration only lands when the node does not already carry a
//! more specific explicit value for that property.

use std::collections::HashMap;

use crate::graph::{PipelineGraph, PipelineNode, REASONING_EFFORT_DEFAULT};
use waypoint_types::WaypointError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Stylesheet {
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub selector: Selector,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// `*` — matches every node.
    Universal,
    /// bare identifier — matches every node with that shape.
    Shape(String),
    /// `.class_name` — matches nodes whose class list contains the token.
    Class(String),
    /// `#node_id` — matches a node by its id.
    Id(String),
}

impl Selector {
    pub fn specificity(&self) -> u8 {
        match self {
            Selector::Universal => 0,
            Selector::Shape(_) => 1,
            Selector::Class(_) => 2,
            Selector::Id(_) => 3,
        }
    }

    pub fn matches(&self, node: &PipelineNode) -> bool {
        match self {
            Selector::Universal => true,
            Selector::Shape(shape) => node.shape == *shape,
            Selector::Class(class) => node.classes.contains(class),
            Selector::Id(id) => node.id == *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.input.len()
                && self.input.as_bytes()[self.pos].is_ascii_whitespace()
            {
                self.pos += 1;
            }
            if self.remaining().starts_with("//") {
                while self.pos < self.input.len() && self.input.as_bytes()[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            if self.remaining().starts_with("/*") {
                self.pos += 2;
                while self.pos + 1 < self.input.len() {
                    if &self.input[self.pos..self.pos + 2] == "*/" {
                        self.pos += 2;
                        break;
                    }
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, ch: u8) -> Result<(), WaypointError> {
        self.skip_whitespace_and_comments();
        match self.peek() {
            Some(c) if c == ch => {
                self.pos += 1;
                Ok(())
            }
            other => Err(self.error(format!(
                "expected '{}', found '{}'",
                ch as char,
                other.map(|c| c as char).unwrap_or('\0')
            ))),
        }
    }

    fn parse_identifier(&mut self) -> Result<String, WaypointError> {
        self.skip_whitespace_and_comments();
        let start = self.pos;
        while self.pos < self.input.len() {
            let c = self.input.as_bytes()[self.pos];
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'-' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected identifier".to_string()));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_value(&mut self) -> Result<String, WaypointError> {
        self.skip_whitespace_and_comments();

        // Quoted value: consume up to the closing quote
        if self.peek() == Some(b'"') {
            self.pos += 1;
            let start = self.pos;
            while self.pos < self.input.len() && self.input.as_bytes()[self.pos] != b'"' {
                self.pos += 1;
            }
            if self.pos >= self.input.len() {
                return Err(self.error("unterminated string value".to_string()));
            }
            let val = self.input[start..self.pos].to_string();
            self.pos += 1;
            return Ok(val);
        }

        // Bare token: up to ';' or '}'
        let start = self.pos;
        while self.pos < self.input.len() {
            let c = self.input.as_bytes()[self.pos];
            if c == b';' || c == b'}' {
                break;
            }
            self.pos += 1;
        }
        let val = self.input[start..self.pos].trim();
        if val.is_empty() {
            return Err(self.error("expected property value".to_string()));
        }
        Ok(val.to_string())
    }

    fn error(&self, message: String) -> WaypointError {
        let consumed = &self.input[..self.pos];
        let line = consumed.chars().filter(|&c| c == '\n').count() + 1;
        let col = consumed
            .rfind('\n')
            .map(|i| self.pos - i)
            .unwrap_or(self.pos + 1);
        WaypointError::ParseError {
            line,
            col,
            message,
            source_snippet: None,
        }
    }

    fn parse_selector(&mut self) -> Result<Selector, WaypointError> {
        self.skip_whitespace_and_comments();
        match self.peek() {
            Some(b'*') => {
                self.pos += 1;
                Ok(Selector::Universal)
            }
            Some(b'#') => {
                self.pos += 1;
                Ok(Selector::Id(self.parse_identifier()?))
            }
            Some(b'.') => {
                self.pos += 1;
                Ok(Selector::Class(self.parse_identifier()?))
            }
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                Ok(Selector::Shape(self.parse_identifier()?))
            }
            other => Err(self.error(format!(
                "expected selector ('*', '#id', '.class', or shape), found '{}'",
                other.map(|c| c as char).unwrap_or('\0')
            ))),
        }
    }

    fn parse_declaration(&mut self) -> Result<Declaration, WaypointError> {
        let property = self.parse_identifier()?;
        // Both `key: value` and `key = value` forms are accepted
        self.skip_whitespace_and_comments();
        match self.peek() {
            Some(b':') | Some(b'=') => {
                self.pos += 1;
            }
            _ => return Err(self.error("expected ':' or '=' after property name".to_string())),
        }
        let value = self.parse_value()?;
        Ok(Declaration { property, value })
    }

    fn parse_rule(&mut self) -> Result<Rule, WaypointError> {
        let selector = self.parse_selector()?;
        self.expect(b'{')?;

        let mut declarations = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                None => {
                    return Err(self.error("unexpected end of input in rule body".to_string()))
                }
                _ => {
                    declarations.push(self.parse_declaration()?);
                    self.skip_whitespace_and_comments();
                    if self.peek() == Some(b';') {
                        self.pos += 1;
                    }
                }
            }
        }

        Ok(Rule {
            selector,
            declarations,
        })
    }

    fn parse_stylesheet(&mut self) -> Result<Stylesheet, WaypointError> {
        let mut rules = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            if self.pos >= self.input.len() {
                break;
            }
            rules.push(self.parse_rule()?);
        }
        if rules.is_empty() {
            return Err(self.error("stylesheet must contain at least one rule".to_string()));
        }
        Ok(Stylesheet { rules })
    }
}

/// Parse a CSS-like model stylesheet from a string.
pub fn parse_stylesheet(input: &str) -> Result<Stylesheet, WaypointError> {
    Parser::new(input).parse_stylesheet()
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Apply a stylesheet to a `PipelineGraph`, mutating nodes in-place.
///
/// For each node a property map is composed by layering matching rules in
/// ascending specificity (universal, shape, class, id); later layers
/// overwrite earlier ones key by key. Each recognized property then lands
/// only when the node does not already carry an explicit value:
/// `model`/`provider`/`fidelity` when empty, `reasoning_effort` when still
/// at the "high" sentinel, `max_retries` when 0, `timeout` when unset.
pub fn apply_stylesheet(graph: &mut PipelineGraph, stylesheet: &Stylesheet) {
    for node in graph.all_nodes_mut() {
        let mut matching: Vec<&Rule> = stylesheet
            .rules
            .iter()
            .filter(|r| r.selector.matches(node))
            .collect();
        // Stable sort: rules at equal specificity keep stylesheet order
        matching.sort_by_key(|r| r.selector.specificity());

        let mut properties: HashMap<&str, &str> = HashMap::new();
        for rule in matching {
            for decl in &rule.declarations {
                properties.insert(decl.property.as_str(), decl.value.as_str());
            }
        }

        for (property, value) in properties {
            match property {
                "model" | "llm_model" => {
                    if node.llm_model.is_none() {
                        node.llm_model = Some(value.to_string());
                    }
                }
                "provider" | "llm_provider" => {
                    if node.llm_provider.is_none() {
                        node.llm_provider = Some(value.to_string());
                    }
                }
                "fidelity" => {
                    if node.fidelity.is_none() {
                        node.fidelity = Some(value.to_string());
                    }
                }
                "reasoning_effort" => {
                    if node.reasoning_effort == REASONING_EFFORT_DEFAULT {
                        node.reasoning_effort = value.to_string();
                    }
                }
                "max_retries" => {
                    if node.max_retries == 0 {
                        if let Ok(n) = value.parse::<usize>() {
                            node.max_retries = n;
                        }
                    }
                }
                "timeout" => {
                    if node.timeout.is_none() {
                        if let Ok(d) = waypoint_dot::duration_serde::parse_duration_str(value) {
                            node.timeout = Some(d);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
