use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DotGraph {
    pub name: String,
    pub attrs: HashMap<String, AttributeValue>,
    pub nodes: HashMap<String, NodeDef>,
    /// Edges in declaration order, subgraph edges included.
    pub edges: Vec<EdgeDef>,
    pub node_defaults: HashMap<String, AttributeValue>,
    pub edge_defaults: HashMap<String, AttributeValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    pub attrs: HashMap<String, AttributeValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDef {
    pub from: String,
    pub to: String,
    pub attrs: HashMap<String, AttributeValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    #[serde(with = "crate::duration_serde")]
    Duration(Duration),
}

impl AttributeValue {
    /// String view of the value, for attributes read as free text.
    pub fn as_text(&self) -> String {
        match self {
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Integer(i) => i.to_string(),
            AttributeValue::Float(f) => f.to_string(),
            AttributeValue::Boolean(b) => b.to_string(),
            AttributeValue::Duration(d) => format!("{}ms", d.as_millis()),
        }
    }
}
