//! Core graph value and element types shared by the store facade and the
//! migration engine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Vertex identity within the backing store.
pub type VertexId = u64;
/// Edge identity within the backing store.
pub type EdgeId = u64;

/// A single typed property value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropertyValue {
    /// UTF-8 string value.
    Str(String),
    /// 32-bit integer value.
    Int(i32),
    /// 64-bit integer value.
    Long(i64),
    /// Boolean value.
    Bool(bool),
}

/// The value type of a property key definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    /// UTF-8 string.
    Str,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// Boolean.
    Bool,
}

/// Cardinality of a property key: how many values one vertex may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// Exactly one value.
    Single,
    /// Unordered set of distinct values.
    Set,
    /// Ordered list of values.
    List,
}

/// Direction qualifier for edge enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Edges leaving the vertex.
    Out,
    /// Edges arriving at the vertex.
    In,
    /// Both directions.
    Both,
}

impl PropertyValue {
    /// The value type this value inhabits.
    pub fn value_type(&self) -> ValueType {
        match self {
            PropertyValue::Str(_) => ValueType::Str,
            PropertyValue::Int(_) => ValueType::Int,
            PropertyValue::Long(_) => ValueType::Long,
            PropertyValue::Bool(_) => ValueType::Bool,
        }
    }

    /// Coerces this value into `target`, returning `None` when no lossless
    /// conversion exists (out-of-range narrowing, unparseable strings).
    pub fn coerce(&self, target: ValueType) -> Option<PropertyValue> {
        match (self, target) {
            (v, t) if v.value_type() == t => Some(v.clone()),
            (PropertyValue::Int(v), ValueType::Long) => Some(PropertyValue::Long(i64::from(*v))),
            (PropertyValue::Long(v), ValueType::Int) => {
                i32::try_from(*v).ok().map(PropertyValue::Int)
            }
            (PropertyValue::Int(v), ValueType::Str) => Some(PropertyValue::Str(v.to_string())),
            (PropertyValue::Long(v), ValueType::Str) => Some(PropertyValue::Str(v.to_string())),
            (PropertyValue::Bool(v), ValueType::Str) => Some(PropertyValue::Str(v.to_string())),
            (PropertyValue::Str(s), ValueType::Int) => s.trim().parse().ok().map(PropertyValue::Int),
            (PropertyValue::Str(s), ValueType::Long) => {
                s.trim().parse().ok().map(PropertyValue::Long)
            }
            (PropertyValue::Str(s), ValueType::Bool) => match s.trim() {
                s if s.eq_ignore_ascii_case("true") => Some(PropertyValue::Bool(true)),
                s if s.eq_ignore_ascii_case("false") => Some(PropertyValue::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Long(v) => write!(f, "{v}"),
            PropertyValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Str => "String",
            ValueType::Int => "Integer",
            ValueType::Long => "Long",
            ValueType::Bool => "Boolean",
        };
        f.write_str(name)
    }
}

/// A vertex: identity, node-type tag, and a multi-valued property map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Store-assigned identity.
    pub id: VertexId,
    /// Domain node type (e.g. `device`, `interface`).
    pub node_type: String,
    /// Property name to one-or-many typed values.
    pub properties: BTreeMap<String, Vec<PropertyValue>>,
}

impl Vertex {
    /// Creates an empty vertex of the given node type.
    pub fn new(id: VertexId, node_type: impl Into<String>) -> Self {
        Self {
            id,
            node_type: node_type.into(),
            properties: BTreeMap::new(),
        }
    }
}

/// A directed, labeled edge with a single-valued property map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Store-assigned identity.
    pub id: EdgeId,
    /// Edge label.
    pub label: String,
    /// Vertex the edge leaves.
    pub out_v: VertexId,
    /// Vertex the edge arrives at.
    pub in_v: VertexId,
    /// Edge properties.
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Edge {
    /// The endpoint opposite `v`, treating self-loops as their own far end.
    pub fn other(&self, v: VertexId) -> VertexId {
        if self.out_v == v {
            self.in_v
        } else {
            self.out_v
        }
    }
}
