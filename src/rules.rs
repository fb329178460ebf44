//! Declarative edge-rule catalogue.
//!
//! Rules are plain data: an ordered (out-type, in-type) node-type pair maps
//! to the edge labels permitted between them, whether the relation is
//! hierarchical (tree) or a loose association (cousin), and how many
//! concurrent edges of that shape may exist. The catalogue is queried through
//! pure lookup functions; nothing here mutates the graph.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::model::PropertyValue;

/// Edge property carrying the tree/cousin semantic flag.
pub const PARENTAGE_KEY: &str = "parentage";

/// Whether a relation is hierarchical or a loose association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// Parent/child relation; the child's lifecycle is scoped under the parent.
    Tree,
    /// Association between independently-identified vertices.
    Cousin,
}

impl RelationKind {
    /// The marker value stored under [`PARENTAGE_KEY`].
    pub fn marker(self) -> PropertyValue {
        PropertyValue::Str(self.as_str().to_string())
    }

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::Tree => "tree",
            RelationKind::Cousin => "cousin",
        }
    }

    /// Parses a [`PARENTAGE_KEY`] marker value.
    pub fn from_marker(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Str(s) if s == "tree" => Some(RelationKind::Tree),
            PropertyValue::Str(s) if s == "cousin" => Some(RelationKind::Cousin),
            _ => None,
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many concurrent edges of one shape are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Multiplicity {
    /// Unbounded.
    Many,
    /// At most one edge of this shape between the same two vertices.
    Simple,
    /// The in-vertex accepts at most one incoming edge of this shape.
    ManyToOne,
}

impl Default for Multiplicity {
    fn default() -> Self {
        Multiplicity::Many
    }
}

/// One permitted edge shape between an ordered pair of node types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRule {
    /// Node type of the out-vertex.
    #[serde(rename = "out")]
    pub out_type: String,
    /// Node type of the in-vertex.
    #[serde(rename = "in")]
    pub in_type: String,
    /// Permitted edge label.
    pub label: String,
    /// Tree or cousin semantics.
    pub kind: RelationKind,
    /// Concurrent-edge constraint.
    #[serde(default)]
    pub multiplicity: Multiplicity,
    /// Extra properties the rule stamps onto conforming edges.
    #[serde(default)]
    pub properties: std::collections::BTreeMap<String, String>,
}

/// Failure to load a rule catalogue.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The TOML document did not parse into a rule set.
    #[error("rule catalogue parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Two rules declare the same (pair, kind, label) shape.
    #[error("duplicate rule for {out} -[{kind}/{label}]-> {in_}")]
    DuplicateRule {
        /// Out-vertex node type.
        out: String,
        /// In-vertex node type.
        in_: String,
        /// Relation kind.
        kind: RelationKind,
        /// Edge label.
        label: String,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CatalogDoc {
    #[serde(rename = "rule", default)]
    rules: Vec<EdgeRule>,
}

/// The full rule set, queried by ordered node-type pair.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    rules: Vec<EdgeRule>,
}

impl RuleCatalog {
    /// Builds a catalogue from pre-constructed rules.
    pub fn from_rules(rules: Vec<EdgeRule>) -> Result<Self, CatalogError> {
        for (i, rule) in rules.iter().enumerate() {
            let dup = rules[..i].iter().any(|other| {
                other.out_type == rule.out_type
                    && other.in_type == rule.in_type
                    && other.kind == rule.kind
                    && other.label == rule.label
            });
            if dup {
                return Err(CatalogError::DuplicateRule {
                    out: rule.out_type.clone(),
                    in_: rule.in_type.clone(),
                    kind: rule.kind,
                    label: rule.label.clone(),
                });
            }
        }
        Ok(Self { rules })
    }

    /// Parses a TOML catalogue document (an array of `[[rule]]` tables).
    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDoc = toml::from_str(raw)?;
        Self::from_rules(doc.rules)
    }

    /// Every rule permitted between the ordered pair, all kinds.
    pub fn rules_between(&self, out_type: &str, in_type: &str) -> SmallVec<[&EdgeRule; 2]> {
        self.rules
            .iter()
            .filter(|rule| rule.out_type == out_type && rule.in_type == in_type)
            .collect()
    }

    /// Rules permitted between the ordered pair with the given kind.
    pub fn rules_between_kind(
        &self,
        out_type: &str,
        in_type: &str,
        kind: RelationKind,
    ) -> SmallVec<[&EdgeRule; 2]> {
        self.rules
            .iter()
            .filter(|rule| {
                rule.out_type == out_type && rule.in_type == in_type && rule.kind == kind
            })
            .collect()
    }

    /// All rules, in declaration order.
    pub fn rules(&self) -> &[EdgeRule] {
        &self.rules
    }
}
