//! Rule-aware edge creation.
//!
//! Reconciliation and merge never assemble conforming edges by hand; they go
//! through these primitives, which derive the rule-implied property set and
//! enforce the rule's multiplicity constraint.

use std::collections::BTreeMap;

use crate::engine::{MigrationError, RelationShape, Result};
use crate::model::{Direction, EdgeId, PropertyValue, VertexId};
use crate::rules::{EdgeRule, Multiplicity, PARENTAGE_KEY};
use crate::store::GraphTxn;

/// The exact property set a rule prescribes for its edges.
pub fn ruled_properties(rule: &EdgeRule) -> BTreeMap<String, PropertyValue> {
    let mut properties = BTreeMap::new();
    properties.insert(PARENTAGE_KEY.to_string(), rule.kind.marker());
    for (key, value) in &rule.properties {
        properties.insert(key.clone(), PropertyValue::Str(value.clone()));
    }
    properties
}

fn shape_of(rule: &EdgeRule) -> RelationShape {
    RelationShape {
        out_type: rule.out_type.clone(),
        kind: rule.kind,
        in_type: rule.in_type.clone(),
    }
}

/// Checks whether creating one more `rule`-shaped edge from `out_v` to
/// `in_v` would exceed the rule's multiplicity, ignoring `exclude` (the edge
/// about to be replaced, when reconciling in place).
pub fn check_multiplicity(
    txn: &dyn GraphTxn,
    rule: &EdgeRule,
    out_v: VertexId,
    in_v: VertexId,
    exclude: Option<EdgeId>,
) -> Result<()> {
    let violated = match rule.multiplicity {
        Multiplicity::Many => false,
        Multiplicity::Simple => txn
            .edges(out_v, Direction::Out, Some(&rule.label))?
            .iter()
            .any(|edge| edge.in_v == in_v && Some(edge.id) != exclude),
        Multiplicity::ManyToOne => txn
            .edges(in_v, Direction::In, Some(&rule.label))?
            .iter()
            .any(|edge| Some(edge.id) != exclude),
    };
    if violated {
        return Err(MigrationError::Multiplicity {
            shape: shape_of(rule),
        });
    }
    Ok(())
}

/// Creates a rule-conformant edge, deriving the rule-implied properties and
/// enforcing multiplicity against the current graph state.
pub fn create_ruled_edge(
    txn: &mut dyn GraphTxn,
    rule: &EdgeRule,
    out_v: VertexId,
    in_v: VertexId,
) -> Result<EdgeId> {
    check_multiplicity(txn, rule, out_v, in_v, None)?;
    Ok(txn.create_edge(out_v, in_v, &rule.label, ruled_properties(rule))?)
}
