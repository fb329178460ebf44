//! Edge reconciliation.
//!
//! Rewrites every qualifying edge so its label and properties exactly match
//! what the rule catalogue prescribes for its endpoints. Old edges are
//! removed and recreated through the rule-aware primitives, never patched in
//! place. Edges whose endpoints have no matching rule are skipped and
//! counted; would-be multiplicity violations are tallied per relation shape
//! and leave the edge untouched.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::engine::{link, MigrationError, Result};
use crate::model::Edge;
use crate::rules::{EdgeRule, RelationKind, RuleCatalog, PARENTAGE_KEY};
use crate::store::GraphTxn;

/// Chooses among multiple permitted rules for one edge.
pub trait Disambiguator {
    /// Picks the rule the edge should conform to, or `None` to skip it.
    fn choose<'r>(&self, current_label: &str, candidates: &[&'r EdgeRule])
        -> Option<&'r EdgeRule>;
}

/// Table-driven disambiguation: an edge whose label already matches a
/// candidate keeps it; otherwise the old label is looked up in a fixed
/// old-label to new-label table.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    renames: BTreeMap<String, String>,
}

impl LabelTable {
    /// Creates an empty table (exact-match disambiguation only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an old-label to new-label mapping.
    pub fn rename(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.renames.insert(old.into(), new.into());
        self
    }
}

impl Disambiguator for LabelTable {
    fn choose<'r>(
        &self,
        current_label: &str,
        candidates: &[&'r EdgeRule],
    ) -> Option<&'r EdgeRule> {
        if let Some(exact) = candidates.iter().find(|rule| rule.label == current_label).copied() {
            return Some(exact);
        }
        let renamed = self.renames.get(current_label)?;
        candidates.iter().find(|rule| rule.label == *renamed).copied()
    }
}

/// Scope restriction for one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileScope {
    /// Node-type pairs to reconcile (matched in either orientation);
    /// empty means every edge.
    pub pairs: Vec<(String, String)>,
}

impl ReconcileScope {
    /// Unrestricted scope.
    pub fn all() -> Self {
        Self::default()
    }

    /// Scope restricted to edges between the two node types.
    pub fn between(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            pairs: vec![(a.into(), b.into())],
        }
    }

    fn admits(&self, out_type: &str, in_type: &str) -> bool {
        self.pairs.is_empty()
            || self.pairs.iter().any(|(a, b)| {
                (a == out_type && b == in_type) || (a == in_type && b == out_type)
            })
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Edges removed and recreated in rule-conformant form.
    pub processed: u64,
    /// Edges left untouched: no matching rule, or disambiguation yielded
    /// nothing.
    pub skipped: u64,
    /// Edges lacking the parentage marker property.
    pub missing_parentage: u64,
    /// Would-be multiplicity violations, keyed by rendered relation shape.
    pub multiplicity: BTreeMap<String, u64>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

/// Rewrites every edge in scope to conform to the catalogue.
pub fn reconcile(
    txn: &mut dyn GraphTxn,
    catalog: &RuleCatalog,
    scope: &ReconcileScope,
    disambiguator: &dyn Disambiguator,
) -> Result<ReconcileReport> {
    let start = Instant::now();
    let mut report = ReconcileReport::default();

    let edges = txn.all_edges()?;
    for edge in edges {
        let (Some(out_vertex), Some(in_vertex)) = (txn.vertex(edge.out_v)?, txn.vertex(edge.in_v)?)
        else {
            // Endpoint vanished mid-pass; nothing to conform.
            report.skipped += 1;
            continue;
        };
        let out_type = out_vertex.node_type.as_str();
        let in_type = in_vertex.node_type.as_str();
        if !scope.admits(out_type, in_type) {
            continue;
        }

        let kind = match edge_kind(&edge, catalog, out_type, in_type, &mut report) {
            Some(kind) => kind,
            None => {
                report.skipped += 1;
                continue;
            }
        };

        let candidates = catalog.rules_between_kind(out_type, in_type, kind);
        let rule = match candidates.len() {
            0 => {
                debug!(
                    edge = edge.id,
                    out_type, in_type, "migrate.reconcile.no_rule"
                );
                report.skipped += 1;
                continue;
            }
            1 => candidates[0],
            _ => match disambiguator.choose(&edge.label, &candidates) {
                Some(rule) => rule,
                None => {
                    debug!(
                        edge = edge.id,
                        label = %edge.label,
                        out_type,
                        in_type,
                        "migrate.reconcile.ambiguous_label"
                    );
                    report.skipped += 1;
                    continue;
                }
            },
        };

        // Check against the graph as it will look once the old edge is gone,
        // so a conforming edge can always be replaced by itself.
        match link::check_multiplicity(txn, rule, edge.out_v, edge.in_v, Some(edge.id)) {
            Ok(()) => {}
            Err(MigrationError::Multiplicity { shape }) => {
                *report.multiplicity.entry(shape.to_string()).or_insert(0) += 1;
                continue;
            }
            Err(err) => return Err(err),
        }
        txn.remove_edge(edge.id)?;
        link::create_ruled_edge(txn, rule, edge.out_v, edge.in_v)?;
        report.processed += 1;
    }

    report.duration_ms = start.elapsed().as_secs_f64() * 1_000.0;
    info!(
        processed = report.processed,
        skipped = report.skipped,
        missing_parentage = report.missing_parentage,
        multiplicity_violations = report.multiplicity.values().sum::<u64>(),
        duration_ms = report.duration_ms,
        "migrate.reconcile.completed"
    );
    Ok(report)
}

/// Determines the relation kind of an edge from its parentage marker,
/// falling back to the catalogue when the marker is absent: if every rule
/// between the endpoint types agrees on one kind, that kind is used
/// (tallied as missing metadata); disagreement means the edge is skipped.
fn edge_kind(
    edge: &Edge,
    catalog: &RuleCatalog,
    out_type: &str,
    in_type: &str,
    report: &mut ReconcileReport,
) -> Option<RelationKind> {
    if let Some(marker) = edge.properties.get(PARENTAGE_KEY) {
        if let Some(kind) = RelationKind::from_marker(marker) {
            return Some(kind);
        }
    }
    report.missing_parentage += 1;
    let rules = catalog.rules_between(out_type, in_type);
    let mut kinds = rules.iter().map(|rule| rule.kind);
    let first = kinds.next()?;
    kinds.all(|kind| kind == first).then_some(first)
}
