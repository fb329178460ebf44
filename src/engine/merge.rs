//! Recursive vertex merge.
//!
//! Folds a secondary vertex's properties, tree children, and cousin
//! relations into a primary vertex of the same domain, then deletes the
//! secondary. Children shared by both sides (same structural identity) merge
//! recursively; children only the secondary has are re-parented; cousins
//! only the secondary has are re-pointed, unless the primary already holds
//! an equivalent relation.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::{MigrationError, Result};
use crate::model::{Direction, Edge, Vertex, VertexId};
use crate::notify::{EventKind, NotificationSink, VertexEvent};
use crate::rules::{RelationKind, PARENTAGE_KEY};
use crate::store::GraphTxn;

const DEFAULT_NATURAL_KEY: &str = "name";

/// Per-node-type merge policy.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Properties that are always overwritten from secondary onto primary,
    /// keyed by the primary's node type.
    pub force_copy: BTreeMap<String, BTreeSet<String>>,
    /// Properties forming a child's structural identity, keyed by node type.
    /// Types without an entry use `name`.
    pub natural_keys: BTreeMap<String, Vec<String>>,
}

impl MergeOptions {
    fn is_forced(&self, node_type: &str, property: &str) -> bool {
        self.force_copy
            .get(node_type)
            .is_some_and(|set| set.contains(property))
    }

    /// The structural identity of a vertex: its node type plus the rendered
    /// values of its natural-key properties.
    fn structural_identity(&self, vertex: &Vertex) -> String {
        let mut identity = vertex.node_type.clone();
        let default_keys = [DEFAULT_NATURAL_KEY.to_string()];
        let keys = self
            .natural_keys
            .get(&vertex.node_type)
            .map(Vec::as_slice)
            .unwrap_or(&default_keys);
        for key in keys {
            identity.push('\u{1f}');
            if let Some(values) = vertex.properties.get(key) {
                for value in values {
                    identity.push_str(&value.to_string());
                    identity.push('\u{1e}');
                }
            }
        }
        identity
    }
}

/// Result of one merge call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    /// Properties copied (or force-copied) onto a primary-side vertex.
    pub properties_copied: u64,
    /// Individual values added by multi-valued unions.
    pub values_unioned: u64,
    /// Child pairs merged recursively.
    pub children_merged: u64,
    /// Secondary-only children re-parented onto a primary-side vertex.
    pub children_reparented: u64,
    /// Secondary-only cousins re-pointed onto a primary-side vertex.
    pub cousins_repointed: u64,
    /// Vertices deleted (the secondary and recursively merged children).
    pub vertices_removed: u64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

/// Merges `secondary` into `primary` and deletes `secondary`.
///
/// The primary's identity is never destroyed; the secondary is always
/// destroyed on success. Emits a delete event for the secondary and an
/// update event for the primary through `sink`; sink failures are logged and
/// never escalated.
pub fn merge_vertices(
    txn: &mut dyn GraphTxn,
    primary: VertexId,
    secondary: VertexId,
    options: &MergeOptions,
    sink: &mut dyn NotificationSink,
) -> Result<MergeReport> {
    let start = Instant::now();
    if primary == secondary {
        return Err(MigrationError::Precondition(format!(
            "cannot merge vertex {primary} into itself"
        )));
    }
    txn.vertex(primary)?.ok_or_else(|| {
        MigrationError::Precondition(format!("primary vertex {primary} not found"))
    })?;
    let secondary_before = txn.vertex(secondary)?.ok_or_else(|| {
        MigrationError::Precondition(format!("secondary vertex {secondary} not found"))
    })?;
    let secondary_related = related_vertices(txn, secondary);

    let mut report = MergeReport::default();
    let mut visited = FxHashSet::default();
    merge_into(txn, primary, secondary, options, &mut report, &mut visited)?;

    emit(
        sink,
        VertexEvent {
            kind: EventKind::Delete,
            vertex: secondary_before,
            related: secondary_related,
        },
    );
    if let Some(primary_after) = txn.vertex(primary)? {
        let related = related_vertices(txn, primary);
        emit(
            sink,
            VertexEvent {
                kind: EventKind::Update,
                vertex: primary_after,
                related,
            },
        );
    }

    report.duration_ms = start.elapsed().as_secs_f64() * 1_000.0;
    info!(
        primary,
        secondary,
        properties_copied = report.properties_copied,
        children_merged = report.children_merged,
        children_reparented = report.children_reparented,
        cousins_repointed = report.cousins_repointed,
        vertices_removed = report.vertices_removed,
        duration_ms = report.duration_ms,
        "migrate.merge.completed"
    );
    Ok(report)
}

fn merge_into(
    txn: &mut dyn GraphTxn,
    primary: VertexId,
    secondary: VertexId,
    options: &MergeOptions,
    report: &mut MergeReport,
    visited: &mut FxHashSet<(VertexId, VertexId)>,
) -> Result<()> {
    if !visited.insert((primary, secondary)) {
        return Ok(());
    }
    let primary_vertex = txn.vertex(primary)?.ok_or_else(|| {
        MigrationError::Precondition(format!("primary vertex {primary} not found"))
    })?;
    let secondary_vertex = txn.vertex(secondary)?.ok_or_else(|| {
        MigrationError::Precondition(format!("secondary vertex {secondary} not found"))
    })?;

    merge_properties(txn, &primary_vertex, &secondary_vertex, options, report)?;
    merge_children(txn, primary, secondary, options, report, visited)?;
    repoint_cousins(txn, primary, secondary, report)?;

    txn.remove_vertex(secondary)?;
    report.vertices_removed += 1;
    Ok(())
}

fn merge_properties(
    txn: &mut dyn GraphTxn,
    primary: &Vertex,
    secondary: &Vertex,
    options: &MergeOptions,
    report: &mut MergeReport,
) -> Result<()> {
    for (key, secondary_values) in &secondary.properties {
        match primary.properties.get(key) {
            None => {
                txn.set_vertex_property(primary.id, key, secondary_values.clone())?;
                report.properties_copied += 1;
            }
            Some(_) if options.is_forced(&primary.node_type, key) => {
                txn.set_vertex_property(primary.id, key, secondary_values.clone())?;
                report.properties_copied += 1;
            }
            Some(primary_values)
                if primary_values.len() > 1 || secondary_values.len() > 1 =>
            {
                let mut union = primary_values.clone();
                let mut added = 0u64;
                for value in secondary_values {
                    if !union.contains(value) {
                        union.push(value.clone());
                        added += 1;
                    }
                }
                if added > 0 {
                    txn.set_vertex_property(primary.id, key, union)?;
                    report.values_unioned += added;
                }
            }
            // Single-valued and present on both sides: primary wins.
            Some(_) => {}
        }
    }
    Ok(())
}

fn is_tree(edge: &Edge) -> bool {
    edge.properties
        .get(PARENTAGE_KEY)
        .and_then(RelationKind::from_marker)
        == Some(RelationKind::Tree)
}

/// Hierarchical children of `parent`: in-vertices of its outgoing tree edges.
fn tree_children(txn: &dyn GraphTxn, parent: VertexId) -> Result<Vec<(Edge, Vertex)>> {
    let mut children = Vec::new();
    for edge in txn.edges(parent, Direction::Out, None)? {
        if !is_tree(&edge) {
            continue;
        }
        if let Some(child) = txn.vertex(edge.in_v)? {
            children.push((edge, child));
        }
    }
    Ok(children)
}

fn merge_children(
    txn: &mut dyn GraphTxn,
    primary: VertexId,
    secondary: VertexId,
    options: &MergeOptions,
    report: &mut MergeReport,
    visited: &mut FxHashSet<(VertexId, VertexId)>,
) -> Result<()> {
    let primary_children: BTreeMap<String, VertexId> = tree_children(txn, primary)?
        .into_iter()
        .map(|(_, child)| (options.structural_identity(&child), child.id))
        .collect();

    for (edge, child) in tree_children(txn, secondary)? {
        if child.id == primary || child.id == secondary {
            // Self-parenting shapes; the offending edge dies with the
            // secondary instead of being folded into the primary.
            continue;
        }
        match primary_children.get(&options.structural_identity(&child)) {
            Some(&existing) if existing == child.id => {
                // Already a child of both sides; the duplicate tree edge
                // dies with the secondary.
            }
            Some(&existing) => {
                debug!(
                    primary_child = existing,
                    secondary_child = child.id,
                    "migrate.merge.child_pair"
                );
                merge_into(txn, existing, child.id, options, report, visited)?;
                report.children_merged += 1;
            }
            None => {
                let properties = edge.properties.clone();
                txn.remove_edge(edge.id)?;
                txn.create_edge(primary, child.id, &edge.label, properties)?;
                report.children_reparented += 1;
            }
        }
    }
    Ok(())
}

/// Re-points every non-tree relation of the secondary onto the primary,
/// skipping relations the primary already holds an equivalent of.
fn repoint_cousins(
    txn: &mut dyn GraphTxn,
    primary: VertexId,
    secondary: VertexId,
    report: &mut MergeReport,
) -> Result<()> {
    let mut held: BTreeSet<(String, VertexId)> = txn
        .edges(primary, Direction::Both, None)?
        .into_iter()
        .map(|edge| (edge.label.clone(), edge.other(primary)))
        .collect();
    for edge in txn.edges(secondary, Direction::Both, None)? {
        if is_tree(&edge) {
            continue;
        }
        let far = edge.other(secondary);
        if far == primary {
            continue;
        }
        if !held.insert((edge.label.clone(), far)) {
            continue;
        }
        let out_v = if edge.out_v == secondary { primary } else { edge.out_v };
        let in_v = if edge.in_v == secondary { primary } else { edge.in_v };
        let properties = edge.properties.clone();
        txn.remove_edge(edge.id)?;
        txn.create_edge(out_v, in_v, &edge.label, properties)?;
        report.cousins_repointed += 1;
    }
    Ok(())
}

/// Best-effort snapshot of a vertex's neighbors. A failure to fetch any of
/// them degrades to a partial list.
fn related_vertices(txn: &dyn GraphTxn, id: VertexId) -> Vec<Vertex> {
    let mut related = Vec::new();
    let edges = match txn.edges(id, Direction::Both, None) {
        Ok(edges) => edges,
        Err(err) => {
            warn!(vertex = id, error = %err, "migrate.merge.relations_unavailable");
            return related;
        }
    };
    for edge in edges {
        let far = edge.other(id);
        if far == id {
            continue;
        }
        match txn.vertex(far) {
            Ok(Some(vertex)) => related.push(vertex),
            Ok(None) => {}
            Err(err) => {
                warn!(vertex = id, neighbor = far, error = %err, "migrate.merge.relation_fetch_failed");
            }
        }
    }
    related
}

fn emit(sink: &mut dyn NotificationSink, event: VertexEvent) {
    let kind = event.kind;
    let vertex = event.vertex.id;
    if let Err(err) = sink.publish(event) {
        warn!(?kind, vertex, error = %err, "migrate.merge.notification_dropped");
    }
}
