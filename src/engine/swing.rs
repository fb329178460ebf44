//! Edge swinging: retargeting edges from one vertex onto another of the
//! same node type, preserving label and properties.
//!
//! What is safe to do with the drained old vertex depends on the calling
//! migration's domain knowledge, so cleanup is a caller-supplied hook
//! invoked once after all swinging completes.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::engine::{MigrationError, Result};
use crate::model::{Direction, VertexId};
use crate::store::GraphTxn;

/// One edge-swing request.
#[derive(Debug, Clone)]
pub struct SwingSpec {
    /// Vertex losing its edges.
    pub old: VertexId,
    /// Vertex receiving them; must share the old vertex's node type.
    pub new: VertexId,
    /// Restrict to edges whose far endpoint has this node type.
    pub far_type: Option<String>,
    /// Restrict to edges with this label.
    pub label: Option<String>,
    /// Which incident edges move.
    pub direction: Direction,
}

impl SwingSpec {
    /// Swings every edge, both directions, no restrictions.
    pub fn all(old: VertexId, new: VertexId) -> Self {
        Self {
            old,
            new,
            far_type: None,
            label: None,
            direction: Direction::Both,
        }
    }
}

/// Hook invoked once after all swinging completes.
pub trait SwingCleanup {
    /// Disposes of (or keeps) the drained old vertex.
    fn after_swing(&mut self, txn: &mut dyn GraphTxn, old: VertexId) -> Result<()>;
}

/// Cleanup that leaves the old vertex in place.
#[derive(Debug, Default)]
pub struct KeepVertex;

impl SwingCleanup for KeepVertex {
    fn after_swing(&mut self, _txn: &mut dyn GraphTxn, _old: VertexId) -> Result<()> {
        Ok(())
    }
}

/// Result of one swing call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SwingReport {
    /// Edges matching the direction/label restriction.
    pub examined: u64,
    /// Edges moved onto the new vertex.
    pub swung: u64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

/// Moves every matching edge from `spec.old` onto `spec.new`.
///
/// Validates before any mutation: both vertices must exist and share a node
/// type. A violation aborts the whole call untouched.
pub fn swing_edges(
    txn: &mut dyn GraphTxn,
    spec: &SwingSpec,
    cleanup: &mut dyn SwingCleanup,
) -> Result<SwingReport> {
    let start = Instant::now();
    let old = txn
        .vertex(spec.old)?
        .ok_or_else(|| MigrationError::Precondition(format!("old vertex {} not found", spec.old)))?;
    let new = txn
        .vertex(spec.new)?
        .ok_or_else(|| MigrationError::Precondition(format!("new vertex {} not found", spec.new)))?;
    if old.node_type != new.node_type {
        return Err(MigrationError::Precondition(format!(
            "cannot swing between node types `{}` and `{}`",
            old.node_type, new.node_type
        )));
    }

    let mut report = SwingReport::default();
    let edges = txn.edges(spec.old, spec.direction, spec.label.as_deref())?;
    report.examined = edges.len() as u64;
    for edge in edges {
        if let Some(want) = &spec.far_type {
            let far = edge.other(spec.old);
            let matches = txn
                .vertex(far)?
                .map(|vertex| vertex.node_type == *want)
                .unwrap_or(false);
            if !matches {
                continue;
            }
        }
        // Capture, delete, recreate: the replacement carries the same label
        // and full property map, with the old endpoint swapped for the new.
        let out_v = if edge.out_v == spec.old { spec.new } else { edge.out_v };
        let in_v = if edge.in_v == spec.old { spec.new } else { edge.in_v };
        let properties = edge.properties.clone();
        txn.remove_edge(edge.id)?;
        txn.create_edge(out_v, in_v, &edge.label, properties)?;
        debug!(
            edge = edge.id,
            label = %edge.label,
            from = spec.old,
            to = spec.new,
            "migrate.swing.moved"
        );
        report.swung += 1;
    }

    cleanup.after_swing(txn, spec.old)?;
    report.duration_ms = start.elapsed().as_secs_f64() * 1_000.0;
    info!(
        old = spec.old,
        new = spec.new,
        examined = report.examined,
        swung = report.swung,
        duration_ms = report.duration_ms,
        "migrate.swing.completed"
    );
    Ok(report)
}
