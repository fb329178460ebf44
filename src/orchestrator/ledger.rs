//! The idempotency ledger.
//!
//! A dedicated vertex, located by its boolean marker property, holds one
//! boolean property per migration name that has completed against this
//! store. The marker and per-migration key definitions are ensured
//! idempotently before a run; the value write for a completing migration
//! shares that migration's transaction so a rollback discards it.

use tracing::debug;

use crate::engine::Result;
use crate::model::{Cardinality, PropertyValue, ValueType, VertexId};
use crate::store::{GraphStore, GraphTxn, PropertyKeyDef};

/// Marker property identifying the ledger vertex.
pub const LEDGER_MARKER: &str = "migration-ledger";

const LEDGER_NODE_TYPE: &str = "migration-ledger";

/// Ensures the ledger vertex and its property keys exist, returning the
/// ledger vertex id. Safe to call repeatedly.
pub fn ensure(store: &dyn GraphStore, migration_names: &[&str]) -> Result<VertexId> {
    let mut mgmt = store.manage()?;
    let mut defined = 0usize;
    if mgmt.property_key(LEDGER_MARKER)?.is_none() {
        mgmt.define_property_key(PropertyKeyDef::new(
            LEDGER_MARKER,
            ValueType::Bool,
            Cardinality::Single,
        ))?;
        defined += 1;
    }
    for name in migration_names {
        if mgmt.property_key(name)?.is_none() {
            mgmt.define_property_key(PropertyKeyDef::new(
                *name,
                ValueType::Bool,
                Cardinality::Single,
            ))?;
            defined += 1;
        }
    }
    if defined > 0 {
        mgmt.commit()?;
    } else {
        mgmt.rollback()?;
    }

    let mut txn = store.begin()?;
    if let Some(&id) = txn
        .vertices_by_property(LEDGER_MARKER, &PropertyValue::Bool(true))?
        .first()
    {
        txn.rollback()?;
        return Ok(id);
    }
    let id = txn.create_vertex(LEDGER_NODE_TYPE)?;
    txn.set_vertex_property(id, LEDGER_MARKER, vec![PropertyValue::Bool(true)])?;
    txn.commit()?;
    debug!(ledger = id, "orchestrator.ledger.created");
    Ok(id)
}

/// Whether the named migration has a completion record.
pub fn is_recorded(txn: &dyn GraphTxn, ledger: VertexId, name: &str) -> Result<bool> {
    Ok(txn
        .vertex_property(ledger, name)?
        .contains(&PropertyValue::Bool(true)))
}

/// Records the named migration as completed, inside the caller's
/// transaction.
pub fn record(txn: &mut dyn GraphTxn, ledger: VertexId, name: &str) -> Result<()> {
    txn.set_vertex_property(ledger, name, vec![PropertyValue::Bool(true)])?;
    Ok(())
}
