//! Graph store facade.
//!
//! The migration engine never talks to a concrete graph database. It issues
//! every operation through the narrow traits in this module: [`GraphStore`]
//! hands out data transactions and management sessions, [`GraphTxn`] covers
//! transactional vertex/edge CRUD plus the two traversals the engine needs
//! (property equality, edge label/direction), and [`SchemaSession`] covers
//! property-key and composite-index definition. Any backend that implements
//! these traits can be migrated; [`MemoryStore`] is the reference
//! implementation used by the tests and the in-memory CLI backend.

mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Cardinality, Direction, Edge, EdgeId, PropertyValue, ValueType, Vertex, VertexId};

pub use memory::MemoryStore;

/// Schema definition of a single property key.
///
/// A key name is globally unique across the schema. Retiring a definition
/// under a new name is the only way to free the name for a fresh definition
/// with a different type or cardinality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyKeyDef {
    /// Globally unique key name.
    pub name: String,
    /// Value type each stored element must inhabit.
    pub value_type: ValueType,
    /// How many values one vertex may hold under this key.
    pub cardinality: Cardinality,
    /// Whether the store applies strict-consistency checks to this key.
    pub consistency_lock: bool,
}

impl PropertyKeyDef {
    /// Convenience constructor with the lock cleared.
    pub fn new(name: impl Into<String>, value_type: ValueType, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            value_type,
            cardinality,
            consistency_lock: false,
        }
    }
}

/// Definition of a composite index over exactly one property key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name, unique among indexes.
    pub name: String,
    /// The single property key the index covers.
    pub key: String,
    /// Whether the index enforces global value uniqueness.
    pub unique: bool,
    /// Whether the store applies strict-consistency checks to this index.
    pub consistency_lock: bool,
}

/// Entry point to a backing graph store.
pub trait GraphStore {
    /// Opens a data transaction. Mutations buffer until [`GraphTxn::commit`].
    fn begin(&self) -> Result<Box<dyn GraphTxn + '_>>;

    /// Opens a schema management session. The session is a single-owner
    /// resource: at most one schema mutation is in flight at a time.
    fn manage(&self) -> Result<Box<dyn SchemaSession + '_>>;
}

/// A data transaction over vertices and edges.
///
/// All reads observe the transaction's own pending writes. A transaction must
/// be explicitly committed or rolled back; implementations are free to treat
/// a drop without either as a rollback.
pub trait GraphTxn {
    /// Reads a vertex, or `None` when the id is unknown.
    fn vertex(&self, id: VertexId) -> Result<Option<Vertex>>;

    /// Creates a vertex of the given node type and returns its id.
    fn create_vertex(&mut self, node_type: &str) -> Result<VertexId>;

    /// Removes a vertex together with every incident edge.
    fn remove_vertex(&mut self, id: VertexId) -> Result<()>;

    /// Ids of every vertex holding the named property, in ascending order.
    fn vertices_with_property(&self, key: &str) -> Result<Vec<VertexId>>;

    /// Ids of every vertex holding `value` under `key`, in ascending order.
    fn vertices_by_property(&self, key: &str, value: &PropertyValue) -> Result<Vec<VertexId>>;

    /// The values a vertex holds under `key`; empty when absent.
    fn vertex_property(&self, id: VertexId, key: &str) -> Result<Vec<PropertyValue>>;

    /// Replaces the values a vertex holds under `key`, subject to the key's
    /// type, cardinality, and any unique index.
    fn set_vertex_property(
        &mut self,
        id: VertexId,
        key: &str,
        values: Vec<PropertyValue>,
    ) -> Result<()>;

    /// Removes `key` from the vertex. Removing an absent key is a no-op.
    fn remove_vertex_property(&mut self, id: VertexId, key: &str) -> Result<()>;

    /// Edges incident to `id` in the given direction, optionally restricted
    /// to one label. `Both` lists a self-loop once.
    fn edges(&self, id: VertexId, direction: Direction, label: Option<&str>) -> Result<Vec<Edge>>;

    /// Every edge in the store. Reconciliation's unrestricted scan.
    fn all_edges(&self) -> Result<Vec<Edge>>;

    /// Creates an edge and returns its id.
    fn create_edge(
        &mut self,
        out_v: VertexId,
        in_v: VertexId,
        label: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<EdgeId>;

    /// Removes an edge.
    fn remove_edge(&mut self, id: EdgeId) -> Result<()>;

    /// Makes every buffered mutation visible atomically.
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every buffered mutation.
    fn rollback(self: Box<Self>) -> Result<()>;
}

/// A schema management session.
pub trait SchemaSession {
    /// Looks up a property key definition by name.
    fn property_key(&self, name: &str) -> Result<Option<PropertyKeyDef>>;

    /// Defines a fresh property key. Fails when the name is taken.
    fn define_property_key(&mut self, def: PropertyKeyDef) -> Result<()>;

    /// Renames a property key. Metadata-only, immediate and atomic at
    /// commit; existing data becomes reachable under the new name.
    fn rename_property_key(&mut self, old: &str, new: &str) -> Result<()>;

    /// Looks up a composite index by name.
    fn index(&self, name: &str) -> Result<Option<IndexSpec>>;

    /// Defines a composite index. A unique index must never come into
    /// existence while duplicate values are stored under its key.
    fn define_index(&mut self, spec: IndexSpec) -> Result<()>;

    /// Applies every buffered schema mutation atomically.
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every buffered schema mutation.
    fn rollback(self: Box<Self>) -> Result<()>;
}
