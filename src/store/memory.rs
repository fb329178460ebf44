//! In-memory reference implementation of the store facade.
//!
//! Transactions clone the current graph image and swap it back on commit,
//! which gives the engine the exact transaction boundaries it depends on.
//! The engine is single-threaded and batch-sequential, so one writer at a
//! time is the supported usage; the image swap makes a commit atomic with
//! respect to readers. Schema sessions buffer their mutations as an op log
//! applied to the live image on commit, so a property-key rename lands
//! together with the data it re-labels.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::model::{
    Cardinality, Direction, Edge, EdgeId, PropertyValue, Vertex, VertexId,
};
use crate::store::{GraphStore, GraphTxn, IndexSpec, PropertyKeyDef, SchemaSession};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Schema {
    keys: BTreeMap<String, PropertyKeyDef>,
    indexes: BTreeMap<String, IndexSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct GraphImage {
    schema: Schema,
    vertices: BTreeMap<VertexId, Vertex>,
    edges: BTreeMap<EdgeId, Edge>,
    next_vertex_id: VertexId,
    next_edge_id: EdgeId,
}

/// Shared-handle in-memory graph store.
///
/// Cloning the store clones the handle, not the graph; all clones observe the
/// same image.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<GraphImage>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes the full graph image (schema and data) to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&*self.inner.read())
            .map_err(|err| StoreError::Serialization(err.to_string()))
    }

    /// Restores a store from an image produced by [`MemoryStore::to_json`].
    pub fn from_json(raw: &str) -> Result<Self> {
        let image: GraphImage =
            serde_json::from_str(raw).map_err(|err| StoreError::Serialization(err.to_string()))?;
        Ok(Self {
            inner: Arc::new(RwLock::new(image)),
        })
    }

    /// Number of vertices currently stored.
    pub fn vertex_count(&self) -> usize {
        self.inner.read().vertices.len()
    }

    /// Number of edges currently stored.
    pub fn edge_count(&self) -> usize {
        self.inner.read().edges.len()
    }
}

impl GraphStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn GraphTxn + '_>> {
        let image = self.inner.read().clone();
        Ok(Box::new(MemTxn { store: self, image }))
    }

    fn manage(&self) -> Result<Box<dyn SchemaSession + '_>> {
        let view = self.inner.read().schema.clone();
        Ok(Box::new(MemSession {
            store: self,
            view,
            ops: Vec::new(),
        }))
    }
}

struct MemTxn<'s> {
    store: &'s MemoryStore,
    image: GraphImage,
}

impl MemTxn<'_> {
    fn vertex_ref(&self, id: VertexId) -> Result<&Vertex> {
        self.image
            .vertices
            .get(&id)
            .ok_or(StoreError::VertexNotFound(id))
    }

    /// Validates `values` against the key definition and any unique index,
    /// returning the (possibly deduplicated) values to store.
    fn admit_values(
        &self,
        id: VertexId,
        key: &str,
        values: Vec<PropertyValue>,
    ) -> Result<Vec<PropertyValue>> {
        let def = self
            .image
            .schema
            .keys
            .get(key)
            .ok_or_else(|| StoreError::UnknownPropertyKey(key.to_string()))?;
        for value in &values {
            if value.value_type() != def.value_type {
                return Err(StoreError::PropertyRejected {
                    key: key.to_string(),
                    reason: format!(
                        "expected {} value, got {}",
                        def.value_type,
                        value.value_type()
                    ),
                });
            }
        }
        let values = match def.cardinality {
            Cardinality::Single => {
                if values.len() > 1 {
                    return Err(StoreError::PropertyRejected {
                        key: key.to_string(),
                        reason: format!("single-cardinality key given {} values", values.len()),
                    });
                }
                values
            }
            Cardinality::Set => {
                let mut seen = Vec::with_capacity(values.len());
                for value in values {
                    if !seen.contains(&value) {
                        seen.push(value);
                    }
                }
                seen
            }
            Cardinality::List => values,
        };

        let unique = self
            .image
            .schema
            .indexes
            .values()
            .any(|spec| spec.unique && spec.key == key);
        if unique {
            for value in &values {
                let clash = self.image.vertices.values().any(|vertex| {
                    vertex.id != id
                        && vertex
                            .properties
                            .get(key)
                            .is_some_and(|held| held.contains(value))
                });
                if clash {
                    return Err(StoreError::UniquenessViolation {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(values)
    }
}

impl GraphTxn for MemTxn<'_> {
    fn vertex(&self, id: VertexId) -> Result<Option<Vertex>> {
        Ok(self.image.vertices.get(&id).cloned())
    }

    fn create_vertex(&mut self, node_type: &str) -> Result<VertexId> {
        self.image.next_vertex_id += 1;
        let id = self.image.next_vertex_id;
        self.image.vertices.insert(id, Vertex::new(id, node_type));
        Ok(id)
    }

    fn remove_vertex(&mut self, id: VertexId) -> Result<()> {
        if self.image.vertices.remove(&id).is_none() {
            return Err(StoreError::VertexNotFound(id));
        }
        self.image
            .edges
            .retain(|_, edge| edge.out_v != id && edge.in_v != id);
        Ok(())
    }

    fn vertices_with_property(&self, key: &str) -> Result<Vec<VertexId>> {
        Ok(self
            .image
            .vertices
            .values()
            .filter(|vertex| vertex.properties.contains_key(key))
            .map(|vertex| vertex.id)
            .collect())
    }

    fn vertices_by_property(&self, key: &str, value: &PropertyValue) -> Result<Vec<VertexId>> {
        Ok(self
            .image
            .vertices
            .values()
            .filter(|vertex| {
                vertex
                    .properties
                    .get(key)
                    .is_some_and(|held| held.contains(value))
            })
            .map(|vertex| vertex.id)
            .collect())
    }

    fn vertex_property(&self, id: VertexId, key: &str) -> Result<Vec<PropertyValue>> {
        Ok(self
            .vertex_ref(id)?
            .properties
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    fn set_vertex_property(
        &mut self,
        id: VertexId,
        key: &str,
        values: Vec<PropertyValue>,
    ) -> Result<()> {
        self.vertex_ref(id)?;
        let admitted = self.admit_values(id, key, values)?;
        let vertex = self
            .image
            .vertices
            .get_mut(&id)
            .ok_or(StoreError::VertexNotFound(id))?;
        if admitted.is_empty() {
            vertex.properties.remove(key);
        } else {
            vertex.properties.insert(key.to_string(), admitted);
        }
        Ok(())
    }

    fn remove_vertex_property(&mut self, id: VertexId, key: &str) -> Result<()> {
        let vertex = self
            .image
            .vertices
            .get_mut(&id)
            .ok_or(StoreError::VertexNotFound(id))?;
        vertex.properties.remove(key);
        Ok(())
    }

    fn edges(&self, id: VertexId, direction: Direction, label: Option<&str>) -> Result<Vec<Edge>> {
        self.vertex_ref(id)?;
        Ok(self
            .image
            .edges
            .values()
            .filter(|edge| match direction {
                Direction::Out => edge.out_v == id,
                Direction::In => edge.in_v == id,
                Direction::Both => edge.out_v == id || edge.in_v == id,
            })
            .filter(|edge| label.map_or(true, |want| edge.label == want))
            .cloned()
            .collect())
    }

    fn all_edges(&self) -> Result<Vec<Edge>> {
        Ok(self.image.edges.values().cloned().collect())
    }

    fn create_edge(
        &mut self,
        out_v: VertexId,
        in_v: VertexId,
        label: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<EdgeId> {
        self.vertex_ref(out_v)?;
        self.vertex_ref(in_v)?;
        self.image.next_edge_id += 1;
        let id = self.image.next_edge_id;
        self.image.edges.insert(
            id,
            Edge {
                id,
                label: label.to_string(),
                out_v,
                in_v,
                properties,
            },
        );
        Ok(id)
    }

    fn remove_edge(&mut self, id: EdgeId) -> Result<()> {
        self.image
            .edges
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::EdgeNotFound(id))
    }

    fn commit(self: Box<Self>) -> Result<()> {
        *self.store.inner.write() = self.image;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum SchemaOp {
    DefineKey(PropertyKeyDef),
    RenameKey { old: String, new: String },
    DefineIndex(IndexSpec),
}

struct MemSession<'s> {
    store: &'s MemoryStore,
    view: Schema,
    ops: Vec<SchemaOp>,
}

fn apply_op(image: &mut GraphImage, op: &SchemaOp) -> Result<()> {
    match op {
        SchemaOp::DefineKey(def) => {
            if image.schema.keys.contains_key(&def.name) {
                return Err(StoreError::SchemaViolation(format!(
                    "property key `{}` already defined",
                    def.name
                )));
            }
            image.schema.keys.insert(def.name.clone(), def.clone());
        }
        SchemaOp::RenameKey { old, new } => {
            if image.schema.keys.contains_key(new) {
                return Err(StoreError::SchemaViolation(format!(
                    "cannot rename `{old}`: `{new}` already defined"
                )));
            }
            let mut def = image
                .schema
                .keys
                .remove(old)
                .ok_or_else(|| StoreError::UnknownPropertyKey(old.clone()))?;
            def.name = new.clone();
            image.schema.keys.insert(new.clone(), def);
            // Data is addressed by name in this backend, so the rename
            // re-labels stored values in the same atomic application.
            for vertex in image.vertices.values_mut() {
                if let Some(values) = vertex.properties.remove(old) {
                    vertex.properties.insert(new.clone(), values);
                }
            }
            for index in image.schema.indexes.values_mut() {
                if index.key == *old {
                    index.key = new.clone();
                }
            }
        }
        SchemaOp::DefineIndex(spec) => {
            if image.schema.indexes.contains_key(&spec.name) {
                return Err(StoreError::SchemaViolation(format!(
                    "index `{}` already defined",
                    spec.name
                )));
            }
            if !image.schema.keys.contains_key(&spec.key) {
                return Err(StoreError::UnknownPropertyKey(spec.key.clone()));
            }
            if spec.unique {
                let mut seen: BTreeMap<&PropertyValue, VertexId> = BTreeMap::new();
                for vertex in image.vertices.values() {
                    for value in vertex.properties.get(&spec.key).into_iter().flatten() {
                        if seen.insert(value, vertex.id).is_some() {
                            return Err(StoreError::SchemaViolation(format!(
                                "cannot create unique index `{}`: duplicate value `{value}` under `{}`",
                                spec.name, spec.key
                            )));
                        }
                    }
                }
            }
            image.schema.indexes.insert(spec.name.clone(), spec.clone());
        }
    }
    Ok(())
}

impl SchemaSession for MemSession<'_> {
    fn property_key(&self, name: &str) -> Result<Option<PropertyKeyDef>> {
        Ok(self.view.keys.get(name).cloned())
    }

    fn define_property_key(&mut self, def: PropertyKeyDef) -> Result<()> {
        if self.view.keys.contains_key(&def.name) {
            return Err(StoreError::SchemaViolation(format!(
                "property key `{}` already defined",
                def.name
            )));
        }
        self.view.keys.insert(def.name.clone(), def.clone());
        self.ops.push(SchemaOp::DefineKey(def));
        Ok(())
    }

    fn rename_property_key(&mut self, old: &str, new: &str) -> Result<()> {
        if self.view.keys.contains_key(new) {
            return Err(StoreError::SchemaViolation(format!(
                "cannot rename `{old}`: `{new}` already defined"
            )));
        }
        let mut def = self
            .view
            .keys
            .remove(old)
            .ok_or_else(|| StoreError::UnknownPropertyKey(old.to_string()))?;
        def.name = new.to_string();
        self.view.keys.insert(new.to_string(), def);
        self.ops.push(SchemaOp::RenameKey {
            old: old.to_string(),
            new: new.to_string(),
        });
        Ok(())
    }

    fn index(&self, name: &str) -> Result<Option<IndexSpec>> {
        Ok(self.view.indexes.get(name).cloned())
    }

    fn define_index(&mut self, spec: IndexSpec) -> Result<()> {
        if self.view.indexes.contains_key(&spec.name) {
            return Err(StoreError::SchemaViolation(format!(
                "index `{}` already defined",
                spec.name
            )));
        }
        if !self.view.keys.contains_key(&spec.key) {
            return Err(StoreError::UnknownPropertyKey(spec.key.clone()));
        }
        self.view.indexes.insert(spec.name.clone(), spec.clone());
        self.ops.push(SchemaOp::DefineIndex(spec));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let mut guard = self.store.inner.write();
        let mut staged = guard.clone();
        for op in &self.ops {
            apply_op(&mut staged, op)?;
        }
        *guard = staged;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
