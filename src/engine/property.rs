//! Property type/cardinality migration.
//!
//! Retires the existing property-key definition under a timestamped name,
//! defines a fresh key (and optional composite index) under the original
//! name, then carries the captured data over vertex by vertex. The batched
//! variant bounds transaction size: every batch commits on its own, and a
//! failing batch is isolated, logged, and reported for manual reconciliation
//! instead of aborting the rest of the run.

use std::fmt;
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::{MigrationError, Result};
use crate::model::{Cardinality, PropertyValue, ValueType, VertexId};
use crate::store::{GraphStore, GraphTxn, IndexSpec, PropertyKeyDef};

/// Index treatment for the freshly defined key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexKind {
    /// No index.
    None,
    /// Composite index without a uniqueness constraint.
    NonUnique,
    /// Composite index enforcing global value uniqueness.
    Unique,
}

/// One property migration request.
#[derive(Debug, Clone)]
pub struct PropertyMigration {
    /// Property to migrate.
    pub property: String,
    /// Value type of the fresh definition.
    pub target_type: ValueType,
    /// Cardinality of the fresh definition.
    pub cardinality: Cardinality,
    /// Index treatment for the fresh definition.
    pub index: IndexKind,
    /// Whether captured values are carried onto the fresh key.
    pub preserve_data: bool,
    /// Whether strict-consistency locks are requested on key and index.
    pub consistency_lock: bool,
    /// Data carry-over block size; `None` runs one data transaction.
    pub block_size: Option<usize>,
}

impl PropertyMigration {
    /// A preserve-data migration with no index and no batching.
    pub fn retype(property: impl Into<String>, target_type: ValueType) -> Self {
        Self {
            property: property.into(),
            target_type,
            cardinality: Cardinality::Single,
            index: IndexKind::None,
            preserve_data: true,
            consistency_lock: false,
            block_size: None,
        }
    }
}

/// A batch that failed during carry-over and needs manual reconciliation.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    /// Zero-based batch index in collection order.
    pub batch: usize,
    /// Number of vertices the batch covered.
    pub vertices: usize,
    /// Rendered error.
    pub error: String,
}

/// Result of one property migration run.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyMigrationReport {
    /// The migrated property name.
    pub property: String,
    /// The timestamped name the old definition was retired under. Failed
    /// batches still hold their data under this key.
    pub retired_key: String,
    /// Vertices that held the property when the run started.
    pub vertices_total: usize,
    /// Vertices whose data was carried over (or cleared) and committed.
    pub vertices_migrated: usize,
    /// Individual values dropped by the duplicate guard or because they do
    /// not coerce to the target type.
    pub values_skipped: u64,
    /// Number of carry-over batches formed.
    pub batches_total: usize,
    /// Batches whose transaction failed; their vertices keep the retired
    /// property.
    pub failed_batches: Vec<BatchFailure>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

/// Duplicate values that block a unique index.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    /// Rendered distinct values that occur more than once, sorted.
    pub values: Vec<String>,
    /// Total occurrences of duplicated values across all vertices.
    pub occurrences: u64,
}

impl fmt::Display for DuplicateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unique index refused: {} occurrences across {} duplicated value(s): {:?}",
            self.occurrences,
            self.values.len(),
            self.values
        )
    }
}

type Batch = FxHashMap<VertexId, Vec<PropertyValue>>;

/// Runs a property migration.
pub fn run(store: &dyn GraphStore, migration: &PropertyMigration) -> Result<PropertyMigrationReport> {
    run_with_observer(store, migration, &mut |_, _| {})
}

/// Runs a property migration, reporting `(batches_done, batches_total)`
/// after each carry-over batch.
pub fn run_with_observer(
    store: &dyn GraphStore,
    migration: &PropertyMigration,
    observer: &mut dyn FnMut(usize, usize),
) -> Result<PropertyMigrationReport> {
    let start = Instant::now();
    let property = migration.property.as_str();

    let mgmt = store.manage()?;
    let Some(existing) = mgmt.property_key(property)? else {
        mgmt.rollback()?;
        return Err(MigrationError::MissingPropertyKey(property.to_string()));
    };
    debug!(
        property,
        from = %existing.value_type,
        to = %migration.target_type,
        "migrate.property.begin"
    );

    // Capture before any schema mutation: the captured batches feed both the
    // duplicate scan and the carry-over. An error here aborts the run with
    // zero mutation.
    let batches = {
        let txn = store.begin()?;
        let collected = collect_batches(txn.as_ref(), property, migration.block_size);
        txn.rollback()?;
        match collected {
            Ok(batches) => batches,
            Err(err) => {
                mgmt.rollback()?;
                return Err(err);
            }
        }
    };
    let vertices_total: usize = batches.iter().map(Batch::len).sum();

    if migration.index == IndexKind::Unique {
        if let Some(report) = find_duplicates(&batches) {
            mgmt.rollback()?;
            return Err(MigrationError::DuplicateValues(report));
        }
    }

    let millis = unix_millis();
    let retired_key = format!("{property}-retired-{millis}");
    let schema = apply_schema(mgmt, migration, &retired_key, millis);
    if let Err(err) = schema {
        // The session was rolled back inside apply_schema; no data
        // transaction is open yet.
        return Err(err);
    }
    info!(property, retired = %retired_key, "migrate.property.schema_committed");

    let batches_total = batches.len();
    let mut vertices_migrated = 0usize;
    let mut values_skipped = 0u64;
    let mut failed_batches = Vec::new();
    let mut seen = FxHashSet::default();
    let isolate_failures = migration.block_size.is_some();

    for (index, batch) in batches.iter().enumerate() {
        match carry_batch(store, migration, &retired_key, batch, &mut seen) {
            Ok(skipped) => {
                vertices_migrated += batch.len();
                values_skipped += skipped;
            }
            Err(err) if isolate_failures => {
                warn!(
                    property,
                    batch = index,
                    vertices = batch.len(),
                    error = %err,
                    "migrate.property.batch_failed"
                );
                failed_batches.push(BatchFailure {
                    batch: index,
                    vertices: batch.len(),
                    error: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
        observer(index + 1, batches_total);
    }

    let report = PropertyMigrationReport {
        property: property.to_string(),
        retired_key,
        vertices_total,
        vertices_migrated,
        values_skipped,
        batches_total,
        failed_batches,
        duration_ms: start.elapsed().as_secs_f64() * 1_000.0,
    };
    if report.failed_batches.is_empty() {
        info!(
            property,
            vertices = report.vertices_migrated,
            values_skipped = report.values_skipped,
            batches = report.batches_total,
            duration_ms = report.duration_ms,
            "migrate.property.completed"
        );
    } else {
        warn!(
            property,
            retired = %report.retired_key,
            failed = report.failed_batches.len(),
            batches = report.batches_total,
            "migrate.property.completed_with_failures"
        );
    }
    Ok(report)
}

fn unix_millis() -> i128 {
    time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

fn collect_batches(
    txn: &dyn GraphTxn,
    property: &str,
    block_size: Option<usize>,
) -> Result<Vec<Batch>> {
    let ids = txn.vertices_with_property(property)?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let block = block_size.unwrap_or(ids.len()).max(1);
    let mut batches = Vec::with_capacity(ids.len().div_ceil(block));
    for chunk in ids.chunks(block) {
        let mut batch = Batch::default();
        for &id in chunk {
            batch.insert(id, txn.vertex_property(id, property)?);
        }
        batches.push(batch);
    }
    Ok(batches)
}

/// Merges all captured batches into one value-presence structure; a value is
/// duplicate when, after removing one occurrence, it is still present.
fn find_duplicates(batches: &[Batch]) -> Option<DuplicateReport> {
    let mut counts: FxHashMap<&PropertyValue, u64> = FxHashMap::default();
    for batch in batches {
        for values in batch.values() {
            for value in values {
                *counts.entry(value).or_insert(0) += 1;
            }
        }
    }
    let mut values: Vec<String> = counts
        .iter()
        .filter(|(_, &count)| count > 1)
        .map(|(value, _)| value.to_string())
        .collect();
    if values.is_empty() {
        return None;
    }
    values.sort();
    let occurrences = counts.values().filter(|&&count| count > 1).sum();
    Some(DuplicateReport {
        values,
        occurrences,
    })
}

fn apply_schema(
    mut mgmt: Box<dyn crate::store::SchemaSession + '_>,
    migration: &PropertyMigration,
    retired_key: &str,
    millis: i128,
) -> Result<()> {
    let staged = (|| -> Result<()> {
        mgmt.rename_property_key(&migration.property, retired_key)?;
        mgmt.define_property_key(PropertyKeyDef {
            name: migration.property.clone(),
            value_type: migration.target_type,
            cardinality: migration.cardinality,
            consistency_lock: migration.consistency_lock,
        })?;
        if migration.index != IndexKind::None {
            mgmt.define_index(IndexSpec {
                name: format!("{}-index-{millis}", migration.property),
                key: migration.property.clone(),
                unique: migration.index == IndexKind::Unique,
                consistency_lock: migration.consistency_lock,
            })?;
        }
        Ok(())
    })();
    match staged {
        Ok(()) => {
            mgmt.commit()?;
            Ok(())
        }
        Err(err) => {
            mgmt.rollback()?;
            Err(err)
        }
    }
}

/// Carries one batch in its own transaction, returning how many values were
/// skipped. Any error rolls the batch back untouched.
fn carry_batch(
    store: &dyn GraphStore,
    migration: &PropertyMigration,
    retired_key: &str,
    batch: &Batch,
    seen: &mut FxHashSet<PropertyValue>,
) -> Result<u64> {
    let mut txn = store.begin()?;
    let mut skipped = 0u64;
    let outcome = (|| -> Result<u64> {
        for (&id, captured) in batch {
            if migration.preserve_data {
                let mut carried = Vec::with_capacity(captured.len());
                for value in captured {
                    let Some(coerced) = value.coerce(migration.target_type) else {
                        warn!(
                            property = %migration.property,
                            vertex = id,
                            value = %value,
                            target = %migration.target_type,
                            "migrate.property.value_not_coercible"
                        );
                        skipped += 1;
                        continue;
                    };
                    if migration.index == IndexKind::Unique {
                        if !seen.insert(coerced.clone()) {
                            warn!(
                                property = %migration.property,
                                vertex = id,
                                value = %coerced,
                                "migrate.property.duplicate_value_skipped"
                            );
                            skipped += 1;
                            continue;
                        }
                    }
                    carried.push(coerced);
                }
                if !carried.is_empty() {
                    txn.set_vertex_property(id, &migration.property, carried)?;
                }
            }
            txn.remove_vertex_property(id, retired_key)?;
        }
        Ok(skipped)
    })();
    match outcome {
        Ok(skipped) => {
            txn.commit()?;
            Ok(skipped)
        }
        Err(err) => {
            txn.rollback()?;
            Err(err)
        }
    }
}
