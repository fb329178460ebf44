//! Compile-time migration registry.
//!
//! Migrations are registered explicitly with a name, a priority, and an
//! enabled flag; there is no runtime discovery. The runner executes entries
//! in ascending priority order, ties broken by name.

use crate::engine::Result;
use crate::notify::BufferedSink;
use crate::rules::RuleCatalog;
use crate::store::{GraphStore, GraphTxn};

/// Self-reported outcome of one migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The migration completed; commit its work and record it.
    Success,
    /// The migration failed; roll its work back.
    Failure,
    /// The migration is unsure; roll back and point the operator at the logs.
    CheckLogs,
}

/// Everything a migration may touch while it runs.
pub struct MigrationContext<'a> {
    /// The store, for primitives that manage their own transactions
    /// (batched property migration commits per batch by design).
    pub store: &'a dyn GraphStore,
    /// The migration's own transaction; committed or rolled back by the
    /// runner based on the reported outcome.
    pub txn: &'a mut dyn GraphTxn,
    /// The edge-rule catalogue.
    pub catalog: &'a RuleCatalog,
    /// Queued notifications, published only if the transaction commits.
    pub notifications: &'a mut BufferedSink,
}

/// One migration implementation.
pub trait Migration {
    /// Runs the migration and reports its outcome.
    fn run(&mut self, ctx: &mut MigrationContext<'_>) -> Result<Outcome>;
}

type Builder = Box<dyn Fn() -> Result<Box<dyn Migration>>>;

/// One registered migration: identity, gating, and a constructor.
pub struct MigrationSpec {
    /// Ledger key and summary name.
    pub name: String,
    /// Ascending execution order; ties broken by name.
    pub priority: i32,
    /// Disabled entries are skipped unless explicitly run.
    pub enabled: bool,
    builder: Builder,
}

impl MigrationSpec {
    /// Constructs the migration; a failure here skips the entry.
    pub fn build(&self) -> Result<Box<dyn Migration>> {
        (self.builder)()
    }
}

/// The registry the runner draws from.
#[derive(Default)]
pub struct MigrationRegistry {
    specs: Vec<MigrationSpec>,
}

impl MigrationRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a migration.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        priority: i32,
        enabled: bool,
        builder: impl Fn() -> Result<Box<dyn Migration>> + 'static,
    ) -> &mut Self {
        self.specs.push(MigrationSpec {
            name: name.into(),
            priority,
            enabled,
            builder: Box::new(builder),
        });
        self
    }

    /// Entries in execution order: ascending priority, ties by name.
    pub fn ordered(&self) -> Vec<&MigrationSpec> {
        let mut specs: Vec<&MigrationSpec> = self.specs.iter().collect();
        specs.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        specs
    }

    /// Number of registered migrations.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
