//! Migration orchestration: an explicit registry of migrations, an
//! idempotency ledger persisted in the graph itself, and a runner that
//! sequences, gates, and transacts each migration as one atomic unit.

mod ledger;
mod registry;
mod runner;

pub use ledger::{ensure as ensure_ledger, is_recorded, record, LEDGER_MARKER};
pub use registry::{Migration, MigrationContext, MigrationRegistry, MigrationSpec, Outcome};
pub use runner::{
    list, run, ListEntry, MigrationResult, MigrationStatus, RunOptions, RunReport,
};
