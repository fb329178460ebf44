//! The four migration primitives and their shared plumbing.
//!
//! Each primitive returns an explicit result struct instead of mutating
//! shared counters, so callers compose and test them in isolation.

pub mod link;
pub mod merge;
pub mod property;
pub mod reconcile;
pub mod swing;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::error::StoreError;
use crate::rules::RelationKind;

pub use self::property::DuplicateReport;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// The (out-type, kind, in-type) shape of a relation, used to key
/// multiplicity tallies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RelationShape {
    /// Node type of the out-vertex.
    pub out_type: String,
    /// Tree or cousin.
    pub kind: RelationKind,
    /// Node type of the in-vertex.
    pub in_type: String,
}

impl fmt::Display for RelationShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.out_type, self.kind, self.in_type)
    }
}

/// Errors raised by the migration primitives.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The property named for migration has no schema definition.
    #[error("property key `{0}` does not exist; nothing to migrate")]
    MissingPropertyKey(String),
    /// Duplicate values block the requested unique index.
    #[error("{0}")]
    DuplicateValues(DuplicateReport),
    /// Creating the relation would exceed its multiplicity constraint.
    #[error("multiplicity exceeded for {shape}")]
    Multiplicity {
        /// The violated relation shape.
        shape: RelationShape,
    },
    /// A call-level precondition failed before any mutation.
    #[error("precondition failed: {0}")]
    Precondition(String),
    /// The backing store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}
