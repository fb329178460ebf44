use std::io;

use thiserror::Error;

use crate::model::{EdgeId, VertexId};

/// Result alias for store-level operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the graph store facade and its implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O failure while loading or persisting a store image.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Snapshot artifact could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// A vertex referenced by id does not exist.
    #[error("vertex {0} not found")]
    VertexNotFound(VertexId),
    /// An edge referenced by id does not exist.
    #[error("edge {0} not found")]
    EdgeNotFound(EdgeId),
    /// A property key referenced by name is not defined.
    #[error("property key `{0}` is not defined")]
    UnknownPropertyKey(String),
    /// Schema metadata constraint violated (duplicate key name, bad rename).
    #[error("schema violation: {0}")]
    SchemaViolation(String),
    /// A write did not match the property key's value type or cardinality.
    #[error("property `{key}` rejects value: {reason}")]
    PropertyRejected {
        /// The property key that rejected the write.
        key: String,
        /// Why the write was rejected.
        reason: String,
    },
    /// A write would duplicate a value under a unique index.
    #[error("unique index on `{key}` already contains value `{value}`")]
    UniquenessViolation {
        /// The uniquely indexed key.
        key: String,
        /// The rendered duplicate value.
        value: String,
    },
    /// Caller misuse of the facade (closed transaction, bad argument).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
