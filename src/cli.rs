//! Shared support for the command-line tools: argument-string parsing for
//! the positional contracts, store opening, tracing setup, and the
//! operator-confirmation countdown.

use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::{Backend, ConfigError, StoreConfig};
use crate::engine::property::IndexKind;
use crate::engine::MigrationError;
use crate::error::StoreError;
use crate::model::{Cardinality, ValueType};
use crate::snapshot::{JsonSnapshotService, SnapshotError};
use crate::store::MemoryStore;

/// Errors surfaced to the operator by the command-line tools.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid argument value.
    #[error("{0}")]
    Message(String),
    /// Descriptor loading failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Store-level failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Engine-level failure.
    #[error(transparent)]
    Migration(#[from] MigrationError),
    /// Snapshot service failure.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Installs the fmt tracing subscriber with `RUST_LOG`-style filtering.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .try_init();
}

/// Parses the positional `targetType` token: `String`, `Set<String>`,
/// `Integer`, `Long`, or `Boolean`.
pub fn parse_target_type(raw: &str) -> Result<(ValueType, Cardinality), CliError> {
    match raw {
        "String" => Ok((ValueType::Str, Cardinality::Single)),
        "Set<String>" => Ok((ValueType::Str, Cardinality::Set)),
        "Integer" => Ok((ValueType::Int, Cardinality::Single)),
        "Long" => Ok((ValueType::Long, Cardinality::Single)),
        "Boolean" => Ok((ValueType::Bool, Cardinality::Single)),
        other => Err(CliError::Message(format!(
            "unsupported target type `{other}` (expected String, Set<String>, Integer, Long, or Boolean)"
        ))),
    }
}

/// Parses the positional `indexKind` token. `uniqueIndex` is refused when
/// `allow_unique` is false (the history tool).
pub fn parse_index_kind(raw: &str, allow_unique: bool) -> Result<IndexKind, CliError> {
    match raw {
        "uniqueIndex" if allow_unique => Ok(IndexKind::Unique),
        "index" => Ok(IndexKind::NonUnique),
        "noIndex" => Ok(IndexKind::None),
        other => {
            let expected = if allow_unique {
                "uniqueIndex, index, or noIndex"
            } else {
                "index or noIndex"
            };
            Err(CliError::Message(format!(
                "unsupported index kind `{other}` (expected {expected})"
            )))
        }
    }
}

/// Parses a positional boolean token, strictly `true` or `false`.
pub fn parse_bool(raw: &str, what: &str) -> Result<bool, CliError> {
    match raw {
        _ if raw.eq_ignore_ascii_case("true") => Ok(true),
        _ if raw.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(CliError::Message(format!(
            "{what} must be `true` or `false`, got `{other}`"
        ))),
    }
}

/// Opens the configured store, optionally seeded from a snapshot artifact
/// instead of the descriptor's own image. Seeding is only valid for the
/// in-memory backend.
pub fn open_store(
    config: &StoreConfig,
    snapshot: Option<&Path>,
) -> Result<MemoryStore, CliError> {
    match (config.backend, snapshot) {
        (Backend::Memory, Some(path)) => Ok(JsonSnapshotService::load_store(path)?),
        (Backend::Memory, None) => match config.data_path() {
            Some(path) if path.exists() => Ok(JsonSnapshotService::load_store(&path)?),
            _ => Ok(MemoryStore::new()),
        },
    }
}

/// Writes the store image back to the descriptor's `data` path, when one is
/// configured.
pub fn persist_store(config: &StoreConfig, store: &MemoryStore) -> Result<(), CliError> {
    if let Some(path) = config.data_path() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        std::fs::write(&path, store.to_json()?).map_err(ConfigError::Io)?;
    }
    Ok(())
}

/// The abortable operator-confirmation delay: the only interruptible window
/// before the single-pass tool mutates anything. Ctrl-C here aborts with
/// zero mutation.
pub fn countdown(seconds: u64, what: &str) {
    let bar = ProgressBar::new(seconds);
    bar.set_style(
        ProgressStyle::with_template("{msg} {bar:20} {pos}/{len}s")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message(format!("starting {what} (Ctrl-C aborts)"));
    for _ in 0..seconds {
        std::thread::sleep(Duration::from_secs(1));
        bar.inc(1);
    }
    bar.finish_and_clear();
}
