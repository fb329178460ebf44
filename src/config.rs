//! Store connection descriptor loaded from TOML.
//!
//! The `-c` file names the backend, the rule-catalogue document, and where
//! snapshot artifacts go. Relative paths resolve against the descriptor's
//! own directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::rules::{CatalogError, RuleCatalog};

/// Backend selector. Real deployments target an external store through the
/// facade; the bundled tools ship the in-memory backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The in-memory reference backend.
    Memory,
}

/// Parsed store connection descriptor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreConfig {
    /// Which backend to open.
    pub backend: Backend,
    /// Path to the TOML rule catalogue, when edge semantics are needed.
    #[serde(default)]
    pub rules: Option<PathBuf>,
    /// Store image the in-memory backend loads at open and persists back to
    /// after a committed run.
    #[serde(default)]
    pub data: Option<PathBuf>,
    /// Directory for snapshot artifacts.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("snapshots")
}

/// Failure to load or interpret a descriptor.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem failure.
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The descriptor did not parse.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// The referenced rule catalogue did not load.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl StoreConfig {
    /// Loads a descriptor from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let mut config: StoreConfig = toml::from_str(&raw)?;
        config.base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        Ok(config)
    }

    /// The snapshot directory, resolved against the descriptor location.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.resolve(&self.snapshot_dir)
    }

    /// The store image path, resolved against the descriptor location.
    pub fn data_path(&self) -> Option<PathBuf> {
        self.data.as_deref().map(|path| self.resolve(path))
    }

    /// Loads the referenced rule catalogue; an absent reference yields an
    /// empty catalogue.
    pub fn load_rules(&self) -> Result<RuleCatalog, ConfigError> {
        match &self.rules {
            None => Ok(RuleCatalog::default()),
            Some(path) => {
                let raw = fs::read_to_string(self.resolve(path))?;
                Ok(RuleCatalog::from_toml_str(&raw)?)
            }
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}
