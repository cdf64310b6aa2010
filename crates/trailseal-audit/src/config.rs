//! TOML configuration for an audit trail.
//!
//! ```toml
//! [store]
//! backend = "file"
//! path = "var/audit.jsonl"
//! sync_writes = true
//!
//! [sequencer]
//! lock_timeout_ms = 2000
//! verify_on_startup = true
//! ```
//!
//! Every section is optional; the default is an in-memory store with no lock
//! timeout and no startup verification.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use trailseal_contracts::error::{AuditError, AuditResult};
use trailseal_core::{sequencer::SequencerOptions, traits::AuditStore};

use crate::{file::FileStore, memory::MemoryStore};

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrailConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sequencer: SequencerConfig,
}

/// Which backend holds the entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,
    File {
        path: PathBuf,
        #[serde(default = "default_sync_writes")]
        sync_writes: bool,
    },
}

fn default_sync_writes() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequencerConfig {
    /// Longest a writer waits for the chain head.  Absent means no limit.
    pub lock_timeout_ms: Option<u64>,
    #[serde(default)]
    pub verify_on_startup: bool,
}

impl TrailConfig {
    /// Parse `s` as TOML and validate it.
    ///
    /// Returns `AuditError::Config` if the TOML is malformed, does not match
    /// the expected shape, or carries an unusable value.
    pub fn from_toml_str(s: &str) -> AuditResult<Self> {
        let config: TrailConfig = toml::from_str(s).map_err(|e| AuditError::Config {
            reason: format!("failed to parse audit config TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as TOML configuration.
    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AuditError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// A configuration for a durable file store at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreConfig::File {
                path: path.into(),
                sync_writes: true,
            },
            ..Default::default()
        }
    }

    fn validate(&self) -> AuditResult<()> {
        if let StoreConfig::File { path, .. } = &self.store {
            if path.as_os_str().is_empty() {
                return Err(AuditError::Config {
                    reason: "store.path must not be empty".to_string(),
                });
            }
        }
        if self.sequencer.lock_timeout_ms == Some(0) {
            return Err(AuditError::Config {
                reason: "sequencer.lock_timeout_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl StoreConfig {
    /// Open the configured backend.
    pub fn open(&self) -> AuditResult<Arc<dyn AuditStore>> {
        let store: Arc<dyn AuditStore> = match self {
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
            StoreConfig::File { path, sync_writes } => {
                Arc::new(FileStore::open(path, *sync_writes)?)
            }
        };
        Ok(store)
    }
}

impl SequencerConfig {
    pub fn options(&self) -> SequencerOptions {
        SequencerOptions {
            lock_timeout: self.lock_timeout_ms.map(Duration::from_millis),
            verify_on_startup: self.verify_on_startup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_memory_without_timeout() {
        let config = TrailConfig::from_toml_str("").unwrap();
        assert_eq!(config, TrailConfig::default());
        assert_eq!(config.store, StoreConfig::Memory);
        let options = config.sequencer.options();
        assert!(options.lock_timeout.is_none());
        assert!(!options.verify_on_startup);
    }

    #[test]
    fn file_backend_with_sequencer_settings() {
        let toml = r#"
            [store]
            backend = "file"
            path = "var/audit.jsonl"

            [sequencer]
            lock_timeout_ms = 1500
            verify_on_startup = true
        "#;
        let config = TrailConfig::from_toml_str(toml).unwrap();
        assert_eq!(
            config.store,
            StoreConfig::File {
                path: PathBuf::from("var/audit.jsonl"),
                sync_writes: true,
            }
        );
        let options = config.sequencer.options();
        assert_eq!(options.lock_timeout, Some(Duration::from_millis(1500)));
        assert!(options.verify_on_startup);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        let err = TrailConfig::from_toml_str("[sequencer]\nlock_timeout = 5\n").unwrap_err();
        assert!(matches!(err, AuditError::Config { .. }));

        let err = TrailConfig::from_toml_str("[sequencer]\nlock_timeout_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("lock_timeout_ms"));

        let err =
            TrailConfig::from_toml_str("[store]\nbackend = \"file\"\npath = \"\"\n").unwrap_err();
        assert!(err.to_string().contains("store.path"));

        let err = TrailConfig::from_toml_str("[store]\nbackend = \"s3\"\n").unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let err = TrailConfig::from_file(Path::new("/nonexistent/trailseal.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
