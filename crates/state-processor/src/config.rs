//! # Configuration
//!
//! ```toml
//! [chain]
//! dao_fork_block = 1920000
//! dao_fork_support = true
//! byzantium_block = 4370000
//! eip158_block = 2675000
//!
//! [persistence]
//! mode = "batched"            # or "synchronous"
//! batch_size = 50
//! error_log_path = "./data/recorder-errors.log"
//!
//! [store]
//! path = "./data/recorder"
//! database = "geth"
//! ```
//!
//! Every section and field is optional. Environment variables override the
//! file: `RECORDER_PERSISTENCE_MODE`, `RECORDER_BATCH_SIZE`,
//! `RECORDER_ERROR_LOG`, `RECORDER_STORE_PATH`.

use crate::adapters::FileErrorLog;
use crate::domain::staging::DEFAULT_BATCH_SIZE;
use crate::errors::ConfigError;
use crate::persistence::{BatchedSink, PersistenceMode, PersistenceSink, ReceiptMerger};
use crate::ports::outbound::{ErrorLog, StoreConnector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default error log location.
pub const DEFAULT_ERROR_LOG_PATH: &str = "./data/recorder-errors.log";

/// Default document store location.
pub const DEFAULT_STORE_PATH: &str = "./data/recorder";

/// Default database (namespace) name.
pub const DEFAULT_DATABASE: &str = "geth";

// =============================================================================
// CHAIN
// =============================================================================

/// Fork activation heights the processor needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Block of the DAO hard fork.
    pub dao_fork_block: Option<u64>,
    /// Whether this chain applies the DAO hard fork.
    pub dao_fork_support: bool,
    /// First Byzantium block.
    pub byzantium_block: Option<u64>,
    /// First EIP-158 block.
    pub eip158_block: Option<u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl ChainConfig {
    /// Mainnet activation heights.
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            dao_fork_block: Some(1_920_000),
            dao_fork_support: true,
            byzantium_block: Some(4_370_000),
            eip158_block: Some(2_675_000),
        }
    }

    /// Every fork active from genesis, no DAO fork.
    #[must_use]
    pub fn all_forks() -> Self {
        Self {
            dao_fork_block: None,
            dao_fork_support: false,
            byzantium_block: Some(0),
            eip158_block: Some(0),
        }
    }

    /// True if `number` is the DAO fork block of a supporting chain.
    #[must_use]
    pub fn is_dao_fork_block(&self, number: u64) -> bool {
        self.dao_fork_support && self.dao_fork_block == Some(number)
    }

    /// True if Byzantium rules apply at `number`.
    #[must_use]
    pub fn is_byzantium(&self, number: u64) -> bool {
        self.byzantium_block.is_some_and(|b| number >= b)
    }

    /// True if EIP-158 rules apply at `number`.
    #[must_use]
    pub fn is_eip158(&self, number: u64) -> bool {
        self.eip158_block.is_some_and(|b| number >= b)
    }
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Recording behaviour.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Sink selection.
    pub mode: PersistenceMode,
    /// Transactions per batch (batched mode).
    pub batch_size: usize,
    /// Dead-letter file (batched mode).
    pub error_log_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            mode: PersistenceMode::Batched,
            batch_size: DEFAULT_BATCH_SIZE,
            error_log_path: PathBuf::from(DEFAULT_ERROR_LOG_PATH),
        }
    }
}

impl PersistenceConfig {
    /// Builds the configured sink, opening the error log file for batched
    /// mode.
    pub fn build_sink<C>(&self, connector: C) -> Result<Box<dyn PersistenceSink>, ConfigError>
    where
        C: StoreConnector + 'static,
        C::Store: 'static,
    {
        match self.mode {
            PersistenceMode::Batched => {
                let log = FileErrorLog::open(&self.error_log_path).map_err(|e| ConfigError::Io {
                    path: self.error_log_path.display().to_string(),
                    error: e.to_string(),
                })?;
                Ok(self.build_sink_with_log(connector, log))
            }
            PersistenceMode::Synchronous => Ok(Box::new(ReceiptMerger::new(connector))),
        }
    }

    /// Builds the configured sink with a caller-supplied error log (ignored
    /// in synchronous mode).
    pub fn build_sink_with_log<C, L>(&self, connector: C, log: L) -> Box<dyn PersistenceSink>
    where
        C: StoreConnector + 'static,
        C::Store: 'static,
        L: ErrorLog + 'static,
    {
        match self.mode {
            PersistenceMode::Batched => Box::new(BatchedSink::new(connector, log, self.batch_size)),
            PersistenceMode::Synchronous => Box::new(ReceiptMerger::new(connector)),
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Document store location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database directory.
    pub path: PathBuf,
    /// Database (namespace) name.
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
            database: DEFAULT_DATABASE.to_string(),
        }
    }
}

#[cfg(feature = "rocksdb")]
impl StoreConfig {
    /// RocksDB settings for this location.
    #[must_use]
    pub fn rocks_config(&self) -> crate::adapters::RocksStoreConfig {
        crate::adapters::RocksStoreConfig {
            path: self.path.to_string_lossy().into_owned(),
            database: self.database.clone(),
            ..crate::adapters::RocksStoreConfig::default()
        }
    }
}

// =============================================================================
// TOP LEVEL
// =============================================================================

/// Complete processor configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Fork heights.
    pub chain: ChainConfig,
    /// Recording behaviour.
    pub persistence: PersistenceConfig,
    /// Store location.
    pub store: StoreConfig,
}

impl ProcessorConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Defaults with environment overrides.
    ///
    /// # Environment Variables
    ///
    /// - `RECORDER_PERSISTENCE_MODE`: `batched` or `synchronous`
    /// - `RECORDER_BATCH_SIZE`: transactions per batch
    /// - `RECORDER_ERROR_LOG`: dead-letter file
    /// - `RECORDER_STORE_PATH`: document store directory
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(lookup)?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = lookup("RECORDER_PERSISTENCE_MODE") {
            self.persistence.mode = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "RECORDER_PERSISTENCE_MODE",
                value,
            })?;
        }
        if let Some(value) = lookup("RECORDER_BATCH_SIZE") {
            self.persistence.batch_size = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "RECORDER_BATCH_SIZE",
                value,
            })?;
        }
        if let Some(value) = lookup("RECORDER_ERROR_LOG") {
            self.persistence.error_log_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("RECORDER_STORE_PATH") {
            self.store.path = PathBuf::from(value);
        }
        self.validate()
    }

    /// Rejects unusable settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.persistence.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.store.database.is_empty() {
            return Err(ConfigError::Invalid("store.database must not be empty".into()));
        }
        Ok(())
    }
}
