//! # Adapters Module
//!
//! Implementations of the persistence-side outbound ports.
//!
//! ## Modules
//!
//! - `memory_store`: shared in-memory document store with fault injection
//! - `error_log`: append-only file and in-memory error logs
//! - `rocksdb_store`: RocksDB document store (feature `rocksdb`)

pub mod error_log;
pub mod memory_store;
#[cfg(feature = "rocksdb")]
pub mod rocksdb_store;

pub use error_log::{FileErrorLog, MemoryErrorLog};
pub use memory_store::{MemoryConnector, MemoryDocumentStore, StoreStats};
#[cfg(feature = "rocksdb")]
pub use rocksdb_store::{RocksConnector, RocksDocumentStore, RocksStoreConfig};
