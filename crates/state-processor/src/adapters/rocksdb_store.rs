//! # RocksDB Document Store
//!
//! Durable [`DocumentStore`] backed by RocksDB.
//!
//! ## Layout
//!
//! One column family per collection, namespaced by database name
//! (`geth.transaction`, `geth.trace`, `geth.receipt`). Documents are stored as
//! JSON under their natural key (the transaction hash).
//!
//! ## Sessions
//!
//! RocksDB allows one open instance per path and process, so the connector
//! opens the database on the first dial and hands every later session a
//! shared reference to it.

use crate::domain::records::{merge_fields, Document, RecordKind};
use crate::errors::StoreError;
use crate::ports::outbound::{DocumentStore, StoreConnector};
use parking_lot::{Mutex, RwLock};
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::collections::HashSet;
use std::sync::Arc;

/// RocksDB store configuration.
#[derive(Debug, Clone)]
pub struct RocksStoreConfig {
    /// Database directory.
    pub path: String,
    /// Namespace prefixed to every column family.
    pub database: String,
    /// fsync after each write.
    pub sync_writes: bool,
}

impl Default for RocksStoreConfig {
    fn default() -> Self {
        Self {
            path: "./data/recorder".to_string(),
            database: "geth".to_string(),
            sync_writes: true,
        }
    }
}

impl RocksStoreConfig {
    /// Config for tests (no fsync).
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sync_writes: false,
            ..Self::default()
        }
    }

    fn cf_name(&self, kind: RecordKind) -> String {
        format!("{}.{}", self.database, kind.collection())
    }
}

fn io_error(op: &str, err: rocksdb::Error) -> StoreError {
    StoreError::Query(format!("RocksDB {op} failed: {err}"))
}

/// A session on a shared RocksDB instance.
pub struct RocksDocumentStore {
    db: Arc<RwLock<DB>>,
    config: RocksStoreConfig,
}

impl RocksDocumentStore {
    /// Opens or creates the database with all collections.
    pub fn open(config: RocksStoreConfig) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = RecordKind::ALL
            .iter()
            .map(|kind| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
                ColumnFamilyDescriptor::new(config.cf_name(*kind), cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, &config.path, cf_descriptors)
            .map_err(|e| StoreError::Dial(format!("Failed to open RocksDB: {e}")))?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            config,
        })
    }

    fn write_options(&self) -> rocksdb::WriteOptions {
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }

    fn key_of(kind: RecordKind, doc: &Document) -> Result<String, StoreError> {
        doc.get(kind.key_field())
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                StoreError::Encoding(format!(
                    "document for {} has no {} field",
                    kind.collection(),
                    kind.key_field()
                ))
            })
    }

    fn exists(db: &DB, cf: &rocksdb::ColumnFamily, key: &str) -> Result<bool, StoreError> {
        db.get_pinned_cf(cf, key.as_bytes())
            .map(|v| v.is_some())
            .map_err(|e| io_error("exists check", e))
    }
}

macro_rules! column_family {
    ($db:expr, $config:expr, $kind:expr) => {
        $db.cf_handle(&$config.cf_name($kind)).ok_or_else(|| {
            StoreError::Unavailable(format!("missing column family {}", $config.cf_name($kind)))
        })?
    };
}

impl DocumentStore for RocksDocumentStore {
    fn is_valid(&self, kind: RecordKind) -> bool {
        self.db.read().cf_handle(&self.config.cf_name(kind)).is_some()
    }

    fn insert_many(&mut self, kind: RecordKind, docs: Vec<Document>) -> Result<(), StoreError> {
        let db = self.db.write();
        let cf = column_family!(db, self.config, kind);

        let mut batch = WriteBatch::default();
        let mut seen = HashSet::with_capacity(docs.len());
        for doc in &docs {
            let key = Self::key_of(kind, doc)?;
            if Self::exists(&db, cf, &key)? || !seen.insert(key.clone()) {
                return Err(StoreError::DuplicateKey {
                    collection: kind.collection().to_string(),
                    key,
                });
            }
            batch.put_cf(cf, key.as_bytes(), serde_json::to_vec(doc)?);
        }

        db.write_opt(batch, &self.write_options())
            .map_err(|e| io_error("batch write", e))
    }

    fn insert_one(&mut self, kind: RecordKind, doc: Document) -> Result<(), StoreError> {
        let db = self.db.write();
        let cf = column_family!(db, self.config, kind);

        let key = Self::key_of(kind, &doc)?;
        if Self::exists(&db, cf, &key)? {
            return Err(StoreError::DuplicateKey {
                collection: kind.collection().to_string(),
                key,
            });
        }
        db.put_cf_opt(cf, key.as_bytes(), serde_json::to_vec(&doc)?, &self.write_options())
            .map_err(|e| io_error("put", e))
    }

    fn find_one(&self, kind: RecordKind, key: &str) -> Result<Option<Document>, StoreError> {
        let db = self.db.read();
        let cf = column_family!(db, self.config, kind);

        match db.get_cf(cf, key.as_bytes()).map_err(|e| io_error("get", e))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn update_one(
        &mut self,
        kind: RecordKind,
        key: &str,
        doc: Document,
    ) -> Result<(), StoreError> {
        let db = self.db.write();
        let cf = column_family!(db, self.config, kind);

        let existing = db
            .get_cf(cf, key.as_bytes())
            .map_err(|e| io_error("get", e))?;
        let mut stored: Document = match existing {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => {
                return Err(StoreError::NotFound {
                    collection: kind.collection().to_string(),
                    key: key.to_string(),
                })
            }
        };
        merge_fields(&mut stored, doc);
        db.put_cf_opt(cf, key.as_bytes(), serde_json::to_vec(&stored)?, &self.write_options())
            .map_err(|e| io_error("put", e))
    }

    fn refresh(&mut self) -> Result<(), StoreError> {
        // Embedded: there is no session to re-establish.
        Ok(())
    }
}

/// Opens (once) and shares a RocksDB instance.
pub struct RocksConnector {
    config: RocksStoreConfig,
    db: Mutex<Option<Arc<RwLock<DB>>>>,
}

impl RocksConnector {
    /// Creates a connector; nothing is opened until the first dial.
    #[must_use]
    pub fn new(config: RocksStoreConfig) -> Self {
        Self {
            config,
            db: Mutex::new(None),
        }
    }
}

impl StoreConnector for RocksConnector {
    type Store = RocksDocumentStore;

    fn dial(&self) -> Result<Self::Store, StoreError> {
        let mut slot = self.db.lock();
        if let Some(db) = slot.as_ref() {
            return Ok(RocksDocumentStore {
                db: Arc::clone(db),
                config: self.config.clone(),
            });
        }

        let store = RocksDocumentStore::open(self.config.clone())?;
        *slot = Some(Arc::clone(&store.db));
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_find_update_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let connector =
            RocksConnector::new(RocksStoreConfig::for_testing(dir.path().to_string_lossy()));

        let mut store = connector.dial().unwrap();
        assert!(store.is_valid(RecordKind::Receipt));

        let doc = json!({ "re_txhash": "0xab", "re_failreason": "" });
        store.insert_one(RecordKind::Receipt, doc.clone()).unwrap();
        assert!(matches!(
            store.insert_one(RecordKind::Receipt, doc.clone()),
            Err(StoreError::DuplicateKey { .. })
        ));

        // A second session sees the same data.
        let mut other = connector.dial().unwrap();
        assert_eq!(other.find_one(RecordKind::Receipt, "0xab").unwrap(), Some(doc));

        let updated = json!({ "re_txhash": "0xab", "re_failreason": "oog" });
        other
            .update_one(RecordKind::Receipt, "0xab", updated.clone())
            .unwrap();
        assert_eq!(
            store.find_one(RecordKind::Receipt, "0xab").unwrap(),
            Some(updated)
        );
        assert_eq!(store.find_one(RecordKind::Trace, "0xab").unwrap(), None);
    }

    #[test]
    fn test_update_keeps_fields_it_does_not_set() {
        let dir = tempfile::tempdir().unwrap();
        let connector =
            RocksConnector::new(RocksStoreConfig::for_testing(dir.path().to_string_lossy()));
        let mut store = connector.dial().unwrap();

        store
            .insert_one(
                RecordKind::Receipt,
                json!({ "re_txhash": "0xcd", "re_failreason": "oog", "annotator": "job-7" }),
            )
            .unwrap();
        store
            .update_one(RecordKind::Receipt, "0xcd", json!({ "re_txhash": "0xcd", "re_status": "1" }))
            .unwrap();

        let doc = store.find_one(RecordKind::Receipt, "0xcd").unwrap().unwrap();
        assert_eq!(doc["re_status"], "1");
        assert_eq!(doc["re_failreason"], "oog");
        assert_eq!(doc["annotator"], "job-7");
    }

    #[test]
    fn test_bulk_insert_rejects_duplicates_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let connector =
            RocksConnector::new(RocksStoreConfig::for_testing(dir.path().to_string_lossy()));
        let mut store = connector.dial().unwrap();

        let docs = vec![
            json!({ "tx_hash": "0x01", "tx_trace": "" }),
            json!({ "tx_hash": "0x01", "tx_trace": "" }),
        ];
        assert!(store.insert_many(RecordKind::Trace, docs).is_err());
        assert_eq!(store.find_one(RecordKind::Trace, "0x01").unwrap(), None);
    }
}
