//! # In-Memory Document Store
//!
//! A shared, in-process document store with fault injection.
//!
//! Every handle dialled from a [`MemoryConnector`] sees the same collections,
//! so a test can keep one [`MemoryDocumentStore`] for inspection while the
//! sink owns the connector. Faults are toggled on the shared state:
//!
//! - `fail_bulk_inserts(n, err)` - the next `n` bulk inserts fail with `err`
//! - `fail_key(key)` - any write touching `key` fails
//! - `set_offline(true)` - dialling and every operation fail as unavailable
//! - `mark_stale(kind)` - handles dialled so far report `is_valid(kind) == false`
//!
//! `insert_many` is atomic: either every document is written or none.

use crate::domain::records::{merge_fields, Document, RecordKind};
use crate::errors::StoreError;
use crate::ports::outbound::{DocumentStore, StoreConnector};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Operation counters, for assertions in tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Successful dials.
    pub dials: u64,
    /// Successful session refreshes.
    pub refreshes: u64,
    /// `insert_many` calls (successful or not).
    pub bulk_inserts: u64,
    /// `insert_one` calls (successful or not).
    pub single_inserts: u64,
    /// `update_one` calls (successful or not).
    pub updates: u64,
}

#[derive(Debug, Default)]
struct Shared {
    collections: HashMap<RecordKind, BTreeMap<String, Document>>,
    bulk_failures: Option<(usize, StoreError)>,
    failing_keys: HashSet<String>,
    offline: bool,
    next_session: u64,
    stale_before: HashMap<RecordKind, u64>,
    stats: StoreStats,
}

impl Shared {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }

    fn check_key(&self, kind: RecordKind, key: &str) -> Result<(), StoreError> {
        if self.failing_keys.contains(key) {
            return Err(StoreError::Query(format!(
                "write rejected for {key} in {}",
                kind.collection()
            )));
        }
        Ok(())
    }

    fn contains(&self, kind: RecordKind, key: &str) -> bool {
        self.collections
            .get(&kind)
            .is_some_and(|docs| docs.contains_key(key))
    }

    fn open_session(&mut self) -> u64 {
        let session = self.next_session;
        self.next_session += 1;
        session
    }
}

fn document_key(kind: RecordKind, doc: &Document) -> Result<String, StoreError> {
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

/// A session on the shared in-memory store.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    shared: Arc<Mutex<Shared>>,
    session: u64,
}

impl Clone for MemoryDocumentStore {
    /// Clones open a new session on the same data.
    fn clone(&self) -> Self {
        let session = self.shared.lock().open_session();
        Self {
            shared: Arc::clone(&self.shared),
            session,
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let mut shared = Shared::default();
        let session = shared.open_session();
        Self {
            shared: Arc::new(Mutex::new(shared)),
            session,
        }
    }

    /// A connector dialling sessions on this store.
    #[must_use]
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            shared: Arc::clone(&self.shared),
        }
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    /// Makes the next `times` bulk inserts fail with `err`.
    pub fn fail_bulk_inserts(&self, times: usize, err: StoreError) {
        self.shared.lock().bulk_failures = (times > 0).then_some((times, err));
    }

    /// Makes every write of the document keyed `key` fail.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.shared.lock().failing_keys.insert(key.into());
    }

    /// Takes the store offline (or back online).
    pub fn set_offline(&self, offline: bool) {
        self.shared.lock().offline = offline;
    }

    /// Invalidates the `kind` collection handle of every session opened so far.
    pub fn mark_stale(&self, kind: RecordKind) {
        let mut shared = self.shared.lock();
        let cutoff = shared.next_session;
        shared.stale_before.insert(kind, cutoff);
    }

    /// Clears every injected fault.
    pub fn clear_faults(&self) {
        let mut shared = self.shared.lock();
        shared.bulk_failures = None;
        shared.failing_keys.clear();
        shared.offline = false;
        shared.stale_before.clear();
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Number of documents in `kind`'s collection.
    #[must_use]
    pub fn count(&self, kind: RecordKind) -> usize {
        self.shared
            .lock()
            .collections
            .get(&kind)
            .map_or(0, BTreeMap::len)
    }

    /// Returns the stored document, bypassing fault injection.
    #[must_use]
    pub fn get(&self, kind: RecordKind, key: &str) -> Option<Document> {
        self.shared
            .lock()
            .collections
            .get(&kind)
            .and_then(|docs| docs.get(key).cloned())
    }

    /// True if `kind`'s collection holds `key`.
    #[must_use]
    pub fn contains(&self, kind: RecordKind, key: &str) -> bool {
        self.shared.lock().contains(kind, key)
    }

    /// Writes `doc` directly, bypassing fault injection and duplicate checks.
    ///
    /// Stands in for writers outside the recorder (e.g. annotation jobs).
    pub fn put(&self, kind: RecordKind, doc: Document) -> Result<(), StoreError> {
        let key = document_key(kind, &doc)?;
        self.shared
            .lock()
            .collections
            .entry(kind)
            .or_default()
            .insert(key, doc);
        Ok(())
    }

    /// Operation counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.shared.lock().stats.clone()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn is_valid(&self, kind: RecordKind) -> bool {
        let shared = self.shared.lock();
        !shared.offline
            && shared
                .stale_before
                .get(&kind)
                .map_or(true, |cutoff| self.session >= *cutoff)
    }

    fn insert_many(&mut self, kind: RecordKind, docs: Vec<Document>) -> Result<(), StoreError> {
        let mut shared = self.shared.lock();
        shared.stats.bulk_inserts += 1;
        shared.check_online()?;

        if let Some((remaining, err)) = shared.bulk_failures.take() {
            if remaining > 1 {
                shared.bulk_failures = Some((remaining - 1, err.clone()));
            }
            return Err(err);
        }

        let mut keyed = Vec::with_capacity(docs.len());
        let mut seen = HashSet::with_capacity(docs.len());
        for doc in docs {
            let key = document_key(kind, &doc)?;
            shared.check_key(kind, &key)?;
            if shared.contains(kind, &key) || !seen.insert(key.clone()) {
                return Err(StoreError::DuplicateKey {
                    collection: kind.collection().to_string(),
                    key,
                });
            }
            keyed.push((key, doc));
        }

        shared.collections.entry(kind).or_default().extend(keyed);
        Ok(())
    }

    fn insert_one(&mut self, kind: RecordKind, doc: Document) -> Result<(), StoreError> {
        let mut shared = self.shared.lock();
        shared.stats.single_inserts += 1;
        shared.check_online()?;

        let key = document_key(kind, &doc)?;
        shared.check_key(kind, &key)?;
        if shared.contains(kind, &key) {
            return Err(StoreError::DuplicateKey {
                collection: kind.collection().to_string(),
                key,
            });
        }
        shared.collections.entry(kind).or_default().insert(key, doc);
        Ok(())
    }

    fn find_one(&self, kind: RecordKind, key: &str) -> Result<Option<Document>, StoreError> {
        let shared = self.shared.lock();
        shared.check_online()?;
        Ok(shared
            .collections
            .get(&kind)
            .and_then(|docs| docs.get(key).cloned()))
    }

    fn update_one(
        &mut self,
        kind: RecordKind,
        key: &str,
        doc: Document,
    ) -> Result<(), StoreError> {
        let mut shared = self.shared.lock();
        shared.stats.updates += 1;
        shared.check_online()?;
        shared.check_key(kind, key)?;

        let slot = shared
            .collections
            .get_mut(&kind)
            .and_then(|docs| docs.get_mut(key))
            .ok_or_else(|| StoreError::NotFound {
                collection: kind.collection().to_string(),
                key: key.to_string(),
            })?;
        merge_fields(slot, doc);
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), StoreError> {
        let mut shared = self.shared.lock();
        shared.check_online()?;
        shared.stats.refreshes += 1;
        self.session = shared.open_session();
        Ok(())
    }
}

/// Dials sessions on a [`MemoryDocumentStore`].
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
}

impl StoreConnector for MemoryConnector {
    type Store = MemoryDocumentStore;

    fn dial(&self) -> Result<Self::Store, StoreError> {
        let mut shared = self.shared.lock();
        if shared.offline {
            return Err(StoreError::Dial("connection refused".to_string()));
        }
        shared.stats.dials += 1;
        let session = shared.open_session();
        Ok(MemoryDocumentStore {
            shared: Arc::clone(&self.shared),
            session,
        })
    }
}
