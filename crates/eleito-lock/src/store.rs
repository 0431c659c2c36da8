//! Store adapter for the lock record
//!
//! The election engine talks to the shared store only through the
//! `LockStore` trait. `MemoryLockStore` is the reference implementation:
//! it backs tests and single-process demos and enforces the same
//! compare-and-swap semantics a real coordination store would.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use eleito_common::{EleitoError, Result};

use crate::model::{LockKey, LockRecord, VersionedRecord};

/// Versioned record store with optimistic concurrency.
///
/// All three operations may fail with a transient `Store` error, retried
/// by the election engine on its normal schedule. `create` and `update`
/// fail with `Conflict` when another writer got there first; that is the
/// expected outcome of a lost election race, not an error to surface.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Read the record, returning `None` if it has never been created
    async fn get(&self, key: &LockKey) -> Result<Option<VersionedRecord>>;

    /// Create the record. Fails with `Conflict` if it already exists.
    async fn create(&self, key: &LockKey, record: &LockRecord) -> Result<VersionedRecord>;

    /// Conditionally update the record. Fails with `Conflict` unless the
    /// stored version still equals `expected_version`.
    async fn update(
        &self,
        key: &LockKey,
        record: &LockRecord,
        expected_version: &str,
    ) -> Result<VersionedRecord>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

struct StoredRecord {
    record: LockRecord,
    version: u64,
}

impl StoredRecord {
    fn versioned(&self) -> VersionedRecord {
        VersionedRecord {
            record: self.record.clone(),
            version: self.version.to_string(),
        }
    }
}

/// In-memory lock store.
///
/// Versions are a per-key monotonic counter. `fail_next` injects
/// transient failures so tests can simulate store outages.
#[derive(Default)]
pub struct MemoryLockStore {
    records: DashMap<String, StoredRecord>,
    fail_remaining: AtomicU32,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations fail with a transient store error
    pub fn fail_next(&self, count: u32) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    fn check_fault(&self) -> Result<()> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .fail_remaining
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(EleitoError::Store("injected store outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn get(&self, key: &LockKey) -> Result<Option<VersionedRecord>> {
        self.check_fault()?;
        Ok(self.records.get(&key.to_string()).map(|e| e.versioned()))
    }

    async fn create(&self, key: &LockKey, record: &LockRecord) -> Result<VersionedRecord> {
        self.check_fault()?;
        match self.records.entry(key.to_string()) {
            Entry::Occupied(_) => Err(EleitoError::Conflict(format!(
                "lock record '{}' already exists",
                key
            ))),
            Entry::Vacant(vacant) => {
                let stored = StoredRecord {
                    record: record.clone(),
                    version: 1,
                };
                let versioned = stored.versioned();
                vacant.insert(stored);
                trace!(key = %key, "created lock record");
                Ok(versioned)
            }
        }
    }

    async fn update(
        &self,
        key: &LockKey,
        record: &LockRecord,
        expected_version: &str,
    ) -> Result<VersionedRecord> {
        self.check_fault()?;
        let mut entry = self
            .records
            .get_mut(&key.to_string())
            .ok_or_else(|| EleitoError::RecordNotFound(key.to_string()))?;

        if entry.version.to_string() != expected_version {
            return Err(EleitoError::Conflict(format!(
                "lock record '{}' version changed: expected {}, found {}",
                key, expected_version, entry.version
            )));
        }

        entry.record = record.clone();
        entry.version += 1;
        trace!(key = %key, version = entry.version, holder = %record.holder_identity, "updated lock record");
        Ok(entry.versioned())
    }

    fn describe(&self) -> String {
        "in-memory lock store".to_string()
    }
}
