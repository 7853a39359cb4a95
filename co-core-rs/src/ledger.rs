//! Versioned key-value ledger with optimistic transactions.
//!
//! Every committed key carries the height of the transaction that last
//! wrote it. A [`Transaction`] records the version of each key it reads
//! and buffers its writes; [`Ledger::commit`] re-checks those versions
//! under the write lock and applies the whole write-set or nothing.
//!
//! The marketplace core only sees the [`LedgerStore`] trait, so any store
//! with the same contract can stand in for this one.

use crate::error::StoreError;
use crate::storage::{CommitRecord, LedgerSnapshot, Storage, StorageConfig};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Store contract consumed by the marketplace core
pub trait LedgerStore {
    /// Value under `key`, `None` when absent
    fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Overwrite the value under `key`
    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// All `(key, value)` pairs whose JSON record matches `selector`, ordered by key
    fn query(&mut self, selector: &Selector) -> Result<Vec<(String, Vec<u8>)>, StoreError>;
}

/// Equality selector over a top-level field of a JSON record
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    field: String,
    value: Value,
}

impl Selector {
    /// Match records where `field == value`
    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Check a stored record against the selector
    pub fn matches(&self, bytes: &[u8]) -> bool {
        serde_json::from_slice::<Value>(bytes)
            .ok()
            .and_then(|record| record.get(&self.field).cloned())
            .map_or(false, |v| v == self.value)
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut selector = serde_json::Map::new();
        selector.insert(self.field.clone(), self.value.clone());
        write!(f, "{}", serde_json::json!({ "selector": selector }))
    }
}

/// Committed value and the height that wrote it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedValue {
    pub version: u64,
    pub value: Vec<u8>,
}

/// Result of a successful commit
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub tx_id: String,
    pub height: u64,
    pub committed_at: DateTime<Utc>,
    pub keys_written: usize,
}

#[derive(Debug, Default)]
struct WorldState {
    entries: BTreeMap<String, VersionedValue>,
    height: u64,
}

impl WorldState {
    fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            entries: snapshot.entries,
            height: snapshot.height,
        }
    }

    fn apply(&mut self, commit: &CommitRecord) {
        for (key, value) in &commit.writes {
            self.entries.insert(
                key.clone(),
                VersionedValue {
                    version: commit.height,
                    value: value.clone(),
                },
            );
        }
        self.height = commit.height;
    }

    fn version(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|e| e.version)
    }
}

/// Shared ledger, safe to use from many threads
pub struct Ledger {
    world: RwLock<WorldState>,
    /// WAL-backed persistence (None for in-memory ledgers)
    storage: Option<Mutex<Storage>>,
}

impl Ledger {
    /// Create an empty, non-durable ledger
    pub fn in_memory() -> Self {
        Self {
            world: RwLock::new(WorldState::default()),
            storage: None,
        }
    }

    /// Open a durable ledger, recovering any state already on disk
    pub fn open(config: StorageConfig) -> Result<Self, StoreError> {
        let mut storage = Storage::new(config)?;
        let recovered = storage.open()?;

        let mut world = recovered
            .snapshot
            .map(WorldState::from_snapshot)
            .unwrap_or_default();
        for commit in &recovered.commits {
            world.apply(commit);
        }

        info!(
            "Ledger: Opened at height {} ({} keys)",
            world.height,
            world.entries.len()
        );

        Ok(Self {
            world: RwLock::new(world),
            storage: Some(Mutex::new(storage)),
        })
    }

    /// Start a transaction against the current committed state
    pub fn begin(&self) -> Transaction<'_> {
        Transaction {
            ledger: self,
            tx_id: Uuid::new_v4().to_string(),
            reads: HashMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Validate the transaction's read-set and apply its write-set atomically
    pub fn commit(&self, tx: Transaction<'_>) -> Result<CommitReceipt, StoreError> {
        let Transaction {
            tx_id,
            reads,
            writes,
            ..
        } = tx;

        let mut world = self.world.write();

        if writes.is_empty() {
            debug!("Ledger: Read-only transaction {} at height {}", tx_id, world.height);
            return Ok(CommitReceipt {
                tx_id,
                height: world.height,
                committed_at: Utc::now(),
                keys_written: 0,
            });
        }

        for (key, seen) in &reads {
            if world.version(key) != *seen {
                warn!("Ledger: Transaction {} rejected, stale read of {}", tx_id, key);
                return Err(StoreError::Conflict {
                    key: key.clone(),
                    tx_id,
                });
            }
        }

        let commit = CommitRecord {
            tx_id,
            height: world.height + 1,
            committed_at: Utc::now(),
            writes: writes.into_iter().collect(),
        };

        if let Some(storage) = &self.storage {
            let mut storage = storage.lock();
            storage.save_commit(&commit)?;
            world.apply(&commit);

            // The commit is already durable in the WAL; a failed snapshot is retried next commit
            if storage.should_snapshot() {
                let snapshot = LedgerSnapshot {
                    height: world.height,
                    entries: world.entries.clone(),
                };
                if let Err(e) = storage.save_snapshot(&snapshot) {
                    warn!("Ledger: Snapshot at height {} failed: {}", snapshot.height, e);
                }
            }
        } else {
            world.apply(&commit);
        }

        debug!(
            "Ledger: Committed {} at height {} ({} keys)",
            commit.tx_id,
            commit.height,
            commit.writes.len()
        );

        Ok(CommitReceipt {
            keys_written: commit.writes.len(),
            tx_id: commit.tx_id,
            height: commit.height,
            committed_at: commit.committed_at,
        })
    }

    /// Finish a read-only transaction without taking the write lock.
    ///
    /// The read-set is still validated, so a query that overlapped a commit
    /// fails with `Conflict` instead of returning a torn view. Buffered
    /// writes are discarded.
    pub fn release(&self, tx: Transaction<'_>) -> Result<CommitReceipt, StoreError> {
        let world = self.world.read();

        if !tx.writes.is_empty() {
            warn!(
                "Ledger: Discarding {} writes of read-only transaction {}",
                tx.writes.len(),
                tx.tx_id()
            );
        }

        for (key, seen) in &tx.reads {
            if world.version(key) != *seen {
                debug!("Ledger: Read-only transaction {} saw a stale {}", tx.tx_id(), key);
                return Err(StoreError::Conflict {
                    key: key.clone(),
                    tx_id: tx.tx_id,
                });
            }
        }

        debug!("Ledger: Released {} at height {}", tx.tx_id(), world.height);
        Ok(CommitReceipt {
            tx_id: tx.tx_id,
            height: world.height,
            committed_at: Utc::now(),
            keys_written: 0,
        })
    }

    /// Height of the last committed transaction
    pub fn height(&self) -> u64 {
        self.world.read().height
    }

    /// Committed version of `key`
    pub fn version(&self, key: &str) -> Option<u64> {
        self.world.read().version(key)
    }

    /// Committed value of `key`, outside any transaction
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.world.read().entries.get(key).map(|e| e.value.clone())
    }

    /// Copy of the full committed state
    pub fn snapshot(&self) -> LedgerSnapshot {
        let world = self.world.read();
        LedgerSnapshot {
            height: world.height,
            entries: world.entries.clone(),
        }
    }
}

/// One invocation's working set: versions read and values written
pub struct Transaction<'l> {
    ledger: &'l Ledger,
    tx_id: String,
    reads: HashMap<String, Option<u64>>,
    writes: BTreeMap<String, Vec<u8>>,
}

impl Transaction<'_> {
    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    /// Number of distinct committed keys observed
    pub fn read_set_len(&self) -> usize {
        self.reads.len()
    }

    /// Number of distinct keys written
    pub fn write_set_len(&self) -> usize {
        self.writes.len()
    }
}

impl LedgerStore for Transaction<'_> {
    fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(value) = self.writes.get(key) {
            return Ok(Some(value.clone()));
        }

        let world = self.ledger.world.read();
        let entry = world.entries.get(key);
        self.reads
            .entry(key.to_string())
            .or_insert_with(|| entry.map(|e| e.version));

        Ok(entry.map(|e| e.value.clone()))
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.writes.insert(key.to_string(), value);
        Ok(())
    }

    fn query(&mut self, selector: &Selector) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        debug!("Ledger: Rich query {}", selector);

        let mut results = BTreeMap::new();
        {
            let world = self.ledger.world.read();
            for (key, entry) in world.entries.iter() {
                if selector.matches(&entry.value) {
                    self.reads
                        .entry(key.clone())
                        .or_insert(Some(entry.version));
                    results.insert(key.clone(), entry.value.clone());
                }
            }
        }

        // Own writes shadow committed values
        for (key, value) in &self.writes {
            if selector.matches(value) {
                results.insert(key.clone(), value.clone());
            } else {
                results.remove(key);
            }
        }

        Ok(results.into_iter().collect())
    }
}
