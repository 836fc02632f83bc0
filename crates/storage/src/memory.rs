//! In-memory [`StateStore`] with snapshot reads and optimistic conflict
//! detection at commit.
//!
//! Every transaction reads from a copy of the committed data taken at
//! `begin` and buffers its writes locally. At commit the store checks that no
//! key the transaction read or wrote, and no key under a prefix it scanned,
//! was committed by someone else after `begin`; on success the buffered
//! writes are applied atomically.
//!
//! The store remembers the `begin` version of every open transaction. A
//! key's last-modified version is only needed while some open transaction
//! began before it, so older entries are pruned whenever a transaction ends.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StateError;
use crate::traits::{StateStore, StateTransaction};

type Bytes = Vec<u8>;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    data: BTreeMap<Bytes, Bytes>,
    /// Commit version that last touched each key, kept while an open
    /// transaction began before that version.
    modified: BTreeMap<Bytes, u64>,
    /// Open transactions counted by their `begin` version.
    live: BTreeMap<u64, usize>,
    version: u64,
}

impl MemoryInner {
    fn register(&mut self) -> u64 {
        *self.live.entry(self.version).or_default() += 1;
        self.version
    }

    /// Forgets one transaction begun at `begin_version` and drops version
    /// entries no remaining transaction can conflict with.
    fn release(&mut self, begin_version: u64) {
        if let Some(count) = self.live.get_mut(&begin_version) {
            *count -= 1;
            if *count == 0 {
                self.live.remove(&begin_version);
            }
        }
        let horizon = self
            .live
            .keys()
            .next()
            .copied()
            .unwrap_or(self.version);
        self.modified.retain(|_, version| *version > horizon);
    }

    fn try_commit(&mut self, tx: &mut MemoryTransaction) -> Result<(), StateError> {
        let changed_since_begin =
            |key: &[u8]| self.modified.get(key).is_some_and(|v| *v > tx.begin_version);
        if let Some(key) = tx
            .reads
            .iter()
            .chain(tx.writes.keys())
            .find(|key| changed_since_begin(key.as_slice()))
        {
            return Err(StateError::Conflict { key: key.clone() });
        }
        for prefix in &tx.scans {
            let conflict = self
                .modified
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .find(|(_, version)| **version > tx.begin_version);
            if let Some((key, _)) = conflict {
                return Err(StateError::Conflict { key: key.clone() });
            }
        }

        if tx.writes.is_empty() {
            return Ok(());
        }
        self.version += 1;
        let version = self.version;
        for (key, value) in std::mem::take(&mut tx.writes) {
            match value {
                Some(value) => {
                    self.data.insert(key.clone(), value);
                }
                None => {
                    self.data.remove(&key);
                }
            }
            self.modified.insert(key, version);
        }
        tracing::trace!(version, "memory store commit applied");
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryTransaction {
    begin_version: u64,
    snapshot: BTreeMap<Bytes, Bytes>,
    /// `None` marks a buffered delete.
    writes: BTreeMap<Bytes, Option<Bytes>>,
    reads: BTreeSet<Bytes>,
    scans: BTreeSet<Bytes>,
    /// The store this transaction is registered with until it ends.
    store: Option<Arc<Mutex<MemoryInner>>>,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            if let Ok(mut inner) = store.lock() {
                inner.release(self.begin_version);
            }
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed keys.
    pub fn len(&self) -> Result<usize, StateError> {
        Ok(self.lock()?.data.len())
    }

    pub fn is_empty(&self) -> Result<bool, StateError> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StateError> {
        self.inner
            .lock()
            .map_err(|e| StateError::Backend(format!("memory store lock poisoned: {e}")))
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, StateError> {
        let mut inner = self.lock()?;
        Ok(MemoryTransaction {
            begin_version: inner.register(),
            snapshot: inner.data.clone(),
            writes: BTreeMap::new(),
            reads: BTreeSet::new(),
            scans: BTreeSet::new(),
            store: Some(Arc::clone(&self.inner)),
        })
    }

    async fn commit(&self, mut tx: MemoryTransaction) -> Result<(), StateError> {
        let mut inner = self.lock()?;
        let result = inner.try_commit(&mut tx);
        if tx.store.take().is_some() {
            inner.release(tx.begin_version);
        }
        result
    }

    /// Dropping the transaction discards its writes and releases it.
    async fn abort(&self, tx: MemoryTransaction) -> Result<(), StateError> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl StateTransaction for MemoryTransaction {
    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        self.reads.insert(key.to_vec());
        if let Some(buffered) = self.writes.get(key) {
            return Ok(buffered.clone());
        }
        Ok(self.snapshot.get(key).cloned())
    }

    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StateError> {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    async fn delete(&mut self, key: &[u8]) -> Result<(), StateError> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    async fn first_with_prefix(
        &mut self,
        prefix: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, StateError> {
        self.scans.insert(prefix.to_vec());

        let committed = self
            .snapshot
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .find(|(key, _)| !self.writes.contains_key(*key));
        let buffered = self
            .writes
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .find_map(|(key, value)| value.as_ref().map(|value| (key, value)));

        let first = match (committed, buffered) {
            (Some(c), Some(b)) => Some(if c.0 < b.0 { c } else { b }),
            (c, b) => c.or(b),
        };
        tracing::trace!(prefix = ?prefix, found = first.is_some(), "prefix scan");
        Ok(first.map(|(key, value)| (key.clone(), value.clone())))
    }
}
