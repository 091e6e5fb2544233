use crate::EngineError;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

/// Trait for the storage behind an [`HmSearch`](crate::HmSearch) index.
///
/// A store is a multimap from partition keys to the full hashes that carry
/// them. Implementations must tolerate concurrent `insert` and `probe` calls.
pub trait PartitionStore: Send + Sync {
    /// Add `(partition key, hash)` pairs in one atomic batch. Pairs already
    /// present are left as they are.
    fn insert(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), EngineError>;
    /// Visit every hash stored under any of `keys`. A hash reachable through
    /// several keys may be visited more than once.
    fn probe(
        &self,
        keys: &[Vec<u8>],
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), EngineError>,
    ) -> Result<(), EngineError>;
    /// Flush any buffered writes.
    fn flush(&self) -> Result<(), EngineError> {
        Ok(())
    }
    /// Release the store. Called once, when the owning engine closes.
    fn close(self: Box<Self>) -> Result<(), EngineError> {
        self.flush()
    }
}

/// An in-memory store using a `RwLock` around a `HashMap`.
pub struct MemoryStore {
    partitions: RwLock<HashMap<Vec<u8>, BTreeSet<Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionStore for MemoryStore {
    fn insert(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), EngineError> {
        // A single write lock is held for the entire batch.
        let mut guard = self
            .partitions
            .write()
            .map_err(|_| EngineError::storage("poisoned lock"))?;
        for (key, hash) in entries {
            guard.entry(key).or_default().insert(hash);
        }
        Ok(())
    }

    fn probe(
        &self,
        keys: &[Vec<u8>],
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let guard = self
            .partitions
            .read()
            .map_err(|_| EngineError::storage("poisoned lock"))?;
        for key in keys {
            if let Some(hashes) = guard.get(key) {
                for hash in hashes {
                    visitor(hash)?;
                }
            }
        }
        Ok(())
    }
}

/// The redb store implementation.
///
/// Redb is a pure Rust ACID-compliant embedded database and the default
/// on-disk format for [`HmSearch`](crate::HmSearch).
#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use self::redb::RedbStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_deduplicates_pairs() {
        let store = MemoryStore::new();
        store
            .insert(vec![
                (b"k1".to_vec(), b"h1".to_vec()),
                (b"k1".to_vec(), b"h1".to_vec()),
                (b"k1".to_vec(), b"h2".to_vec()),
            ])
            .unwrap();

        let mut seen = Vec::new();
        store
            .probe(&[b"k1".to_vec(), b"missing".to_vec()], &mut |hash| {
                seen.push(hash.to_vec());
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, vec![b"h1".to_vec(), b"h2".to_vec()]);
    }

    #[test]
    fn visitor_errors_stop_the_probe() {
        let store = MemoryStore::new();
        store
            .insert(vec![(b"k".to_vec(), b"a".to_vec()), (b"k".to_vec(), b"b".to_vec())])
            .unwrap();

        let mut calls = 0;
        let result = store.probe(&[b"k".to_vec()], &mut |_| {
            calls += 1;
            Err(EngineError::Corrupt("stop".into()))
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
