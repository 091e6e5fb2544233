use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::backend::{MemoryStore, PartitionStore};
use crate::hash::{hamming_distance, Partitioning};
use crate::{EngineConfig, EngineError, LookupResult, OpenMode, SearchEngine};

/// Hamming-distance index over fixed-size hashes.
///
/// Each hash is stored once per partition, keyed by the partition's bits.
/// A lookup probes the exact key and the one-bit neighbours of every
/// partition of the query, then keeps the candidates whose full distance is
/// within the bound.
pub struct HmSearch {
    store: Box<dyn PartitionStore>,
    config: EngineConfig,
    partitioning: Partitioning,
    mode: OpenMode,
}

impl HmSearch {
    /// Build an engine over an arbitrary store.
    pub fn with_store(
        config: EngineConfig,
        store: Box<dyn PartitionStore>,
        mode: OpenMode,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            store,
            partitioning: config.partitioning(),
            config,
            mode,
        })
    }

    /// An ephemeral read-write engine kept entirely in memory.
    pub fn in_memory(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_store(config, Box::new(MemoryStore::new()), OpenMode::ReadWrite)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    fn check_length(&self, hash: &[u8]) -> Result<(), EngineError> {
        let expected = self.config.hash_bytes();
        if hash.len() != expected {
            return Err(EngineError::InvalidHashLength {
                expected,
                actual: hash.len(),
            });
        }
        Ok(())
    }

    fn probe_keys(&self, hash: &[u8]) -> Vec<Vec<u8>> {
        let p = &self.partitioning;
        let mut keys = Vec::with_capacity((p.partitions() * (p.partition_bits() + 1)) as usize);
        for index in 0..p.partitions() {
            let exact = p.key(hash, index);
            keys.extend(p.neighbours(&exact, index));
            keys.push(exact);
        }
        keys
    }
}

impl SearchEngine for HmSearch {
    fn init(path: &Path, config: &EngineConfig) -> Result<(), EngineError> {
        config.validate()?;
        #[cfg(feature = "backend-redb")]
        {
            let store = crate::backend::RedbStore::create(path, config)?;
            Box::new(store).close()
        }
        #[cfg(not(feature = "backend-redb"))]
        {
            let _ = path;
            Err(EngineError::storage("redb backend disabled at compile time"))
        }
    }

    fn open(path: &Path, mode: OpenMode) -> Result<Self, EngineError> {
        #[cfg(feature = "backend-redb")]
        {
            let store = crate::backend::RedbStore::open(path)?;
            let config = store.load_config()?;
            debug!(path = %path.display(), ?mode, ?config, "hmsearch_open");
            Self::with_store(config, Box::new(store), mode)
        }
        #[cfg(not(feature = "backend-redb"))]
        {
            let _ = (path, mode);
            Err(EngineError::storage("redb backend disabled at compile time"))
        }
    }

    fn insert(&self, hash: &[u8]) -> Result<(), EngineError> {
        if self.mode == OpenMode::ReadOnly {
            return Err(EngineError::ReadOnly);
        }
        self.check_length(hash)?;

        let entries = (0..self.partitioning.partitions())
            .map(|index| (self.partitioning.key(hash, index), hash.to_vec()))
            .collect();
        self.store.insert(entries)
    }

    fn lookup(&self, hash: &[u8], max_error: Option<u32>) -> Result<Vec<LookupResult>, EngineError> {
        self.check_length(hash)?;
        let bound = max_error.map_or(self.config.max_error, |m| m.min(self.config.max_error));

        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut results = Vec::new();
        self.store.probe(&self.probe_keys(hash), &mut |candidate: &[u8]| {
            if seen.contains(candidate) {
                return Ok(());
            }
            seen.insert(candidate.to_vec());

            let distance = hamming_distance(hash, candidate);
            if distance <= bound {
                results.push(LookupResult {
                    hash: candidate.to_vec(),
                    distance,
                });
            }
            Ok(())
        })?;

        results.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.hash.cmp(&b.hash)));
        Ok(results)
    }

    fn close(self) -> Result<(), EngineError> {
        self.store.close()
    }
}
