//! Redb (Rust embedded database) store for HmSearch partitions.
//!
//! Layout:
//! - `hmsearch_meta`: engine parameters (`hash_bits`, `max_error`,
//!   `num_hashes`) and the store schema version.
//! - `hmsearch_partitions`: multimap from partition key to full hash.
//!
//! Every insert batch is one write transaction; every lookup probes all of its
//! keys inside one read transaction, so lookups see a consistent snapshot.

use crate::{EngineConfig, EngineError, PartitionStore};
use redb::{
    Database, MultimapTableDefinition, ReadableDatabase, ReadableMultimapTable, ReadableTable,
    TableDefinition,
};
use std::fs::OpenOptions;
use std::path::Path;

/// Bump this value whenever the on-disk layout changes.
pub const STORE_SCHEMA_VERSION: u64 = 2;

const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("hmsearch_meta");
const PARTITION_TABLE: MultimapTableDefinition<&[u8], &[u8]> =
    MultimapTableDefinition::new("hmsearch_partitions");

/// Redb store for persistent partition storage.
///
/// Redb handles its own internal locking and MVCC, so the store is shared
/// across threads without further synchronization.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Create a fresh database at `path`, discarding any previous contents,
    /// and record `config` in it.
    pub fn create<P: AsRef<Path>>(path: P, config: &EngineConfig) -> Result<Self, EngineError> {
        let path = path.as_ref();
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let db = Database::create(path).map_err(EngineError::storage)?;

        let write_txn = db.begin_write().map_err(EngineError::storage)?;
        {
            let mut meta = write_txn
                .open_table(META_TABLE)
                .map_err(EngineError::storage)?;
            for (key, value) in [
                ("schema_version", STORE_SCHEMA_VERSION),
                ("hash_bits", config.hash_bits as u64),
                ("max_error", config.max_error as u64),
                ("num_hashes", config.num_hashes),
            ] {
                meta.insert(key, value).map_err(EngineError::storage)?;
            }
            // Accessing the table creates it.
            let _partitions = write_txn
                .open_multimap_table(PARTITION_TABLE)
                .map_err(EngineError::storage)?;
        }
        write_txn.commit().map_err(EngineError::storage)?;

        Ok(Self { db })
    }

    /// Open an existing database. Fails if `path` does not hold one.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EngineError::Io(format!(
                "no database at {}",
                path.display()
            )));
        }
        let db = Database::open(path).map_err(EngineError::storage)?;
        Ok(Self { db })
    }

    /// Read the engine parameters recorded at creation.
    pub fn load_config(&self) -> Result<EngineConfig, EngineError> {
        let read_txn = self.db.begin_read().map_err(EngineError::storage)?;
        let meta = read_txn
            .open_table(META_TABLE)
            .map_err(EngineError::storage)?;

        let read = |key: &str| -> Result<u64, EngineError> {
            meta.get(key)
                .map_err(EngineError::storage)?
                .map(|value| value.value())
                .ok_or_else(|| EngineError::Corrupt(format!("missing {key}")))
        };

        let schema_version = read("schema_version")?;
        if schema_version != STORE_SCHEMA_VERSION {
            return Err(EngineError::Corrupt(format!(
                "unsupported schema version {schema_version}"
            )));
        }

        let narrow = |key: &str| -> Result<u32, EngineError> {
            u32::try_from(read(key)?)
                .map_err(|_| EngineError::Corrupt(format!("{key} out of range")))
        };

        Ok(EngineConfig {
            hash_bits: narrow("hash_bits")?,
            max_error: narrow("max_error")?,
            num_hashes: read("num_hashes")?,
        })
    }
}

impl PartitionStore for RedbStore {
    fn insert(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), EngineError> {
        let write_txn = self.db.begin_write().map_err(EngineError::storage)?;
        {
            let mut table = write_txn
                .open_multimap_table(PARTITION_TABLE)
                .map_err(EngineError::storage)?;
            for (key, hash) in entries {
                table
                    .insert(key.as_slice(), hash.as_slice())
                    .map_err(EngineError::storage)?;
            }
        }
        write_txn.commit().map_err(EngineError::storage)?;
        Ok(())
    }

    fn probe(
        &self,
        keys: &[Vec<u8>],
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let read_txn = self.db.begin_read().map_err(EngineError::storage)?;
        let table = read_txn
            .open_multimap_table(PARTITION_TABLE)
            .map_err(EngineError::storage)?;

        for key in keys {
            for item in table.get(key.as_slice()).map_err(EngineError::storage)? {
                let hash = item.map_err(EngineError::storage)?;
                visitor(hash.value())?;
            }
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), EngineError> {
        // Commits are durable on return; dropping the database releases the
        // file lock.
        drop(self.db);
        Ok(())
    }
}
