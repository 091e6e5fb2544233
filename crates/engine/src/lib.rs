//! # HmSearch engine
//!
//! This crate provides the search engine behind `hmsearch`: an index of
//! fixed-size binary hashes (typically perceptual image hashes) answering
//! "which stored hashes are within N bits of this one?".
//!
//! ## Core Features
//!
//! - **Capability trait**: [`SearchEngine`] is the whole surface the handle
//!   layer needs: `init`, `open`, `insert`, `lookup`, `close`. Anything that
//!   implements it can be driven by the close-drain guard.
//! - **Pluggable Stores**: [`HmSearch`] keeps its partitions in a
//!   [`PartitionStore`]. Out of the box:
//!   - [`MemoryStore`], a `HashMap` behind a `RwLock` (ideal for testing).
//!   - [`RedbStore`], persistent storage in a redb file (the `backend-redb`
//!     feature, enabled by default).
//! - **Hex codec**: helpers in [`hash`] parse and format the hex strings used
//!   at the public boundary.
//!
//! ## Example Usage
//!
//! ```
//! use engine::{EngineConfig, HmSearch, SearchEngine};
//! use engine::hash::parse_hex;
//!
//! let index = HmSearch::in_memory(EngineConfig::new(64, 5, 100)).unwrap();
//! index.insert(&parse_hex("414F2C9F12625841").unwrap()).unwrap();
//!
//! let hits = index.lookup(&parse_hex("414F2C9F12625840").unwrap(), None).unwrap();
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].distance, 1);
//! ```

mod backend;
mod config;
mod error;
pub mod hash;
mod hmsearch;

use std::path::Path;

use serde::{Deserialize, Serialize};

#[cfg(feature = "backend-redb")]
pub use backend::RedbStore;
pub use backend::{MemoryStore, PartitionStore};
pub use config::EngineConfig;
pub use error::EngineError;
pub use hmsearch::HmSearch;

/// How a database is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

impl OpenMode {
    /// Numeric code used at dynamically typed boundaries.
    pub const fn as_raw(self) -> i64 {
        match self {
            OpenMode::ReadOnly => 0,
            OpenMode::ReadWrite => 1,
        }
    }

    pub const fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(OpenMode::ReadOnly),
            1 => Some(OpenMode::ReadWrite),
            _ => None,
        }
    }
}

/// One stored hash within the requested distance of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub hash: Vec<u8>,
    pub distance: u32,
}

/// The operations an engine instance offers.
///
/// Implementations must accept concurrent `insert` and `lookup` calls on a
/// shared reference. `close` consumes the engine; callers guarantee no other
/// call is in flight when it runs.
pub trait SearchEngine: Send + Sync + Sized + 'static {
    /// Create the on-disk structures for a new database at `path`.
    fn init(path: &Path, config: &EngineConfig) -> Result<(), EngineError>;

    /// Open an existing database.
    fn open(path: &Path, mode: OpenMode) -> Result<Self, EngineError>;

    fn insert(&self, hash: &[u8]) -> Result<(), EngineError>;

    /// Find stored hashes within `max_error` bits of `hash`. `None` uses the
    /// maximum the database was initialized with.
    fn lookup(&self, hash: &[u8], max_error: Option<u32>)
        -> Result<Vec<LookupResult>, EngineError>;

    fn close(self) -> Result<(), EngineError>;
}
