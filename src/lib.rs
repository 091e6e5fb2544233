//! Umbrella crate for `hmsearch`: Hamming-distance hash search behind
//! close-safe handles.
//!
//! A database is created with [`init_sync`] / [`init_async`] and opened with
//! [`open_sync`] / [`open_async`], yielding a [`Database`] handle. Handles can
//! be cloned freely and shared across threads. Every operation exists in two
//! flavours:
//!
//! - `*_sync` runs on the calling thread and returns `Result<T, Error>`.
//! - `*_async` runs on a worker of the [`Runtime`] and passes the outcome to a
//!   completion, invoked once on the runtime's delivery thread.
//!
//! Closing a handle waits for operations already inside the engine, then
//! tears the engine down. Operations that arrive afterwards fail with
//! [`Error::Closed`].
//!
//! ```no_run
//! use hmsearch::{init_sync, open_sync, READWRITE};
//!
//! init_sync("hashes.redb", 64, 5, 1_000_000)?;
//! let db = open_sync("hashes.redb", READWRITE)?;
//! db.insert_sync("00ff00ff00ff00ff")?;
//! for hit in db.lookup_sync("00ff00ff00ff00fe", None)? {
//!     println!("{} at distance {}", hit.hash, hit.distance);
//! }
//! db.close_sync()?;
//! # Ok::<(), hmsearch::Error>(())
//! ```

pub mod config;
mod database;
mod delivery;
mod error;
mod guard;
pub mod host;
mod module;
mod runtime;
mod task;

use std::path::Path;

pub use config::{ConfigError, DrainPolicy, RuntimeConfig};
pub use database::{Database, Match};
pub use delivery::run_sync;
pub use error::{Error, HmResult, UsageError};
pub use guard::{CloseDrainGuard, Lease};
pub use module::Module;
pub use runtime::{Runtime, RuntimeError};
pub use task::{CloseTask, InitTask, InsertTask, LookupTask, OpenTask, Task, TaskId, TaskKind};

pub use engine::{EngineConfig, EngineError, HmSearch, LookupResult, OpenMode, SearchEngine};

/// Open without write access; inserts fail.
pub const READONLY: OpenMode = OpenMode::ReadOnly;
pub const READWRITE: OpenMode = OpenMode::ReadWrite;

/// Create an HmSearch database at `path`, replacing any existing file.
pub fn init_sync(
    path: impl AsRef<Path>,
    hash_bits: u32,
    max_error: u32,
    num_hashes: u64,
) -> HmResult<()> {
    Module::<HmSearch>::global()?.init_sync(path, hash_bits, max_error, num_hashes)
}

/// Create a database on a worker of the global runtime.
pub fn init_async<F>(
    path: impl AsRef<Path>,
    hash_bits: u32,
    max_error: u32,
    num_hashes: u64,
    completion: F,
) -> HmResult<()>
where
    F: FnOnce(HmResult<()>) + Send + 'static,
{
    Module::<HmSearch>::global()?.init_async(path, hash_bits, max_error, num_hashes, completion);
    Ok(())
}

pub fn open_sync(path: impl AsRef<Path>, mode: OpenMode) -> HmResult<Database> {
    Module::<HmSearch>::global()?.open_sync(path, mode)
}

pub fn open_async<F>(path: impl AsRef<Path>, mode: OpenMode, completion: F) -> HmResult<()>
where
    F: FnOnce(HmResult<Database>) + Send + 'static,
{
    Module::<HmSearch>::global()?.open_async(path, mode, completion);
    Ok(())
}
