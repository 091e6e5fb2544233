//! Database handles.
//!
//! A [`Database`] is a cheap, cloneable reference to one opened engine
//! instance behind a close-drain guard. Each operation comes in a synchronous
//! flavour, which runs on the caller's thread, and an asynchronous one, which
//! runs on the runtime's workers and reports through a completion.
//! Malformed arguments are rejected before anything is scheduled.

use std::fmt;
use std::sync::Arc;

use engine::hash::parse_hex;
use engine::{HmSearch, SearchEngine};
use serde::{Deserialize, Serialize};

use crate::delivery::run_sync;
use crate::error::{HmResult, UsageError};
use crate::guard::CloseDrainGuard;
use crate::runtime::Runtime;
use crate::task::{CloseTask, InsertTask, LookupTask};

/// One lookup hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Lowercase hex.
    pub hash: String,
    pub distance: u32,
}

struct DatabaseInner<E> {
    guard: CloseDrainGuard<E>,
    runtime: Runtime,
}

pub struct Database<E: SearchEngine = HmSearch> {
    inner: Arc<DatabaseInner<E>>,
}

impl<E: SearchEngine> Clone for Database<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: SearchEngine> fmt::Debug for Database<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("open", &self.is_open())
            .field("active_users", &self.active_users())
            .finish()
    }
}

impl<E: SearchEngine> PartialEq for Database<E> {
    /// Handles are equal when they refer to the same opened instance.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<E: SearchEngine> Database<E> {
    /// A handle with nothing attached; every operation reports
    /// [`Error::Closed`](crate::Error::Closed).
    pub fn new(runtime: Runtime) -> Self {
        let guard = CloseDrainGuard::new(runtime.config().drain_policy);
        Self::with_guard(runtime, guard)
    }

    /// Wrap an already opened engine.
    pub fn attached(runtime: Runtime, engine: E) -> Self {
        let guard = CloseDrainGuard::with_engine(runtime.config().drain_policy, engine);
        Self::with_guard(runtime, guard)
    }

    fn with_guard(runtime: Runtime, guard: CloseDrainGuard<E>) -> Self {
        Self {
            inner: Arc::new(DatabaseInner { guard, runtime }),
        }
    }

    pub(crate) fn guard(&self) -> &CloseDrainGuard<E> {
        &self.inner.guard
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// `true` from a successful open until a close detaches the engine.
    pub fn is_open(&self) -> bool {
        self.inner.guard.is_open()
    }

    /// `true` while a close waits for operations or tears the engine down.
    pub fn is_closing(&self) -> bool {
        self.inner.guard.is_closing()
    }

    /// Operations currently inside the engine.
    pub fn active_users(&self) -> usize {
        self.inner.guard.active_users()
    }

    pub fn insert_sync(&self, hash: &str) -> HmResult<()> {
        let hash = decode_hash(hash)?;
        run_sync(InsertTask::new(self.clone(), hash))
    }

    pub fn insert_async<F>(&self, hash: &str, completion: F) -> Result<(), UsageError>
    where
        F: FnOnce(HmResult<()>) + Send + 'static,
    {
        let hash = decode_hash(hash)?;
        self.inner
            .runtime
            .schedule(InsertTask::new(self.clone(), hash), completion);
        Ok(())
    }

    /// Find stored hashes within `max_error` bits of `hash`. `None` or a
    /// negative value means the database's configured maximum; larger values
    /// are clamped to it.
    pub fn lookup_sync(&self, hash: &str, max_error: Option<i64>) -> HmResult<Vec<Match>> {
        let hash = decode_hash(hash)?;
        run_sync(LookupTask::new(self.clone(), hash, effective_max_error(max_error)))
    }

    pub fn lookup_async<F>(
        &self,
        hash: &str,
        max_error: Option<i64>,
        completion: F,
    ) -> Result<(), UsageError>
    where
        F: FnOnce(HmResult<Vec<Match>>) + Send + 'static,
    {
        let hash = decode_hash(hash)?;
        self.inner.runtime.schedule(
            LookupTask::new(self.clone(), hash, effective_max_error(max_error)),
            completion,
        );
        Ok(())
    }

    /// Wait for in-flight operations, then close the engine. Closing an
    /// already closed handle succeeds.
    pub fn close_sync(&self) -> HmResult<()> {
        run_sync(CloseTask::new(self.clone()))
    }

    pub fn close_async<F>(&self, completion: F)
    where
        F: FnOnce(HmResult<()>) + Send + 'static,
    {
        self.inner
            .runtime
            .schedule(CloseTask::new(self.clone()), completion);
    }
}

pub(crate) fn decode_hash(hash: &str) -> Result<Vec<u8>, UsageError> {
    parse_hex(hash).map_err(|err| UsageError::InvalidHash {
        hash: hash.to_string(),
        reason: err.to_string(),
    })
}

fn effective_max_error(max_error: Option<i64>) -> Option<u32> {
    max_error.and_then(|m| u32::try_from(m).ok())
}
