//! Close-drain guard.
//!
//! [`CloseDrainGuard`] owns the engine instance behind a handle and counts the
//! operations currently using it. Operations hold a [`Lease`] for the length
//! of one engine call; [`CloseDrainGuard::close`] waits for every outstanding
//! lease to be released before it detaches and tears the engine down, so no
//! operation ever touches an engine that is being (or has been) closed.
//!
//! All state lives under one mutex with a condition variable signalled
//! whenever the number of users drops to zero or a close finishes.

use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use engine::{EngineError, SearchEngine};
use tracing::{debug, warn};

use crate::config::DrainPolicy;

struct GuardState<E> {
    engine: Option<Arc<E>>,
    active_users: usize,
    closing: bool,
}

pub struct CloseDrainGuard<E> {
    state: Mutex<GuardState<E>>,
    changed: Condvar,
    policy: DrainPolicy,
}

/// A counted borrow of the attached engine. Dropping it releases the guard.
pub struct Lease<'a, E> {
    // Field order matters: the engine reference is dropped before the
    // release runs, so a woken closer always finds itself the sole owner.
    engine: Arc<E>,
    _release: Release<'a, E>,
}

struct Release<'a, E>(&'a CloseDrainGuard<E>);

impl<E> Drop for Release<'_, E> {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl<E> Deref for Lease<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.engine
    }
}

impl<E> CloseDrainGuard<E> {
    /// A guard with no engine attached.
    pub fn new(policy: DrainPolicy) -> Self {
        Self {
            state: Mutex::new(GuardState {
                engine: None,
                active_users: 0,
                closing: false,
            }),
            changed: Condvar::new(),
            policy,
        }
    }

    /// A guard that starts open with `engine` attached.
    pub fn with_engine(policy: DrainPolicy, engine: E) -> Self {
        let guard = Self::new(policy);
        guard.lock().engine = Some(Arc::new(engine));
        guard
    }

    pub fn policy(&self) -> DrainPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, GuardState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a freshly opened engine. Hands the engine back if one is
    /// already attached or a close is in progress.
    pub fn attach(&self, engine: E) -> Result<(), E> {
        let mut state = self.lock();
        if state.engine.is_some() || state.closing {
            return Err(engine);
        }
        state.engine = Some(Arc::new(engine));
        Ok(())
    }

    /// Borrow the engine for one operation, or `None` if the handle is
    /// closed (or draining under [`DrainPolicy::RejectNew`]).
    pub fn try_acquire(&self) -> Option<Lease<'_, E>> {
        let mut state = self.lock();
        if state.closing && self.policy == DrainPolicy::RejectNew {
            return None;
        }
        let engine = Arc::clone(state.engine.as_ref()?);
        state.active_users += 1;
        drop(state);

        Some(Lease {
            engine,
            _release: Release(self),
        })
    }

    fn release(&self) {
        let mut state = self.lock();
        debug_assert!(state.active_users > 0, "release without acquire");
        state.active_users = state.active_users.saturating_sub(1);
        if state.active_users == 0 {
            self.changed.notify_all();
        }
    }

    /// Whether an engine is attached. Stays `true` while a close drains.
    pub fn is_open(&self) -> bool {
        self.lock().engine.is_some()
    }

    /// Whether a close is waiting for users or tearing the engine down.
    pub fn is_closing(&self) -> bool {
        self.lock().closing
    }

    pub fn active_users(&self) -> usize {
        self.lock().active_users
    }
}

impl<E: SearchEngine> CloseDrainGuard<E> {
    /// Drain all users, detach the engine and tear it down.
    ///
    /// Concurrent closers are serialized; the ones arriving after the first
    /// find nothing attached and return `Ok(())`. A teardown failure is
    /// reported, but the engine is detached regardless.
    pub fn close(&self) -> Result<(), EngineError> {
        let state = self.lock();
        let mut state = self
            .changed
            .wait_while(state, |s| s.closing)
            .unwrap_or_else(PoisonError::into_inner);
        if state.engine.is_none() {
            return Ok(());
        }

        state.closing = true;
        debug!(active_users = state.active_users, "guard_close_draining");
        let mut state = self
            .changed
            .wait_while(state, |s| s.active_users > 0)
            .unwrap_or_else(PoisonError::into_inner);
        let engine = state.engine.take();
        drop(state);

        let mut leaked = None;
        let outcome = match engine.map(Arc::try_unwrap) {
            Some(Ok(engine)) => engine.close(),
            Some(Err(shared)) => {
                // Every clone lives in a lease, so this means one escaped its
                // lease. The engine is dropped with its last reference.
                let references = Arc::strong_count(&shared);
                warn!(references, "guard_close_engine_shared");
                leaked = Some(references);
                Ok(())
            }
            None => Ok(()),
        };

        let mut state = self.lock();
        state.closing = false;
        self.changed.notify_all();
        drop(state);
        debug_assert!(
            leaked.is_none(),
            "engine still shared by {leaked:?} references at close"
        );

        match &outcome {
            Ok(()) => debug!("guard_close_done"),
            Err(err) => warn!(error = %err, "guard_close_teardown_failed"),
        }
        outcome
    }
}
