//! Shared helpers for the integration tests: runtimes, sample hashes and
//! instrumented engines.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use hmsearch::{
    DrainPolicy, EngineConfig, EngineError, LookupResult, OpenMode, Runtime, RuntimeConfig,
    SearchEngine,
};

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub const INSERTED: [&str; 12] = [
    "414F2C9F12625841",
    "DD29B9354FE2BB80",
    "D68F2C1AF77285D9",
    "CBCD1C9D73BA4B18",
    "824EB2B44456DBCD",
    "CD9F03E038366F16",
    "6E32A6B749EDCEC5",
    "D81FBE9ADBF9DCAD",
    "78364579589F20D3",
    "3CA1063EC8C29C2C",
    "3CA1063EC8C29C20",
    "3CA1063EC8C29C21",
];

/// Query `i` is `i` bits away from `INSERTED[i]`.
pub const AT_DISTANCE: [&str; 7] = [
    "414F2C9F12625841",
    "DD29B9354FE0BB80",
    "D68F0C1AF77085D9",
    "CBCD0C9D73B04B18",
    "422EB2B44456DBCD",
    "CD9F030038066F16",
    "6E32A60049EDCEC5",
];

pub const MISSING: &str = "92EFC9B23AA80608";

pub fn runtime(worker_threads: usize) -> Runtime {
    runtime_with(worker_threads, DrainPolicy::RejectNew)
}

pub fn runtime_with(worker_threads: usize, drain_policy: DrainPolicy) -> Runtime {
    Runtime::new(
        RuntimeConfig::default()
            .with_worker_threads(worker_threads)
            .with_drain_policy(drain_policy)
            .with_thread_names("it-worker", "it-delivery"),
    )
    .expect("runtime")
}

/// Spin until `cond` holds or the timeout elapses.
pub fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

/// A latch that engine calls wait on until the test opens it.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
    entered: AtomicUsize,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    fn pass(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let open = self.open.lock().unwrap();
        let _open = self.opened.wait_while(open, |open| !*open).unwrap();
    }
}

/// Engine whose lookups block on a [`Gate`] and echo the query back.
pub struct GatedEngine {
    gate: Arc<Gate>,
    closed: Arc<AtomicBool>,
}

impl GatedEngine {
    pub fn new(gate: &Arc<Gate>, closed: &Arc<AtomicBool>) -> Self {
        Self {
            gate: Arc::clone(gate),
            closed: Arc::clone(closed),
        }
    }
}

impl SearchEngine for GatedEngine {
    fn init(_: &Path, _: &EngineConfig) -> Result<(), EngineError> {
        Err(EngineError::storage("gated engine is not persistent"))
    }

    fn open(_: &Path, _: OpenMode) -> Result<Self, EngineError> {
        Err(EngineError::storage("gated engine is not persistent"))
    }

    fn insert(&self, _: &[u8]) -> Result<(), EngineError> {
        Ok(())
    }

    fn lookup(&self, hash: &[u8], _: Option<u32>) -> Result<Vec<LookupResult>, EngineError> {
        self.gate.pass();
        Ok(vec![LookupResult {
            hash: hash.to_vec(),
            distance: 0,
        }])
    }

    fn close(self) -> Result<(), EngineError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Engine whose lookups panic.
pub struct PanickingEngine;

impl SearchEngine for PanickingEngine {
    fn init(_: &Path, _: &EngineConfig) -> Result<(), EngineError> {
        Ok(())
    }

    fn open(_: &Path, _: OpenMode) -> Result<Self, EngineError> {
        Ok(PanickingEngine)
    }

    fn insert(&self, _: &[u8]) -> Result<(), EngineError> {
        Ok(())
    }

    fn lookup(&self, _: &[u8], _: Option<u32>) -> Result<Vec<LookupResult>, EngineError> {
        panic!("lookup exploded");
    }

    fn close(self) -> Result<(), EngineError> {
        Ok(())
    }
}
