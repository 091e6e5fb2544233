//! Operation tasks.
//!
//! Every public operation is packaged as a [`Task`]: a self-contained value
//! holding its inputs and, for handle operations, a clone of the handle. A
//! task runs exactly once. Running consumes it, so it moves from created to
//! running to completed by ownership alone, and its output or error is handed
//! to exactly one consumer.
//!
//! Handle tasks hold a guard lease only for the engine call and the hand-off
//! of its outcome. Completions run on the delivery thread, never under a
//! lease.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use engine::hash::format_hex;
use engine::{EngineConfig, LookupResult, OpenMode, SearchEngine};
use tracing::{debug, warn, Level};

use crate::database::{Database, Match};
use crate::error::{Error, HmResult};
use crate::runtime::Runtime;

pub type TaskId = u64;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_task_id() -> TaskId {
    NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Init,
    Open,
    Insert,
    Lookup,
    Close,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Init => "init",
            TaskKind::Open => "open",
            TaskKind::Insert => "insert",
            TaskKind::Lookup => "lookup",
            TaskKind::Close => "close",
        }
    }
}

/// A unit of work executed once, on the caller's thread or on a worker.
pub trait Task: Send + 'static {
    type Output: Send + 'static;

    fn kind(&self) -> TaskKind;

    /// Perform the operation and hand its outcome to `report` exactly once.
    ///
    /// Handle tasks call `report` while still holding their lease. On the
    /// asynchronous path `report` only queues the outcome, so a close that
    /// drains this task is queued behind it; the completion itself runs later
    /// on the delivery thread, after the lease is gone.
    fn run<R>(self, report: R)
    where
        R: FnOnce(HmResult<Self::Output>);
}

/// Run a task inside a span carrying its id and kind.
pub(crate) fn execute<T, R>(task_id: TaskId, task: T, report: R)
where
    T: Task,
    R: FnOnce(HmResult<T::Output>),
{
    let span = tracing::span!(
        Level::DEBUG,
        "hmsearch.task",
        task_id,
        kind = task.kind().as_str()
    );
    let _guard = span.enter();
    let start = Instant::now();
    debug!("task_running");

    task.run(|outcome| {
        let elapsed_micros = start.elapsed().as_micros();
        match &outcome {
            Ok(_) => debug!(elapsed_micros, "task_success"),
            Err(err) => warn!(error = %err, elapsed_micros, "task_failure"),
        }
        report(outcome);
    });
}

/// Creates a new database file.
pub struct InitTask<E> {
    path: PathBuf,
    config: EngineConfig,
    _engine: PhantomData<fn() -> E>,
}

impl<E: SearchEngine> InitTask<E> {
    pub fn new(path: impl Into<PathBuf>, config: EngineConfig) -> Self {
        Self {
            path: path.into(),
            config,
            _engine: PhantomData,
        }
    }
}

impl<E: SearchEngine> Task for InitTask<E> {
    type Output = ();

    fn kind(&self) -> TaskKind {
        TaskKind::Init
    }

    fn run<R>(self, report: R)
    where
        R: FnOnce(HmResult<()>),
    {
        report(E::init(&self.path, &self.config).map_err(Error::from));
    }
}

/// Opens a database and wraps it in a new handle bound to `runtime`.
pub struct OpenTask<E> {
    path: PathBuf,
    mode: OpenMode,
    runtime: Runtime,
    _engine: PhantomData<fn() -> E>,
}

impl<E: SearchEngine> OpenTask<E> {
    pub fn new(path: impl Into<PathBuf>, mode: OpenMode, runtime: Runtime) -> Self {
        Self {
            path: path.into(),
            mode,
            runtime,
            _engine: PhantomData,
        }
    }
}

impl<E: SearchEngine> Task for OpenTask<E> {
    type Output = Database<E>;

    fn kind(&self) -> TaskKind {
        TaskKind::Open
    }

    fn run<R>(self, report: R)
    where
        R: FnOnce(HmResult<Database<E>>),
    {
        let runtime = self.runtime;
        report(
            E::open(&self.path, self.mode)
                .map(|engine| Database::attached(runtime, engine))
                .map_err(Error::from),
        );
    }
}

pub struct InsertTask<E: SearchEngine> {
    db: Database<E>,
    hash: Vec<u8>,
}

impl<E: SearchEngine> InsertTask<E> {
    pub fn new(db: Database<E>, hash: Vec<u8>) -> Self {
        Self { db, hash }
    }
}

impl<E: SearchEngine> Task for InsertTask<E> {
    type Output = ();

    fn kind(&self) -> TaskKind {
        TaskKind::Insert
    }

    fn run<R>(self, report: R)
    where
        R: FnOnce(HmResult<()>),
    {
        let Some(engine) = self.db.guard().try_acquire() else {
            return report(Err(Error::Closed));
        };
        report(engine.insert(&self.hash).map_err(Error::from));
    }
}

pub struct LookupTask<E: SearchEngine> {
    db: Database<E>,
    hash: Vec<u8>,
    max_error: Option<u32>,
}

impl<E: SearchEngine> LookupTask<E> {
    pub fn new(db: Database<E>, hash: Vec<u8>, max_error: Option<u32>) -> Self {
        Self {
            db,
            hash,
            max_error,
        }
    }
}

impl<E: SearchEngine> Task for LookupTask<E> {
    type Output = Vec<Match>;

    fn kind(&self) -> TaskKind {
        TaskKind::Lookup
    }

    fn run<R>(self, report: R)
    where
        R: FnOnce(HmResult<Vec<Match>>),
    {
        let Some(engine) = self.db.guard().try_acquire() else {
            return report(Err(Error::Closed));
        };
        report(
            engine
                .lookup(&self.hash, self.max_error)
                .map_err(Error::from)
                .and_then(marshal),
        );
    }
}

fn marshal(results: Vec<LookupResult>) -> HmResult<Vec<Match>> {
    let mut matches = Vec::new();
    matches
        .try_reserve_exact(results.len())
        .map_err(|err| Error::Marshal(err.to_string()))?;
    matches.extend(results.into_iter().map(|r| Match {
        hash: format_hex(&r.hash),
        distance: r.distance,
    }));
    Ok(matches)
}

pub struct CloseTask<E: SearchEngine> {
    db: Database<E>,
}

impl<E: SearchEngine> CloseTask<E> {
    pub fn new(db: Database<E>) -> Self {
        Self { db }
    }
}

impl<E: SearchEngine> Task for CloseTask<E> {
    type Output = ();

    fn kind(&self) -> TaskKind {
        TaskKind::Close
    }

    fn run<R>(self, report: R)
    where
        R: FnOnce(HmResult<()>),
    {
        report(self.db.guard().close().map_err(Error::from));
    }
}
