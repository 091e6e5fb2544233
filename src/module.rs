use std::marker::PhantomData;
use std::path::Path;

use engine::{EngineConfig, HmSearch, OpenMode, SearchEngine};

use crate::database::Database;
use crate::delivery::run_sync;
use crate::error::{Error, HmResult};
use crate::runtime::Runtime;
use crate::task::{InitTask, OpenTask};

/// Module-level operations: creating and opening databases.
///
/// Handles opened through a module schedule their asynchronous work on the
/// module's runtime.
pub struct Module<E: SearchEngine = HmSearch> {
    runtime: Runtime,
    _engine: PhantomData<fn() -> E>,
}

impl<E: SearchEngine> Clone for Module<E> {
    fn clone(&self) -> Self {
        Self::new(self.runtime.clone())
    }
}

impl<E: SearchEngine> Module<E> {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            _engine: PhantomData,
        }
    }

    /// A module on the process-wide runtime.
    pub fn global() -> HmResult<Self> {
        let runtime = Runtime::global().map_err(|err| Error::Runtime(err.to_string()))?;
        Ok(Self::new(runtime))
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Create a database at `path`, replacing any file already there.
    pub fn init_sync(
        &self,
        path: impl AsRef<Path>,
        hash_bits: u32,
        max_error: u32,
        num_hashes: u64,
    ) -> HmResult<()> {
        let config = EngineConfig::new(hash_bits, max_error, num_hashes);
        run_sync(InitTask::<E>::new(path.as_ref(), config))
    }

    pub fn init_async<F>(
        &self,
        path: impl AsRef<Path>,
        hash_bits: u32,
        max_error: u32,
        num_hashes: u64,
        completion: F,
    ) where
        F: FnOnce(HmResult<()>) + Send + 'static,
    {
        let config = EngineConfig::new(hash_bits, max_error, num_hashes);
        self.runtime
            .schedule(InitTask::<E>::new(path.as_ref(), config), completion);
    }

    pub fn open_sync(&self, path: impl AsRef<Path>, mode: OpenMode) -> HmResult<Database<E>> {
        run_sync(OpenTask::<E>::new(path.as_ref(), mode, self.runtime.clone()))
    }

    pub fn open_async<F>(&self, path: impl AsRef<Path>, mode: OpenMode, completion: F)
    where
        F: FnOnce(HmResult<Database<E>>) + Send + 'static,
    {
        self.runtime.schedule(
            OpenTask::<E>::new(path.as_ref(), mode, self.runtime.clone()),
            completion,
        );
    }
}
