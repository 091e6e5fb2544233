//! Worker runtime.
//!
//! Asynchronous tasks execute on the blocking pool of a dedicated tokio
//! runtime, capped at [`RuntimeConfig::worker_threads`] threads. Finished
//! tasks are handed to one named delivery thread which invokes completions in
//! the order tasks finish.
//!
//! Every scheduled task keeps the runtime alive until its completion has run,
//! so dropping the last user-held [`Runtime`] never strands a pending
//! completion.

use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, RuntimeConfig};
use crate::delivery::{delivery_loop, run_caught, Delivery};
use crate::error::{Error, HmResult};
use crate::task::{next_task_id, Task, TaskId, TaskKind};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start worker pool: {0}")]
    Spawn(#[from] std::io::Error),
}

struct RuntimeInner {
    workers: Option<tokio::runtime::Runtime>,
    deliveries: UnboundedSender<Delivery>,
    config: RuntimeConfig,
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        // Runs after the last task delivered, so nothing is left to wait for.
        if let Some(workers) = self.workers.take() {
            workers.shutdown_background();
        }
        debug!("runtime_stopped");
    }
}

/// Shared handle to a worker pool and its delivery thread.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;

        let workers = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.worker_threads)
            .thread_name(config.worker_thread_name.clone())
            .build()?;

        let (deliveries, receiver) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name(config.delivery_thread_name.clone())
            .spawn(move || delivery_loop(receiver))?;

        info!(
            worker_threads = config.worker_threads,
            drain_policy = config.drain_policy.as_str(),
            "runtime_started"
        );
        Ok(Self {
            inner: Arc::new(RuntimeInner {
                workers: Some(workers),
                deliveries,
                config,
            }),
        })
    }

    /// The process-wide runtime used by the free functions, configured from
    /// the environment on first use.
    pub fn global() -> Result<Runtime, RuntimeError> {
        static GLOBAL: OnceLock<Runtime> = OnceLock::new();
        if let Some(runtime) = GLOBAL.get() {
            return Ok(runtime.clone());
        }
        let runtime = Runtime::new(RuntimeConfig::from_env()?)?;
        // A racing initializer may win; the loser's pool is simply dropped.
        Ok(GLOBAL.get_or_init(|| runtime).clone())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Run `task` on a worker and pass its outcome to `completion` on the
    /// delivery thread.
    pub fn schedule<T, F>(&self, task: T, completion: F)
    where
        T: Task,
        F: FnOnce(HmResult<T::Output>) + Send + 'static,
    {
        let task_id = next_task_id();
        let kind = task.kind();
        debug!(task_id, kind = kind.as_str(), "task_scheduled");

        let keepalive = self.clone();
        let Some(workers) = self.inner.workers.as_ref() else {
            // Only reachable while the runtime is being torn down.
            warn!(task_id, "runtime_stopped_before_schedule");
            let outcome = Err(Error::Runtime("worker pool stopped".into()));
            keepalive.deliver(task_id, kind, outcome, completion);
            return;
        };
        workers.spawn_blocking(move || {
            run_caught(task_id, task, move |outcome| {
                keepalive.deliver(task_id, kind, outcome, completion);
            });
        });
    }

    /// Queue `completion(outcome)` on the delivery thread. The runtime stays
    /// alive until the completion has run.
    fn deliver<O, F>(self, task_id: TaskId, kind: TaskKind, outcome: HmResult<O>, completion: F)
    where
        O: Send + 'static,
        F: FnOnce(HmResult<O>) + Send + 'static,
    {
        let deliveries = self.inner.deliveries.clone();
        let delivery = Delivery::new(task_id, kind, move || {
            completion(outcome);
            drop(self);
        });
        if deliveries.send(delivery).is_err() {
            warn!(task_id, "delivery_thread_gone");
        }
    }
}
