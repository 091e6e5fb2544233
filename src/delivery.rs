//! Result delivery.
//!
//! Both calling conventions share one task body. The synchronous one runs the
//! task on the caller's thread and returns its outcome. The asynchronous one
//! runs it on a worker, which then posts a [`Delivery`] to the single delivery
//! thread. Completions therefore never run on a worker, never run
//! concurrently with one another, and run exactly once per scheduled task.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, trace};

use crate::error::{Error, HmResult};
use crate::task::{execute, next_task_id, Task, TaskId, TaskKind};

/// Caller-supplied continuation receiving a task's outcome.
pub type Completion<T> = Box<dyn FnOnce(HmResult<T>) + Send + 'static>;

/// Run `task` on the calling thread.
pub fn run_sync<T: Task>(task: T) -> HmResult<T::Output> {
    let mut slot = None;
    execute(next_task_id(), task, |outcome| slot = Some(outcome));
    slot.unwrap_or_else(|| Err(Error::Worker("task finished without an outcome".into())))
}

/// Run `task` on the current (worker) thread. `report` is called exactly
/// once; a panic before the task reported becomes [`Error::Worker`].
pub(crate) fn run_caught<T, R>(task_id: TaskId, task: T, report: R)
where
    T: Task,
    R: FnOnce(HmResult<T::Output>),
{
    let mut report = Some(report);
    let caught = panic::catch_unwind(AssertUnwindSafe(|| {
        execute(task_id, task, |outcome| {
            if let Some(report) = report.take() {
                report(outcome);
            }
        })
    }));

    if let Some(report) = report.take() {
        let message = match caught {
            Err(payload) => panic_message(payload.as_ref()),
            Ok(()) => "task finished without an outcome".to_string(),
        };
        error!(task_id, panic = %message, "task_panicked");
        report(Err(Error::Worker(message)));
    }
}

/// A finished task's outcome bound to its completion, ready to run on the
/// delivery thread.
pub(crate) struct Delivery {
    task_id: TaskId,
    kind: TaskKind,
    complete: Box<dyn FnOnce() + Send + 'static>,
}

impl Delivery {
    pub(crate) fn new<F>(task_id: TaskId, kind: TaskKind, complete: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            task_id,
            kind,
            complete: Box::new(complete),
        }
    }

    fn run(self) {
        let Delivery {
            task_id,
            kind,
            complete,
        } = self;
        trace!(task_id, kind = kind.as_str(), "task_delivering");
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(complete)) {
            error!(
                task_id,
                kind = kind.as_str(),
                panic = %panic_message(payload.as_ref()),
                "completion_panicked"
            );
        }
    }
}

/// Body of the delivery thread: run deliveries in arrival order until every
/// sender is gone.
pub(crate) fn delivery_loop(mut deliveries: UnboundedReceiver<Delivery>) {
    debug!("delivery_thread_started");
    while let Some(delivery) = deliveries.blocking_recv() {
        delivery.run();
    }
    debug!("delivery_thread_stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Panics;

    impl Task for Panics {
        type Output = ();

        fn kind(&self) -> TaskKind {
            TaskKind::Lookup
        }

        fn run<R>(self, _report: R)
        where
            R: FnOnce(HmResult<()>),
        {
            panic!("engine exploded");
        }
    }

    struct Fails;

    impl Task for Fails {
        type Output = u32;

        fn kind(&self) -> TaskKind {
            TaskKind::Insert
        }

        fn run<R>(self, report: R)
        where
            R: FnOnce(HmResult<u32>),
        {
            report(Err(Error::Closed));
        }
    }

    #[test]
    fn panics_become_worker_errors() {
        let mut outcomes = Vec::new();
        run_caught(1, Panics, |outcome| outcomes.push(outcome));
        assert_eq!(outcomes, vec![Err(Error::Worker("engine exploded".into()))]);
    }

    #[test]
    fn panic_after_reporting_is_not_reported_twice() {
        struct ReportsThenPanics;

        impl Task for ReportsThenPanics {
            type Output = u32;

            fn kind(&self) -> TaskKind {
                TaskKind::Lookup
            }

            fn run<R>(self, report: R)
            where
                R: FnOnce(HmResult<u32>),
            {
                report(Ok(5));
                panic!("late failure");
            }
        }

        let mut outcomes = Vec::new();
        run_caught(2, ReportsThenPanics, |outcome| outcomes.push(outcome));
        assert_eq!(outcomes, vec![Ok(5)]);
    }

    #[test]
    fn sync_run_returns_task_error() {
        assert_eq!(run_sync(Fails), Err(Error::Closed));
    }

    #[test]
    fn loop_runs_deliveries_in_order_and_survives_panics() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..3u64 {
            let seen = std::sync::Arc::clone(&seen);
            let sent = tx.send(Delivery::new(i, TaskKind::Insert, move || {
                if i == 1 {
                    panic!("bad completion");
                }
                seen.lock().unwrap().push(i);
            }));
            assert!(sent.is_ok());
        }
        drop(tx);

        std::thread::spawn(move || delivery_loop(rx)).join().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 2]);
    }
}
