//! Refresh executors.
//!
//! A hit on the concurrent cache returns the value at once and hands the
//! promotion of the entry to an [`Executor`]. The cache ships two:
//!
//! | Executor           | Behaviour                                                     |
//! |--------------------|---------------------------------------------------------------|
//! | [`RefreshPool`]    | bounded queue drained by worker threads (the default)         |
//! | [`InlineExecutor`] | runs every promotion on the calling thread; deterministic      |
//!
//! When a pool's queue is full the caller runs the promotion itself and the
//! dispatch is reported as [`Dispatch::Saturated`].

use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;
use core::fmt;
use crossbeam_channel::{Sender, TrySendError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// How a task was run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Accepted for later execution.
    Queued,
    /// Run on the caller by design.
    Inline,
    /// Run on the caller because the executor could not accept it.
    Saturated,
}

/// Runs promotion tasks.
///
/// Implementations must eventually run every task they are given, either
/// later or before `execute` returns.
pub trait Executor: Send + Sync {
    /// Runs or schedules `task`.
    fn execute(&self, task: Task) -> Dispatch;
}

/// Runs every task before returning.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) -> Dispatch {
        task();
        Dispatch::Inline
    }
}

/// Fixed worker threads fed by a bounded queue.
///
/// Dropping the pool closes the queue and joins the workers after they have
/// drained it.
pub struct RefreshPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    queue: usize,
}

impl RefreshPool {
    /// Starts `workers` threads behind a queue of `queue` tasks. Both are
    /// raised to at least one.
    pub fn new(workers: usize, queue: usize) -> Self {
        let queue = queue.max(1);
        let (sender, receiver) = crossbeam_channel::bounded::<Task>(queue);

        let mut handles = Vec::with_capacity(workers.max(1));
        for i in 0..workers.max(1) {
            let receiver = receiver.clone();
            let spawned = thread::Builder::new()
                .name(format!("midpoint-refresh-{i}"))
                .spawn(move || {
                    for task in receiver.iter() {
                        task();
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => warn!(worker = i, %err, "failed to spawn refresh worker"),
            }
        }

        if handles.is_empty() {
            // Nothing would drain the queue.
            warn!("no refresh workers running, promotions run on the caller");
            return RefreshPool {
                sender: None,
                workers: handles,
                queue,
            };
        }

        debug!(workers = handles.len(), queue, "refresh pool started");
        RefreshPool {
            sender: Some(sender),
            workers: handles,
            queue,
        }
    }

    /// Number of running worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Queue bound.
    pub fn queue(&self) -> usize {
        self.queue
    }
}

impl Executor for RefreshPool {
    fn execute(&self, task: Task) -> Dispatch {
        let Some(sender) = &self.sender else {
            task();
            return Dispatch::Saturated;
        };
        match sender.try_send(task) {
            Ok(()) => Dispatch::Queued,
            Err(TrySendError::Full(task)) => {
                debug!("refresh queue full, running on caller");
                task();
                Dispatch::Saturated
            }
            Err(TrySendError::Disconnected(task)) => {
                debug!("refresh queue closed, running on caller");
                task();
                Dispatch::Saturated
            }
        }
    }
}

impl Drop for RefreshPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("refresh worker panicked");
            }
        }
    }
}

impl fmt::Debug for RefreshPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshPool")
            .field("workers", &self.workers.len())
            .field("queue", &self.queue)
            .field(
                "pending",
                &self.sender.as_ref().map_or(0, |sender| sender.len()),
            )
            .finish()
    }
}
