//! Fire-and-forget command workers.
//!
//! Each operator action runs on its own short-lived named thread so the
//! input thread never waits on a link round trip or an interval sleep.
//! A job's only way to report back is the observer: failures are logged and
//! forwarded to [`Observer::on_command_failed`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::error::Result;
use crate::telemetry::{Observer, Operation};

/// Spawns and tracks command workers.
pub struct Dispatcher {
    observer: Arc<dyn Observer>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self {
            observer,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Runs `job` on a new worker thread and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Worker`](crate::ControlError::Worker) if the
    /// thread could not be spawned; the job is dropped unrun.
    pub fn spawn<T, F>(&self, operation: Operation, job: F) -> Result<()>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let observer = Arc::clone(&self.observer);
        let handle = thread::Builder::new()
            .name(format!("cmd-{operation}"))
            .spawn(move || {
                if let Err(err) = job() {
                    log::error!("{operation} failed: {err}");
                    observer.on_command_failed(operation, &err);
                }
            })?;

        let mut workers = self.workers.lock();
        workers.retain(|worker| !worker.is_finished());
        workers.push(handle);
        Ok(())
    }

    /// Workers that have not finished yet.
    pub fn in_flight(&self) -> usize {
        let mut workers = self.workers.lock();
        workers.retain(|worker| !worker.is_finished());
        workers.len()
    }

    /// Waits for every tracked worker to finish.
    pub fn join_all(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let name = worker.thread().name().unwrap_or("cmd").to_string();
            if worker.join().is_err() {
                log::error!("worker {name} panicked");
            }
        }
    }
}
