//! Cooperative work queue
//!
//! Jobs submitted to a [`WorkQueue`] run one at a time, in submission order,
//! on a single tokio task. [`DelayedWork`] is a reschedulable one-shot job
//! that lands on the queue once its delay expires.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle for submitting jobs to the queue task
#[derive(Clone)]
pub struct WorkQueue {
    name: &'static str,
    job_tx: mpsc::UnboundedSender<Job>,
    runtime: Handle,
}

impl WorkQueue {
    /// Start the queue task. Must be called from within a tokio runtime.
    pub fn start(name: &'static str) -> (Self, JoinHandle<()>) {
        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<Job>();

        let task = tokio::spawn(async move {
            while let Some(job) = job_rx.recv().await {
                job();
            }
            debug!("[WORKQ] {} stopped", name);
        });

        let queue = Self {
            name,
            job_tx,
            runtime: Handle::current(),
        };
        (queue, task)
    }

    /// Queue a job. Returns false if the queue task has stopped.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        if self.job_tx.send(Box::new(job)).is_err() {
            warn!("[WORKQ] {} is closed, job dropped", self.name);
            return false;
        }
        true
    }

    /// Runtime the queue was started on
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

/// A one-shot job that runs on a [`WorkQueue`] after a delay.
///
/// At most one run is outstanding: rescheduling a pending job restarts its
/// delay instead of queuing a second run.
pub struct DelayedWork {
    queue: WorkQueue,
    job: Arc<dyn Fn() + Send + Sync>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl DelayedWork {
    pub fn new(queue: WorkQueue, job: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            queue,
            job: Arc::new(job),
            timer: Mutex::new(None),
        }
    }

    fn timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule the job to run after `delay`, cancelling a pending run
    pub fn reschedule(&self, delay: Duration) {
        let mut timer = self.timer();
        if let Some(pending) = timer.take() {
            pending.abort();
        }

        let queue = self.queue.clone();
        let job = self.job.clone();
        *timer = Some(self.queue.runtime().spawn(async move {
            sleep(delay).await;
            queue.submit(move || job());
        }));
    }

    /// Cancel a pending run. Returns true if one was pending.
    ///
    /// A run already handed to the queue is not recalled.
    pub fn cancel(&self) -> bool {
        match self.timer().take() {
            Some(pending) => {
                let was_pending = !pending.is_finished();
                pending.abort();
                was_pending
            }
            None => false,
        }
    }

    /// Whether a run is waiting for its delay to expire
    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.timer()
            .as_ref()
            .map(|pending| !pending.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for DelayedWork {
    fn drop(&mut self) {
        if let Some(pending) = self.timer().take() {
            pending.abort();
        }
    }
}
