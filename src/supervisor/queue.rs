//! Per-coordinator sequential task queue.
//!
//! Jobs submitted to a [`TaskQueue`] run one at a time, in submission
//! order, on a single worker task. Each coordinator owns its own queue, so
//! there is no process-wide serialization point. A panicking job is logged
//! and does not stop the worker.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{AppError, Result};

const QUEUE_CAPACITY: usize = 256;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Sender side of a sequential task queue.
///
/// Clones feed the same worker. The worker exits after every clone is
/// dropped and the backlog has run.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<Job>,
}

impl TaskQueue {
    /// Start a queue worker.
    #[must_use]
    pub fn spawn(name: &'static str) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(QUEUE_CAPACITY);
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    warn!(queue = name, "queued job panicked, continuing with the next one");
                }
            }
            debug!(queue = name, "task queue drained");
        });
        (Self { tx }, worker)
    }

    /// Enqueue an async job. Waits while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Queue` if the worker has stopped.
    pub async fn submit<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tx
            .send(Box::pin(job))
            .await
            .map_err(|_| AppError::Queue("task queue worker stopped".into()))
    }

    /// Enqueue a synchronous closure.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Queue` if the worker has stopped.
    pub async fn submit_fn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(async move { job() }).await
    }
}
