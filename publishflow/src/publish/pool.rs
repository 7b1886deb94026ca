//! Fixed-parallelism worker pool with a bounded submission queue.

use crate::config::PublishConfig;
use crate::errors::PublishError;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error};

/// Counters reported when a pool is drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Jobs accepted by [`BatchPool::submit`].
    pub submitted: usize,
    /// Jobs that ran to completion.
    pub completed: usize,
    /// Jobs that panicked.
    pub panicked: usize,
}

/// Runs submitted jobs on at most `parallelism` concurrent tasks.
///
/// Submissions go through a bounded channel; once it is full, `submit`
/// waits until a worker frees a slot. Jobs may finish in any order.
/// [`drain`](Self::drain) is the synchronization barrier: it closes the
/// queue and returns only after every accepted job has finished.
pub struct BatchPool {
    name: String,
    tx: mpsc::Sender<BoxFuture<'static, ()>>,
    dispatcher: JoinHandle<PoolStats>,
    submitted: AtomicUsize,
}

impl BatchPool {
    /// Creates a pool and starts its dispatcher.
    #[must_use]
    pub fn new(name: impl Into<String>, parallelism: usize, capacity: usize) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dispatcher = tokio::spawn(dispatch(name.clone(), parallelism.max(1), rx));
        debug!(pool = %name, parallelism, capacity, "Batch pool started");

        Self {
            name,
            tx,
            dispatcher,
            submitted: AtomicUsize::new(0),
        }
    }

    /// Creates a pool sized from the run configuration.
    #[must_use]
    pub fn for_config(name: impl Into<String>, config: &PublishConfig) -> Self {
        Self::new(name, config.parallelism, config.queue_capacity())
    }

    /// Returns the pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of jobs accepted so far.
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Queues a job, waiting while the queue is full.
    pub async fn submit<F>(&self, job: F) -> Result<(), PublishError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tx
            .send(Box::pin(job))
            .await
            .map_err(|_| PublishError::Internal(format!("Batch pool '{}' is closed", self.name)))?;
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Closes the queue and waits for every accepted job to finish.
    pub async fn drain(self) -> Result<PoolStats, PublishError> {
        let Self {
            name,
            tx,
            dispatcher,
            submitted,
        } = self;
        drop(tx);

        let mut stats = dispatcher.await.map_err(|e| {
            PublishError::Internal(format!("Batch pool '{name}' dispatcher failed: {e}"))
        })?;
        stats.submitted = submitted.into_inner();
        debug!(
            pool = %name,
            submitted = stats.submitted,
            completed = stats.completed,
            panicked = stats.panicked,
            "Batch pool drained"
        );
        Ok(stats)
    }
}

impl std::fmt::Debug for BatchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchPool")
            .field("name", &self.name)
            .field("submitted", &self.submitted())
            .finish()
    }
}

async fn dispatch(
    name: String,
    parallelism: usize,
    mut rx: mpsc::Receiver<BoxFuture<'static, ()>>,
) -> PoolStats {
    let permits = Arc::new(Semaphore::new(parallelism));
    let mut running = JoinSet::new();
    let mut stats = PoolStats::default();

    while let Some(job) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        running.spawn(async move {
            job.await;
            drop(permit);
        });
        while let Some(result) = running.try_join_next() {
            record(&name, &mut stats, result);
        }
    }

    while let Some(result) = running.join_next().await {
        record(&name, &mut stats, result);
    }
    stats
}

fn record(name: &str, stats: &mut PoolStats, result: Result<(), JoinError>) {
    match result {
        Ok(()) => stats.completed += 1,
        Err(e) => {
            stats.panicked += 1;
            error!(pool = %name, "Batch job did not complete: {e}");
        }
    }
}
