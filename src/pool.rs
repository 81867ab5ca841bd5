/*!
 * Generic bounded-concurrency worker pool
 *
 * Used at two nesting levels: an outer pool over the spec's sources and an
 * inner pool over each fetch plan's objects. Each pool derives a child
 * cancellation scope from its parent; the error channel has the same
 * capacity as the job buffer so a worker never blocks reporting a failure.
 */

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, VolareError};
use crate::types::DEFAULT_WORKERS;

pub type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Processor invoked once per job with the pool's cancellation scope.
pub type JobFn<T> = Arc<dyn Fn(CancellationToken, T) -> JobFuture + Send + Sync>;

/// Bounded-concurrency executor with cancellation and error fan-in.
///
/// Lifecycle: [`start`](WorkerPool::start), any number of
/// [`submit`](WorkerPool::submit) calls, then [`stop`](WorkerPool::stop),
/// which closes the job channel, waits for the workers to drain, and closes
/// the error channel so [`next_error`](WorkerPool::next_error) terminates.
pub struct WorkerPool<T> {
    worker_count: usize,
    jobs_tx: Option<mpsc::Sender<T>>,
    jobs_rx: Arc<Mutex<mpsc::Receiver<T>>>,
    errs_tx: Option<mpsc::Sender<VolareError>>,
    errs_rx: mpsc::Receiver<VolareError>,
    cancel: CancellationToken,
    workers: JoinSet<()>,
    processor: JobFn<T>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Build a pool with `worker_count` workers and a job buffer sized to
    /// the number of items about to be submitted. The pool's cancellation
    /// scope is derived from `parent`.
    pub fn new(
        parent: &CancellationToken,
        worker_count: usize,
        job_buffer: usize,
        processor: JobFn<T>,
    ) -> Self {
        let capacity = job_buffer.max(1);
        let (jobs_tx, jobs_rx) = mpsc::channel(capacity);
        let (errs_tx, errs_rx) = mpsc::channel(capacity);

        Self {
            worker_count: worker_count.max(1),
            jobs_tx: Some(jobs_tx),
            jobs_rx: Arc::new(Mutex::new(jobs_rx)),
            errs_tx: Some(errs_tx),
            errs_rx,
            cancel: parent.child_token(),
            workers: JoinSet::new(),
            processor,
        }
    }

    /// Spawn the workers. Each worker loops drawing the next job or
    /// observing cancellation; processor errors are forwarded to the error
    /// channel, never dropped.
    pub fn start(&mut self) {
        let Some(errs_tx) = self.errs_tx.clone() else {
            return;
        };

        for id in 0..self.worker_count {
            self.workers.spawn(worker_loop(
                id,
                self.jobs_rx.clone(),
                errs_tx.clone(),
                self.cancel.clone(),
                self.processor.clone(),
            ));
        }
    }

    /// Enqueue a job, or fail with [`VolareError::Cancelled`] once the
    /// pool's scope is cancelled. Submissions right after cancellation may
    /// still succeed while the buffer has room.
    pub async fn submit(&self, job: T) -> Result<()> {
        let Some(jobs_tx) = self.jobs_tx.as_ref() else {
            return Err(VolareError::Cancelled);
        };

        tokio::select! {
            sent = jobs_tx.send(job) => sent.map_err(|_| VolareError::Cancelled),
            _ = self.cancel.cancelled() => Err(VolareError::Cancelled),
        }
    }

    /// Trigger the pool's cancellation scope without closing the job
    /// channel; in-flight jobs observe it through their token.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Close the job channel, wait for the workers to drain the buffer and
    /// finish in-flight work, then close the error channel.
    pub async fn stop(&mut self) {
        self.jobs_tx.take();
        while self.workers.join_next().await.is_some() {}
        self.errs_tx.take();
    }

    /// Read the next worker error. Blocks until one arrives or the error
    /// channel is closed by [`stop`](WorkerPool::stop); errors come in no
    /// particular order.
    pub async fn next_error(&mut self) -> Option<VolareError> {
        self.errs_rx.recv().await
    }
}

async fn worker_loop<T: Send + 'static>(
    id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<T>>>,
    errs: mpsc::Sender<VolareError>,
    cancel: CancellationToken,
    processor: JobFn<T>,
) {
    loop {
        let job = {
            let mut rx = jobs.lock().await;
            tokio::select! {
                job = rx.recv() => job,
                _ = cancel.cancelled() => {
                    tracing::debug!(worker = id, "cancellation observed, exiting");
                    return;
                }
            }
        };

        // None means the job channel is closed and drained.
        let Some(job) = job else { return };

        tokio::select! {
            result = (processor)(cancel.clone(), job) => {
                if let Err(err) = result {
                    tracing::error!(worker = id, error = %err, "error processing job");
                    // Capacity equals the job buffer, so this never blocks.
                    let _ = errs.send(err).await;
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!(worker = id, "cancellation observed mid-job, exiting");
                return;
            }
        }
    }
}

/// One-shot helper: build a pool sized to `items`, run every item through
/// `processor`, and surface the first failure.
///
/// Submission failures come back wrapped as `submit item`, worker failures
/// as `processing error`; remaining worker errors are discarded.
pub async fn run_pool<T: Send + 'static>(
    cancel: &CancellationToken,
    items: Vec<T>,
    workers: Option<usize>,
    processor: JobFn<T>,
) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }

    let worker_count = workers.unwrap_or(DEFAULT_WORKERS);
    let mut pool = WorkerPool::new(cancel, worker_count, items.len(), processor);
    pool.start();

    for item in items {
        if let Err(err) = pool.submit(item).await {
            pool.cancel();
            pool.stop().await;
            return Err(VolareError::Submit(Box::new(err)));
        }
    }

    pool.stop().await;

    if let Some(err) = pool.next_error().await {
        return Err(VolareError::Processing(Box::new(err)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_processor(counter: Arc<AtomicUsize>) -> JobFn<usize> {
        Arc::new(move |_cancel, _job| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_all_jobs_processed() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        run_pool(&cancel, (0..25).collect(), Some(4), counting_processor(counter.clone()))
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 25);
    }

    #[tokio::test]
    async fn test_empty_items_is_noop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        run_pool(&cancel, Vec::new(), None, counting_processor(counter.clone()))
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_jobs_report_one_error_each() {
        let processor: JobFn<usize> = Arc::new(|_cancel, job| {
            Box::pin(async move {
                if job % 2 == 0 {
                    Err(VolareError::Other(format!("job {job} failed")))
                } else {
                    Ok(())
                }
            })
        });

        let cancel = CancellationToken::new();
        let mut pool = WorkerPool::new(&cancel, 3, 10, processor);
        pool.start();

        for job in 0..10 {
            pool.submit(job).await.unwrap();
        }
        pool.stop().await;

        let mut errors = 0;
        while pool.next_error().await.is_some() {
            errors += 1;
        }
        assert_eq!(errors, 5);
    }

    #[tokio::test]
    async fn test_run_pool_wraps_first_error() {
        let processor: JobFn<usize> = Arc::new(|_cancel, _job| {
            Box::pin(async { Err(VolareError::Other("boom".to_string())) })
        });

        let cancel = CancellationToken::new();
        let err = run_pool(&cancel, vec![1, 2, 3], Some(2), processor)
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("processing error: "));
    }

    #[tokio::test]
    async fn test_submit_after_cancel_eventually_fails() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let buffer = 4;
        let mut pool = WorkerPool::new(&cancel, 2, buffer, counting_processor(counter));
        pool.start();
        pool.cancel();

        let mut failed = false;
        for job in 0..buffer + 16 {
            if pool.submit(job).await.is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed, "submit must fail within a bounded number of attempts");

        pool.stop().await;
    }

    #[tokio::test]
    async fn test_cancelled_parent_fails_submit_in_run_pool() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let processor: JobFn<usize> = Arc::new(|_cancel, _job| Box::pin(async { Ok(()) }));

        // With a cancelled parent the workers exit immediately; once the
        // buffer fills, submission observes the cancellation.
        let items: Vec<usize> = (0..64).collect();
        let err = run_pool(&cancel, items, Some(2), processor).await.unwrap_err();
        assert!(err.to_string().starts_with("submit item: "));
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_in_flight_jobs_observe_cancellation() {
        let cancel = CancellationToken::new();

        let processor: JobFn<usize> = Arc::new(|token, _job| {
            Box::pin(async move {
                token.cancelled().await;
                Err(VolareError::Cancelled)
            })
        });

        let mut pool = WorkerPool::new(&cancel, 1, 1, processor);
        pool.start();
        pool.submit(1).await.unwrap();

        // Give the worker time to pick the job up, then cancel the parent.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();
        pool.stop().await;
    }
}
