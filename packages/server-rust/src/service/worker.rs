//! Background worker for periodic and on-demand tasks.
//!
//! A `BackgroundWorker<R>` owns one `BackgroundRunnable` on a spawned task and
//! feeds it from a bounded channel. Producers that must never wait (stream
//! teardown paths) hold a cloned [`TaskSender`] and submit with `try_submit`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

const TASK_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler executed by `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called on each tick interval. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once after the loop exits. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// TaskSender
// ---------------------------------------------------------------------------

/// Cloneable submission handle for a running worker.
pub struct TaskSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for TaskSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> TaskSender<T> {
    /// Submits a task without waiting for channel capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is full or the worker has stopped.
    pub fn try_submit(&self, task: T) -> anyhow::Result<()> {
        self.tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => anyhow::anyhow!("worker channel full"),
            mpsc::error::TrySendError::Closed(_) => anyhow::anyhow!("worker channel closed"),
        })
    }
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Generic background worker that processes tasks via an mpsc channel.
///
/// The spawned loop runs each task through `BackgroundRunnable::run()`, calls
/// `on_tick()` at the configured interval and `shutdown()` once stopped.
/// Tasks already queued when `stop()` is called are still processed.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Starts the worker with the given runnable and tick interval.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(mut runnable: R, tick_interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(TASK_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break,
                        }
                    }
                    _ = ticker.tick() => {
                        runnable.on_tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            rx.close();
            while let Some(t) = rx.recv().await {
                runnable.run(t).await;
            }
            runnable.shutdown().await;
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Returns a cloneable submission handle, or `None` once stopped.
    #[must_use]
    pub fn sender(&self) -> Option<TaskSender<R::Task>> {
        self.tx.as_ref().map(|tx| TaskSender { tx: tx.clone() })
    }

    /// Submits a task, waiting for channel capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(task)
                .await
                .map_err(|_| anyhow::anyhow!("worker channel closed")),
            None => Err(anyhow::anyhow!("worker not running")),
        }
    }

    /// Stops the worker and waits for its task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Default, Clone)]
    struct Counters {
        runs: Arc<AtomicU32>,
        ticks: Arc<AtomicU32>,
        shutdowns: Arc<AtomicU32>,
    }

    struct CountingRunnable(Counters);

    #[async_trait]
    impl BackgroundRunnable for CountingRunnable {
        type Task = String;

        async fn run(&mut self, _task: String) {
            self.0.runs.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_tick(&mut self) {
            self.0.ticks.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.0.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn start_submit_and_stop() {
        let counters = Counters::default();
        let mut worker =
            BackgroundWorker::start(CountingRunnable(counters.clone()), Duration::from_secs(60));

        worker.submit("a".to_string()).await.unwrap();
        worker.submit("b".to_string()).await.unwrap();
        worker.stop().await;

        assert_eq!(counters.runs.load(Ordering::SeqCst), 2);
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn queued_tasks_are_processed_before_shutdown() {
        let counters = Counters::default();
        let mut worker =
            BackgroundWorker::start(CountingRunnable(counters.clone()), Duration::from_secs(60));
        let sender = worker.sender().unwrap();

        for i in 0..10 {
            sender.try_submit(format!("t{i}")).unwrap();
        }
        worker.stop().await;

        assert_eq!(counters.runs.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn tick_fires_periodically() {
        let counters = Counters::default();
        let mut worker =
            BackgroundWorker::start(CountingRunnable(counters.clone()), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(100)).await;
        worker.stop().await;

        assert!(counters.ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn submit_after_stop_returns_error() {
        let mut worker = BackgroundWorker::start(
            CountingRunnable(Counters::default()),
            Duration::from_secs(60),
        );
        let sender = worker.sender().unwrap();
        worker.stop().await;

        assert!(worker.submit("late".to_string()).await.is_err());
        assert!(worker.sender().is_none());
        assert!(sender.try_submit("late".to_string()).is_err());
    }
}
