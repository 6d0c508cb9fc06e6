//! Server-wide metrics aggregation.
//!
//! Streams hand their final metrics to a [`MetricsAggregator`] running on a
//! `BackgroundWorker`. The aggregator keeps running totals, mirrors them into
//! the `metrics` registry and publishes a snapshot for the health endpoint.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::Serialize;
use sieve_core::MetricsAccumulator;
use tracing::info;

use super::operation::StreamMode;
use super::worker::BackgroundRunnable;

/// Final metrics of one closed stream.
#[derive(Debug, Clone)]
pub struct StreamClosed {
    pub mode: StreamMode,
    pub metrics: MetricsAccumulator,
    pub failed: bool,
}

/// Totals across every closed stream, as exposed on `/health`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateSnapshot {
    pub streams_completed: u64,
    pub streams_failed: u64,
    pub events_processed: u64,
    pub events_emitted: u64,
    pub processing_time_ms: f64,
    pub send_time_ms: f64,
    pub recv_time_ms: f64,
}

pub type SnapshotHandle = Arc<ArcSwap<AggregateSnapshot>>;

pub struct MetricsAggregator {
    totals: MetricsAccumulator,
    streams_completed: u64,
    streams_failed: u64,
    reported_streams: u64,
    snapshot: SnapshotHandle,
}

impl MetricsAggregator {
    #[must_use]
    pub fn new(service_name: &str) -> Self {
        Self {
            totals: MetricsAccumulator::new(service_name),
            streams_completed: 0,
            streams_failed: 0,
            reported_streams: 0,
            snapshot: Arc::new(ArcSwap::from_pointee(AggregateSnapshot::default())),
        }
    }

    /// Shared handle to the published snapshot.
    #[must_use]
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        Arc::clone(&self.snapshot)
    }

    fn publish(&self) {
        self.snapshot.store(Arc::new(AggregateSnapshot {
            streams_completed: self.streams_completed,
            streams_failed: self.streams_failed,
            events_processed: self.totals.events_processed(),
            events_emitted: self.totals.events_emitted(),
            processing_time_ms: self.totals.processing_time_ms(),
            send_time_ms: self.totals.send_time_ms(),
            recv_time_ms: self.totals.recv_time_ms(),
        }));
    }

    fn log_totals(&self, label: &'static str) {
        let total_streams = self.streams_completed + self.streams_failed;
        match self.totals.summary() {
            Some(summary) => info!(
                streams = total_streams,
                failed = self.streams_failed,
                "{label}\n{summary}"
            ),
            None => info!(streams = total_streams, failed = self.streams_failed, "{label}"),
        }
    }
}

#[async_trait]
impl BackgroundRunnable for MetricsAggregator {
    type Task = StreamClosed;

    async fn run(&mut self, task: StreamClosed) {
        let outcome = if task.failed { "failed" } else { "completed" };
        if task.failed {
            self.streams_failed += 1;
        } else {
            self.streams_completed += 1;
        }
        self.totals.merge(&task.metrics);

        let mode = task.mode.as_str();
        metrics::counter!("sieve_streams_total", "mode" => mode, "outcome" => outcome)
            .increment(1);
        metrics::counter!("sieve_events_processed_total", "mode" => mode)
            .increment(task.metrics.events_processed());
        metrics::counter!("sieve_events_emitted_total", "mode" => mode)
            .increment(task.metrics.events_emitted());
        metrics::histogram!("sieve_stream_processing_ms", "mode" => mode)
            .record(task.metrics.processing_time_ms());
        metrics::histogram!("sieve_stream_send_ms", "mode" => mode)
            .record(task.metrics.send_time_ms());
        metrics::histogram!("sieve_stream_recv_ms", "mode" => mode)
            .record(task.metrics.recv_time_ms());

        self.publish();
    }

    async fn on_tick(&mut self) {
        let total_streams = self.streams_completed + self.streams_failed;
        if total_streams == self.reported_streams {
            return;
        }
        self.reported_streams = total_streams;
        self.log_totals("aggregate stream metrics");
    }

    async fn shutdown(&mut self) {
        self.publish();
        self.log_totals("final aggregate stream metrics");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::service::worker::BackgroundWorker;

    fn closed(mode: StreamMode, events: u64, emitted: u64, failed: bool) -> StreamClosed {
        let mut metrics = MetricsAccumulator::new("rules-service");
        metrics.record_processing_count(Duration::from_millis(2), events);
        metrics.record_send(Duration::from_millis(1));
        metrics.record_emitted(emitted);
        StreamClosed {
            mode,
            metrics,
            failed,
        }
    }

    #[tokio::test]
    async fn run_folds_reports_into_snapshot() {
        let mut aggregator = MetricsAggregator::new("rules-service");
        let handle = aggregator.snapshot_handle();

        aggregator.run(closed(StreamMode::Event, 5, 3, false)).await;
        aggregator.run(closed(StreamMode::Batch, 10, 4, true)).await;

        let snapshot = handle.load();
        assert_eq!(snapshot.streams_completed, 1);
        assert_eq!(snapshot.streams_failed, 1);
        assert_eq!(snapshot.events_processed, 15);
        assert_eq!(snapshot.events_emitted, 7);
        assert!(snapshot.processing_time_ms >= 4.0);
    }

    #[tokio::test]
    async fn worker_drains_reports_on_stop() {
        let aggregator = MetricsAggregator::new("rules-service");
        let handle = aggregator.snapshot_handle();
        let mut worker = BackgroundWorker::start(aggregator, Duration::from_secs(60));
        let sender = worker.sender().unwrap();

        for _ in 0..3 {
            sender.try_submit(closed(StreamMode::Event, 2, 1, false)).unwrap();
        }
        worker.stop().await;

        assert_eq!(handle.load().streams_completed, 3);
        assert_eq!(handle.load().events_emitted, 3);
    }

    #[tokio::test]
    async fn tick_only_reports_after_new_streams() {
        let mut aggregator = MetricsAggregator::new("rules-service");
        aggregator.on_tick().await;
        assert_eq!(aggregator.reported_streams, 0);

        aggregator.run(closed(StreamMode::Event, 1, 1, false)).await;
        aggregator.on_tick().await;
        assert_eq!(aggregator.reported_streams, 1);
    }
}
