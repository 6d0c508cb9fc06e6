//! Per-stream phase timing: receive, processing and send.
//!
//! A `MetricsAccumulator` is owned by the task that handles one stream and is
//! never shared. At stream end it produces a [`MetricsSummary`], a
//! diagnostic side channel that has no effect on what the stream emits.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

// ---------------------------------------------------------------------------
// MetricsAccumulator
// ---------------------------------------------------------------------------

/// Accumulated phase times (milliseconds) and event counts for one stream.
///
/// `events_processed` counts every event that reached the processing phase,
/// whether it was emitted, rejected or failed. Counters only ever grow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsAccumulator {
    service_name: String,
    events_processed: u64,
    events_emitted: u64,
    processing_time_ms: f64,
    send_time_ms: f64,
    recv_time_ms: f64,
}

impl MetricsAccumulator {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            events_processed: 0,
            events_emitted: 0,
            processing_time_ms: 0.0,
            send_time_ms: 0.0,
            recv_time_ms: 0.0,
        }
    }

    pub fn record_recv(&mut self, elapsed: Duration) {
        self.recv_time_ms += millis(elapsed);
    }

    /// Records the processing time of a single event.
    pub fn record_processing(&mut self, elapsed: Duration) {
        self.record_processing_count(elapsed, 1);
    }

    /// Records one processing sample that covers `count` events.
    pub fn record_processing_count(&mut self, elapsed: Duration, count: u64) {
        self.processing_time_ms += millis(elapsed);
        self.events_processed += count;
    }

    pub fn record_send(&mut self, elapsed: Duration) {
        self.send_time_ms += millis(elapsed);
    }

    /// Counts `count` events written to the output.
    pub fn record_emitted(&mut self, count: u64) {
        self.events_emitted += count;
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[must_use]
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    #[must_use]
    pub fn events_emitted(&self) -> u64 {
        self.events_emitted
    }

    #[must_use]
    pub fn processing_time_ms(&self) -> f64 {
        self.processing_time_ms
    }

    #[must_use]
    pub fn send_time_ms(&self) -> f64 {
        self.send_time_ms
    }

    #[must_use]
    pub fn recv_time_ms(&self) -> f64 {
        self.recv_time_ms
    }

    #[must_use]
    pub fn total_time_ms(&self) -> f64 {
        self.processing_time_ms + self.send_time_ms + self.recv_time_ms
    }

    /// Adds the counters and times of `other` into `self`.
    pub fn merge(&mut self, other: &MetricsAccumulator) {
        self.events_processed += other.events_processed;
        self.events_emitted += other.events_emitted;
        self.processing_time_ms += other.processing_time_ms;
        self.send_time_ms += other.send_time_ms;
        self.recv_time_ms += other.recv_time_ms;
    }

    /// Builds the end-of-stream summary, or `None` if no time was recorded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self) -> Option<MetricsSummary> {
        let total = self.total_time_ms();
        if total <= 0.0 {
            return None;
        }

        let events = self.events_processed;
        let phase = |time_ms: f64| PhaseSummary {
            total_ms: time_ms,
            share_pct: time_ms / total * 100.0,
            avg_per_event_ms: if events == 0 {
                0.0
            } else {
                time_ms / events as f64
            },
        };

        Some(MetricsSummary {
            service_name: self.service_name.clone(),
            events_processed: events,
            events_emitted: self.events_emitted,
            processing: phase(self.processing_time_ms),
            send: phase(self.send_time_ms),
            recv: phase(self.recv_time_ms),
        })
    }
}

// ---------------------------------------------------------------------------
// MetricsSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSummary {
    pub total_ms: f64,
    /// Share of the total time across all three phases, in percent.
    pub share_pct: f64,
    pub avg_per_event_ms: f64,
}

/// End-of-stream breakdown of where time was spent.
///
/// `Display` renders the multi-line report written to the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub service_name: String,
    pub events_processed: u64,
    pub events_emitted: u64,
    pub processing: PhaseSummary,
    pub send: PhaseSummary,
    pub recv: PhaseSummary,
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} Metrics ===", self.service_name)?;
        writeln!(f, "Events processed: {}", self.events_processed)?;
        writeln!(f, "Events emitted: {}", self.events_emitted)?;
        for (label, p) in [
            ("Processing", &self.processing),
            ("IPC Send", &self.send),
            ("IPC Recv", &self.recv),
        ] {
            writeln!(f, "{label} time: {:.2}ms ({:.1}%)", p.total_ms, p.share_pct)?;
        }
        writeln!(f, "Avg per event:")?;
        writeln!(f, "  Processing: {:.4}ms", self.processing.avg_per_event_ms)?;
        writeln!(f, "  IPC Send: {:.4}ms", self.send.avg_per_event_ms)?;
        write!(f, "  IPC Recv: {:.4}ms", self.recv.avg_per_event_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_accumulator_has_no_summary() {
        let m = MetricsAccumulator::new("rules-service");
        assert!(m.summary().is_none());
        assert_eq!(m.events_processed(), 0);
    }

    #[test]
    fn processing_count_is_added_per_sample() {
        let mut m = MetricsAccumulator::new("svc");
        m.record_processing(Duration::from_millis(2));
        m.record_processing_count(Duration::from_millis(4), 5);
        assert_eq!(m.events_processed(), 6);
        assert!((m.processing_time_ms() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn summary_reports_shares_and_averages() {
        let mut m = MetricsAccumulator::new("svc");
        m.record_recv(Duration::from_millis(10));
        m.record_processing_count(Duration::from_millis(30), 4);
        m.record_send(Duration::from_millis(60));
        m.record_emitted(2);

        let s = m.summary().unwrap();
        assert_eq!(s.events_processed, 4);
        assert_eq!(s.events_emitted, 2);
        assert!((s.recv.share_pct - 10.0).abs() < 1e-9);
        assert!((s.processing.share_pct - 30.0).abs() < 1e-9);
        assert!((s.send.share_pct - 60.0).abs() < 1e-9);
        assert!((s.processing.avg_per_event_ms - 7.5).abs() < 1e-9);
        assert!((s.send.avg_per_event_ms - 15.0).abs() < 1e-9);
    }

    #[test]
    fn summary_without_processed_events_does_not_divide_by_zero() {
        let mut m = MetricsAccumulator::new("svc");
        m.record_recv(Duration::from_millis(1));
        let s = m.summary().unwrap();
        assert_eq!(s.recv.avg_per_event_ms, 0.0);
        assert!((s.recv.share_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn merge_adds_everything() {
        let mut a = MetricsAccumulator::new("server");
        let mut b = MetricsAccumulator::new("stream");
        a.record_processing(Duration::from_millis(1));
        b.record_processing_count(Duration::from_millis(2), 3);
        b.record_send(Duration::from_millis(1));
        b.record_emitted(1);

        a.merge(&b);
        assert_eq!(a.service_name(), "server");
        assert_eq!(a.events_processed(), 4);
        assert_eq!(a.events_emitted(), 1);
        assert!((a.total_time_ms() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn display_renders_report() {
        let mut m = MetricsAccumulator::new("rules-service");
        m.record_processing_count(Duration::from_millis(3), 3);
        m.record_send(Duration::from_millis(1));
        let text = m.summary().unwrap().to_string();

        assert!(text.starts_with("=== rules-service Metrics ==="));
        assert!(text.contains("Events processed: 3"));
        assert!(text.contains("Processing time: 3.00ms (75.0%)"));
        assert!(text.contains("IPC Send time: 1.00ms (25.0%)"));
        assert!(text.contains("IPC Recv time: 0.00ms (0.0%)"));
        assert!(text.contains("  Processing: 1.0000ms"));
    }
}
