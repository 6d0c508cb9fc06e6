//! Stream-level types shared by the dispatchers, the aggregator and the
//! transport: stream modes, dispatch errors and end-of-stream reports.

use std::fmt;

use sieve_core::{MetricsAccumulator, RuleError};
use tracing::info;

/// Which endpoint a stream arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// One event per request, one response per admitted event.
    Event,
    /// One arrival group per request, one response per non-empty survivor set.
    Batch,
}

impl StreamMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Batch => "batch",
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatcher state, used only as a tracing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    AwaitingInput,
    Received,
    Classified,
    Processed,
    Emitting,
    StreamClosed,
}

impl DispatchState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingInput => "awaiting_input",
            Self::Received => "received",
            Self::Classified => "classified",
            Self::Processed => "processed",
            Self::Emitting => "emitting",
            Self::StreamClosed => "stream_closed",
        }
    }
}

/// Errors that end a stream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    /// A non-work-item event carried a value that is not an integer.
    #[error("contract violation: {0}")]
    Contract(#[from] RuleError),
    /// The inbound side of the transport failed.
    #[error("input stream failed: {0}")]
    Input(String),
    /// The peer stopped reading responses.
    #[error("output stream closed by peer")]
    OutputClosed,
}

impl DispatchError {
    /// Short label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Contract(_) => "contract",
            Self::Input(_) => "input",
            Self::OutputClosed => "output_closed",
        }
    }
}

/// Final state of one stream, produced when its input ends or fails.
#[derive(Debug, Clone)]
pub struct StreamReport {
    pub mode: StreamMode,
    pub metrics: MetricsAccumulator,
    pub outcome: Result<(), DispatchError>,
}

impl StreamReport {
    /// Logs the stream's metrics summary. Silent when no time was recorded.
    pub fn log_summary(&self) {
        let Some(summary) = self.metrics.summary() else {
            return;
        };
        info!(
            mode = self.mode.as_str(),
            events_processed = summary.events_processed,
            events_emitted = summary.events_emitted,
            processing_ms = summary.processing.total_ms,
            send_ms = summary.send.total_ms,
            recv_ms = summary.recv.total_ms,
            "stream metrics\n{summary}"
        );
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }
}
