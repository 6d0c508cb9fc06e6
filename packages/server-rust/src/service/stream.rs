//! Per-stream request loop shared by the event and batch dispatchers.
//!
//! [`run_stream`] pulls requests from a transport-agnostic input stream, hands
//! each one to a [`StreamHandler`], writes whatever the handler emits to the
//! output channel and flushes metrics when the input ends or fails.

use std::fmt;
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use sieve_core::MetricsAccumulator;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::aggregate::StreamClosed;
use super::operation::{DispatchError, DispatchState, StreamMode, StreamReport};
use super::worker::TaskSender;

/// Request handling for one stream mode.
pub trait StreamHandler: Send {
    type Request: Send;
    /// What a handled request yields when something must be emitted.
    type Output: Send;
    /// The frame written to the output channel.
    type Response: Send;

    fn mode(&self) -> StreamMode;

    /// Handles one request received at `received_at`.
    ///
    /// Returns `Ok(None)` when nothing is emitted for this request.
    ///
    /// # Errors
    ///
    /// Returns a `DispatchError` that ends the stream.
    fn handle(
        &mut self,
        request: Self::Request,
        received_at: Instant,
        metrics: &mut MetricsAccumulator,
    ) -> Result<Option<Self::Output>, DispatchError>;

    fn respond(output: Self::Output) -> Self::Response;

    /// Number of events carried by `output`.
    fn emitted_count(_output: &Self::Output) -> u64 {
        1
    }
}

/// Drives one stream to completion.
///
/// Responses are written in request order. Send time covers building the
/// response and waiting for channel capacity. The report is logged and, when
/// `sink` is set, forwarded to the metrics aggregator on every exit path.
pub async fn run_stream<H, S, E>(
    mut handler: H,
    service_name: &str,
    mut input: S,
    output: &mpsc::Sender<H::Response>,
    sink: Option<&TaskSender<StreamClosed>>,
) -> StreamReport
where
    H: StreamHandler,
    S: Stream<Item = Result<H::Request, E>> + Unpin,
    E: fmt::Display,
{
    let mode = handler.mode();
    let mut metrics = MetricsAccumulator::new(service_name);

    let outcome = loop {
        trace!(state = DispatchState::AwaitingInput.as_str());
        let request = match input.next().await {
            None => break Ok(()),
            Some(Ok(request)) => request,
            Some(Err(e)) => break Err(DispatchError::Input(e.to_string())),
        };
        let received_at = Instant::now();

        let out = match handler.handle(request, received_at, &mut metrics) {
            Ok(Some(out)) => out,
            Ok(None) => continue,
            Err(e) => break Err(e),
        };

        trace!(state = DispatchState::Emitting.as_str());
        let count = H::emitted_count(&out);
        let send_start = Instant::now();
        let sent = output.send(H::respond(out)).await;
        metrics.record_send(send_start.elapsed());
        if sent.is_err() {
            break Err(DispatchError::OutputClosed);
        }
        metrics.record_emitted(count);
    };

    debug!(
        state = DispatchState::StreamClosed.as_str(),
        mode = mode.as_str(),
        ok = outcome.is_ok(),
        "stream finished"
    );
    if let Err(e) = &outcome {
        warn!(mode = mode.as_str(), error = %e, "stream ended with error");
    }

    let report = StreamReport {
        mode,
        metrics,
        outcome,
    };
    report.log_summary();

    if let Some(sink) = sink {
        let closed = StreamClosed {
            mode,
            metrics: report.metrics.clone(),
            failed: report.is_failure(),
        };
        if let Err(e) = sink.try_submit(closed) {
            debug!(error = %e, "stream report not aggregated");
        }
    }

    report
}
