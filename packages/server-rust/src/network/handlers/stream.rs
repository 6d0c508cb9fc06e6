//! WebSocket stream endpoints.
//!
//! Each upgraded socket is one stream. Text frames carry JSON, binary frames
//! carry named `MsgPack`; responses use the encoding picked by `?format=`.
//! Frames that fail to decode become empty requests, which the dispatchers
//! skip. The stream ends when the peer sends Close, the server shuts down or
//! the dispatcher fails, and the close code tells the peer which it was.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::future;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sieve_core::messages::{decode_binary, decode_text};
use sieve_core::{CodecError, EncodedFrame, WireFormat};
use tokio::sync::mpsc;
use tracing::{debug, error, info_span, warn, Instrument};

use super::AppState;
use crate::service::{run_stream, DispatchError, StreamHandler};

/// Close reasons are limited to 123 bytes by the protocol.
const MAX_CLOSE_REASON: usize = 123;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StreamQuery {
    /// Encoding of outbound frames.
    #[serde(default)]
    pub format: WireFormat,
}

/// `GET /v1/rules`: one event per frame.
pub async fn event_stream_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> Response {
    let handler = state.stage.event_dispatcher();
    ws.on_upgrade(move |socket| serve_stream(socket, state, handler, query.format))
}

/// `GET /v1/rules/batch`: one arrival group per frame.
pub async fn batch_stream_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> Response {
    let handler = state.stage.batch_dispatcher();
    ws.on_upgrade(move |socket| serve_stream(socket, state, handler, query.format))
}

async fn serve_stream<H>(socket: WebSocket, state: AppState, handler: H, format: WireFormat)
where
    H: StreamHandler + 'static,
    H::Request: DeserializeOwned + Default + 'static,
    H::Response: Serialize + 'static,
{
    let mode = handler.mode();
    let entry = state.streams.open(mode, format);
    let span = info_span!("stream", stream_id = entry.id().0, mode = mode.as_str());
    serve_open_stream(socket, &state, handler, format)
        .instrument(span)
        .await;
    drop(entry);
}

async fn serve_open_stream<H>(socket: WebSocket, state: &AppState, handler: H, format: WireFormat)
where
    H: StreamHandler + 'static,
    H::Request: DeserializeOwned + Default + 'static,
    H::Response: Serialize + 'static,
{
    let (mut sink, source) = socket.split();

    let Some(_permit) = state.stage.pool().acquire().await else {
        send_close(&mut sink, close_code::AWAY, "server shutting down".to_string()).await;
        return;
    };
    debug!("stream accepted");

    let mut shutdown = state.shutdown.shutdown_receiver();
    let stopped = async move {
        let _ = shutdown.wait_for(|stop| *stop).await;
    };
    let input = Box::pin(inbound_requests::<H::Request>(source).take_until(stopped));

    let capacity = state.config.connection.outbound_channel_capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let writer = tokio::spawn(write_responses(sink, rx, format).in_current_span());

    let report = run_stream(
        handler,
        &state.stage.config().service_name,
        input,
        &tx,
        state.stage.metrics_sink(),
    )
    .await;
    drop(tx);

    // The writer hands the sink back once every queued response is written.
    let Ok(Some(mut sink)) = writer.await else {
        return;
    };
    if let Some((code, reason)) = close_for(&report.outcome, state.shutdown.is_shutting_down()) {
        send_close(&mut sink, code, reason).await;
    }
}

fn inbound_requests<R>(source: SplitStream<WebSocket>) -> impl Stream<Item = Result<R, axum::Error>>
where
    R: DeserializeOwned + Default,
{
    source
        .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(or_empty(decode_text(text.as_str())))),
                Ok(Message::Binary(bytes)) => Some(Ok(or_empty(decode_binary(&bytes)))),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        })
}

fn or_empty<R: Default>(decoded: Result<R, CodecError>) -> R {
    decoded.unwrap_or_else(|e| {
        warn!(error = %e, "undecodable frame treated as empty request");
        R::default()
    })
}

async fn write_responses<T: Serialize>(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<T>,
    format: WireFormat,
) -> Option<SplitSink<WebSocket, Message>> {
    while let Some(response) = rx.recv().await {
        let message = match format.encode(&response) {
            Ok(EncodedFrame::Text(text)) => Message::Text(text.into()),
            Ok(EncodedFrame::Binary(bytes)) => Message::Binary(bytes.into()),
            Err(e) => {
                error!(error = %e, "response could not be encoded");
                return None;
            }
        };
        if let Err(e) = sink.send(message).await {
            debug!(error = %e, "peer stopped reading");
            return None;
        }
    }
    Some(sink)
}

/// Close code and reason for a finished stream, or `None` when the peer is
/// already gone.
fn close_for(outcome: &Result<(), DispatchError>, shutting_down: bool) -> Option<(u16, String)> {
    match outcome {
        Ok(()) if shutting_down => Some((close_code::AWAY, "server shutting down".to_string())),
        Ok(()) => Some((close_code::NORMAL, String::new())),
        Err(e @ DispatchError::Contract(_)) => Some((close_code::POLICY, e.to_string())),
        Err(e @ DispatchError::Input(_)) => Some((close_code::ERROR, e.to_string())),
        Err(DispatchError::OutputClosed) => None,
    }
}

fn truncate_reason(mut reason: String) -> String {
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

async fn send_close(sink: &mut SplitSink<WebSocket, Message>, code: u16, reason: String) {
    let frame = CloseFrame {
        code,
        reason: truncate_reason(reason).into(),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "close frame not delivered");
    }
}

#[cfg(test)]
mod tests {
    use sieve_core::RuleError;

    use super::*;

    #[test]
    fn contract_violation_closes_with_policy_code() {
        let outcome = Err(DispatchError::Contract(RuleError::NonNumericValue {
            kind: "click".to_string(),
            value: "\"abc\"".to_string(),
        }));
        let (code, reason) = close_for(&outcome, false).unwrap();
        assert_eq!(code, close_code::POLICY);
        assert!(reason.contains("non-numeric"));
    }

    #[test]
    fn clean_end_closes_normally_unless_shutting_down() {
        assert_eq!(close_for(&Ok(()), false), Some((close_code::NORMAL, String::new())));
        assert_eq!(close_for(&Ok(()), true).map(|(code, _)| code), Some(close_code::AWAY));
    }

    #[test]
    fn closed_output_sends_no_close_frame() {
        assert!(close_for(&Err(DispatchError::OutputClosed), false).is_none());
    }

    #[test]
    fn long_reasons_are_truncated_on_char_boundary() {
        let reason = "é".repeat(100);
        let truncated = truncate_reason(reason);
        assert!(truncated.len() <= MAX_CLOSE_REASON);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[test]
    fn stream_query_defaults_to_json() {
        let query: StreamQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.format, WireFormat::Json);
        let query: StreamQuery = serde_json::from_str(r#"{"format":"msgpack"}"#).unwrap();
        assert_eq!(query.format, WireFormat::MsgPack);
    }
}
