//! Manages the media-stream WebSocket connection lifecycle for one call.

use super::{
    bridge::{CallBridge, Flow},
    protocol::{TelephonyCommand, TelephonyEvent},
    provider::RealtimeLegEvent,
};
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, Stream, StreamExt,
    stream::SplitSink,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, error, field, info, info_span, instrument, warn};

/// Capacity of the queue feeding the telephony writer task.
const TELEPHONY_CHANNEL_CAPACITY: usize = 256;

/// Axum handler to upgrade an HTTP connection to a media-stream WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual media-stream connection.
///
/// Spawns the writer task, then runs the call on this task until the stream
/// stops or the connection drops.
#[instrument(name = "media_stream", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id: u32 = rand::random();
    tracing::Span::current().record("connection_id", connection_id);
    info!("New media stream connection.");

    let (socket_tx, socket_rx) = socket.split();
    let (telephony_tx, telephony_rx) = mpsc::channel(TELEPHONY_CHANNEL_CAPACITY);
    let writer = tokio::spawn(write_telephony(socket_tx, telephony_rx).in_current_span());

    let bridge = CallBridge::new(state, telephony_tx);
    let call_span = info_span!("call", call_sid = field::Empty, stream_sid = field::Empty);
    run_call(bridge, socket_rx).instrument(call_span).await;

    if let Err(e) = writer.await {
        error!(error = ?e, "Telephony writer task failed");
    }
    info!("Media stream connection closed.");
}

/// The per-call event loop.
///
/// Telephony frames and realtime events are handled strictly one at a time.
/// Dropping the bridge at the end closes the writer queue, which closes the
/// socket.
async fn run_call<S>(mut bridge: CallBridge, mut socket_rx: S)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut realtime_rx: Option<mpsc::Receiver<RealtimeLegEvent>> = None;

    loop {
        tokio::select! {
            msg = socket_rx.next() => {
                let flow = match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<TelephonyEvent>(text.as_str()) {
                            Ok(event) => bridge.handle_telephony(event).await,
                            Err(e) => {
                                warn!(error = %e, "Ignoring unparseable telephony message");
                                Flow::Continue
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Telephony side closed the connection.");
                        Flow::Hangup
                    }
                    Some(Ok(_)) => Flow::Continue,
                    Some(Err(e)) => {
                        warn!(error = ?e, "Error receiving from telephony WebSocket");
                        Flow::Hangup
                    }
                };
                if realtime_rx.is_none() {
                    realtime_rx = bridge.take_realtime_events();
                }
                if flow == Flow::Hangup {
                    break;
                }
            },
            event = recv_opt(&mut realtime_rx) => match event {
                Some(event) => bridge.handle_realtime(event).await,
                None => realtime_rx = None,
            },
        }
    }

    // The realtime task may be waiting to report its close; release it first.
    drop(realtime_rx);
    bridge.finish().await;
}

/// Receives from `rx` if there is one; otherwise never resolves.
async fn recv_opt<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Serializes queued commands onto the socket until the queue closes.
async fn write_telephony(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<TelephonyCommand>,
) {
    while let Some(command) = rx.recv().await {
        let serialized = match serde_json::to_string(&command) {
            Ok(serialized) => serialized,
            Err(e) => {
                error!(error = ?e, "Failed to serialize telephony command");
                continue;
            }
        };
        if let Err(e) = socket_tx.send(Message::Text(serialized.into())).await {
            warn!(error = ?e, "Failed to write to telephony WebSocket");
            return;
        }
    }
    let _ = socket_tx.send(Message::Close(None)).await;
    let _ = socket_tx.close().await;
}
