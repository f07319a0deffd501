//! Handles the real-time WebSocket connection to OpenAI for voice interaction.

use super::{
    REALTIME_CHANNEL_CAPACITY, RealtimeConnector, RealtimeLeg, RealtimeLegEvent,
    events::{ClientEvent, ServerEvent},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{
    net::TcpStream,
    sync::mpsc::{self, error::TrySendError},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{Instrument, debug, info, info_span, warn};

/// Connects calls to the OpenAI Realtime API.
#[derive(Clone)]
pub struct OpenAiConnector {
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiConnector {
    pub fn new(url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}?model={}", self.url, self.model)
    }
}

#[async_trait]
impl RealtimeConnector for OpenAiConnector {
    async fn connect(&self, call_sid: &str) -> Result<RealtimeLeg> {
        let mut request = self.endpoint().into_client_request()?;
        request
            .headers_mut()
            .insert("Authorization", format!("Bearer {}", self.api_key).parse()?);
        request
            .headers_mut()
            .insert("OpenAI-Beta", "realtime=v1".parse()?);

        let (ws_stream, _) = connect_async(request)
            .await
            .context("Failed to connect to OpenAI Realtime WebSocket")?;
        info!(call_sid, model = %self.model, "Connected to OpenAI Realtime API.");

        let (client_tx, client_rx) = mpsc::channel(REALTIME_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(REALTIME_CHANNEL_CAPACITY);

        let handle = tokio::spawn(
            async move {
                let reason = match pump(ws_stream, client_rx, &event_tx).await {
                    Ok(reason) => reason,
                    Err(e) => {
                        warn!(error = ?e, "Realtime connection failed");
                        Some(e.to_string())
                    }
                };
                let _ = event_tx.send(RealtimeLegEvent::Closed(reason)).await;
            }
            .instrument(info_span!("realtime_leg", call_sid = %call_sid)),
        );

        Ok(RealtimeLeg {
            tx: client_tx,
            rx: event_rx,
            handle,
        })
    }
}

type RealtimeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Shuttles events between the bridge channels and the socket until either side closes.
///
/// Reading and writing run concurrently, so a bridge that is slow to take
/// server events never stops queued client events from reaching the socket.
/// Returns the close reason reported by the server, if any.
async fn pump(
    ws_stream: RealtimeSocket,
    client_rx: mpsc::Receiver<ClientEvent>,
    event_tx: &mpsc::Sender<RealtimeLegEvent>,
) -> Result<Option<String>> {
    let (sink, stream) = ws_stream.split();

    tokio::select! {
        written = write_client_events(sink, client_rx) => written.map(|()| None),
        read = read_server_events(stream, event_tx) => read,
    }
}

async fn write_client_events(
    mut sink: SplitSink<RealtimeSocket, WsMessage>,
    mut client_rx: mpsc::Receiver<ClientEvent>,
) -> Result<()> {
    while let Some(event) = client_rx.recv().await {
        let text = serde_json::to_string(&event)?;
        sink.send(WsMessage::Text(text.into())).await?;
    }
    debug!("Bridge released the realtime leg; closing socket.");
    let _ = sink.send(WsMessage::Close(None)).await;
    Ok(())
}

async fn read_server_events(
    mut stream: SplitStream<RealtimeSocket>,
    event_tx: &mpsc::Sender<RealtimeLegEvent>,
) -> Result<Option<String>> {
    while let Some(message) = stream.next().await {
        match message? {
            WsMessage::Text(text) => {
                let event = match serde_json::from_str::<ServerEvent>(text.as_str()) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Skipping unparseable realtime event");
                        continue;
                    }
                };
                if !forward(event, event_tx).await {
                    return Ok(None);
                }
            }
            WsMessage::Close(frame) => {
                return Ok(frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty()));
            }
            _ => {}
        }
    }
    Ok(None)
}

/// Hands a server event to the bridge. Audio is dropped when the bridge is
/// behind; everything else waits for room. Returns false once the bridge is gone.
async fn forward(event: ServerEvent, event_tx: &mpsc::Sender<RealtimeLegEvent>) -> bool {
    if matches!(event, ServerEvent::ResponseAudioDelta { .. }) {
        return match event_tx.try_send(RealtimeLegEvent::Server(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Bridge is backed up; dropping assistant audio chunk");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        };
    }
    event_tx.send(RealtimeLegEvent::Server(event)).await.is_ok()
}
