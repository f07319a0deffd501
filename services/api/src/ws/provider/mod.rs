//! Manages the per-call WebSocket connection to the realtime voice model.

pub mod events;
pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use events::{ClientEvent, ServerEvent};
use tokio::{sync::mpsc, task::JoinHandle};

/// Capacity of the channels between the bridge and the realtime connection task.
pub const REALTIME_CHANNEL_CAPACITY: usize = 256;

/// Something the realtime connection task reports back to the bridge.
#[derive(Debug)]
pub enum RealtimeLegEvent {
    /// A parsed server event.
    Server(ServerEvent),
    /// The connection is gone; carries the reason when there is one.
    Closed(Option<String>),
}

/// An open realtime connection owned by one call.
///
/// Dropping `tx` makes the connection task close the socket and exit.
pub struct RealtimeLeg {
    pub tx: mpsc::Sender<ClientEvent>,
    pub rx: mpsc::Receiver<RealtimeLegEvent>,
    pub handle: JoinHandle<()>,
}

/// Opens realtime connections.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self, call_sid: &str) -> Result<RealtimeLeg>;
}
