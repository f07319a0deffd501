//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the record store and the realtime connector.

use crate::{config::Config, registry::CallRegistry, ws::provider::RealtimeConnector};
use hostline_core::store::RecordStore;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub connector: Arc<dyn RealtimeConnector>,
    pub registry: CallRegistry,
    /// The default system prompt template.
    pub system_prompt: Arc<String>,
    pub config: Arc<Config>,
}
