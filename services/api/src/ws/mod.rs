//! Media Stream Bridging
//!
//! This module contains the logic that joins a telephony media stream to a
//! realtime model connection for the lifetime of one call:
//!
//! - `protocol`: The JSON events exchanged with the telephony platform.
//! - `session`: The WebSocket lifecycle and the per-call event loop.
//! - `bridge`: The per-call state machine.
//! - `cycle`: Exposes the order desk tools to the model and runs its tool calls.
//! - `provider`: The realtime model connection and its wire events.

pub mod bridge;
mod cycle;
pub mod protocol;
pub mod provider;
pub mod session;

pub use session::ws_handler;
