//! Hostline API Library Crate
//!
//! This library contains the media-stream server: configuration, the
//! Postgres record store, the HTTP handlers and the WebSocket call bridge.
//! The `api` binary is a thin wrapper around this library.

pub mod audio_utils;
pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod router;
pub mod state;
pub mod ws;

#[cfg(test)]
mod test_support;
