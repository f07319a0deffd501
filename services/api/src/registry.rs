//! The set of calls currently bridged by this process.

use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

/// What the registry knows about a live call.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveCall {
    pub stream_sid: String,
    pub restaurant: String,
    pub started_at: DateTime<Utc>,
}

/// Calls keyed by call sid. Entries are added when a stream starts and
/// removed when the call ends.
#[derive(Clone, Default)]
pub struct CallRegistry {
    calls: Arc<RwLock<HashMap<String, ActiveCall>>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, call_sid: &str, call: ActiveCall) {
        if let Some(previous) = self.calls.write().await.insert(call_sid.to_string(), call) {
            tracing::warn!(call_sid, stream_sid = %previous.stream_sid, "Replaced an active call with the same sid");
        }
    }

    /// Removes the entry for `call_sid` if it still belongs to `stream_sid`.
    ///
    /// A stream that was replaced under the same sid leaves the newer call in place.
    pub async fn remove(&self, call_sid: &str, stream_sid: &str) -> Option<ActiveCall> {
        let mut calls = self.calls.write().await;
        match calls.get(call_sid) {
            Some(call) if call.stream_sid == stream_sid => calls.remove(call_sid),
            _ => None,
        }
    }

    pub async fn len(&self) -> usize {
        self.calls.read().await.len()
    }

    pub async fn get(&self, call_sid: &str) -> Option<ActiveCall> {
        self.calls.read().await.get(call_sid).cloned()
    }
}
