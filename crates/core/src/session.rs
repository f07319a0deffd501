//! Per-call session state.
//!
//! A `CallSession` exists from the telephony `start` event until the call
//! ends. Its identifiers and restaurant never change once set; only the
//! response and greeting flags and the shared order book move.

use crate::{menu::Restaurant, order::OrderBook};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Identifiers the telephony platform hands over on `start`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallIdentity {
    pub call_sid: String,
    pub stream_sid: String,
    pub caller_phone: Option<String>,
    pub called_number: Option<String>,
}

#[derive(Debug)]
pub struct CallSession {
    identity: CallIdentity,
    restaurant: Restaurant,
    call_log_id: Option<Uuid>,
    started_at: DateTime<Utc>,
    order: Arc<Mutex<OrderBook>>,
    response_in_flight: bool,
    greeted: bool,
}

impl CallSession {
    pub fn new(identity: CallIdentity, restaurant: Restaurant, call_log_id: Option<Uuid>) -> Self {
        Self {
            identity,
            restaurant,
            call_log_id,
            started_at: Utc::now(),
            order: Arc::new(Mutex::new(OrderBook::new())),
            response_in_flight: false,
            greeted: false,
        }
    }

    pub fn call_sid(&self) -> &str {
        &self.identity.call_sid
    }

    pub fn stream_sid(&self) -> &str {
        &self.identity.stream_sid
    }

    pub fn identity(&self) -> &CallIdentity {
        &self.identity
    }

    pub fn restaurant(&self) -> &Restaurant {
        &self.restaurant
    }

    pub fn call_log_id(&self) -> Option<Uuid> {
        self.call_log_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The order book shared with this call's tool desk.
    pub fn order(&self) -> Arc<Mutex<OrderBook>> {
        self.order.clone()
    }

    pub fn response_in_flight(&self) -> bool {
        self.response_in_flight
    }

    pub fn set_response_in_flight(&mut self, in_flight: bool) {
        self.response_in_flight = in_flight;
    }

    /// Returns `true` exactly once per call: the first time the greeting is due.
    pub fn take_greeting(&mut self) -> bool {
        !std::mem::replace(&mut self.greeted, true)
    }

    /// Whole seconds between the start of the call and `ended_at`, never negative.
    pub fn duration_secs(&self, ended_at: DateTime<Utc>) -> i64 {
        (ended_at - self.started_at).num_seconds().max(0)
    }
}
