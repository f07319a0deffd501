//! External Record Store
//!
//! The bridge never owns persistence. It talks to a `RecordStore`, which only
//! has to offer point lookups, filtered listings, inserts and updates by id.
//! `MemoryStore` is a complete in-process implementation used by tests.

use crate::menu::{MenuItem, MenuQuery, Restaurant};
use crate::order::OrderLine;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    Caller,
    Ai,
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::Caller => write!(f, "caller"),
            TranscriptRole::Ai => write!(f, "ai"),
        }
    }
}

/// What a call turned out to be about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Order,
    Reservation,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKind::Order => write!(f, "order"),
            CallKind::Reservation => write!(f, "reservation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTranscript {
    pub call_log_id: Uuid,
    pub role: TranscriptRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub call_log_id: Option<Uuid>,
    pub restaurant_id: Uuid,
    pub items: Vec<OrderLine>,
    pub total: f64,
    pub delivery_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub call_log_id: Option<Uuid>,
    pub restaurant_id: Uuid,
    pub guest_name: String,
    pub date: String,
    pub time: String,
    pub guest_count: u32,
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallLogUpdate {
    /// The call ended normally.
    Completed {
        ended_at: DateTime<Utc>,
        duration_secs: i64,
    },
    /// The call produced an order or a reservation.
    Kind(CallKind),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Finds the restaurant answering the given inbound number.
    async fn find_restaurant_by_phone(&self, phone: &str) -> Result<Option<Restaurant>>;

    /// Returns any restaurant at all; used when no number matches.
    async fn any_restaurant(&self) -> Result<Option<Restaurant>>;

    /// Finds the call log created for this call by the telephony webhook, if any.
    async fn find_call_log(&self, call_sid: &str) -> Result<Option<Uuid>>;

    /// Lists a restaurant's available menu items matching `query`.
    async fn list_menu_items(&self, restaurant_id: Uuid, query: &MenuQuery)
    -> Result<Vec<MenuItem>>;

    async fn insert_transcript(&self, transcript: NewTranscript) -> Result<()>;

    /// Persists a confirmed order and returns its id.
    async fn insert_order(&self, order: NewOrder) -> Result<Uuid>;

    /// Persists a confirmed reservation and returns its id.
    async fn insert_reservation(&self, reservation: NewReservation) -> Result<Uuid>;

    async fn update_call_log(&self, call_log_id: Uuid, update: CallLogUpdate) -> Result<()>;

    /// Marks the telephony call-session row for `call_sid` as completed.
    async fn complete_call_session(&self, call_sid: &str) -> Result<()>;
}

/// A call log as kept by `MemoryStore`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallLogEntry {
    pub call_sid: String,
    pub status: Option<String>,
    pub kind: Option<CallKind>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub session_completed: bool,
}

#[derive(Default)]
struct Tables {
    restaurants: Vec<Restaurant>,
    menu_items: Vec<MenuItem>,
    call_logs: Vec<(Uuid, CallLogEntry)>,
    transcripts: Vec<NewTranscript>,
    orders: Vec<(Uuid, NewOrder)>,
    reservations: Vec<(Uuid, NewReservation)>,
}

/// An in-process `RecordStore`.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut guard = self
            .tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn add_restaurant(&self, restaurant: Restaurant) {
        self.with_tables(|t| t.restaurants.push(restaurant));
    }

    pub fn add_menu_item(&self, item: MenuItem) {
        self.with_tables(|t| t.menu_items.push(item));
    }

    /// Creates a call log the way the telephony webhook would before the
    /// media stream connects.
    pub fn add_call_log(&self, call_sid: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.with_tables(|t| {
            t.call_logs.push((
                id,
                CallLogEntry {
                    call_sid: call_sid.to_string(),
                    ..Default::default()
                },
            ))
        });
        id
    }

    pub fn call_log(&self, id: Uuid) -> Option<CallLogEntry> {
        self.with_tables(|t| {
            t.call_logs
                .iter()
                .find(|(log_id, _)| *log_id == id)
                .map(|(_, entry)| entry.clone())
        })
    }

    pub fn transcripts(&self) -> Vec<NewTranscript> {
        self.with_tables(|t| t.transcripts.clone())
    }

    pub fn orders(&self) -> Vec<(Uuid, NewOrder)> {
        self.with_tables(|t| t.orders.clone())
    }

    pub fn reservations(&self) -> Vec<(Uuid, NewReservation)> {
        self.with_tables(|t| t.reservations.clone())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_restaurant_by_phone(&self, phone: &str) -> Result<Option<Restaurant>> {
        Ok(self.with_tables(|t| {
            t.restaurants
                .iter()
                .find(|r| r.phone.as_deref() == Some(phone))
                .cloned()
        }))
    }

    async fn any_restaurant(&self) -> Result<Option<Restaurant>> {
        Ok(self.with_tables(|t| t.restaurants.first().cloned()))
    }

    async fn find_call_log(&self, call_sid: &str) -> Result<Option<Uuid>> {
        Ok(self.with_tables(|t| {
            t.call_logs
                .iter()
                .find(|(_, entry)| entry.call_sid == call_sid)
                .map(|(id, _)| *id)
        }))
    }

    async fn list_menu_items(
        &self,
        restaurant_id: Uuid,
        query: &MenuQuery,
    ) -> Result<Vec<MenuItem>> {
        Ok(self.with_tables(|t| {
            t.menu_items
                .iter()
                .filter(|item| item.restaurant_id == restaurant_id && query.matches(item))
                .cloned()
                .collect()
        }))
    }

    async fn insert_transcript(&self, transcript: NewTranscript) -> Result<()> {
        self.with_tables(|t| t.transcripts.push(transcript));
        Ok(())
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.with_tables(|t| t.orders.push((id, order)));
        Ok(id)
    }

    async fn insert_reservation(&self, reservation: NewReservation) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.with_tables(|t| t.reservations.push((id, reservation)));
        Ok(id)
    }

    async fn update_call_log(&self, call_log_id: Uuid, update: CallLogUpdate) -> Result<()> {
        self.with_tables(|t| {
            let entry = t
                .call_logs
                .iter_mut()
                .find(|(id, _)| *id == call_log_id)
                .map(|(_, entry)| entry)
                .ok_or_else(|| anyhow::anyhow!("call log {} not found", call_log_id))?;
            match update {
                CallLogUpdate::Completed {
                    ended_at,
                    duration_secs,
                } => {
                    entry.status = Some("completed".to_string());
                    entry.ended_at = Some(ended_at);
                    entry.duration_secs = Some(duration_secs);
                }
                CallLogUpdate::Kind(kind) => entry.kind = Some(kind),
            }
            Ok(())
        })
    }

    async fn complete_call_session(&self, call_sid: &str) -> Result<()> {
        self.with_tables(|t| {
            for (_, entry) in t.call_logs.iter_mut().filter(|(_, e)| e.call_sid == call_sid) {
                entry.session_completed = true;
            }
        });
        Ok(())
    }
}
