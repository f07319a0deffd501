//! API and Database Models
//!
//! Row types mapped with `sqlx` and the response bodies documented with
//! `utoipa`. Rows convert into the catalog types of `hostline_core`.

use hostline_core::menu::{MenuItem, Restaurant};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(FromRow, Debug, Clone)]
pub struct RestaurantRow {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub cuisine: Option<String>,
    pub voice: Option<String>,
    pub greeting_message: Option<String>,
    pub system_prompt: Option<String>,
}

impl From<RestaurantRow> for Restaurant {
    fn from(row: RestaurantRow) -> Self {
        Restaurant {
            id: row.id,
            name: row.name,
            phone: row.phone,
            cuisine: row.cuisine,
            voice: row.voice,
            greeting_message: row.greeting_message,
            system_prompt: row.system_prompt,
        }
    }
}

#[derive(FromRow, Debug, Clone)]
pub struct MenuItemRow {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub available: bool,
    pub modifications: Vec<String>,
}

impl From<MenuItemRow> for MenuItem {
    fn from(row: MenuItemRow) -> Self {
        MenuItem {
            id: row.id,
            restaurant_id: row.restaurant_id,
            name: row.name,
            description: row.description,
            category: row.category,
            price: row.price,
            available: row.available,
            modifications: row.modifications,
        }
    }
}

/// Liveness and load of the media-stream server.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    /// Calls currently bridged by this process.
    #[schema(example = 3)]
    pub active_calls: usize,
}
