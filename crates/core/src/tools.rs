//! Order Desk Tool Service
//!
//! The five tools the realtime model may call during a call, served over the
//! Model Context Protocol. Each call gets its own `OrderDesk`, bound to the
//! call's restaurant, call log and shared `OrderBook`.
//!
//! Every tool answers with a short sentence the model reads back to the
//! caller. A tool returns `Err` only when the record store failed; the error
//! text is still a caller-facing sentence.

use crate::{
    menu::{MenuQuery, best_name_match},
    order::{OrderBook, OrderLine, format_amount, round_cents},
    store::{CallKind, CallLogUpdate, NewOrder, NewReservation, RecordStore},
};
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const ADD_ORDER_ITEM: &str = "add_order_item";
pub const CONFIRM_ORDER: &str = "confirm_order";
pub const MAKE_RESERVATION: &str = "make_reservation";
pub const LOOKUP_MENU: &str = "lookup_menu";
pub const GET_CURRENT_ORDER: &str = "get_current_order";

/// Every tool an `OrderDesk` serves.
pub const TOOL_NAMES: [&str; 5] = [
    ADD_ORDER_ITEM,
    CONFIRM_ORDER,
    MAKE_RESERVATION,
    LOOKUP_MENU,
    GET_CURRENT_ORDER,
];

/// Result text for a tool name the desk does not serve.
pub const UNKNOWN_TOOL_RESULT: &str = "Function not recognized.";
/// Result text when a tool call could not be carried out at all.
pub const TOOL_FAILED_RESULT: &str =
    "Sorry, I couldn't complete that right now. Could you try again in a moment?";

// --- Data Structures for Tools ---

#[derive(Deserialize, JsonSchema, Debug)]
pub struct AddOrderItemArgs {
    /// Name of the menu item
    pub item_name: String,
    /// Quantity to order
    #[serde(default)]
    pub quantity: Option<u32>,
    /// Any modifications or special requests
    #[serde(default)]
    pub modifications: Option<Vec<String>>,
}

#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct ConfirmOrderArgs {
    /// Delivery address if applicable
    #[serde(default)]
    pub delivery_address: Option<String>,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct MakeReservationArgs {
    /// Name for the reservation
    pub guest_name: String,
    /// Date in YYYY-MM-DD format
    pub date: String,
    /// Time in HH:MM format (24h)
    pub time: String,
    /// Number of guests
    #[serde(default)]
    pub guest_count: Option<u32>,
    /// Any special requests
    #[serde(default)]
    pub special_requests: Option<String>,
}

#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct LookupMenuArgs {
    /// Category to filter by (e.g., appetizers, mains, desserts)
    #[serde(default)]
    pub category: Option<String>,
    /// Search term to find specific items
    #[serde(default)]
    pub search: Option<String>,
}

// --- Service and Handler Implementation ---

pub struct OrderDesk {
    restaurant_id: Uuid,
    call_log_id: Option<Uuid>,
    store: Arc<dyn RecordStore>,
    /// The same book the call session holds.
    order: Arc<Mutex<OrderBook>>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for OrderDesk {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl OrderDesk {
    pub fn new(
        restaurant_id: Uuid,
        call_log_id: Option<Uuid>,
        store: Arc<dyn RecordStore>,
        order: Arc<Mutex<OrderBook>>,
    ) -> Self {
        Self {
            restaurant_id,
            call_log_id,
            store,
            order,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Add an item to the current order. After this succeeds, briefly confirm (e.g. 'Got it, one margherita'). Then ask 'Anything else?' Do NOT recap the full order unless the caller asks."
    )]
    pub async fn add_order_item(
        &self,
        args: Parameters<AddOrderItemArgs>,
    ) -> Result<String, String> {
        info!(args = ?args.0, "Executing tool 'add_order_item'");
        let args = args.0;
        let candidates = self
            .store
            .list_menu_items(self.restaurant_id, &MenuQuery::by_name(args.item_name.trim()))
            .await
            .map_err(|e| {
                error!(error = ?e, "Menu lookup failed");
                TOOL_FAILED_RESULT.to_string()
            })?;

        let Some(item) = best_name_match(&candidates, &args.item_name) else {
            return Ok(format!(
                "Sorry, I couldn't find \"{}\" on our menu. Could you try again?",
                args.item_name
            ));
        };

        let quantity = args.quantity.filter(|q| *q > 0).unwrap_or(1);
        let mut order = self.order.lock().await;
        order.push(OrderLine {
            name: item.name.clone(),
            quantity,
            unit_price: item.price,
            modifications: args.modifications.filter(|m| !m.is_empty()),
        });

        Ok(format!(
            "Added {}x {} (${} each). Current order total: ${}. Items in order: {}",
            quantity,
            item.name,
            item.price,
            format_amount(order.total()),
            order.summary()
        ))
    }

    #[tool(
        description = "Finalize and submit the order. Only call this AFTER reading back the complete order to the caller and receiving their explicit confirmation."
    )]
    pub async fn confirm_order(
        &self,
        args: Parameters<ConfirmOrderArgs>,
    ) -> Result<String, String> {
        info!(args = ?args.0, "Executing tool 'confirm_order'");
        let mut order = self.order.lock().await;
        if order.is_empty() {
            return Ok("There are no items in the current order to confirm.".to_string());
        }

        let total = order.total();
        let item_count = order.lines().len();
        let new_order = NewOrder {
            call_log_id: self.call_log_id,
            restaurant_id: self.restaurant_id,
            items: order.lines().to_vec(),
            total: round_cents(total),
            delivery_address: args.0.delivery_address.filter(|a| !a.trim().is_empty()),
        };
        let order_id = self.store.insert_order(new_order).await.map_err(|e| {
            error!(error = ?e, "Failed to persist order");
            "Sorry, I couldn't place the order just now. Your items are still saved, could we try confirming again?".to_string()
        })?;
        order.confirm(order_id);
        info!(%order_id, items = item_count, "Order confirmed");

        self.tag_call_log(CallKind::Order);

        Ok(format!(
            "Order confirmed! {} items, total: ${}. Order ID: {}",
            item_count,
            format_amount(total),
            order_id
        ))
    }

    #[tool(description = "Make a reservation at the restaurant.")]
    pub async fn make_reservation(
        &self,
        args: Parameters<MakeReservationArgs>,
    ) -> Result<String, String> {
        info!(args = ?args.0, "Executing tool 'make_reservation'");
        let args = args.0;
        let guest_count = args.guest_count.filter(|c| *c > 0).unwrap_or(1);
        let reservation = NewReservation {
            call_log_id: self.call_log_id,
            restaurant_id: self.restaurant_id,
            guest_name: args.guest_name.clone(),
            date: args.date.clone(),
            time: args.time.clone(),
            guest_count,
            special_requests: args.special_requests.filter(|s| !s.trim().is_empty()),
        };
        self.store
            .insert_reservation(reservation)
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to persist reservation");
                "Sorry, I couldn't book the reservation right now. Could we try again in a moment?"
                    .to_string()
            })?;

        self.tag_call_log(CallKind::Reservation);

        Ok(format!(
            "Reservation confirmed for {}, party of {}, on {} at {}.",
            args.guest_name, guest_count, args.date, args.time
        ))
    }

    #[tool(
        description = "Look up menu items. Use when the caller asks about the menu or specific items."
    )]
    pub async fn lookup_menu(&self, args: Parameters<LookupMenuArgs>) -> Result<String, String> {
        info!(args = ?args.0, "Executing tool 'lookup_menu'");
        let query = MenuQuery {
            category: args.0.category,
            search: args.0.search,
            name: None,
        };
        let items = self
            .store
            .list_menu_items(self.restaurant_id, &query)
            .await
            .map_err(|e| {
                error!(error = ?e, "Menu lookup failed");
                TOOL_FAILED_RESULT.to_string()
            })?;

        if items.is_empty() {
            return Ok("No matching menu items found.".to_string());
        }
        Ok(items
            .iter()
            .map(|item| item.lookup_line())
            .collect::<Vec<_>>()
            .join("; "))
    }

    #[tool(
        description = "Get the current order items and running total. Use this silently if you need to check what has been ordered so far instead of asking the caller to repeat themselves."
    )]
    pub async fn get_current_order(&self) -> Result<String, String> {
        info!("Executing tool 'get_current_order'");
        let order = self.order.lock().await;
        if order.is_empty() {
            return Ok("No items in the current order yet.".to_string());
        }
        Ok(format!(
            "Current order: {}. Total: ${}",
            order.priced_summary(),
            format_amount(order.total())
        ))
    }
}

impl OrderDesk {
    /// Records what the call was about without holding up the tool result.
    fn tag_call_log(&self, kind: CallKind) {
        let Some(call_log_id) = self.call_log_id else {
            return;
        };
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store
                .update_call_log(call_log_id, CallLogUpdate::Kind(kind))
                .await
            {
                warn!(%call_log_id, %kind, error = ?e, "Call log update failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::{MenuItem, Restaurant};
    use crate::store::{MemoryStore, MockRecordStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        desk: OrderDesk,
        call_log_id: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let restaurant = Restaurant::new("Luigi's");
        store.add_restaurant(restaurant.clone());

        let mut pizza = MenuItem::new(restaurant.id, "Margherita Pizza", 12.0);
        pizza.category = Some("Mains".to_string());
        pizza.description = Some("Tomato, mozzarella, basil".to_string());
        store.add_menu_item(pizza);
        let mut tiramisu = MenuItem::new(restaurant.id, "Tiramisu", 7.5);
        tiramisu.category = Some("Desserts".to_string());
        store.add_menu_item(tiramisu);
        let mut lasagna = MenuItem::new(restaurant.id, "Lasagna", 15.0);
        lasagna.available = false;
        store.add_menu_item(lasagna);

        let call_log_id = store.add_call_log("CA-test");
        let desk = OrderDesk::new(
            restaurant.id,
            Some(call_log_id),
            store.clone(),
            Arc::new(Mutex::new(OrderBook::new())),
        );
        Fixture {
            store,
            desk,
            call_log_id,
        }
    }

    fn add_args(name: &str, quantity: Option<u32>) -> Parameters<AddOrderItemArgs> {
        Parameters(AddOrderItemArgs {
            item_name: name.to_string(),
            quantity,
            modifications: None,
        })
    }

    #[tokio::test]
    async fn test_add_order_item_reports_total_and_lines() {
        let f = fixture();
        let result = f
            .desk
            .add_order_item(add_args("margherita pizza", Some(2)))
            .await
            .unwrap();

        assert!(result.contains("Current order total: $24.00"), "{result}");
        assert!(result.contains("Items in order: 2x Margherita Pizza"), "{result}");
        assert_eq!(f.desk.order.lock().await.lines().len(), 1);
    }

    #[tokio::test]
    async fn test_add_order_item_defaults_quantity_to_one() {
        let f = fixture();
        let result = f
            .desk
            .add_order_item(add_args("TIRAMISU", None))
            .await
            .unwrap();
        assert!(result.starts_with("Added 1x Tiramisu ($7.5 each)"), "{result}");

        let result = f
            .desk
            .add_order_item(add_args("tiramisu", Some(0)))
            .await
            .unwrap();
        assert!(result.contains("Items in order: 1x Tiramisu, 1x Tiramisu"));
        assert!(result.contains("$15.00"));
    }

    #[tokio::test]
    async fn test_add_order_item_unknown_item_leaves_order_unchanged() {
        let f = fixture();
        let result = f
            .desk
            .add_order_item(add_args("unicorn steak", None))
            .await
            .unwrap();

        assert_eq!(
            result,
            "Sorry, I couldn't find \"unicorn steak\" on our menu. Could you try again?"
        );
        assert!(f.desk.order.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_order_item_ignores_unavailable_items() {
        let f = fixture();
        let result = f
            .desk
            .add_order_item(add_args("lasagna", None))
            .await
            .unwrap();
        assert!(result.starts_with("Sorry"));
    }

    #[tokio::test]
    async fn test_confirm_order_empty_never_persists() {
        let f = fixture();
        let result = f
            .desk
            .confirm_order(Parameters(ConfirmOrderArgs::default()))
            .await
            .unwrap();
        assert_eq!(result, "There are no items in the current order to confirm.");
        assert!(f.store.orders().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_order_twice_persists_once() {
        let f = fixture();
        f.desk
            .add_order_item(add_args("margherita", Some(2)))
            .await
            .unwrap();
        f.desk.add_order_item(add_args("tiramisu", None)).await.unwrap();

        let first = f
            .desk
            .confirm_order(Parameters(ConfirmOrderArgs {
                delivery_address: Some("12 Elm Street".to_string()),
            }))
            .await
            .unwrap();
        let second = f
            .desk
            .confirm_order(Parameters(ConfirmOrderArgs::default()))
            .await
            .unwrap();

        let orders = f.store.orders();
        assert_eq!(orders.len(), 1);
        let (order_id, order) = &orders[0];
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.total, 31.5);
        assert_eq!(order.delivery_address.as_deref(), Some("12 Elm Street"));
        assert_eq!(order.call_log_id, Some(f.call_log_id));

        assert_eq!(
            first,
            format!("Order confirmed! 2 items, total: $31.50. Order ID: {}", order_id)
        );
        assert_eq!(second, "There are no items in the current order to confirm.");

        let book = f.desk.order.lock().await;
        assert!(book.is_empty());
        assert_eq!(book.confirmed_order_id(), Some(*order_id));
    }

    #[tokio::test]
    async fn test_make_reservation_echoes_fields() {
        let f = fixture();
        let result = f
            .desk
            .make_reservation(Parameters(MakeReservationArgs {
                guest_name: "Ada".to_string(),
                date: "2026-11-02".to_string(),
                time: "19:30".to_string(),
                guest_count: Some(4),
                special_requests: Some("window seat".to_string()),
            }))
            .await
            .unwrap();

        assert_eq!(
            result,
            "Reservation confirmed for Ada, party of 4, on 2026-11-02 at 19:30."
        );
        let reservations = f.store.reservations();
        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].1.guest_count, 4);
        assert_eq!(
            reservations[0].1.special_requests.as_deref(),
            Some("window seat")
        );
    }

    #[tokio::test]
    async fn test_make_reservation_defaults_guest_count() {
        let f = fixture();
        let result = f
            .desk
            .make_reservation(Parameters(MakeReservationArgs {
                guest_name: "Grace".to_string(),
                date: "2026-11-03".to_string(),
                time: "12:00".to_string(),
                guest_count: None,
                special_requests: None,
            }))
            .await
            .unwrap();
        assert!(result.contains("party of 1"));
    }

    #[tokio::test]
    async fn test_lookup_menu_filters() {
        let f = fixture();
        let all = f
            .desk
            .lookup_menu(Parameters(LookupMenuArgs::default()))
            .await
            .unwrap();
        assert_eq!(
            all,
            "Margherita Pizza - $12: Tomato, mozzarella, basil; Tiramisu - $7.5"
        );

        let desserts = f
            .desk
            .lookup_menu(Parameters(LookupMenuArgs {
                category: Some("dessert".to_string()),
                search: None,
            }))
            .await
            .unwrap();
        assert_eq!(desserts, "Tiramisu - $7.5");

        let by_description = f
            .desk
            .lookup_menu(Parameters(LookupMenuArgs {
                category: None,
                search: Some("basil".to_string()),
            }))
            .await
            .unwrap();
        assert!(by_description.starts_with("Margherita Pizza"));

        let none = f
            .desk
            .lookup_menu(Parameters(LookupMenuArgs {
                category: None,
                search: Some("sushi".to_string()),
            }))
            .await
            .unwrap();
        assert_eq!(none, "No matching menu items found.");
    }

    #[tokio::test]
    async fn test_get_current_order() {
        let f = fixture();
        assert_eq!(
            f.desk.get_current_order().await.unwrap(),
            "No items in the current order yet."
        );

        f.desk
            .add_order_item(add_args("margherita", Some(2)))
            .await
            .unwrap();
        assert_eq!(
            f.desk.get_current_order().await.unwrap(),
            "Current order: 2x Margherita Pizza ($12). Total: $24.00"
        );
    }

    #[tokio::test]
    async fn test_store_failures_degrade_to_sentences() {
        let mut store = MockRecordStore::new();
        store
            .expect_list_menu_items()
            .returning(|_, _| Err(anyhow::anyhow!("connection reset")));
        store
            .expect_insert_order()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));
        store.expect_update_call_log().never();

        let order = Arc::new(Mutex::new(OrderBook::new()));
        order.lock().await.push(OrderLine {
            name: "Calzone".to_string(),
            quantity: 1,
            unit_price: 14.0,
            modifications: None,
        });
        let desk = OrderDesk::new(Uuid::new_v4(), Some(Uuid::new_v4()), Arc::new(store), order);

        let err = desk.add_order_item(add_args("calzone", None)).await.unwrap_err();
        assert_eq!(err, TOOL_FAILED_RESULT);

        let err = desk
            .lookup_menu(Parameters(LookupMenuArgs::default()))
            .await
            .unwrap_err();
        assert_eq!(err, TOOL_FAILED_RESULT);

        let err = desk
            .confirm_order(Parameters(ConfirmOrderArgs::default()))
            .await
            .unwrap_err();
        assert!(err.starts_with("Sorry, I couldn't place the order"));
        // A failed confirmation keeps the items for a retry.
        assert_eq!(desk.order.lock().await.lines().len(), 1);
    }
}
