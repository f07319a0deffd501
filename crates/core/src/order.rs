use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One line of an in-progress order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    pub name: String,
    pub quantity: u32,
    #[serde(rename = "price")]
    pub unit_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifications: Option<Vec<String>>,
}

impl OrderLine {
    pub fn subtotal(&self) -> f64 {
        f64::from(self.quantity) * self.unit_price
    }
}

/// The order accumulated during a single call.
///
/// Lines are only appended by `add_order_item` and only cleared by a
/// successful `confirm_order`.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    lines: Vec<OrderLine>,
    confirmed_order_id: Option<Uuid>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: OrderLine) {
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.lines.iter().map(OrderLine::subtotal).sum()
    }

    pub fn confirmed_order_id(&self) -> Option<Uuid> {
        self.confirmed_order_id
    }

    /// Records a persisted order and empties the book.
    pub fn confirm(&mut self, order_id: Uuid) -> Vec<OrderLine> {
        self.confirmed_order_id = Some(order_id);
        std::mem::take(&mut self.lines)
    }

    /// `"2x Margherita Pizza, 1x Tiramisu"`
    pub fn summary(&self) -> String {
        self.lines
            .iter()
            .map(|l| format!("{}x {}", l.quantity, l.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `"2x Margherita Pizza ($12), 1x Tiramisu ($7.5)"`
    pub fn priced_summary(&self) -> String {
        self.lines
            .iter()
            .map(|l| format!("{}x {} (${})", l.quantity, l.name, l.unit_price))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Renders a money amount with exactly two decimals.
pub fn format_amount(amount: f64) -> String {
    format!("{:.2}", amount)
}

/// Rounds a money amount to cents for persistence.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
