// =============================================================================
// OrderState — persistent, one row per (bot_id, signal_id)
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::enums::{OrderStatus, Side};

#[derive(Debug, Clone, PartialEq)]
pub struct OrderState {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub signal_id: String,
    pub status: OrderStatus,
    pub side: Side,
    pub symbol: String,
    pub trigger_price: Decimal,
    pub stop_price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub order_id: Option<i64>,
    pub stop_order_id: Option<i64>,
    pub take_profit_order_id: Option<i64>,
    /// Set when a protective leg (TP or SL) fills and the position closes
    /// (spec §4.5 scenario S6: "sets state `closed` with `exit_price` from
    /// tp avg").
    pub exit_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderState {
    /// Builds a fresh row prior to exchange placement (status set by the caller).
    pub fn new(
        bot_id: Uuid,
        signal_id: impl Into<String>,
        status: OrderStatus,
        side: Side,
        symbol: impl Into<String>,
        trigger_price: Decimal,
        stop_price: Decimal,
        quantity: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            bot_id,
            signal_id: signal_id.into(),
            status,
            side,
            symbol: symbol.into(),
            trigger_price,
            stop_price,
            quantity,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            order_id: None,
            stop_order_id: None,
            take_profit_order_id: None,
            exit_price: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enforces invariant 1 (spec §8): any of these statuses demands a non-null `order_id`.
    pub fn upholds_order_id_invariant(&self) -> bool {
        !self.status.requires_order_id() || self.order_id.is_some()
    }

    pub fn mark(&mut self, status: OrderStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Transitions an armed state to `closed` once a protective leg fills.
    pub fn close(&mut self, exit_price: Decimal) {
        self.exit_price = Some(exit_price);
        self.mark(OrderStatus::Closed);
    }

    pub fn has_any_exit_leg(&self) -> bool {
        self.stop_order_id.is_some() || self.take_profit_order_id.is_some()
    }

    pub fn has_fill_evidence(&self) -> bool {
        self.filled_quantity > Decimal::ZERO || self.avg_fill_price.is_some()
    }
}
