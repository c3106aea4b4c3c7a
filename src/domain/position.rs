// =============================================================================
// Position — in-memory per-bot position, single-writer (Monitor only)
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::enums::Side;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// `take_profit = entry +/- R * |entry - stop|`, per spec §4.4/§4.5.
    pub fn compute_take_profit(side: Side, entry: Decimal, stop: Decimal, r_multiple: Decimal) -> Decimal {
        let distance = (entry - stop).abs();
        match side {
            Side::Long => entry + distance * r_multiple,
            Side::Short => entry - distance * r_multiple,
        }
    }

    pub fn new(symbol: impl Into<String>, side: Side, entry_price: Decimal, quantity: Decimal, stop_loss: Decimal, r_multiple: Decimal) -> Self {
        let take_profit = Self::compute_take_profit(side, entry_price, stop_loss, r_multiple);
        Self {
            symbol: symbol.into(),
            side,
            entry_price,
            quantity,
            stop_loss,
            take_profit,
            opened_at: Utc::now(),
        }
    }
}
