// =============================================================================
// sqlx row types — mirror app/db/models/{bots,order_states}.py
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{BotConfig, BotStatus, Environment, OrderState, OrderStatus, Side, SideWhitelist};

use super::StoreError;

/// Raw row as returned by sqlx from the `bots` table.
#[derive(Debug, sqlx::FromRow)]
pub struct BotConfigRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cred_id: Uuid,
    pub symbol: String,
    pub timeframe: String,
    pub enabled: bool,
    pub status: String,
    pub env: String,
    pub side_whitelist: String,
    pub leverage: i32,
    pub use_balance_pct: bool,
    pub balance_pct: Decimal,
    pub fixed_notional: Decimal,
    pub max_position_usdt: Decimal,
    pub tp_r_multiple: Decimal,
}

impl BotConfigRow {
    pub fn into_domain(self) -> Result<BotConfig, StoreError> {
        let status = match self.status.as_str() {
            "active" => BotStatus::Active,
            "paused" => BotStatus::Paused,
            "ended" => BotStatus::Ended,
            other => return Err(StoreError(format!("unknown bot status '{other}'"))),
        };
        let env = match self.env.as_str() {
            "testnet" => Environment::Testnet,
            "prod" => Environment::Prod,
            other => return Err(StoreError(format!("unknown environment '{other}'"))),
        };
        let side_whitelist = match self.side_whitelist.as_str() {
            "long" => SideWhitelist::Long,
            "short" => SideWhitelist::Short,
            "both" => SideWhitelist::Both,
            other => return Err(StoreError(format!("unknown side_whitelist '{other}'"))),
        };
        Ok(BotConfig {
            id: self.id,
            user_id: self.user_id,
            cred_id: self.cred_id,
            symbol: self.symbol,
            timeframe: self.timeframe,
            enabled: self.enabled,
            status,
            env,
            side_whitelist,
            leverage: self.leverage.max(1) as u32,
            use_balance_pct: self.use_balance_pct,
            balance_pct: self.balance_pct,
            fixed_notional: self.fixed_notional,
            max_position_usdt: self.max_position_usdt,
            tp_r_multiple: self.tp_r_multiple,
        })
    }
}

/// Raw row for the `order_states` table.
#[derive(Debug, sqlx::FromRow)]
pub struct OrderStateRow {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub signal_id: String,
    pub status: String,
    pub side: String,
    pub symbol: String,
    pub trigger_price: Decimal,
    pub stop_price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub order_id: Option<i64>,
    pub stop_order_id: Option<i64>,
    pub take_profit_order_id: Option<i64>,
    pub exit_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderStateRow {
    pub fn into_domain(self) -> Result<OrderState, StoreError> {
        let side = match self.side.as_str() {
            "long" => Side::Long,
            "short" => Side::Short,
            other => return Err(StoreError(format!("unknown side '{other}'"))),
        };
        let status = parse_status(&self.status)?;
        Ok(OrderState {
            id: self.id,
            bot_id: self.bot_id,
            signal_id: self.signal_id,
            status,
            side,
            symbol: self.symbol,
            trigger_price: self.trigger_price,
            stop_price: self.stop_price,
            quantity: self.quantity,
            filled_quantity: self.filled_quantity,
            avg_fill_price: self.avg_fill_price,
            order_id: self.order_id,
            stop_order_id: self.stop_order_id,
            take_profit_order_id: self.take_profit_order_id,
            exit_price: self.exit_price,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    pub fn from_domain(state: &OrderState) -> Self {
        Self {
            id: state.id,
            bot_id: state.bot_id,
            signal_id: state.signal_id.clone(),
            status: state.status.to_string(),
            side: state.side.to_string(),
            symbol: state.symbol.clone(),
            trigger_price: state.trigger_price,
            stop_price: state.stop_price,
            quantity: state.quantity,
            filled_quantity: state.filled_quantity,
            avg_fill_price: state.avg_fill_price,
            order_id: state.order_id,
            stop_order_id: state.stop_order_id,
            take_profit_order_id: state.take_profit_order_id,
            exit_price: state.exit_price,
            created_at: state.created_at,
            updated_at: state.updated_at,
        }
    }
}

pub fn parse_status(raw: &str) -> Result<OrderStatus, StoreError> {
    Ok(match raw {
        "armed" => OrderStatus::Armed,
        "pending" => OrderStatus::Pending,
        "filled" => OrderStatus::Filled,
        "closed" => OrderStatus::Closed,
        "cancelled" => OrderStatus::Cancelled,
        "failed" => OrderStatus::Failed,
        "skipped_low_balance" => OrderStatus::SkippedLowBalance,
        "skipped_whitelist" => OrderStatus::SkippedWhitelist,
        other => return Err(StoreError(format!("unknown order status '{other}'"))),
    })
}
