// =============================================================================
// DryRunClient — logs every call instead of hitting the exchange
// =============================================================================
//
// Activated by DRY_RUN_MODE. Mirrors the shape of BinanceFuturesClient so the
// Executor and Monitor never need to branch on mode; only app_state wiring
// picks which implementation goes behind the ExchangeClient trait object.
// =============================================================================

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use crate::domain::Candle;
use super::client::{ExchangeClient, NewOrderParams, OrderAck, OrderInfo};
use super::errors::ExchangeError;

pub struct DryRunClient {
    next_order_id: AtomicI64,
    synthetic_balance: Decimal,
}

impl DryRunClient {
    pub fn new(synthetic_balance: Decimal) -> Self {
        Self {
            next_order_id: AtomicI64::new(1),
            synthetic_balance,
        }
    }
}

impl Default for DryRunClient {
    fn default() -> Self {
        Self::new(dec!(10000))
    }
}

#[async_trait]
impl ExchangeClient for DryRunClient {
    async fn get_exchange_info(&self) -> Result<serde_json::Value, ExchangeError> {
        Ok(serde_json::json!({ "symbols": [] }))
    }

    async fn get_available_balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        info!(asset, balance = %self.synthetic_balance, "dry-run: balance queried");
        Ok(self.synthetic_balance)
    }

    async fn get_used_margin(&self, _asset: &str) -> Result<Decimal, ExchangeError> {
        Ok(Decimal::ZERO)
    }

    async fn change_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        info!(symbol, leverage, "dry-run: leverage change skipped");
        Ok(())
    }

    async fn new_order(&self, params: NewOrderParams<'_>) -> Result<OrderAck, ExchangeError> {
        let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        info!(
            symbol = params.symbol,
            side = params.side,
            order_type = params.order_type,
            qty = %params.quantity,
            order_id,
            "dry-run: order placed"
        );
        Ok(OrderAck {
            order_id,
            client_order_id: params.client_order_id.to_string(),
            status: "NEW".to_string(),
        })
    }

    async fn get_order(&self, symbol: &str, order_id: i64) -> Result<OrderInfo, ExchangeError> {
        Ok(OrderInfo {
            order_id,
            client_order_id: String::new(),
            symbol: symbol.to_string(),
            status: "NEW".to_string(),
            executed_qty: Decimal::ZERO,
            avg_price: Decimal::ZERO,
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<(), ExchangeError> {
        info!(symbol, order_id, "dry-run: order cancelled");
        Ok(())
    }

    async fn list_open_orders(&self, _symbol: Option<&str>) -> Result<Vec<OrderInfo>, ExchangeError> {
        Ok(Vec::new())
    }

    async fn get_mark_price(&self, _symbol: &str) -> Result<Decimal, ExchangeError> {
        Ok(Decimal::ZERO)
    }

    async fn get_open_position_qty(&self, _symbol: &str) -> Result<Decimal, ExchangeError> {
        Ok(Decimal::ZERO)
    }

    async fn get_klines(&self, _symbol: &str, _interval: &str, _limit: u32) -> Result<Vec<Candle>, ExchangeError> {
        Ok(Vec::new())
    }
}
