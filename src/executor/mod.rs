// =============================================================================
// Order Executor — places the entry/stop/take-profit trio for ARM signals,
// cancels pending entries for DISARM signals (spec §4.4)
// =============================================================================
//
// Grounded in order_executor.py: one bot-scoped lock serializes everything
// this bot does (open question 3 in DESIGN.md — resolves DISARM-vs-fill races
// by giving the Monitor and Executor a shared per-bot critical section), a
// short-TTL balance cache avoids hammering /fapi/v2/balance on every signal,
// and the entry/stop/take-profit trio is placed in order with rollback in
// reverse if any later leg fails.
// =============================================================================

pub mod client_id;
pub mod filters;
pub mod sizing;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::bot_locks::BotLocks;
use crate::domain::{ArmSignal, BotConfig, DisarmSignal, Environment, OrderState, OrderStatus, Side};
use crate::exchange::{ExchangeClient, ExchangeError, NewOrderParams};
use crate::router::poller::{DispatchOutcome, SignalDispatcher};
use crate::store::OrderStore;

use filters::{FilterCache, SymbolFilters};
use sizing::{size_and_quantize, QuantizedOrder, SizingError};

const QUOTE_ASSET: &str = "USDT";

struct CachedBalance {
    value: Decimal,
    fetched_at: Instant,
}

enum TrioError {
    Retryable,
    Failed(String),
}

/// Places and cancels orders on behalf of every bot subscribed to a symbol.
/// Implements [`SignalDispatcher`], the seam `router::poller::Poller` calls.
pub struct Executor {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn OrderStore>,
    filters: Arc<FilterCache>,
    bot_locks: Arc<BotLocks>,
    balance_cache: RwLock<HashMap<(Uuid, Environment), CachedBalance>>,
    balance_ttl: Duration,
    max_retries: u32,
    backoff_base: Duration,
    leverage_set: RwLock<HashMap<(Uuid, String), u32>>,
}

impl Executor {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn OrderStore>,
        filters: Arc<FilterCache>,
        bot_locks: Arc<BotLocks>,
        balance_ttl: Duration,
        max_retries: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            exchange,
            store,
            filters,
            bot_locks,
            balance_cache: RwLock::new(HashMap::new()),
            balance_ttl,
            max_retries,
            backoff_base,
            leverage_set: RwLock::new(HashMap::new()),
        }
    }

    async fn retry<T, F, Fut>(&self, mut f: F) -> Result<T, ExchangeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.kind.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff_base * 2u32.pow(attempt.min(6));
                    warn!(attempt, error = %e, "retrying exchange call after backoff");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn available_balance(&self, bot: &BotConfig) -> Result<Decimal, ExchangeError> {
        let key = (bot.cred_id, bot.env);
        if let Some(cached) = self.balance_cache.read().await.get(&key) {
            if cached.fetched_at.elapsed() < self.balance_ttl {
                return Ok(cached.value);
            }
        }
        let value = self.retry(|| self.exchange.get_available_balance(QUOTE_ASSET)).await?;
        self.balance_cache.write().await.insert(key, CachedBalance { value, fetched_at: Instant::now() });
        Ok(value)
    }

    async fn ensure_leverage(&self, bot: &BotConfig) -> Result<(), ExchangeError> {
        let key = (bot.id, bot.symbol.clone());
        if self.leverage_set.read().await.get(&key) == Some(&bot.leverage) {
            return Ok(());
        }
        self.retry(|| self.exchange.change_leverage(&bot.symbol, bot.leverage)).await?;
        self.leverage_set.write().await.insert(key, bot.leverage);
        Ok(())
    }

    /// Inserts a terminal (non-working) order state for audit purposes. Best
    /// effort: a failed insert here only loses an audit row, not correctness,
    /// so it's logged rather than propagated.
    async fn record_terminal(&self, bot: &BotConfig, signal_id: &str, arm: &ArmSignal, status: OrderStatus) {
        let state = OrderState::new(
            bot.id,
            signal_id.to_string(),
            status,
            arm.side,
            arm.symbol.clone(),
            arm.trigger,
            arm.stop,
            Decimal::ZERO,
        );
        if let Err(e) = self.store.insert(&state).await {
            error!(bot_id = %bot.id, signal_id, error = %e, "failed to persist terminal order state");
        }
    }

    /// Places the entry limit order, then the protective stop-loss, then the
    /// take-profit, rolling back already-placed legs in reverse on any later
    /// failure.
    async fn place_trio(
        &self,
        bot: &BotConfig,
        arm: &ArmSignal,
        filters: &SymbolFilters,
        quantized: &QuantizedOrder,
    ) -> Result<(i64, i64, i64), TrioError> {
        let prefix = client_id::bot_client_prefix(bot.id);
        let entry_side = arm.side.entry_order_side();
        let exit_side = arm.side.exit_order_side();

        let entry_client_id = client_id::exit_client_id(&prefix, "en");
        let entry = self
            .retry(|| {
                self.exchange.new_order(NewOrderParams {
                    symbol: &arm.symbol,
                    side: entry_side,
                    order_type: "LIMIT",
                    quantity: quantized.quantity,
                    price: Some(quantized.entry_price),
                    stop_price: None,
                    reduce_only: false,
                    time_in_force: Some("GTC"),
                    client_order_id: &entry_client_id,
                })
            })
            .await
            .map_err(classify_trio_error)?;

        let stop_client_id = client_id::exit_client_id(&prefix, "sl");
        let stop = match self
            .retry(|| {
                self.exchange.new_order(NewOrderParams {
                    symbol: &arm.symbol,
                    side: exit_side,
                    order_type: "STOP_MARKET",
                    quantity: quantized.quantity,
                    price: None,
                    stop_price: Some(arm.stop),
                    reduce_only: true,
                    time_in_force: None,
                    client_order_id: &stop_client_id,
                })
            })
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                self.cancel_best_effort(&arm.symbol, entry.order_id).await;
                return Err(classify_trio_error(e));
            }
        };

        let tp_price = filters.floor_price(take_profit_price(arm, bot.tp_r_multiple));
        let tp_client_id = client_id::exit_client_id(&prefix, "tp");
        let take_profit = match self
            .retry(|| {
                self.exchange.new_order(NewOrderParams {
                    symbol: &arm.symbol,
                    side: exit_side,
                    order_type: "TAKE_PROFIT_MARKET",
                    quantity: quantized.quantity,
                    price: None,
                    stop_price: Some(tp_price),
                    reduce_only: true,
                    time_in_force: None,
                    client_order_id: &tp_client_id,
                })
            })
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                self.cancel_best_effort(&arm.symbol, stop.order_id).await;
                self.cancel_best_effort(&arm.symbol, entry.order_id).await;
                return Err(classify_trio_error(e));
            }
        };

        Ok((entry.order_id, stop.order_id, take_profit.order_id))
    }

    async fn cancel_best_effort(&self, symbol: &str, order_id: i64) {
        if let Err(e) = self.exchange.cancel_order(symbol, order_id).await {
            error!(symbol, order_id, error = %e, "rollback cancel failed, position may be left unprotected");
        }
    }

    /// Cancels any exchange-open order tagged with this bot's client-id
    /// prefix before placing a fresh trio (`_cleanup_bot_exit_orders`).
    /// Best effort: a stale order surviving this sweep is caught by the
    /// Monitor's own tagged sweep on its next poll.
    async fn cleanup_lingering_exit_orders(&self, bot: &BotConfig) {
        let prefix = client_id::bot_client_prefix(bot.id);
        let open = match self.exchange.list_open_orders(Some(&bot.symbol)).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(bot_id = %bot.id, error = %e, "could not list open orders for pre-trade cleanup");
                return;
            }
        };
        for order in open.into_iter().filter(|o| client_id::is_tagged(&o.client_order_id, &prefix)) {
            self.cancel_best_effort(&bot.symbol, order.order_id).await;
        }
    }
}

fn classify_trio_error(e: ExchangeError) -> TrioError {
    if e.kind.is_retryable() {
        TrioError::Retryable
    } else {
        TrioError::Failed(e.to_string())
    }
}

/// `trigger + R * |trigger - stop|` for longs, the mirror for shorts.
fn take_profit_price(arm: &ArmSignal, r_multiple: Decimal) -> Decimal {
    let distance = (arm.trigger - arm.stop).abs();
    match arm.side {
        Side::Long => arm.trigger + distance * r_multiple,
        Side::Short => arm.trigger - distance * r_multiple,
    }
}

#[async_trait]
impl SignalDispatcher for Executor {
    #[instrument(skip(self, bot, arm), fields(bot_id = %bot.id, symbol = %arm.symbol, side = %arm.side))]
    async fn dispatch_arm(&self, bot: &BotConfig, arm: &ArmSignal) -> DispatchOutcome {
        let _guard = self.bot_locks.lock(bot.id).await;

        let signal_id = arm.idempotency_key();
        match self.store.find(bot.id, &signal_id).await {
            Ok(Some(_)) => return DispatchOutcome::Done,
            Ok(None) => {}
            Err(e) => {
                error!(bot_id = %bot.id, error = %e, "order state lookup failed");
                return DispatchOutcome::Retryable;
            }
        }

        let filters = match self.filters.get(&arm.symbol).await {
            Ok(f) => f,
            Err(e) if e.kind.is_retryable() => return DispatchOutcome::Retryable,
            Err(e) => {
                warn!(bot_id = %bot.id, error = %e, "could not resolve symbol filters");
                self.record_terminal(bot, &signal_id, arm, OrderStatus::Failed).await;
                return DispatchOutcome::Done;
            }
        };

        if sizing::stop_distance_too_tight(arm.trigger, arm.stop) {
            warn!(bot_id = %bot.id, "rejecting arm, stop distance below minimum ratio");
            self.record_terminal(bot, &signal_id, arm, OrderStatus::Failed).await;
            return DispatchOutcome::Done;
        }

        let mark = match self.retry(|| self.exchange.get_mark_price(&arm.symbol)).await {
            Ok(m) => m,
            Err(e) if e.kind.is_retryable() => return DispatchOutcome::Retryable,
            Err(e) => {
                warn!(bot_id = %bot.id, error = %e, "could not fetch mark price");
                self.record_terminal(bot, &signal_id, arm, OrderStatus::Failed).await;
                return DispatchOutcome::Done;
            }
        };
        if sizing::mark_drift_exceeded(arm.side, arm.trigger, arm.stop, mark) {
            warn!(bot_id = %bot.id, %mark, trigger = %arm.trigger, "rejecting arm, trigger has drifted too far from mark");
            self.record_terminal(bot, &signal_id, arm, OrderStatus::Failed).await;
            return DispatchOutcome::Done;
        }

        let balance = match self.available_balance(bot).await {
            Ok(b) => b,
            Err(e) if e.kind.is_retryable() => return DispatchOutcome::Retryable,
            Err(e) => {
                warn!(bot_id = %bot.id, error = %e, "could not fetch available balance");
                self.record_terminal(bot, &signal_id, arm, OrderStatus::Failed).await;
                return DispatchOutcome::Done;
            }
        };

        let quantized = match size_and_quantize(bot, arm.trigger, balance, &filters) {
            Ok(q) => q,
            Err(SizingError::InsufficientBalance) => {
                self.record_terminal(bot, &signal_id, arm, OrderStatus::SkippedLowBalance).await;
                return DispatchOutcome::Done;
            }
            Err(e) => {
                warn!(bot_id = %bot.id, error = %e, "sizing rejected arm");
                self.record_terminal(bot, &signal_id, arm, OrderStatus::Failed).await;
                return DispatchOutcome::Done;
            }
        };

        if let Err(e) = self.ensure_leverage(bot).await {
            if e.kind.is_retryable() {
                return DispatchOutcome::Retryable;
            }
            warn!(bot_id = %bot.id, error = %e, "failed to set leverage");
            self.record_terminal(bot, &signal_id, arm, OrderStatus::Failed).await;
            return DispatchOutcome::Done;
        }

        self.cleanup_lingering_exit_orders(bot).await;

        match self.place_trio(bot, arm, &filters, &quantized).await {
            Ok((order_id, stop_id, tp_id)) => {
                let mut state = OrderState::new(
                    bot.id,
                    signal_id.clone(),
                    OrderStatus::Pending,
                    arm.side,
                    arm.symbol.clone(),
                    quantized.entry_price,
                    arm.stop,
                    quantized.quantity,
                );
                state.order_id = Some(order_id);
                state.stop_order_id = Some(stop_id);
                state.take_profit_order_id = Some(tp_id);
                if let Err(e) = self.store.insert(&state).await {
                    error!(bot_id = %bot.id, error = %e, "failed to persist order state after placing trio");
                }
                DispatchOutcome::Done
            }
            Err(TrioError::Retryable) => DispatchOutcome::Retryable,
            Err(TrioError::Failed(reason)) => {
                warn!(bot_id = %bot.id, reason, "trio placement failed, rolled back");
                self.record_terminal(bot, &signal_id, arm, OrderStatus::Failed).await;
                DispatchOutcome::Done
            }
        }
    }

    #[instrument(skip(self, bot, disarm), fields(bot_id = %bot.id, symbol = %disarm.symbol, prev_side = %disarm.prev_side))]
    async fn dispatch_disarm(&self, bot: &BotConfig, disarm: &DisarmSignal) -> DispatchOutcome {
        let _guard = self.bot_locks.lock(bot.id).await;

        let pending = match self.store.list_by_statuses(&[OrderStatus::Pending]).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(bot_id = %bot.id, error = %e, "failed to list pending order states for disarm");
                return DispatchOutcome::Retryable;
            }
        };

        let mut any_retryable = false;
        for mut state in pending
            .into_iter()
            .filter(|s| s.bot_id == bot.id && s.symbol == disarm.symbol && s.side == disarm.prev_side)
        {
            if let Some(order_id) = state.order_id {
                match self.exchange.cancel_order(&state.symbol, order_id).await {
                    Ok(()) => {}
                    Err(e) if e.kind.is_retryable() => {
                        any_retryable = true;
                        continue;
                    }
                    Err(e) => warn!(bot_id = %bot.id, error = %e, "failed to cancel entry order on disarm"),
                }
            }
            if let Some(stop_id) = state.stop_order_id {
                self.cancel_best_effort(&state.symbol, stop_id).await;
            }
            if let Some(tp_id) = state.take_profit_order_id {
                self.cancel_best_effort(&state.symbol, tp_id).await;
            }
            state.mark(OrderStatus::Cancelled);
            if let Err(e) = self.store.update(&state).await {
                error!(bot_id = %bot.id, error = %e, "failed to persist cancelled order state");
            }
        }

        if any_retryable {
            DispatchOutcome::Retryable
        } else {
            DispatchOutcome::Done
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BotStatus, SideWhitelist};
    use crate::exchange::OrderInfo;
    use crate::store::memory::MemoryOrderStore;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use rust_decimal_macros::dec;

    struct FakeExchange {
        balance: Decimal,
        mark_price: Decimal,
        next_order_id: SyncMutex<i64>,
        fail_leg: Option<&'static str>,
        cancelled: SyncMutex<Vec<i64>>,
    }

    impl FakeExchange {
        fn new(balance: Decimal, mark_price: Decimal) -> Self {
            Self {
                balance,
                mark_price,
                next_order_id: SyncMutex::new(1),
                fail_leg: None,
                cancelled: SyncMutex::new(Vec::new()),
            }
        }

        fn failing(mut self, leg: &'static str) -> Self {
            self.fail_leg = Some(leg);
            self
        }
    }

    #[async_trait]
    impl ExchangeClient for FakeExchange {
        async fn get_exchange_info(&self) -> Result<serde_json::Value, ExchangeError> {
            unimplemented!()
        }
        async fn get_available_balance(&self, _asset: &str) -> Result<Decimal, ExchangeError> {
            Ok(self.balance)
        }
        async fn get_used_margin(&self, _asset: &str) -> Result<Decimal, ExchangeError> {
            Ok(Decimal::ZERO)
        }
        async fn change_leverage(&self, _symbol: &str, _leverage: u32) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn new_order(&self, params: NewOrderParams<'_>) -> Result<crate::exchange::OrderAck, ExchangeError> {
            let is_entry = params.client_order_id.contains("-en-");
            let is_stop = params.client_order_id.contains("-sl-");
            let leg = if is_entry {
                "entry"
            } else if is_stop {
                "stop"
            } else {
                "tp"
            };
            if self.fail_leg == Some(leg) {
                return Err(ExchangeError::new(crate::domain::ExchangeErrorKind::BadRequest, "synthetic failure"));
            }
            let mut guard = self.next_order_id.lock();
            let id = *guard;
            *guard += 1;
            Ok(crate::exchange::OrderAck {
                order_id: id,
                client_order_id: params.client_order_id.to_string(),
                status: "NEW".to_string(),
            })
        }
        async fn get_order(&self, _symbol: &str, order_id: i64) -> Result<OrderInfo, ExchangeError> {
            Ok(OrderInfo {
                order_id,
                client_order_id: String::new(),
                symbol: "BTCUSDT".into(),
                status: "NEW".into(),
                executed_qty: Decimal::ZERO,
                avg_price: Decimal::ZERO,
            })
        }
        async fn cancel_order(&self, _symbol: &str, order_id: i64) -> Result<(), ExchangeError> {
            self.cancelled.lock().push(order_id);
            Ok(())
        }
        async fn list_open_orders(&self, _symbol: Option<&str>) -> Result<Vec<OrderInfo>, ExchangeError> {
            Ok(Vec::new())
        }
        async fn get_mark_price(&self, _symbol: &str) -> Result<Decimal, ExchangeError> {
            Ok(self.mark_price)
        }
        async fn get_open_position_qty(&self, _symbol: &str) -> Result<Decimal, ExchangeError> {
            Ok(Decimal::ZERO)
        }
        async fn get_klines(&self, _symbol: &str, _interval: &str, _limit: u32) -> Result<Vec<crate::domain::Candle>, ExchangeError> {
            Ok(Vec::new())
        }
    }

    fn bot() -> BotConfig {
        BotConfig {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            cred_id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            timeframe: "2m".into(),
            enabled: true,
            status: BotStatus::Active,
            env: Environment::Testnet,
            side_whitelist: SideWhitelist::Both,
            leverage: 10,
            use_balance_pct: false,
            balance_pct: dec!(0),
            fixed_notional: dec!(100),
            max_position_usdt: dec!(0),
            tp_r_multiple: dec!(1.5),
        }
    }

    fn arm() -> ArmSignal {
        ArmSignal {
            version: "1".into(),
            side: Side::Long,
            symbol: "BTCUSDT".into(),
            timeframe: "2m".into(),
            ts_ms: 1_700_000_000_000,
            ind_ts_ms: 1_699_999_880_000,
            ind_high: dec!(35100.5),
            ind_low: dec!(34990.1),
            trigger: dec!(35010.0),
            stop: dec!(34800.0),
            signal_msg_id: None,
        }
    }

    fn sample_exchange_info() -> serde_json::Value {
        serde_json::json!({
            "symbols": [{
                "symbol": "BTCUSDT",
                "filters": [
                    {"filterType": "LOT_SIZE", "stepSize": "0.001", "minQty": "0.001", "maxQty": "1000"},
                    {"filterType": "PRICE_FILTER", "tickSize": "0.1", "minPrice": "0.1", "maxPrice": "1000000"},
                    {"filterType": "MIN_NOTIONAL", "notional": "5"}
                ]
            }]
        })
    }

    struct InfoExchange {
        inner: FakeExchange,
    }

    #[async_trait]
    impl ExchangeClient for InfoExchange {
        async fn get_exchange_info(&self) -> Result<serde_json::Value, ExchangeError> {
            Ok(sample_exchange_info())
        }
        async fn get_available_balance(&self, a: &str) -> Result<Decimal, ExchangeError> {
            self.inner.get_available_balance(a).await
        }
        async fn get_used_margin(&self, a: &str) -> Result<Decimal, ExchangeError> {
            self.inner.get_used_margin(a).await
        }
        async fn change_leverage(&self, s: &str, l: u32) -> Result<(), ExchangeError> {
            self.inner.change_leverage(s, l).await
        }
        async fn new_order(&self, p: NewOrderParams<'_>) -> Result<crate::exchange::OrderAck, ExchangeError> {
            self.inner.new_order(p).await
        }
        async fn get_order(&self, s: &str, id: i64) -> Result<OrderInfo, ExchangeError> {
            self.inner.get_order(s, id).await
        }
        async fn cancel_order(&self, s: &str, id: i64) -> Result<(), ExchangeError> {
            self.inner.cancel_order(s, id).await
        }
        async fn list_open_orders(&self, s: Option<&str>) -> Result<Vec<OrderInfo>, ExchangeError> {
            self.inner.list_open_orders(s).await
        }
        async fn get_mark_price(&self, s: &str) -> Result<Decimal, ExchangeError> {
            self.inner.get_mark_price(s).await
        }
        async fn get_open_position_qty(&self, s: &str) -> Result<Decimal, ExchangeError> {
            self.inner.get_open_position_qty(s).await
        }
        async fn get_klines(&self, s: &str, i: &str, l: u32) -> Result<Vec<crate::domain::Candle>, ExchangeError> {
            self.inner.get_klines(s, i, l).await
        }
    }

    fn executor(exchange: Arc<dyn ExchangeClient>, store: Arc<dyn OrderStore>) -> Executor {
        let filters = Arc::new(FilterCache::new(exchange.clone(), Duration::from_secs(30)));
        let bot_locks = Arc::new(BotLocks::new());
        Executor::new(exchange, store, filters, bot_locks, Duration::from_secs(30), 1, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn dispatch_arm_places_trio_and_persists_pending_state() {
        let exchange: Arc<dyn ExchangeClient> = Arc::new(InfoExchange {
            inner: FakeExchange::new(dec!(100000), dec!(35010.0)),
        });
        let store: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
        let exec = executor(exchange, store.clone());

        let b = bot();
        let a = arm();
        let outcome = exec.dispatch_arm(&b, &a).await;
        assert_eq!(outcome, DispatchOutcome::Done);

        let state = store.find(b.id, &a.idempotency_key()).await.unwrap().unwrap();
        assert_eq!(state.status, OrderStatus::Pending);
        assert!(state.order_id.is_some());
        assert!(state.stop_order_id.is_some());
        assert!(state.take_profit_order_id.is_some());
    }

    #[tokio::test]
    async fn dispatch_arm_rolls_back_on_take_profit_failure() {
        let exchange: Arc<dyn ExchangeClient> = Arc::new(InfoExchange {
            inner: FakeExchange::new(dec!(100000), dec!(35010.0)).failing("tp"),
        });
        let store: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
        let exec = executor(exchange, store.clone());

        let b = bot();
        let a = arm();
        let outcome = exec.dispatch_arm(&b, &a).await;
        assert_eq!(outcome, DispatchOutcome::Done);

        let state = store.find(b.id, &a.idempotency_key()).await.unwrap().unwrap();
        assert_eq!(state.status, OrderStatus::Failed);
        assert!(state.order_id.is_none());
    }

    #[tokio::test]
    async fn dispatch_arm_rejects_tight_stop() {
        let exchange: Arc<dyn ExchangeClient> = Arc::new(InfoExchange {
            inner: FakeExchange::new(dec!(100000), dec!(35010.0)),
        });
        let store: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
        let exec = executor(exchange, store.clone());

        let b = bot();
        let mut a = arm();
        a.stop = dec!(35009.9); // well within the 5bps minimum distance

        let outcome = exec.dispatch_arm(&b, &a).await;
        assert_eq!(outcome, DispatchOutcome::Done);
        let state = store.find(b.id, &a.idempotency_key()).await.unwrap().unwrap();
        assert_eq!(state.status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn dispatch_disarm_cancels_matching_pending_states() {
        let exchange: Arc<dyn ExchangeClient> = Arc::new(InfoExchange {
            inner: FakeExchange::new(dec!(100000), dec!(35010.0)),
        });
        let store: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
        let exec = executor(exchange, store.clone());

        let b = bot();
        let a = arm();
        exec.dispatch_arm(&b, &a).await;

        let disarm = DisarmSignal {
            version: "1".into(),
            prev_side: Side::Long,
            symbol: "BTCUSDT".into(),
            timeframe: "2m".into(),
            ts_ms: a.ts_ms + 1,
            reason: "regime:long->neutral".into(),
            signal_msg_id: None,
        };
        let outcome = exec.dispatch_disarm(&b, &disarm).await;
        assert_eq!(outcome, DispatchOutcome::Done);

        let state = store.find(b.id, &a.idempotency_key()).await.unwrap().unwrap();
        assert_eq!(state.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn dispatch_arm_skips_low_balance() {
        let exchange: Arc<dyn ExchangeClient> = Arc::new(InfoExchange {
            inner: FakeExchange::new(dec!(0.01), dec!(35010.0)),
        });
        let store: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
        let exec = executor(exchange, store.clone());

        let b = bot();
        let a = arm();
        let outcome = exec.dispatch_arm(&b, &a).await;
        assert_eq!(outcome, DispatchOutcome::Done);
        let state = store.find(b.id, &a.idempotency_key()).await.unwrap().unwrap();
        assert_eq!(state.status, OrderStatus::SkippedLowBalance);
    }
}
