// =============================================================================
// Order Monitor — periodic reconciliation loop driving the order-state
// machine (spec §4.5)
// =============================================================================
//
// Grounded in order_monitor.py's poll loop: one tick walks every order state
// in {pending, filled, armed}, advances it, then runs two sweeps (terminal
// orphan-leg cleanup, symbol-level tagged sweep for bots with no active
// state at all). Restart recovery is not a separate code path — the first
// tick after a restart sees the same {pending, filled, armed} rows the
// crashed process left behind and walks the identical state machine, which
// is what re-places missing protective legs (S7) and fails a bot's position
// safe if that re-placement itself gets rejected.
// =============================================================================

pub mod positions;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::bot_cache::BotCache;
use crate::bot_locks::BotLocks;
use crate::domain::{BotConfig, OrderState, OrderStatus, Position};
use crate::exchange::{ExchangeClient, NewOrderParams};
use crate::executor::client_id;
use crate::store::OrderStore;

use positions::PositionRegistry;

enum LegOutcome {
    Ready,
    Retry,
    FailsafeClosed,
}

pub struct Monitor {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn OrderStore>,
    bot_cache: Arc<BotCache>,
    bot_locks: Arc<BotLocks>,
    positions: PositionRegistry,
    poll_interval: Duration,
}

impl Monitor {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn OrderStore>,
        bot_cache: Arc<BotCache>,
        bot_locks: Arc<BotLocks>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            exchange,
            store,
            bot_cache,
            bot_locks,
            positions: PositionRegistry::new(),
            poll_interval,
        }
    }

    /// Runs forever. The first tick after process start doubles as restart
    /// recovery (spec §4.5 "Recovery after restart").
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                warn!(error = %e, "order monitor tick failed");
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<(), crate::store::StoreError> {
        let active = self
            .store
            .list_by_statuses(&[OrderStatus::Pending, OrderStatus::Filled, OrderStatus::Armed])
            .await?;

        let mut active_bot_ids = HashSet::new();
        let mut terminal = Vec::new();

        for state in active {
            active_bot_ids.insert(state.bot_id);
            let bot = match self.bot_cache.get(state.bot_id).await {
                Some(b) => b,
                None => {
                    warn!(bot_id = %state.bot_id, "no bot config found for active order state, skipping");
                    continue;
                }
            };
            let _guard = self.bot_locks.lock(bot.id).await;
            if let Some(done) = self.process_state(&bot, state).await {
                terminal.push(done);
            }
        }

        self.sweep_terminal(&terminal).await;
        self.sweep_orphans(&active_bot_ids).await;
        Ok(())
    }

    async fn process_state(&self, bot: &BotConfig, state: OrderState) -> Option<OrderState> {
        match state.status {
            OrderStatus::Pending => self.handle_pending(bot, state).await,
            OrderStatus::Filled | OrderStatus::Armed => self.handle_filled_or_armed(bot, state).await,
            _ => None,
        }
    }

    /// `pending -> filled -> armed` on entry fill; `pending -> cancelled` if
    /// the entry is no longer open and nothing executed.
    async fn handle_pending(&self, bot: &BotConfig, mut state: OrderState) -> Option<OrderState> {
        let order_id = match state.order_id {
            Some(id) => id,
            None => {
                error!(bot_id = %bot.id, state_id = %state.id, "pending order state missing order_id, invariant violated");
                return None;
            }
        };

        match self.exchange.get_order(&state.symbol, order_id).await {
            Ok(info) if info.executed_qty > Decimal::ZERO => {
                state.filled_quantity = info.executed_qty;
                state.avg_fill_price = Some(info.avg_price);
                state.mark(OrderStatus::Filled);
                if let Err(e) = self.store.update(&state).await {
                    error!(bot_id = %bot.id, error = %e, "failed to persist filled order state");
                    return None;
                }
                self.open_position(bot, &state).await;
                state.mark(OrderStatus::Armed);
                if let Err(e) = self.store.update(&state).await {
                    error!(bot_id = %bot.id, error = %e, "failed to persist armed order state");
                }
                None
            }
            Ok(info) if !info.is_open() => {
                state.mark(OrderStatus::Cancelled);
                if let Err(e) = self.store.update(&state).await {
                    error!(bot_id = %bot.id, error = %e, "failed to persist cancelled order state");
                }
                Some(state)
            }
            Ok(_) => None, // still resting, check again next tick
            Err(e) if e.is_order_not_found() => {
                state.mark(OrderStatus::Cancelled);
                let _ = self.store.update(&state).await;
                Some(state)
            }
            Err(e) => {
                warn!(bot_id = %bot.id, error = %e, "failed to query pending entry order");
                None
            }
        }
    }

    /// Handles both `filled` (just-crossed from pending, or recovered after
    /// restart with legs missing) and `armed` uniformly: ensure protective
    /// legs exist, ensure the in-memory Position is rehydrated, then check
    /// for a TP/SL fill or an externally-closed position.
    async fn handle_filled_or_armed(&self, bot: &BotConfig, mut state: OrderState) -> Option<OrderState> {
        match self.ensure_protective_legs(bot, &mut state).await {
            LegOutcome::FailsafeClosed => {
                state.mark(OrderStatus::Cancelled);
                if let Err(e) = self.store.update(&state).await {
                    error!(bot_id = %bot.id, error = %e, "failed to persist failsafe-closed order state");
                }
                return Some(state);
            }
            LegOutcome::Retry => return None,
            LegOutcome::Ready => {}
        }

        if state.status == OrderStatus::Filled {
            state.mark(OrderStatus::Armed);
            if let Err(e) = self.store.update(&state).await {
                error!(bot_id = %bot.id, error = %e, "failed to persist armed transition");
            }
        }

        if !self.positions.contains(bot.id).await {
            self.open_position(bot, &state).await;
        }

        let stop_id = state.stop_order_id?;
        let tp_id = state.take_profit_order_id?;

        let tp_info = self.exchange.get_order(&state.symbol, tp_id).await;
        if let Ok(tp) = &tp_info {
            if tp.is_filled_or_partial() {
                self.cancel_best_effort(&state.symbol, stop_id).await;
                state.close(tp.avg_price);
                if let Err(e) = self.store.update(&state).await {
                    error!(bot_id = %bot.id, error = %e, "failed to persist closed order state (tp fill)");
                }
                self.positions.remove(bot.id).await;
                return Some(state);
            }
        }

        let sl_info = self.exchange.get_order(&state.symbol, stop_id).await;
        if let Ok(sl) = &sl_info {
            if sl.is_filled_or_partial() {
                self.cancel_best_effort(&state.symbol, tp_id).await;
                state.close(sl.avg_price);
                if let Err(e) = self.store.update(&state).await {
                    error!(bot_id = %bot.id, error = %e, "failed to persist closed order state (sl fill)");
                }
                self.positions.remove(bot.id).await;
                return Some(state);
            }
        }

        if self.positions.contains(bot.id).await {
            match self.exchange.get_open_position_qty(&state.symbol).await {
                Ok(qty) if qty == Decimal::ZERO => {
                    self.cancel_best_effort(&state.symbol, stop_id).await;
                    self.cancel_best_effort(&state.symbol, tp_id).await;
                    self.positions.remove(bot.id).await;
                    state.mark(OrderStatus::Cancelled);
                    if let Err(e) = self.store.update(&state).await {
                        error!(bot_id = %bot.id, error = %e, "failed to persist cancelled order state (external close)");
                    }
                    return Some(state);
                }
                Ok(_) => {}
                Err(e) => warn!(bot_id = %bot.id, error = %e, "failed to query exchange position"),
            }
        }

        None
    }

    /// Re-places whichever protective leg is missing (vanished on the
    /// exchange, or never persisted — the restart-recovery case, spec S7).
    /// If a re-placement is rejected outright (not just rate-limited), the
    /// position is left unprotected, so this does a failsafe market close
    /// instead of looping forever.
    async fn ensure_protective_legs(&self, bot: &BotConfig, state: &mut OrderState) -> LegOutcome {
        let prefix = client_id::bot_client_prefix(bot.id);
        let entry_price = state.avg_fill_price.unwrap_or(state.trigger_price);
        let tp_price = Position::compute_take_profit(state.side, entry_price, state.stop_price, bot.tp_r_multiple);
        let exit_side = state.side.exit_order_side();
        let mut changed = false;

        let stop_missing = match state.stop_order_id {
            None => true,
            Some(id) => matches!(self.exchange.get_order(&state.symbol, id).await, Err(e) if e.is_order_not_found()),
        };
        if stop_missing {
            let client_order_id = client_id::exit_client_id(&prefix, "sl");
            match self
                .exchange
                .new_order(NewOrderParams {
                    symbol: &state.symbol,
                    side: exit_side,
                    order_type: "STOP_MARKET",
                    quantity: state.quantity,
                    price: None,
                    stop_price: Some(state.stop_price),
                    reduce_only: true,
                    time_in_force: None,
                    client_order_id: &client_order_id,
                })
                .await
            {
                Ok(ack) => {
                    state.stop_order_id = Some(ack.order_id);
                    changed = true;
                }
                Err(e) if e.kind.is_retryable() => return LegOutcome::Retry,
                Err(e) => {
                    warn!(bot_id = %bot.id, error = %e, "stop re-placement rejected, failsafe closing position");
                    self.failsafe_close(bot, state).await;
                    return LegOutcome::FailsafeClosed;
                }
            }
        }

        let tp_missing = match state.take_profit_order_id {
            None => true,
            Some(id) => matches!(self.exchange.get_order(&state.symbol, id).await, Err(e) if e.is_order_not_found()),
        };
        if tp_missing {
            let client_order_id = client_id::exit_client_id(&prefix, "tp");
            match self
                .exchange
                .new_order(NewOrderParams {
                    symbol: &state.symbol,
                    side: exit_side,
                    order_type: "TAKE_PROFIT_MARKET",
                    quantity: state.quantity,
                    price: None,
                    stop_price: Some(tp_price),
                    reduce_only: true,
                    time_in_force: None,
                    client_order_id: &client_order_id,
                })
                .await
            {
                Ok(ack) => {
                    state.take_profit_order_id = Some(ack.order_id);
                    changed = true;
                }
                Err(e) if e.kind.is_retryable() => return LegOutcome::Retry,
                Err(e) => {
                    warn!(bot_id = %bot.id, error = %e, "take-profit re-placement rejected, failsafe closing position");
                    self.failsafe_close(bot, state).await;
                    return LegOutcome::FailsafeClosed;
                }
            }
        }

        if changed {
            if let Err(e) = self.store.update(state).await {
                error!(bot_id = %bot.id, error = %e, "failed to persist recovered protective leg ids");
            }
        }
        LegOutcome::Ready
    }

    /// Cancels whatever legs still exist, flattens with a reduce-only market
    /// order, and drops the in-memory position. Used when a re-placed
    /// protective leg is rejected outright (spec S7's "stop would
    /// immediately trigger" branch).
    async fn failsafe_close(&self, bot: &BotConfig, state: &mut OrderState) {
        if let Some(id) = state.stop_order_id {
            self.cancel_best_effort(&state.symbol, id).await;
        }
        if let Some(id) = state.take_profit_order_id {
            self.cancel_best_effort(&state.symbol, id).await;
        }
        let prefix = client_id::bot_client_prefix(bot.id);
        let client_order_id = client_id::exit_client_id(&prefix, "mc");
        let exit_side = state.side.exit_order_side();
        let result = self
            .exchange
            .new_order(NewOrderParams {
                symbol: &state.symbol,
                side: exit_side,
                order_type: "MARKET",
                quantity: state.quantity,
                price: None,
                stop_price: None,
                reduce_only: true,
                time_in_force: None,
                client_order_id: &client_order_id,
            })
            .await;
        match result {
            Ok(_) => info!(bot_id = %bot.id, symbol = %state.symbol, "failsafe market close placed"),
            Err(e) => error!(bot_id = %bot.id, error = %e, "failsafe market close failed, position may be left unprotected"),
        }
        self.positions.remove(bot.id).await;
    }

    async fn open_position(&self, bot: &BotConfig, state: &OrderState) {
        let entry_price = state.avg_fill_price.unwrap_or(state.trigger_price);
        let position = Position::new(state.symbol.clone(), state.side, entry_price, state.quantity, state.stop_price, bot.tp_r_multiple);
        self.positions.insert(bot.id, position).await;
    }

    async fn cancel_best_effort(&self, symbol: &str, order_id: i64) {
        if let Err(e) = self.exchange.cancel_order(symbol, order_id).await {
            if !e.is_order_not_found() {
                warn!(symbol, order_id, error = %e, "cancel failed during monitor sweep");
            }
        }
    }

    /// Orphan-leg cleanup (spec §4.5 step 4): a state that just went
    /// terminal this tick may still carry exit ids (pending never got to
    /// cancel its legs; armed's external-close path already cancelled its
    /// own) — cancel is idempotent so re-cancelling an already-cancelled leg
    /// is harmless.
    async fn sweep_terminal(&self, terminal: &[OrderState]) {
        for state in terminal {
            if !state.has_any_exit_leg() && !state.has_fill_evidence() {
                continue;
            }
            for id in [state.order_id, state.stop_order_id, state.take_profit_order_id].into_iter().flatten() {
                self.cancel_best_effort(&state.symbol, id).await;
            }
        }
    }

    /// Symbol-level tagged sweep (spec §4.5 step 5): bots in the cache with
    /// no active order state at all, but lingering tagged exchange orders
    /// and no open position, have their orders swept. Recovers from a crash
    /// between trio placement and the first `OrderState` insert.
    async fn sweep_orphans(&self, active_bot_ids: &HashSet<Uuid>) {
        for bot in self.bot_cache.enabled_bots().await {
            if active_bot_ids.contains(&bot.id) {
                continue;
            }
            let prefix = client_id::bot_client_prefix(bot.id);
            let open = match self.exchange.list_open_orders(Some(&bot.symbol)).await {
                Ok(orders) => orders,
                Err(e) => {
                    warn!(bot_id = %bot.id, error = %e, "orphan sweep: could not list open orders");
                    continue;
                }
            };
            let tagged: Vec<_> = open.into_iter().filter(|o| client_id::is_tagged(&o.client_order_id, &prefix)).collect();
            if tagged.is_empty() {
                continue;
            }
            match self.exchange.get_open_position_qty(&bot.symbol).await {
                Ok(qty) if qty == Decimal::ZERO => {
                    for order in tagged {
                        self.cancel_best_effort(&bot.symbol, order.order_id).await;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(bot_id = %bot.id, error = %e, "orphan sweep: could not query position"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BotStatus, Environment, ExchangeErrorKind, Side, SideWhitelist};
    use crate::exchange::{ExchangeError, OrderAck, OrderInfo};
    use crate::store::memory::{MemoryBotConfigRepo, MemoryOrderStore};
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use rust_decimal_macros::dec;
    use std::collections::HashMap as StdHashMap;

    struct FakeExchange {
        orders: SyncMutex<StdHashMap<i64, OrderInfo>>,
        next_id: SyncMutex<i64>,
        cancelled: SyncMutex<Vec<i64>>,
        position_qty: SyncMutex<Decimal>,
        reject_new_orders: bool,
        open_orders: SyncMutex<Vec<OrderInfo>>,
    }

    impl FakeExchange {
        fn new() -> Self {
            Self {
                orders: SyncMutex::new(StdHashMap::new()),
                next_id: SyncMutex::new(1000),
                cancelled: SyncMutex::new(Vec::new()),
                position_qty: SyncMutex::new(dec!(0)),
                reject_new_orders: false,
                open_orders: SyncMutex::new(Vec::new()),
            }
        }

        fn seed(&self, id: i64, status: &str, executed_qty: Decimal, avg_price: Decimal) {
            self.orders.lock().insert(
                id,
                OrderInfo {
                    order_id: id,
                    client_order_id: String::new(),
                    symbol: "BTCUSDT".into(),
                    status: status.to_string(),
                    executed_qty,
                    avg_price,
                },
            );
        }
    }

    #[async_trait]
    impl ExchangeClient for FakeExchange {
        async fn get_exchange_info(&self) -> Result<serde_json::Value, ExchangeError> {
            unimplemented!()
        }
        async fn get_available_balance(&self, _asset: &str) -> Result<Decimal, ExchangeError> {
            unimplemented!()
        }
        async fn get_used_margin(&self, _asset: &str) -> Result<Decimal, ExchangeError> {
            unimplemented!()
        }
        async fn change_leverage(&self, _symbol: &str, _leverage: u32) -> Result<(), ExchangeError> {
            unimplemented!()
        }
        async fn new_order(&self, params: NewOrderParams<'_>) -> Result<OrderAck, ExchangeError> {
            if self.reject_new_orders {
                return Err(ExchangeError::new(ExchangeErrorKind::BadRequest, "would immediately trigger"));
            }
            let mut guard = self.next_id.lock();
            let id = *guard;
            *guard += 1;
            self.orders.lock().insert(
                id,
                OrderInfo {
                    order_id: id,
                    client_order_id: params.client_order_id.to_string(),
                    symbol: params.symbol.to_string(),
                    status: "NEW".to_string(),
                    executed_qty: Decimal::ZERO,
                    avg_price: Decimal::ZERO,
                },
            );
            Ok(OrderAck {
                order_id: id,
                client_order_id: params.client_order_id.to_string(),
                status: "NEW".to_string(),
            })
        }
        async fn get_order(&self, _symbol: &str, order_id: i64) -> Result<OrderInfo, ExchangeError> {
            self.orders
                .lock()
                .get(&order_id)
                .cloned()
                .ok_or_else(|| ExchangeError::new(ExchangeErrorKind::OrderNotFound, "unknown order"))
        }
        async fn cancel_order(&self, _symbol: &str, order_id: i64) -> Result<(), ExchangeError> {
            self.cancelled.lock().push(order_id);
            Ok(())
        }
        async fn list_open_orders(&self, _symbol: Option<&str>) -> Result<Vec<OrderInfo>, ExchangeError> {
            Ok(self.open_orders.lock().clone())
        }
        async fn get_mark_price(&self, _symbol: &str) -> Result<Decimal, ExchangeError> {
            unimplemented!()
        }
        async fn get_open_position_qty(&self, _symbol: &str) -> Result<Decimal, ExchangeError> {
            Ok(*self.position_qty.lock())
        }
        async fn get_klines(&self, _symbol: &str, _interval: &str, _limit: u32) -> Result<Vec<crate::domain::Candle>, ExchangeError> {
            unimplemented!()
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
            leverage: 5,
            use_balance_pct: false,
            balance_pct: dec!(0),
            fixed_notional: dec!(100),
            max_position_usdt: dec!(0),
            tp_r_multiple: dec!(1.5),
        }
    }

    fn monitor(exchange: Arc<FakeExchange>, store: Arc<MemoryOrderStore>, bot: &BotConfig) -> Monitor {
        let repo = Arc::new(MemoryBotConfigRepo::new());
        repo.insert(bot.clone());
        let bot_cache = Arc::new(BotCache::new(repo, Duration::from_secs(60)));
        let bot_locks = Arc::new(BotLocks::new());
        Monitor::new(exchange, store, bot_cache, bot_locks, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn pending_entry_fill_advances_straight_to_armed() {
        let exchange = Arc::new(FakeExchange::new());
        let store = Arc::new(MemoryOrderStore::new());
        let b = bot();

        exchange.seed(1, "FILLED", dec!(0.01), dec!(35010));
        exchange.seed(2, "NEW", dec!(0), dec!(0));
        exchange.seed(3, "NEW", dec!(0), dec!(0));

        let mut state = OrderState::new(b.id, "sig-1", OrderStatus::Pending, Side::Long, "BTCUSDT", dec!(35010), dec!(34800), dec!(0.01));
        state.order_id = Some(1);
        state.stop_order_id = Some(2);
        state.take_profit_order_id = Some(3);
        store.insert(&state).await.unwrap();

        let mon = monitor(exchange, store.clone(), &b);
        mon.tick().await.unwrap();

        let updated = store.find(b.id, "sig-1").await.unwrap().unwrap();
        assert_eq!(updated.status, OrderStatus::Armed);
        assert_eq!(updated.avg_fill_price, Some(dec!(35010)));
        assert!(mon.positions.contains(b.id).await);
    }

    #[tokio::test]
    async fn pending_entry_cancel_sweeps_lingering_legs() {
        let exchange = Arc::new(FakeExchange::new());
        let store = Arc::new(MemoryOrderStore::new());
        let b = bot();

        exchange.seed(1, "CANCELED", dec!(0), dec!(0));
        exchange.seed(2, "NEW", dec!(0), dec!(0));
        exchange.seed(3, "NEW", dec!(0), dec!(0));

        let mut state = OrderState::new(b.id, "sig-1", OrderStatus::Pending, Side::Long, "BTCUSDT", dec!(35010), dec!(34800), dec!(0.01));
        state.order_id = Some(1);
        state.stop_order_id = Some(2);
        state.take_profit_order_id = Some(3);
        store.insert(&state).await.unwrap();

        let mon = monitor(exchange.clone(), store.clone(), &b);
        mon.tick().await.unwrap();

        let updated = store.find(b.id, "sig-1").await.unwrap().unwrap();
        assert_eq!(updated.status, OrderStatus::Cancelled);
        let cancelled = exchange.cancelled.lock().clone();
        assert!(cancelled.contains(&2));
        assert!(cancelled.contains(&3));
    }

    #[tokio::test]
    async fn armed_tp_fill_closes_and_cancels_sl() {
        let exchange = Arc::new(FakeExchange::new());
        let store = Arc::new(MemoryOrderStore::new());
        let b = bot();

        exchange.seed(2, "NEW", dec!(0), dec!(0));
        exchange.seed(3, "FILLED", dec!(0.01), dec!(36215));
        *exchange.position_qty.lock() = dec!(0.01);

        let mut state = OrderState::new(b.id, "sig-1", OrderStatus::Armed, Side::Long, "BTCUSDT", dec!(35010), dec!(34800), dec!(0.01));
        state.order_id = Some(1);
        state.stop_order_id = Some(2);
        state.take_profit_order_id = Some(3);
        state.avg_fill_price = Some(dec!(35010));
        store.insert(&state).await.unwrap();

        let mon = monitor(exchange.clone(), store.clone(), &b);
        mon.positions
            .insert(b.id, Position::new("BTCUSDT", Side::Long, dec!(35010), dec!(0.01), dec!(34800), dec!(1.5)))
            .await;
        mon.tick().await.unwrap();

        let updated = store.find(b.id, "sig-1").await.unwrap().unwrap();
        assert_eq!(updated.status, OrderStatus::Closed);
        assert_eq!(updated.exit_price, Some(dec!(36215)));
        assert!(exchange.cancelled.lock().contains(&2));
        assert!(!mon.positions.contains(b.id).await);
    }

    #[tokio::test]
    async fn restart_recovery_replaces_missing_protective_legs() {
        let exchange = Arc::new(FakeExchange::new());
        let store = Arc::new(MemoryOrderStore::new());
        let b = bot();
        *exchange.position_qty.lock() = dec!(0.01);

        // `filled` with no stop/tp ids persisted at all (crash before the second/third leg landed).
        let mut state = OrderState::new(b.id, "sig-1", OrderStatus::Filled, Side::Long, "BTCUSDT", dec!(35010), dec!(34800), dec!(0.01));
        state.order_id = Some(1);
        state.avg_fill_price = Some(dec!(35010));
        store.insert(&state).await.unwrap();
        exchange.seed(1, "FILLED", dec!(0.01), dec!(35010));

        let mon = monitor(exchange.clone(), store.clone(), &b);
        mon.tick().await.unwrap();

        let updated = store.find(b.id, "sig-1").await.unwrap().unwrap();
        assert_eq!(updated.status, OrderStatus::Armed);
        assert!(updated.stop_order_id.is_some());
        assert!(updated.take_profit_order_id.is_some());
    }

    #[tokio::test]
    async fn restart_recovery_failsafe_closes_when_replacement_rejected() {
        let mut exchange = FakeExchange::new();
        exchange.reject_new_orders = true;
        let exchange = Arc::new(exchange);
        let store = Arc::new(MemoryOrderStore::new());
        let b = bot();

        let mut state = OrderState::new(b.id, "sig-1", OrderStatus::Filled, Side::Long, "BTCUSDT", dec!(35010), dec!(34800), dec!(0.01));
        state.order_id = Some(1);
        state.avg_fill_price = Some(dec!(35010));
        store.insert(&state).await.unwrap();
        exchange.seed(1, "FILLED", dec!(0.01), dec!(35010));

        let mon = monitor(exchange.clone(), store.clone(), &b);
        mon.tick().await.unwrap();

        let updated = store.find(b.id, "sig-1").await.unwrap().unwrap();
        assert_eq!(updated.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn orphan_sweep_cancels_tagged_orders_with_no_active_state_or_position() {
        let exchange = Arc::new(FakeExchange::new());
        let store = Arc::new(MemoryOrderStore::new());
        let b = bot();
        let prefix = client_id::bot_client_prefix(b.id);

        *exchange.open_orders.lock() = vec![
            OrderInfo {
                order_id: 10,
                client_order_id: format!("{prefix}-sl-aaa"),
                symbol: "BTCUSDT".into(),
                status: "NEW".into(),
                executed_qty: dec!(0),
                avg_price: dec!(0),
            },
            OrderInfo {
                order_id: 11,
                client_order_id: format!("{prefix}-tp-bbb"),
                symbol: "BTCUSDT".into(),
                status: "NEW".into(),
                executed_qty: dec!(0),
                avg_price: dec!(0),
            },
        ];

        let mon = monitor(exchange.clone(), store, &b);
        mon.tick().await.unwrap();

        let cancelled = exchange.cancelled.lock().clone();
        assert!(cancelled.contains(&10));
        assert!(cancelled.contains(&11));
    }
}
