// =============================================================================
// In-memory fakes for OrderStore / BotConfigRepo — unit tests only
// =============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::{BotConfig, OrderState, OrderStatus};

use super::{BotConfigRepo, OrderStore, StoreError};

#[derive(Default)]
pub struct MemoryOrderStore {
    rows: Mutex<Vec<OrderState>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, state: &OrderState) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        if rows
            .iter()
            .any(|r| r.bot_id == state.bot_id && r.signal_id == state.signal_id)
        {
            return Err(StoreError(format!(
                "duplicate (bot_id, signal_id) = ({}, {})",
                state.bot_id, state.signal_id
            )));
        }
        rows.push(state.clone());
        Ok(())
    }

    async fn update(&self, state: &OrderState) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        let existing = rows
            .iter_mut()
            .find(|r| r.id == state.id)
            .ok_or_else(|| StoreError(format!("no order_state with id {}", state.id)))?;
        *existing = state.clone();
        Ok(())
    }

    async fn find(&self, bot_id: Uuid, signal_id: &str) -> Result<Option<OrderState>, StoreError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|r| r.bot_id == bot_id && r.signal_id == signal_id)
            .cloned())
    }

    async fn list_by_statuses(&self, statuses: &[OrderStatus]) -> Result<Vec<OrderState>, StoreError> {
        let mut matched: Vec<OrderState> = self
            .rows
            .lock()
            .iter()
            .filter(|r| statuses.contains(&r.status))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matched)
    }
}

#[derive(Default)]
pub struct MemoryBotConfigRepo {
    bots: Mutex<HashMap<Uuid, BotConfig>>,
}

impl MemoryBotConfigRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bot: BotConfig) {
        self.bots.lock().insert(bot.id, bot);
    }
}

#[async_trait]
impl BotConfigRepo for MemoryBotConfigRepo {
    async fn get(&self, id: Uuid) -> Result<Option<BotConfig>, StoreError> {
        Ok(self.bots.lock().get(&id).cloned())
    }

    async fn list_enabled(&self) -> Result<Vec<BotConfig>, StoreError> {
        Ok(self.bots.lock().values().filter(|b| b.is_eligible()).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use rust_decimal_macros::dec;

    fn sample_state(bot_id: Uuid, signal_id: &str) -> OrderState {
        OrderState::new(
            bot_id,
            signal_id,
            OrderStatus::Armed,
            Side::Long,
            "BTCUSDT",
            dec!(100),
            dec!(99),
            dec!(0.01),
        )
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_bot_signal_pair() {
        let store = MemoryOrderStore::new();
        let bot_id = Uuid::new_v4();
        store.insert(&sample_state(bot_id, "sig-1")).await.unwrap();
        let err = store.insert(&sample_state(bot_id, "sig-1")).await.unwrap_err();
        assert!(err.0.contains("duplicate"));
    }

    #[tokio::test]
    async fn list_by_statuses_orders_by_created_at_then_id() {
        let store = MemoryOrderStore::new();
        let bot_id = Uuid::new_v4();
        let mut first = sample_state(bot_id, "sig-1");
        let mut second = sample_state(bot_id, "sig-2");
        second.created_at = first.created_at;
        second.id = Uuid::max();
        first.id = Uuid::nil();
        store.insert(&second).await.unwrap();
        store.insert(&first).await.unwrap();

        let listed = store.list_by_statuses(&[OrderStatus::Armed]).await.unwrap();
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
    }

    #[tokio::test]
    async fn bot_config_repo_filters_on_eligibility() {
        let repo = MemoryBotConfigRepo::new();
        let mut bot = crate::domain::BotConfig {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            cred_id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            timeframe: "2m".into(),
            enabled: true,
            status: crate::domain::BotStatus::Active,
            env: crate::domain::Environment::Testnet,
            side_whitelist: crate::domain::SideWhitelist::Both,
            leverage: 5,
            use_balance_pct: true,
            balance_pct: dec!(0.05),
            fixed_notional: dec!(0),
            max_position_usdt: dec!(0),
            tp_r_multiple: dec!(1.5),
        };
        repo.insert(bot.clone());
        assert_eq!(repo.list_enabled().await.unwrap().len(), 1);
        bot.status = crate::domain::BotStatus::Paused;
        repo.insert(bot);
        assert_eq!(repo.list_enabled().await.unwrap().len(), 0);
    }
}
