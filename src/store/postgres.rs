// =============================================================================
// Postgres-backed OrderStore / BotConfigRepo
// =============================================================================

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{BotConfig, OrderState, OrderStatus};

use super::models::{BotConfigRow, OrderStateRow};
use super::{BotConfigRepo, OrderStore, StoreError};

pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert(&self, state: &OrderState) -> Result<(), StoreError> {
        let row = OrderStateRow::from_domain(state);
        sqlx::query(
            r#"
            INSERT INTO order_states
                (id, bot_id, signal_id, status, side, symbol, trigger_price, stop_price,
                 quantity, filled_quantity, avg_fill_price, order_id, stop_order_id,
                 take_profit_order_id, exit_price, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(row.id)
        .bind(row.bot_id)
        .bind(row.signal_id)
        .bind(row.status)
        .bind(row.side)
        .bind(row.symbol)
        .bind(row.trigger_price)
        .bind(row.stop_price)
        .bind(row.quantity)
        .bind(row.filled_quantity)
        .bind(row.avg_fill_price)
        .bind(row.order_id)
        .bind(row.stop_order_id)
        .bind(row.take_profit_order_id)
        .bind(row.exit_price)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, state: &OrderState) -> Result<(), StoreError> {
        let row = OrderStateRow::from_domain(state);
        sqlx::query(
            r#"
            UPDATE order_states
               SET status = $2, filled_quantity = $3, avg_fill_price = $4,
                   order_id = $5, stop_order_id = $6, take_profit_order_id = $7,
                   exit_price = $8, updated_at = $9
             WHERE id = $1
            "#,
        )
        .bind(row.id)
        .bind(row.status)
        .bind(row.filled_quantity)
        .bind(row.avg_fill_price)
        .bind(row.order_id)
        .bind(row.stop_order_id)
        .bind(row.take_profit_order_id)
        .bind(row.exit_price)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, bot_id: Uuid, signal_id: &str) -> Result<Option<OrderState>, StoreError> {
        let row: Option<OrderStateRow> = sqlx::query_as(
            r#"SELECT id, bot_id, signal_id, status, side, symbol, trigger_price, stop_price,
                      quantity, filled_quantity, avg_fill_price, order_id, stop_order_id,
                      take_profit_order_id, exit_price, created_at, updated_at
                 FROM order_states WHERE bot_id = $1 AND signal_id = $2"#,
        )
        .bind(bot_id)
        .bind(signal_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| r.into_domain()).transpose()
    }

    async fn list_by_statuses(&self, statuses: &[OrderStatus]) -> Result<Vec<OrderState>, StoreError> {
        let status_strs: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        let rows: Vec<OrderStateRow> = sqlx::query_as(
            r#"SELECT id, bot_id, signal_id, status, side, symbol, trigger_price, stop_price,
                      quantity, filled_quantity, avg_fill_price, order_id, stop_order_id,
                      take_profit_order_id, exit_price, created_at, updated_at
                 FROM order_states
                WHERE status = ANY($1)
                ORDER BY created_at ASC, id ASC"#,
        )
        .bind(&status_strs)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| r.into_domain()).collect()
    }
}

pub struct PostgresBotConfigRepo {
    pool: PgPool,
}

impl PostgresBotConfigRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BotConfigRepo for PostgresBotConfigRepo {
    async fn get(&self, id: Uuid) -> Result<Option<BotConfig>, StoreError> {
        let row: Option<BotConfigRow> = sqlx::query_as(
            r#"SELECT id, user_id, cred_id, symbol, timeframe, enabled, status, env,
                      side_whitelist, leverage, use_balance_pct, balance_pct,
                      fixed_notional, max_position_usdt, tp_r_multiple
                 FROM bots WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| r.into_domain()).transpose()
    }

    async fn list_enabled(&self) -> Result<Vec<BotConfig>, StoreError> {
        let rows: Vec<BotConfigRow> = sqlx::query_as(
            r#"SELECT id, user_id, cred_id, symbol, timeframe, enabled, status, env,
                      side_whitelist, leverage, use_balance_pct, balance_pct,
                      fixed_notional, max_position_usdt, tp_r_multiple
                 FROM bots WHERE enabled = true AND status = 'active'"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| r.into_domain()).collect()
    }
}
