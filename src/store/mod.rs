// =============================================================================
// Persistence ports — BotConfig + OrderState, owned by the relational store
// =============================================================================
//
// Mirrors the Python source's `Protocol`-based ports (`BotRepository`,
// `OrderGateway` in order_monitor.py) as Rust traits, so the Executor/Monitor/
// Router can be unit-tested against in-memory fakes without a live Postgres.
// =============================================================================

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{BotConfig, OrderState, OrderStatus};

#[derive(Debug)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError(e.to_string())
    }
}

/// `OrderStateRecord` repository (spec §3 "Persistent store", §6 "Persistent
/// store" / invariant 2 in §8: `(bot_id, signal_id)` unique).
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, state: &OrderState) -> Result<(), StoreError>;
    async fn update(&self, state: &OrderState) -> Result<(), StoreError>;
    async fn find(&self, bot_id: Uuid, signal_id: &str) -> Result<Option<OrderState>, StoreError>;

    /// Ordered by `(created_at, id)` ascending — strict FIFO per spec §9's
    /// resolution of the DISARM-vs-TP-fill race (open question 3).
    async fn list_by_statuses(&self, statuses: &[OrderStatus]) -> Result<Vec<OrderState>, StoreError>;
}

/// Read-only view of `BotConfig`, owned by the external admin path (spec §3).
#[async_trait]
pub trait BotConfigRepo: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<BotConfig>, StoreError>;
    async fn list_enabled(&self) -> Result<Vec<BotConfig>, StoreError>;
}
