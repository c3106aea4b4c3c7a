// =============================================================================
// AppState — process-wide wiring of every shared component
// =============================================================================
//
// Constructed once at startup and handed to every spawned task as cheap
// `Arc` clones: the store pool, the stream bus, the exchange client, and the
// caches/locks the Executor and Monitor share.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::bot_cache::BotCache;
use crate::bot_locks::BotLocks;
use crate::config::Config;
use crate::exchange::{BinanceFuturesClient, DryRunClient, ExchangeClient};
use crate::executor::filters::FilterCache;
use crate::executor::Executor;
use crate::monitor::Monitor;
use crate::store::postgres::{PostgresBotConfigRepo, PostgresOrderStore};
use crate::store::{BotConfigRepo, OrderStore};
use crate::streambus::StreamBus;

pub struct AppState {
    pub config: Config,
    pub bus: Arc<StreamBus>,
    pub store: Arc<dyn OrderStore>,
    pub bot_repo: Arc<dyn BotConfigRepo>,
    pub bot_cache: Arc<BotCache>,
    pub bot_locks: Arc<BotLocks>,
    pub exchange: Arc<dyn ExchangeClient>,
    pub filters: Arc<FilterCache>,
    pub executor: Arc<Executor>,
    pub monitor: Arc<Monitor>,
}

impl AppState {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let bus = Arc::new(StreamBus::connect(&config.redis_url).await?);

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        let store: Arc<dyn OrderStore> = Arc::new(PostgresOrderStore::new(pool.clone()));
        let bot_repo: Arc<dyn BotConfigRepo> = Arc::new(PostgresBotConfigRepo::new(pool));
        let bot_cache = Arc::new(BotCache::new(bot_repo.clone(), Duration::from_secs(config.router_refresh_seconds)));
        let bot_locks = Arc::new(BotLocks::new());

        // A single pair of credentials is the sanctioned bootstrap path; a
        // per-bot-credential exchange client pool is out of scope (SPEC_FULL.md §A.3).
        let exchange: Arc<dyn ExchangeClient> = if config.dry_run_mode {
            info!("dry-run mode: exchange calls are logged, not sent");
            Arc::new(DryRunClient::default())
        } else {
            Arc::new(BinanceFuturesClient::new(
                config.binance_api_key.clone(),
                config.binance_api_secret.clone(),
            ))
        };

        let filters = Arc::new(FilterCache::new(exchange.clone(), Duration::from_secs(config.balance_ttl_seconds)));

        let executor = Arc::new(Executor::new(
            exchange.clone(),
            store.clone(),
            filters.clone(),
            bot_locks.clone(),
            Duration::from_secs(config.balance_ttl_seconds),
            config.max_retries,
            Duration::from_secs_f64(config.backoff_factor),
        ));

        let monitor = Arc::new(Monitor::new(
            exchange.clone(),
            store.clone(),
            bot_cache.clone(),
            bot_locks.clone(),
            Duration::from_secs(config.order_monitor_interval_seconds),
        ));

        Ok(Self {
            config,
            bus,
            store,
            bot_repo,
            bot_cache,
            bot_locks,
            exchange,
            filters,
            executor,
            monitor,
        })
    }
}
