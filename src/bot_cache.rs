// =============================================================================
// BotCache — TTL-refreshed snapshot of enabled bots, shared by Router + Monitor
// =============================================================================
//
// Both the signal Router (symbol -> bot fan-out) and the Order Monitor (sweep
// discovery for bots with no live DB state) need the same "what bots are
// currently enabled" view without hammering Postgres on every poll tick.
// Mirrors the `_enabled_bots_ttl_seconds` cache in order_monitor.py, lifted
// out into a shared component per the module map's bot_cache.rs entry.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::BotConfig;
use crate::store::BotConfigRepo;

struct Snapshot {
    bots: HashMap<Uuid, BotConfig>,
    fetched_at: Instant,
}

/// Shared, TTL-gated cache of currently-enabled bots.
pub struct BotCache {
    repo: Arc<dyn BotConfigRepo>,
    ttl: Duration,
    inner: RwLock<Option<Snapshot>>,
}

impl BotCache {
    pub fn new(repo: Arc<dyn BotConfigRepo>, ttl: Duration) -> Self {
        Self {
            repo,
            ttl,
            inner: RwLock::new(None),
        }
    }

    /// Returns the cached snapshot, refreshing it from the store first if
    /// stale or empty.
    pub async fn enabled_bots(&self) -> Vec<BotConfig> {
        self.refresh_if_stale().await;
        self.inner
            .read()
            .await
            .as_ref()
            .map(|s| s.bots.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Enabled bots for a single symbol, case-sensitive exact match.
    pub async fn enabled_bots_for_symbol(&self, symbol: &str) -> Vec<BotConfig> {
        self.enabled_bots()
            .await
            .into_iter()
            .filter(|b| b.symbol == symbol)
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> Option<BotConfig> {
        self.refresh_if_stale().await;
        self.inner.read().await.as_ref().and_then(|s| s.bots.get(&id).cloned())
    }

    pub async fn force_refresh(&self) {
        self.refresh().await;
    }

    async fn refresh_if_stale(&self) {
        let is_stale = {
            let guard = self.inner.read().await;
            match guard.as_ref() {
                Some(s) => s.fetched_at.elapsed() >= self.ttl,
                None => true,
            }
        };
        if is_stale {
            self.refresh().await;
        }
    }

    async fn refresh(&self) {
        match self.repo.list_enabled().await {
            Ok(bots) => {
                debug!(count = bots.len(), "bot cache refreshed");
                let map = bots.into_iter().map(|b| (b.id, b)).collect();
                *self.inner.write().await = Some(Snapshot {
                    bots: map,
                    fetched_at: Instant::now(),
                });
            }
            Err(e) => {
                warn!(error = %e, "bot cache refresh failed, serving stale data");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BotStatus, Environment, SideWhitelist};
    use crate::store::memory::MemoryBotConfigRepo;
    use rust_decimal_macros::dec;

    fn bot(symbol: &str) -> BotConfig {
        BotConfig {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            cred_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            timeframe: "2m".into(),
            enabled: true,
            status: BotStatus::Active,
            env: Environment::Testnet,
            side_whitelist: SideWhitelist::Both,
            leverage: 5,
            use_balance_pct: true,
            balance_pct: dec!(0.05),
            fixed_notional: dec!(0),
            max_position_usdt: dec!(0),
            tp_r_multiple: dec!(1.5),
        }
    }

    #[tokio::test]
    async fn refreshes_lazily_and_filters_by_symbol() {
        let repo = Arc::new(MemoryBotConfigRepo::new());
        repo.insert(bot("BTCUSDT"));
        repo.insert(bot("ETHUSDT"));
        let cache = BotCache::new(repo, Duration::from_millis(50));

        assert_eq!(cache.enabled_bots().await.len(), 2);
        assert_eq!(cache.enabled_bots_for_symbol("BTCUSDT").await.len(), 1);
    }

    #[tokio::test]
    async fn serves_stale_data_on_refresh_failure() {
        // A cache with no backing data still returns an empty vec rather than panicking.
        let repo = Arc::new(MemoryBotConfigRepo::new());
        let cache = BotCache::new(repo, Duration::from_secs(60));
        assert!(cache.enabled_bots().await.is_empty());
    }
}
