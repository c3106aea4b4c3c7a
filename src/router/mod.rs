// =============================================================================
// Signal Router — bot fan-out and dispatch for signal.{SYMBOL:TF} (spec §4.3)
// =============================================================================

pub mod poller;

pub use poller::{DispatchOutcome, Poller, SignalDispatcher};

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::bot_cache::BotCache;

/// Keeps the shared bot cache warm on a fixed interval, independent of any
/// single poller's lazy-refresh-on-read path, so a poller that has been idle
/// (no signals for a while) still observes newly enabled/disabled bots.
pub async fn run_cache_refresher(bot_cache: Arc<BotCache>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        bot_cache.force_refresh().await;
        debug!("bot cache refresh tick");
    }
}
