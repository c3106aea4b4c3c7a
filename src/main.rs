// =============================================================================
// Worker process entry point
// =============================================================================
//
// Spawns one ingestor + calculator task per configured symbol, one poller
// per (symbol, timeframe), a single shared order monitor, the bot-cache
// refresher, and a heartbeat — then waits for SIGINT/SIGTERM to shut down.
// =============================================================================

mod app_state;
mod bot_cache;
mod bot_locks;
mod calculator;
mod config;
mod domain;
mod exchange;
mod executor;
mod heartbeat;
mod ingestor;
mod monitor;
mod router;
mod store;
mod streambus;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::Config;
use router::Poller;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    let state = Arc::new(AppState::build(config).await?);

    if state.config.backfill_on_start {
        ingestor::backfill_on_start(
            state.bus.clone(),
            state.exchange.clone(),
            &state.config.symbols,
            state.config.backfill_min_2m,
            state.config.backfill_1m_limit,
            state.config.stream_maxlen_1m,
            state.config.stream_maxlen_2m,
        )
        .await;
    }

    let mut tasks = Vec::new();

    for symbol in &state.config.symbols {
        let bus = state.bus.clone();
        let sym = symbol.clone();
        let maxlen_1m = state.config.stream_maxlen_1m;
        let maxlen_2m = state.config.stream_maxlen_2m;
        tasks.push(tokio::spawn(async move {
            ingestor::ws::run(bus, sym, maxlen_1m, maxlen_2m).await;
        }));

        let bus = state.bus.clone();
        let sym = symbol.clone();
        let timeframe = state.config.timeframe.clone();
        let tick_size = state.config.tick_size_default;
        let maxlen_ind = state.config.stream_maxlen_ind;
        let maxlen_signal = state.config.stream_maxlen_signal;
        let catchup_threshold_ms = state.config.catchup_threshold_ms;
        let block_ms = state.config.stream_block_ms;
        tasks.push(tokio::spawn(async move {
            calculator::run_symbol(bus, sym, timeframe, tick_size, maxlen_ind, maxlen_signal, catchup_threshold_ms, block_ms).await;
        }));

        let poller = Poller::new(
            state.bus.clone(),
            state.bot_cache.clone(),
            state.executor.clone(),
            symbol.clone(),
            state.config.timeframe.clone(),
            format!("poller-{symbol}"),
            state.config.stream_block_ms,
        );
        tasks.push(tokio::spawn(async move { poller.run().await }));
    }

    {
        let monitor = state.monitor.clone();
        tasks.push(tokio::spawn(async move { monitor.run().await }));
    }
    {
        let bot_cache = state.bot_cache.clone();
        let interval = std::time::Duration::from_secs(state.config.router_refresh_seconds);
        tasks.push(tokio::spawn(async move { router::run_cache_refresher(bot_cache, interval).await }));
    }
    {
        let bus = state.bus.clone();
        tasks.push(tokio::spawn(async move { heartbeat::run(bus, "worker").await }));
    }

    info!(symbols = ?state.config.symbols, "worker started");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = terminate() => {
            info!("terminate signal received");
        }
    }

    for task in tasks {
        task.abort();
    }

    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
