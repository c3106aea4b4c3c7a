// =============================================================================
// Config — environment-variable driven configuration
// =============================================================================
//
// Unlike a hot-reloadable JSON file, every tunable here comes from the process
// environment and is resolved once at startup. Every field has a sensible
// default, loudly logged, the same philosophy the engine's old JSON config
// followed — just sourced from env vars instead of a file, per the
// original ingestor/calculator services' `_env_*` helpers.
// =============================================================================

use rust_decimal::Decimal;
use tracing::info;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

fn env_decimal(key: &str, default: &str) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<Decimal>().ok())
        .unwrap_or_else(|| default.parse().expect("default decimal literal is valid"))
}

/// Process-wide configuration, resolved once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub symbols: Vec<String>,
    pub timeframe: String,

    pub redis_url: String,
    pub database_url: String,

    pub stream_block_ms: u64,
    pub catchup_threshold_ms: i64,
    pub router_refresh_seconds: u64,
    pub order_monitor_interval_seconds: u64,
    pub balance_ttl_seconds: u64,

    pub stream_maxlen_1m: u64,
    pub stream_maxlen_2m: u64,
    pub stream_maxlen_ind: u64,
    pub stream_maxlen_signal: u64,
    pub stream_retention_ms_1m: u64,
    pub stream_retention_ms_2m: u64,

    pub backfill_on_start: bool,
    pub backfill_1m_limit: u32,
    pub backfill_min_2m: u32,

    pub tick_size_default: Decimal,
    pub max_retries: u32,
    pub backoff_factor: f64,

    pub dry_run_mode: bool,

    pub binance_api_key: String,
    pub binance_api_secret: String,
}

impl Config {
    pub fn from_env() -> Self {
        let cfg = Self {
            symbols: env_list(
                "SYMBOLS",
                &["BTCUSDT", "ETHUSDT", "BNBUSDT", "XRPUSDT", "SOLUSDT"],
            ),
            timeframe: env_string("TIMEFRAME", "2m"),
            redis_url: env_string("REDIS_URL", "redis://127.0.0.1:6379/0"),
            database_url: env_string("DATABASE_URL", "postgres://localhost/aurora_worker"),
            stream_block_ms: env_u64("STREAM_BLOCK_MS", 15_000),
            catchup_threshold_ms: env_u64("CATCHUP_THRESHOLD_MS", 15_000) as i64,
            router_refresh_seconds: env_u64("ROUTER_REFRESH_SECONDS", 60),
            order_monitor_interval_seconds: env_u64("ORDER_MONITOR_INTERVAL_SECONDS", 2),
            balance_ttl_seconds: env_u64("BALANCE_TTL_SECONDS", 30),
            stream_maxlen_1m: env_u64("STREAM_MAXLEN_1M", 5000),
            stream_maxlen_2m: env_u64("STREAM_MAXLEN_2M", 5000),
            stream_maxlen_ind: env_u64("STREAM_MAXLEN_IND", 5000),
            stream_maxlen_signal: env_u64("STREAM_MAXLEN_SIGNAL", 5000),
            stream_retention_ms_1m: env_u64("STREAM_RETENTION_MS_1M", 0),
            stream_retention_ms_2m: env_u64("STREAM_RETENTION_MS_2M", 0),
            backfill_on_start: env_bool("BACKFILL_ON_START", true),
            backfill_1m_limit: env_u32("BACKFILL_1M_LIMIT", 1000),
            backfill_min_2m: env_u32("BACKFILL_MIN_2M", 150),
            tick_size_default: env_decimal("TICK_SIZE_DEFAULT", "0.1"),
            max_retries: env_u32("MAX_RETRIES", 3),
            backoff_factor: std::env::var("BACKOFF_FACTOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.5),
            dry_run_mode: env_bool("DRY_RUN_MODE", false),
            binance_api_key: env_string("BINANCE_API_KEY", ""),
            binance_api_secret: env_string("BINANCE_API_SECRET", ""),
        };

        info!(
            symbols = ?cfg.symbols,
            timeframe = %cfg.timeframe,
            dry_run = cfg.dry_run_mode,
            backfill_on_start = cfg.backfill_on_start,
            "configuration resolved from environment"
        );

        cfg
    }
}
