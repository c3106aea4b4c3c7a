// =============================================================================
// Stream key naming (spec §6 Market/Signal streams)
// =============================================================================

/// 1-minute raw candle stream for `symbol`.
pub fn market_1m(symbol: &str) -> String {
    format!("market.{symbol}:1m")
}

/// 2-minute aggregated candle stream for `symbol`.
pub fn market_2m(symbol: &str) -> String {
    format!("market.{symbol}:2m")
}

/// Calculator indicator stream (MA20/MA200/regime) for `symbol`.
pub fn indicator_2m(symbol: &str) -> String {
    format!("ind.{symbol}:2m")
}

/// ARM/DISARM signal stream for `symbol`.
pub fn signal_2m(symbol: &str) -> String {
    format!("signal.{symbol}:2m")
}

/// Latest-regime snapshot stream, one entry per update, used by late joiners.
pub fn snapshot_2m(symbol: &str) -> String {
    format!("snap.{symbol}:2m")
}

/// Redis set holding the bot ids subscribed to `symbol` (router's fan-out index).
pub fn bot_index(symbol: &str) -> String {
    format!("idx.bots.{symbol}")
}

/// Per-(symbol, consumer) last-processed-offset bookkeeping key.
pub fn worker_offset(symbol: &str, timeframe: &str) -> String {
    format!("worker.offset.signal.{symbol}:{timeframe}")
}

/// Dedup gate key for an idempotency token (spec §9 dedup-once semantics).
pub fn dedupe_key(token: &str) -> String {
    format!("dedupe.{token}")
}

/// Liveness heartbeat key for this worker process.
pub fn heartbeat() -> &'static str {
    "worker.heartbeat"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_symbol_and_timeframe() {
        assert_eq!(market_1m("BTCUSDT"), "market.BTCUSDT:1m");
        assert_eq!(market_2m("BTCUSDT"), "market.BTCUSDT:2m");
        assert_eq!(indicator_2m("BTCUSDT"), "ind.BTCUSDT:2m");
        assert_eq!(signal_2m("BTCUSDT"), "signal.BTCUSDT:2m");
        assert_eq!(bot_index("BTCUSDT"), "idx.bots.BTCUSDT");
    }
}
