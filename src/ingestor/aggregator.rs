// =============================================================================
// TwoMinuteAggregator — pairs even/odd UTC-minute 1m bars into a 2m bar
// =============================================================================
//
// Ported from ingestor/aggregator.py's `OneMinute` pairing: an odd-minute bar
// with no pending even bar is a warmup condition and is dropped, not
// buffered — the next even bar starts a fresh pair.
// =============================================================================

use crate::domain::Candle;

pub struct TwoMinuteAggregator {
    pending_even: Option<Candle>,
}

impl TwoMinuteAggregator {
    pub fn new() -> Self {
        Self { pending_even: None }
    }

    /// Feeds one closed 1-minute bar. Returns the emitted 2-minute bar when
    /// an odd-minute bar completes a pending even-minute one.
    pub fn ingest(&mut self, candle: Candle) -> Option<Candle> {
        if candle.closes_on_even_minute() {
            self.pending_even = Some(candle);
            return None;
        }

        let even = self.pending_even.take()?;
        let open = even.open;
        let high = even.high.max(candle.high);
        let low = even.low.min(candle.low);
        let close = candle.close;
        let volume = even.volume + candle.volume;
        let trade_count = even.trade_count + candle.trade_count;

        Some(Candle::new(
            candle.ts_ms,
            candle.symbol.clone(),
            "2m",
            open,
            high,
            low,
            close,
            volume,
            trade_count,
        ))
    }
}

impl Default for TwoMinuteAggregator {
    fn default() -> Self {
        Self::new()
    }
}
