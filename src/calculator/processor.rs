// =============================================================================
// SymbolProcessor — per-symbol calculator task (spec §4.2)
// =============================================================================
//
// Generalizes processors/symbol_processor.py's consume loop: resumes from a
// watermark tailed from both output streams, runs every closed bar through
// the SMA/regime/indicator-candle pipeline, and gates signal publication on
// catch-up status so historical replay never floods the signal stream.
// =============================================================================

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::domain::{Candle, Regime, Signal};
use crate::streambus::{keys, StreamBus};

use super::regime::{self, ColorTracker};
use super::signal_gen;
use super::sma::Sma;

/// Derived-per-bar snapshot published for observers (spec §3 IndicatorState).
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorState {
    pub ts_ms: i64,
    pub close: Decimal,
    pub ma20: Option<Decimal>,
    pub ma200: Option<Decimal>,
    pub regime: Regime,
    pub ind_ts_ms: i64,
    pub ind_high: Decimal,
    pub ind_low: Decimal,
}

impl IndicatorState {
    pub fn to_stream_map(&self) -> Vec<(&'static str, String)> {
        let regime_str = match self.regime {
            Regime::Long => "long",
            Regime::Short => "short",
            Regime::Neutral => "neutral",
        };
        vec![
            ("ts", self.ts_ms.to_string()),
            ("close", self.close.to_string()),
            ("ma20", self.ma20.map(|v| v.to_string()).unwrap_or_default()),
            ("ma200", self.ma200.map(|v| v.to_string()).unwrap_or_default()),
            ("regime", regime_str.to_string()),
            ("ind_ts", self.ind_ts_ms.to_string()),
            ("ind_high", self.ind_high.to_string()),
            ("ind_low", self.ind_low.to_string()),
        ]
    }
}

fn signal_ts(sig: &Signal) -> i64 {
    match sig {
        Signal::Arm(a) => a.ts_ms,
        Signal::Disarm(d) => d.ts_ms,
    }
}

fn signal_stream_map(sig: &Signal) -> Vec<(&'static str, String)> {
    match sig {
        Signal::Arm(a) => a.to_stream_map(),
        Signal::Disarm(d) => d.to_stream_map(),
    }
}

pub struct SymbolProcessor {
    bus: Arc<StreamBus>,
    symbol: String,
    timeframe: String,
    tick_size: Decimal,
    maxlen_ind: u64,
    maxlen_signal: u64,
    catchup_threshold_ms: i64,

    sma20: Sma,
    sma200: Sma,
    tracker: ColorTracker,
    prev_regime: Regime,
    /// `ind_ts` of the indicator candle behind the currently-armed side, used
    /// to detect a same-regime indicator-candle update (spec §4.2 rule 4).
    armed_ind_ts: Option<i64>,
    watermark_ts: i64,
    catchup_mode: bool,
    buffered_signal: Option<Signal>,
    bars_processed: u64,
}

impl SymbolProcessor {
    pub async fn new(
        bus: Arc<StreamBus>,
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        tick_size: Decimal,
        maxlen_ind: u64,
        maxlen_signal: u64,
        catchup_threshold_ms: i64,
    ) -> Self {
        let symbol = symbol.into();
        let timeframe = timeframe.into();
        let watermark_ts = Self::resume_watermark(&bus, &symbol).await;
        info!(symbol = %symbol, watermark_ts, "calculator resuming");
        Self {
            bus,
            symbol,
            timeframe,
            tick_size,
            maxlen_ind,
            maxlen_signal,
            catchup_threshold_ms,
            sma20: Sma::new(20),
            sma200: Sma::new(200),
            tracker: ColorTracker::new(),
            prev_regime: Regime::Neutral,
            armed_ind_ts: None,
            watermark_ts,
            catchup_mode: true,
            buffered_signal: None,
            bars_processed: 0,
        }
    }

    /// Tails both output streams and takes the newer timestamp, so a crash
    /// between the two writes never replays an already-published bar.
    async fn resume_watermark(bus: &StreamBus, symbol: &str) -> i64 {
        let ind_ts = Self::last_entry_ts(bus, &keys::indicator_2m(symbol)).await;
        let sig_ts = Self::last_entry_ts(bus, &keys::signal_2m(symbol)).await;
        ind_ts.max(sig_ts)
    }

    async fn last_entry_ts(bus: &StreamBus, stream: &str) -> i64 {
        match bus.xrevrange_last(stream, 1).await {
            Ok(entries) => entries
                .first()
                .and_then(|(id, _)| id.split('-').next())
                .and_then(|ts| ts.parse::<i64>().ok())
                .unwrap_or(0),
            Err(e) => {
                warn!(stream, error = %e, "failed to read resume watermark, defaulting to 0");
                0
            }
        }
    }

    #[instrument(skip(self, candle), fields(symbol = %self.symbol, ts = candle.ts_ms))]
    pub async fn on_candle(&mut self, candle: Candle, now_ms: i64) -> redis::RedisResult<()> {
        let ma20 = self.sma20.update(candle.close);
        let ma200 = self.sma200.update(candle.close);
        self.tracker.observe(&candle);
        self.bars_processed += 1;

        if self.bars_processed % 100 == 0 {
            info!(symbol = %self.symbol, bars = self.bars_processed, "calculator milestone");
        }

        if candle.ts_ms <= self.watermark_ts {
            // Already published for this timestamp; still fed the MAs above.
            return Ok(());
        }

        let is_caught_up = now_ms - candle.ts_ms < self.catchup_threshold_ms;
        if self.catchup_mode && is_caught_up {
            self.catchup_mode = false;
            if let Some(sig) = self.buffered_signal.take() {
                self.publish_signal(&sig, 1).await?;
            }
        }

        let close_for_long = self.tracker.close_for_long(&candle);
        let close_for_short = self.tracker.close_for_short(&candle);
        let new_regime = regime::decide(ma20, ma200, close_for_long, close_for_short);
        let indicator_candle = regime::select_indicator_candle(ma20, ma200, &self.tracker, &candle).clone();

        let state = IndicatorState {
            ts_ms: candle.ts_ms,
            close: candle.close,
            ma20,
            ma200,
            regime: new_regime,
            ind_ts_ms: indicator_candle.ts_ms,
            ind_high: indicator_candle.high,
            ind_low: indicator_candle.low,
        };
        self.publish_indicator(&state).await?;

        if ma20.is_none() || ma200.is_none() {
            self.watermark_ts = candle.ts_ms;
            return Ok(());
        }

        let signals = signal_gen::emit(
            self.prev_regime,
            new_regime,
            self.armed_ind_ts,
            indicator_candle.ts_ms,
            indicator_candle.high,
            indicator_candle.low,
            self.tick_size,
            &self.symbol,
            &self.timeframe,
            candle.ts_ms,
        );

        self.armed_ind_ts = match new_regime {
            Regime::Neutral => None,
            _ => Some(indicator_candle.ts_ms),
        };
        self.prev_regime = new_regime;

        if self.catchup_mode {
            if let Some(last) = signals.into_iter().last() {
                self.buffered_signal = Some(last);
            }
        } else {
            for (i, sig) in signals.iter().enumerate() {
                self.publish_signal(sig, (i + 1) as u64).await?;
            }
        }

        self.watermark_ts = candle.ts_ms;
        Ok(())
    }

    async fn publish_indicator(&self, state: &IndicatorState) -> redis::RedisResult<()> {
        let fields = state.to_stream_map();
        self.bus
            .xadd(&keys::indicator_2m(&self.symbol), self.maxlen_ind, &fields)
            .await?;
        self.bus.overwrite_snapshot(&keys::snapshot_2m(&self.symbol), &fields).await?;
        Ok(())
    }

    async fn publish_signal(&self, sig: &Signal, seq: u64) -> redis::RedisResult<()> {
        let ts = signal_ts(sig);
        let id = format!("{ts}-{seq}");
        let fields = signal_stream_map(sig);
        self.bus
            .xadd_with_id(&keys::signal_2m(&self.symbol), &id, self.maxlen_signal, &fields)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(close: Decimal, ts_ms: i64) -> Candle {
        Candle::new(ts_ms, "BTCUSDT", "2m", close, close, close, close, dec!(1), 1)
    }

    #[tokio::test]
    async fn emits_no_signals_while_smas_unready() {
        // Without a live StreamBus this only exercises the pure decision path
        // via the underlying helpers; processor wiring is covered by the
        // signal_gen/regime unit tests plus integration smoke tests.
        let mut sma20 = Sma::new(20);
        let mut sma200 = Sma::new(200);
        assert_eq!(sma20.update(dec!(100)), None);
        assert_eq!(sma200.update(dec!(100)), None);
    }

    #[test]
    fn indicator_state_stream_map_encodes_absent_ma_as_empty_string() {
        let state = IndicatorState {
            ts_ms: 1,
            close: dec!(1),
            ma20: None,
            ma200: None,
            regime: Regime::Neutral,
            ind_ts_ms: 1,
            ind_high: dec!(1),
            ind_low: dec!(1),
        };
        let map = state.to_stream_map();
        let ma20 = map.iter().find(|(k, _)| *k == "ma20").unwrap();
        assert_eq!(ma20.1, "");
    }

    #[test]
    fn candle_helper_builds_flat_bar() {
        let c = candle(dec!(5), 10);
        assert_eq!(c.close, dec!(5));
        assert_eq!(c.ts_ms, 10);
    }
}
