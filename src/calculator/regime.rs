// =============================================================================
// Regime classification + indicator-candle selection (spec §4.2 steps 2-4)
// =============================================================================
//
// Generalizes regime/detector.py's single indicator_close rule to the
// reference-close pair the spec requires: close_for_long tracks the last red
// bar (falls back to the current close), close_for_short tracks the last
// green bar. A doji (close == open) updates neither tracker.
// =============================================================================

use rust_decimal::Decimal;

use crate::domain::{Candle, Regime};

/// Tracks the most recent non-doji red and green closed bars.
#[derive(Debug, Default, Clone)]
pub struct ColorTracker {
    pub last_red: Option<Candle>,
    pub last_green: Option<Candle>,
}

impl ColorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A doji (`close == open`) leaves both trackers unchanged.
    pub fn observe(&mut self, candle: &Candle) {
        if candle.is_doji() {
            return;
        }
        if candle.close < candle.open {
            self.last_red = Some(candle.clone());
        } else {
            self.last_green = Some(candle.clone());
        }
    }

    pub fn close_for_long(&self, current: &Candle) -> Decimal {
        self.last_red.as_ref().map(|c| c.close).unwrap_or(current.close)
    }

    pub fn close_for_short(&self, current: &Candle) -> Decimal {
        self.last_green.as_ref().map(|c| c.close).unwrap_or(current.close)
    }
}

/// `regime = long` iff `ma20 > ma200 ∧ close_for_long > ma20`;
/// `regime = short` iff `ma20 < ma200 ∧ close_for_short < ma20`; else neutral.
/// Requires both MAs to be present.
pub fn decide(ma20: Option<Decimal>, ma200: Option<Decimal>, close_for_long: Decimal, close_for_short: Decimal) -> Regime {
    let (ma20, ma200) = match (ma20, ma200) {
        (Some(a), Some(b)) => (a, b),
        _ => return Regime::Neutral,
    };

    if ma20 > ma200 && close_for_long > ma20 {
        Regime::Long
    } else if ma20 < ma200 && close_for_short < ma20 {
        Regime::Short
    } else {
        Regime::Neutral
    }
}

/// Chooses the reference bar whose high/low become `ind_high`/`ind_low`:
/// last red when `ma20 > ma200`, last green when `ma20 < ma200`, else the
/// current bar. Falls back to the current bar when no tracker entry exists.
pub fn select_indicator_candle<'a>(
    ma20: Option<Decimal>,
    ma200: Option<Decimal>,
    tracker: &'a ColorTracker,
    current: &'a Candle,
) -> &'a Candle {
    match (ma20, ma200) {
        (Some(a), Some(b)) if a > b => tracker.last_red.as_ref().unwrap_or(current),
        (Some(a), Some(b)) if a < b => tracker.last_green.as_ref().unwrap_or(current),
        _ => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, close: Decimal, ts: i64) -> Candle {
        Candle::new(ts, "BTCUSDT", "2m", open, close.max(open), close.min(open), close, dec!(1), 1)
    }

    #[test]
    fn neutral_when_ma_missing() {
        assert_eq!(decide(None, Some(dec!(1)), dec!(1), dec!(1)), Regime::Neutral);
    }

    #[test]
    fn long_when_ma20_above_ma200_and_close_for_long_above_ma20() {
        let r = decide(Some(dec!(105)), Some(dec!(100)), dec!(106), dec!(90));
        assert_eq!(r, Regime::Long);
    }

    #[test]
    fn short_when_ma20_below_ma200_and_close_for_short_below_ma20() {
        let r = decide(Some(dec!(95)), Some(dec!(100)), dec!(110), dec!(80));
        assert_eq!(r, Regime::Short);
    }

    #[test]
    fn neutral_when_reference_close_disagrees() {
        let r = decide(Some(dec!(105)), Some(dec!(100)), dec!(90), dec!(90));
        assert_eq!(r, Regime::Neutral);
    }

    #[test]
    fn doji_leaves_trackers_unchanged() {
        let mut tracker = ColorTracker::new();
        tracker.observe(&candle(dec!(10), dec!(9), 0));
        tracker.observe(&candle(dec!(5), dec!(5), 1)); // doji
        assert_eq!(tracker.last_red.as_ref().unwrap().ts_ms, 0);
        assert!(tracker.last_green.is_none());
    }

    #[test]
    fn indicator_candle_falls_back_to_current_without_tracker_entry() {
        let tracker = ColorTracker::new();
        let current = candle(dec!(10), dec!(11), 5);
        let chosen = select_indicator_candle(Some(dec!(105)), Some(dec!(100)), &tracker, &current);
        assert_eq!(chosen.ts_ms, 5);
    }
}
