// =============================================================================
// Sizing + pre-flight quantization (spec §4.4 steps 1-9)
// =============================================================================
//
// Deterministic, decimal-exact throughout — no f64 anywhere a price or
// quantity is touched (spec §9). Mirrors order_executor.py's
// `_size_position`/`_quantize` pair as one pipeline so the intermediate
// values in spec scenarios S3/S4 are checkable step by step.
// =============================================================================

use std::fmt;

use rust_decimal::Decimal;

use crate::domain::{BotConfig, Side};

use super::filters::SymbolFilters;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingError {
    /// Neither `fixed_notional` nor `use_balance_pct` produced a usable target.
    NoSizingModeConfigured,
    /// Quantized trigger price rounded to zero.
    TriggerQuantizedToZero,
    /// Required margin at the quantized size exceeds available balance.
    InsufficientBalance,
}

impl fmt::Display for SizingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SizingError::NoSizingModeConfigured => "no sizing mode configured",
            SizingError::TriggerQuantizedToZero => "trigger price quantized to zero",
            SizingError::InsufficientBalance => "required margin exceeds available balance",
        };
        write!(f, "{s}")
    }
}

impl std::error::Error for SizingError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizedOrder {
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

/// Step 1: target notional before any clamping.
fn target_notional(bot: &BotConfig, available_balance: Decimal) -> Result<Decimal, SizingError> {
    if bot.fixed_notional > Decimal::ZERO {
        Ok(bot.fixed_notional)
    } else if bot.use_balance_pct {
        let pct = bot.balance_pct.clamp(Decimal::ZERO, Decimal::ONE);
        Ok(available_balance * pct)
    } else {
        Err(SizingError::NoSizingModeConfigured)
    }
}

/// Runs spec §4.4 steps 1-9 end to end and returns the quantized entry
/// order, or a terminal [`SizingError`].
pub fn size_and_quantize(
    bot: &BotConfig,
    trigger: Decimal,
    available_balance: Decimal,
    filters: &SymbolFilters,
) -> Result<QuantizedOrder, SizingError> {
    // Step 1.
    let mut notional = target_notional(bot, available_balance)?;

    // Step 2: clamp by max_position_usdt if set.
    if bot.max_position_usdt > Decimal::ZERO {
        notional = notional.min(bot.max_position_usdt);
    }

    // Step 3.
    let raw_qty = notional / trigger;

    // Step 5: floor to stepSize, cap maxQty, enforce minQty by ceiling up.
    let mut qty = filters.floor_qty(raw_qty);
    qty = qty.min(filters.max_qty);
    if qty < filters.min_qty {
        qty = filters.ceil_qty(filters.min_qty);
    }

    // Step 6: bump up to satisfy min_notional, respecting step.
    if filters.min_notional > Decimal::ZERO && qty * trigger < filters.min_notional {
        let needed = filters.min_notional / trigger;
        qty = filters.ceil_qty(needed);
    }

    // Step 7: recheck maxQty cap.
    qty = qty.min(filters.max_qty);

    // Step 9: quantize trigger to tickSize (floor), reject if zero.
    let quantized_trigger = filters.floor_price(trigger);
    if quantized_trigger <= Decimal::ZERO {
        return Err(SizingError::TriggerQuantizedToZero);
    }

    // Step 8: recompute required margin; reject if it exceeds balance.
    let required_margin = (qty * quantized_trigger) / Decimal::from(bot.leverage.max(1));
    if required_margin > available_balance {
        return Err(SizingError::InsufficientBalance);
    }

    Ok(QuantizedOrder {
        quantity: qty,
        entry_price: quantized_trigger,
    })
}

/// Pre-trade safety gate: rejects an overly tight stop (spec §4.4, 5bps).
pub const MIN_STOP_DISTANCE_RATIO: Decimal = Decimal::from_parts(5, 0, 0, false, 4); // 0.0005

/// Pre-trade safety gate: max allowed drift between trigger/stop and the
/// current mark price (spec §4.4, original constant 0.0015 / 15bps).
pub const MARK_DRIFT_RATIO: Decimal = Decimal::from_parts(15, 0, 0, false, 4); // 0.0015

pub fn stop_distance_too_tight(trigger: Decimal, stop: Decimal) -> bool {
    if trigger == Decimal::ZERO {
        return true;
    }
    ((trigger - stop).abs() / trigger) < MIN_STOP_DISTANCE_RATIO
}

/// Mark-drift guard: rejects if entry or stop sits on the wrong side of the
/// current mark price by more than `MARK_DRIFT_RATIO` (spec §4.4,
/// SPEC_FULL §B.3 — distinct checks for long vs short, stop vs entry). A
/// long buys above mark at `entry` and protects below at `stop`; short
/// mirrors it.
pub fn mark_drift_exceeded(side: Side, entry: Decimal, stop: Decimal, mark: Decimal) -> bool {
    if mark == Decimal::ZERO {
        return false;
    }
    let one_plus = Decimal::ONE + MARK_DRIFT_RATIO;
    let one_minus = Decimal::ONE - MARK_DRIFT_RATIO;
    match side {
        Side::Long => mark > entry * one_plus || mark < stop * one_minus,
        Side::Short => mark < entry * one_minus || mark > stop * one_plus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BotStatus, Environment, SideWhitelist};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn bot(use_pct: bool, pct: Decimal, fixed: Decimal, max_pos: Decimal, leverage: u32) -> BotConfig {
        BotConfig {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            cred_id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            timeframe: "2m".into(),
            enabled: true,
            status: BotStatus::Active,
            env: Environment::Testnet,
            side_whitelist: SideWhitelist::Both,
            leverage,
            use_balance_pct: use_pct,
            balance_pct: pct,
            fixed_notional: fixed,
            max_position_usdt: max_pos,
            tp_r_multiple: dec!(1.5),
        }
    }

    fn filters(step: Decimal, min_qty: Decimal, tick: Decimal, min_notional: Decimal) -> SymbolFilters {
        SymbolFilters {
            step_size: step,
            min_qty,
            max_qty: dec!(10000),
            tick_size: tick,
            min_price: dec!(0),
            max_price: dec!(10000000),
            min_notional,
        }
    }

    /// Spec S3: raw_qty=0.0014, trigger=35010.678 -> qty=0.001, price=35010.6.
    #[test]
    fn s3_quantization() {
        let b = bot(false, dec!(0), dec!(49.01), dec!(0), 10);
        let f = filters(dec!(0.001), dec!(0.001), dec!(0.1), dec!(5));
        // notional chosen so raw_qty works out to 0.0014 at this trigger.
        let trigger = dec!(35010.678);
        let notional = trigger * dec!(0.0014);
        let b = bot(false, dec!(0), notional, dec!(0), 10);
        let out = size_and_quantize(&b, trigger, dec!(100000), &f).unwrap();
        assert_eq!(out.quantity, dec!(0.001));
        assert_eq!(out.entry_price, dec!(35010.6));
        let _ = b;
    }

    /// Spec S4: raw_qty=0.00008, trigger=100 -> bumped to qty=0.050.
    #[test]
    fn s4_min_notional_bump() {
        let trigger = dec!(100);
        let notional = trigger * dec!(0.00008);
        let b = bot(false, dec!(0), notional, dec!(0), 10);
        let f = filters(dec!(0.001), dec!(0.001), dec!(0.1), dec!(5));
        let out = size_and_quantize(&b, trigger, dec!(100000), &f).unwrap();
        assert_eq!(out.quantity, dec!(0.050));
    }

    #[test]
    fn s4_rejects_on_insufficient_balance_after_bump() {
        let trigger = dec!(100);
        let notional = trigger * dec!(0.00008);
        let b = bot(false, dec!(0), notional, dec!(0), 1);
        let f = filters(dec!(0.001), dec!(0.001), dec!(0.1), dec!(5));
        // required margin = 0.050 * 100 / 1 = 5; balance of 1 is insufficient.
        let err = size_and_quantize(&b, trigger, dec!(1), &f).unwrap_err();
        assert_eq!(err, SizingError::InsufficientBalance);
    }

    #[test]
    fn balance_pct_mode_clamps_to_one() {
        let b = bot(true, dec!(5), dec!(0), dec!(0), 5);
        let f = filters(dec!(0.001), dec!(0.001), dec!(0.1), dec!(5));
        let out = size_and_quantize(&b, dec!(100), dec!(1000), &f).unwrap();
        // clamp(5, 0, 1) = 1 -> full balance as notional -> qty = 10
        assert_eq!(out.quantity, dec!(10));
    }

    #[test]
    fn max_position_usdt_clamps_notional() {
        let b = bot(true, dec!(1), dec!(0), dec!(50), 5);
        let f = filters(dec!(0.001), dec!(0.001), dec!(0.1), dec!(5));
        let out = size_and_quantize(&b, dec!(100), dec!(1000), &f).unwrap();
        assert_eq!(out.quantity, dec!(0.5));
    }

    #[test]
    fn no_sizing_mode_is_an_error() {
        let b = bot(false, dec!(0), dec!(0), dec!(0), 5);
        let f = filters(dec!(0.001), dec!(0.001), dec!(0.1), dec!(5));
        assert_eq!(size_and_quantize(&b, dec!(100), dec!(1000), &f).unwrap_err(), SizingError::NoSizingModeConfigured);
    }

    #[test]
    fn tight_stop_rejected_under_5bps() {
        assert!(stop_distance_too_tight(dec!(100), dec!(99.96)));
        assert!(!stop_distance_too_tight(dec!(100), dec!(99.9)));
    }

    #[test]
    fn mark_drift_rejected_beyond_15bps() {
        // Long: entry above mark, stop below entry. Mark already past entry
        // (stale breakout) or already past stop (would stop out immediately).
        assert!(mark_drift_exceeded(Side::Long, dec!(100), dec!(99), dec!(100.2)));
        assert!(mark_drift_exceeded(Side::Long, dec!(100), dec!(99), dec!(98.8)));
        assert!(!mark_drift_exceeded(Side::Long, dec!(100), dec!(99), dec!(99.95)));

        // Short mirrors it: entry below mark, stop above entry.
        assert!(mark_drift_exceeded(Side::Short, dec!(100), dec!(101), dec!(99.8)));
        assert!(mark_drift_exceeded(Side::Short, dec!(100), dec!(101), dec!(101.2)));
        assert!(!mark_drift_exceeded(Side::Short, dec!(100), dec!(101), dec!(100.05)));
    }
}
