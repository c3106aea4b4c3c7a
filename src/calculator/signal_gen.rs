// =============================================================================
// ARM/DISARM emission rules (spec §4.2 step 6)
// =============================================================================
//
// Supersedes signals/generator.py's single-signal `maybe_signal`: this
// generalizes to the full set of transitions the spec names, including
// same-regime indicator-candle updates and direct long<->short flips, which
// the Python source's comments describe but its checked-in generator.py
// predates.
// =============================================================================

use rust_decimal::Decimal;

use crate::domain::{ArmSignal, DisarmSignal, Regime, Side, Signal};

const SIGNAL_VERSION: &str = "1";

fn side_for(regime: Regime) -> Option<Side> {
    match regime {
        Regime::Long => Some(Side::Long),
        Regime::Short => Some(Side::Short),
        Regime::Neutral => None,
    }
}

fn arm_for(side: Side, symbol: &str, timeframe: &str, ts_ms: i64, ind_ts_ms: i64, ind_high: Decimal, ind_low: Decimal, tick: Decimal) -> ArmSignal {
    let (trigger, stop) = match side {
        Side::Long => (ind_high + tick, ind_low - tick),
        Side::Short => (ind_low - tick, ind_high + tick),
    };
    ArmSignal {
        version: SIGNAL_VERSION.to_string(),
        side,
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        ts_ms,
        ind_ts_ms,
        ind_high,
        ind_low,
        trigger,
        stop,
        signal_msg_id: None,
    }
}

fn disarm_for(prev_side: Side, symbol: &str, timeframe: &str, ts_ms: i64, reason: &str) -> DisarmSignal {
    DisarmSignal {
        version: SIGNAL_VERSION.to_string(),
        prev_side,
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        ts_ms,
        reason: reason.to_string(),
        signal_msg_id: None,
    }
}

/// Produces the 0-2 signals implied by a regime transition, in emission order
/// (DISARM always precedes its paired ARM on the same bar).
#[allow(clippy::too_many_arguments)]
pub fn emit(
    prev_regime: Regime,
    new_regime: Regime,
    prev_ind_ts_ms: Option<i64>,
    ind_ts_ms: i64,
    ind_high: Decimal,
    ind_low: Decimal,
    tick: Decimal,
    symbol: &str,
    timeframe: &str,
    ts_ms: i64,
) -> Vec<Signal> {
    match (prev_regime, new_regime) {
        (Regime::Neutral, Regime::Neutral) => Vec::new(),

        (Regime::Neutral, entering) => {
            let side = side_for(entering).expect("non-neutral regime has a side");
            vec![Signal::Arm(arm_for(side, symbol, timeframe, ts_ms, ind_ts_ms, ind_high, ind_low, tick))]
        }

        (leaving, Regime::Neutral) => {
            let prev_side = side_for(leaving).expect("non-neutral regime has a side");
            vec![Signal::Disarm(disarm_for(
                prev_side,
                symbol,
                timeframe,
                ts_ms,
                &format!("regime:{leaving:?}->neutral").to_lowercase(),
            ))]
        }

        (Regime::Long, Regime::Short) | (Regime::Short, Regime::Long) => {
            let prev_side = side_for(prev_regime).expect("non-neutral regime has a side");
            let new_side = side_for(new_regime).expect("non-neutral regime has a side");
            vec![
                Signal::Disarm(disarm_for(
                    prev_side,
                    symbol,
                    timeframe,
                    ts_ms,
                    &format!("regime:{prev_regime:?}->{new_regime:?}").to_lowercase(),
                )),
                Signal::Arm(arm_for(new_side, symbol, timeframe, ts_ms, ind_ts_ms, ind_high, ind_low, tick)),
            ]
        }

        (same_prev, same_new) if same_prev == same_new => {
            // Same regime: only act if the indicator candle itself changed.
            if prev_ind_ts_ms == Some(ind_ts_ms) {
                return Vec::new();
            }
            let side = side_for(same_new).expect("non-neutral regime has a side");
            vec![
                Signal::Disarm(disarm_for(side, symbol, timeframe, ts_ms, "update_pending")),
                Signal::Arm(arm_for(side, symbol, timeframe, ts_ms, ind_ts_ms, ind_high, ind_low, tick)),
            ]
        }

        _ => Vec::new(),
    }
}
