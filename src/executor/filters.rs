// =============================================================================
// Symbol filters — exchangeInfo normalization + decimal-exact quantization
// =============================================================================
//
// Ported from app/core/exchange/filters.py's `build_symbol_filters`: the
// exchange-info payload names the minimum-notional filter `MIN_NOTIONAL` on
// some venues and `NOTIONAL` on others, and some symbols omit `stepSize`/
// `tickSize` in favor of `quantityPrecision`/`pricePrecision` on the symbol's
// root object (`META` fallback). This is the one place that mess is absorbed
// so the sizing algorithm downstream never has to know about it.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use tokio::sync::RwLock;
use tracing::warn;

use crate::exchange::{ExchangeClient, ExchangeError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolFilters {
    pub step_size: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub tick_size: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub min_notional: Decimal,
}

impl SymbolFilters {
    /// Floors `qty` to a multiple of `step_size`, truncating toward zero
    /// (spec §9 "Decimal semantics": floor-to-step truncates for quantity).
    pub fn floor_qty(&self, qty: Decimal) -> Decimal {
        floor_to_step(qty, self.step_size)
    }

    /// Ceils `qty` up to the next multiple of `step_size`.
    pub fn ceil_qty(&self, qty: Decimal) -> Decimal {
        ceil_to_step(qty, self.step_size)
    }

    /// Floors `price` to a multiple of `tick_size` (rounding "down for max").
    pub fn floor_price(&self, price: Decimal) -> Decimal {
        floor_to_step(price, self.tick_size)
    }
}

/// Truncates `value` down to the nearest multiple of `step` (toward zero).
pub fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step == Decimal::ZERO {
        return value;
    }
    (value / step).round_dp_with_strategy(0, RoundingStrategy::ToZero) * step
}

/// Rounds `value` up to the nearest multiple of `step`, away from zero.
pub fn ceil_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step == Decimal::ZERO {
        return value;
    }
    let floored = floor_to_step(value, step);
    if floored < value {
        floored + step
    } else {
        floored
    }
}

fn parse_decimal(v: &serde_json::Value) -> Option<Decimal> {
    v.as_str().and_then(|s| s.parse::<Decimal>().ok())
}

/// Extracts [`SymbolFilters`] for one symbol out of a raw `GET /exchangeInfo`
/// body, normalizing `NOTIONAL`/`MIN_NOTIONAL` naming and falling back to
/// `quantityPrecision`/`pricePrecision` when step/tick sizes are absent.
pub fn parse_symbol_filters(exchange_info: &serde_json::Value, symbol: &str) -> Option<SymbolFilters> {
    let symbols = exchange_info.get("symbols")?.as_array()?;
    let entry = symbols.iter().find(|s| s.get("symbol").and_then(|v| v.as_str()) == Some(symbol))?;
    let filter_list = entry.get("filters")?.as_array()?;

    let mut step_size = None;
    let mut min_qty = None;
    let mut max_qty = None;
    let mut tick_size = None;
    let mut min_price = None;
    let mut max_price = None;
    let mut min_notional = None;

    for f in filter_list {
        match f.get("filterType").and_then(|v| v.as_str()) {
            Some("LOT_SIZE") => {
                step_size = f.get("stepSize").and_then(parse_decimal);
                min_qty = f.get("minQty").and_then(parse_decimal);
                max_qty = f.get("maxQty").and_then(parse_decimal);
            }
            Some("PRICE_FILTER") => {
                tick_size = f.get("tickSize").and_then(parse_decimal);
                min_price = f.get("minPrice").and_then(parse_decimal);
                max_price = f.get("maxPrice").and_then(parse_decimal);
            }
            // Venue-dependent naming for the same concept.
            Some("MIN_NOTIONAL") | Some("NOTIONAL") => {
                min_notional = f
                    .get("notional")
                    .and_then(parse_decimal)
                    .or_else(|| f.get("minNotional").and_then(parse_decimal));
            }
            _ => {}
        }
    }

    // META precision fallback when step/tick sizes are missing outright.
    if step_size.is_none() {
        if let Some(p) = entry.get("quantityPrecision").and_then(|v| v.as_i64()) {
            step_size = Some(precision_to_step(p));
        }
    }
    if tick_size.is_none() {
        if let Some(p) = entry.get("pricePrecision").and_then(|v| v.as_i64()) {
            tick_size = Some(precision_to_step(p));
        }
    }

    Some(SymbolFilters {
        step_size: step_size?,
        min_qty: min_qty.unwrap_or(Decimal::ZERO),
        max_qty: max_qty.unwrap_or(Decimal::MAX),
        tick_size: tick_size?,
        min_price: min_price.unwrap_or(Decimal::ZERO),
        max_price: max_price.unwrap_or(Decimal::MAX),
        min_notional: min_notional.unwrap_or(Decimal::ZERO),
    })
}

fn precision_to_step(precision: i64) -> Decimal {
    let precision = precision.clamp(0, 18) as u32;
    Decimal::new(1, precision)
}

struct CachedFilters {
    by_symbol: HashMap<String, SymbolFilters>,
    fetched_at: Instant,
}

/// TTL-gated cache over `get_exchange_info`, so the Executor doesn't refetch
/// the full exchange-info payload on every single placement.
pub struct FilterCache {
    exchange: Arc<dyn ExchangeClient>,
    ttl: Duration,
    inner: RwLock<Option<CachedFilters>>,
}

impl FilterCache {
    pub fn new(exchange: Arc<dyn ExchangeClient>, ttl: Duration) -> Self {
        Self {
            exchange,
            ttl,
            inner: RwLock::new(None),
        }
    }

    pub async fn get(&self, symbol: &str) -> Result<SymbolFilters, ExchangeError> {
        {
            let guard = self.inner.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    if let Some(f) = cached.by_symbol.get(symbol) {
                        return Ok(*f);
                    }
                }
            }
        }
        self.refresh().await?;
        let guard = self.inner.read().await;
        guard
            .as_ref()
            .and_then(|c| c.by_symbol.get(symbol).copied())
            .ok_or_else(|| ExchangeError::new(crate::domain::ExchangeErrorKind::BadRequest, format!("unknown symbol filters for {symbol}")))
    }

    async fn refresh(&self) -> Result<(), ExchangeError> {
        let info = self.exchange.get_exchange_info().await?;
        let symbols = info.get("symbols").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let mut by_symbol = HashMap::new();
        for entry in &symbols {
            if let Some(sym) = entry.get("symbol").and_then(|v| v.as_str()) {
                if let Some(filters) = parse_symbol_filters(&info, sym) {
                    by_symbol.insert(sym.to_string(), filters);
                } else {
                    warn!(symbol = sym, "could not parse symbol filters, skipping");
                }
            }
        }
        *self.inner.write().await = Some(CachedFilters {
            by_symbol,
            fetched_at: Instant::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn sample_info() -> serde_json::Value {
        json!({
            "symbols": [
                {
                    "symbol": "BTCUSDT",
                    "filters": [
                        {"filterType": "LOT_SIZE", "stepSize": "0.001", "minQty": "0.001", "maxQty": "1000"},
                        {"filterType": "PRICE_FILTER", "tickSize": "0.1", "minPrice": "0.1", "maxPrice": "1000000"},
                        {"filterType": "MIN_NOTIONAL", "notional": "5"}
                    ]
                },
                {
                    "symbol": "ETHUSDT",
                    "filters": [
                        {"filterType": "LOT_SIZE", "stepSize": "0.01", "minQty": "0.01", "maxQty": "10000"},
                        {"filterType": "PRICE_FILTER", "tickSize": "0.01", "minPrice": "0.01", "maxPrice": "100000"},
                        {"filterType": "NOTIONAL", "minNotional": "5"}
                    ]
                }
            ]
        })
    }

    #[test]
    fn parses_min_notional_filter_naming() {
        let f = parse_symbol_filters(&sample_info(), "BTCUSDT").unwrap();
        assert_eq!(f.step_size, dec!(0.001));
        assert_eq!(f.min_notional, dec!(5));
    }

    #[test]
    fn parses_notional_filter_naming_variant() {
        let f = parse_symbol_filters(&sample_info(), "ETHUSDT").unwrap();
        assert_eq!(f.min_notional, dec!(5));
    }

    #[test]
    fn floor_to_step_truncates_toward_zero() {
        assert_eq!(floor_to_step(dec!(0.0014), dec!(0.001)), dec!(0.001));
        assert_eq!(floor_to_step(dec!(35010.678), dec!(0.1)), dec!(35010.6));
    }

    #[test]
    fn ceil_to_step_rounds_up_when_not_exact() {
        assert_eq!(ceil_to_step(dec!(0.00008), dec!(0.001)), dec!(0.001));
        assert_eq!(ceil_to_step(dec!(0.002), dec!(0.001)), dec!(0.002));
    }

    #[test]
    fn missing_symbol_returns_none() {
        assert!(parse_symbol_filters(&sample_info(), "XRPUSDT").is_none());
    }
}
