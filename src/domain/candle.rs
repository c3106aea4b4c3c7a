// =============================================================================
// Candle — immutable OHLCV bar
// =============================================================================

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::Color;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleParseError(pub String);

impl fmt::Display for CandleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid candle: {}", self.0)
    }
}

impl std::error::Error for CandleParseError {}

/// One fixed-interval OHLCV bar. Timestamp is the bar's *close* time, in
/// milliseconds. 2-minute bars close on odd UTC minutes; 1-minute bars close
/// on every UTC minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub ts_ms: i64,
    pub symbol: String,
    pub timeframe: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trade_count: i64,
}

impl Candle {
    pub fn new(
        ts_ms: i64,
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        trade_count: i64,
    ) -> Self {
        Self {
            ts_ms,
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            open,
            high,
            low,
            close,
            volume,
            trade_count,
        }
    }

    /// Green if close >= open, else red. A doji (close == open) is green.
    pub fn color(&self) -> Color {
        if self.close >= self.open {
            Color::Green
        } else {
            Color::Red
        }
    }

    pub fn is_doji(&self) -> bool {
        self.close == self.open
    }

    /// `ts_ms` falls on an odd UTC minute (2-minute bar close convention).
    pub fn closes_on_odd_minute(&self) -> bool {
        (self.ts_ms / 60_000) % 2 == 1
    }

    /// `ts_ms` falls on an even UTC minute.
    pub fn closes_on_even_minute(&self) -> bool {
        !self.closes_on_odd_minute()
    }

    /// Flat `field -> decimal-string` map for the market stream wire format.
    pub fn to_stream_map(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ts", self.ts_ms.to_string()),
            ("sym", self.symbol.clone()),
            ("tf", self.timeframe.clone()),
            ("open", self.open.to_string()),
            ("high", self.high.to_string()),
            ("low", self.low.to_string()),
            ("close", self.close.to_string()),
            ("volume", self.volume.to_string()),
            ("trades", self.trade_count.to_string()),
            (
                "color",
                match self.color() {
                    Color::Green => "green".to_string(),
                    Color::Red => "red".to_string(),
                },
            ),
        ]
    }

    /// Inverse of [`Candle::to_stream_map`] — fails loudly on a missing or
    /// ill-typed field rather than defaulting it away.
    pub fn from_stream_map(map: &HashMap<String, String>) -> Result<Self, CandleParseError> {
        fn field<'a>(map: &'a HashMap<String, String>, key: &str) -> Result<&'a str, CandleParseError> {
            map.get(key)
                .map(|s| s.as_str())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| CandleParseError(format!("missing field '{key}'")))
        }
        fn decimal(map: &HashMap<String, String>, key: &str) -> Result<Decimal, CandleParseError> {
            field(map, key)?
                .parse::<Decimal>()
                .map_err(|e| CandleParseError(format!("field '{key}' not decimal: {e}")))
        }
        fn i64_field(map: &HashMap<String, String>, key: &str) -> Result<i64, CandleParseError> {
            field(map, key)?
                .parse::<i64>()
                .map_err(|e| CandleParseError(format!("field '{key}' not integer: {e}")))
        }

        Ok(Self {
            ts_ms: i64_field(map, "ts")?,
            symbol: field(map, "sym")?.to_uppercase(),
            timeframe: field(map, "tf")?.to_string(),
            open: decimal(map, "open")?,
            high: decimal(map, "high")?,
            low: decimal(map, "low")?,
            close: decimal(map, "close")?,
            volume: decimal(map, "volume")?,
            trade_count: i64_field(map, "trades")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, close: Decimal, ts_ms: i64) -> Candle {
        Candle::new(ts_ms, "BTCUSDT", "1m", open, dec!(0), dec!(0), close, dec!(0), 0)
    }

    #[test]
    fn color_green_when_close_gte_open() {
        assert_eq!(candle(dec!(100), dec!(101), 0).color(), Color::Green);
        assert_eq!(candle(dec!(100), dec!(100), 0).color(), Color::Green);
    }

    #[test]
    fn color_red_when_close_lt_open() {
        assert_eq!(candle(dec!(100), dec!(99), 0).color(), Color::Red);
    }

    #[test]
    fn odd_even_minute_detection() {
        assert!(candle(dec!(1), dec!(1), 180_000).closes_on_odd_minute());
        assert!(candle(dec!(1), dec!(1), 120_000).closes_on_even_minute());
    }

    #[test]
    fn stream_map_round_trips() {
        let c = Candle::new(180_000, "btcusdt", "2m", dec!(100), dec!(102), dec!(99), dec!(101), dec!(45), 22);
        let map: HashMap<String, String> = c
            .to_stream_map()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let parsed = Candle::from_stream_map(&map).unwrap();
        assert_eq!(parsed.symbol, "BTCUSDT");
        assert_eq!(parsed.ts_ms, 180_000);
        assert_eq!(parsed.close, dec!(101));
    }

    #[test]
    fn from_stream_map_rejects_missing_field() {
        let map: HashMap<String, String> = HashMap::new();
        assert!(Candle::from_stream_map(&map).is_err());
    }
}
