// =============================================================================
// Signal — ARM/DISARM tagged union and its stream wire format
// =============================================================================
//
// The stream bus carries flat `field -> string` maps (spec §6). Parsing must
// fail loudly on missing or ill-typed fields rather than defaulting them away
// (spec §9, "Dynamic typing -> explicit tagged unions").
// =============================================================================

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;

use super::enums::Side;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalParseError(pub String);

impl fmt::Display for SignalParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid signal: {}", self.0)
    }
}

impl std::error::Error for SignalParseError {}

fn field<'a>(map: &'a HashMap<String, String>, key: &str) -> Result<&'a str, SignalParseError> {
    map.get(key)
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SignalParseError(format!("missing field '{key}'")))
}

fn parse_side(raw: &str) -> Result<Side, SignalParseError> {
    match raw {
        "long" => Ok(Side::Long),
        "short" => Ok(Side::Short),
        other => Err(SignalParseError(format!("invalid side '{other}'"))),
    }
}

fn parse_decimal(map: &HashMap<String, String>, key: &str) -> Result<Decimal, SignalParseError> {
    let raw = field(map, key)?;
    raw.parse::<Decimal>()
        .map_err(|e| SignalParseError(format!("field '{key}' not decimal: {e}")))
}

fn parse_i64(map: &HashMap<String, String>, key: &str) -> Result<i64, SignalParseError> {
    let raw = field(map, key)?;
    raw.parse::<i64>()
        .map_err(|e| SignalParseError(format!("field '{key}' not integer: {e}")))
}

/// Asks an executor to enter a new position.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmSignal {
    pub version: String,
    pub side: Side,
    pub symbol: String,
    pub timeframe: String,
    pub ts_ms: i64,
    pub ind_ts_ms: i64,
    pub ind_high: Decimal,
    pub ind_low: Decimal,
    pub trigger: Decimal,
    pub stop: Decimal,
    /// Redis stream message id this signal was delivered on, if consumed
    /// from a stream rather than constructed in-process (e.g. by tests).
    pub signal_msg_id: Option<String>,
}

/// Asks to cancel any pending work for the previous side.
#[derive(Debug, Clone, PartialEq)]
pub struct DisarmSignal {
    pub version: String,
    pub prev_side: Side,
    pub symbol: String,
    pub timeframe: String,
    pub ts_ms: i64,
    pub reason: String,
    pub signal_msg_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Arm(ArmSignal),
    Disarm(DisarmSignal),
}

impl ArmSignal {
    pub fn from_stream(map: &HashMap<String, String>) -> Result<Self, SignalParseError> {
        if field(map, "type")? != "arm" {
            return Err(SignalParseError("type is not 'arm'".into()));
        }
        Ok(Self {
            version: field(map, "v")?.to_string(),
            side: parse_side(field(map, "side")?)?,
            symbol: field(map, "sym")?.to_uppercase(),
            timeframe: field(map, "tf")?.to_string(),
            ts_ms: parse_i64(map, "ts")?,
            ind_ts_ms: parse_i64(map, "ind_ts")?,
            ind_high: parse_decimal(map, "ind_high")?,
            ind_low: parse_decimal(map, "ind_low")?,
            trigger: parse_decimal(map, "trigger")?,
            stop: parse_decimal(map, "stop")?,
            signal_msg_id: None,
        })
    }

    pub fn to_stream_map(&self) -> Vec<(&'static str, String)> {
        vec![
            ("v", self.version.clone()),
            ("type", "arm".to_string()),
            ("side", self.side.to_string()),
            ("sym", self.symbol.clone()),
            ("tf", self.timeframe.clone()),
            ("ts", self.ts_ms.to_string()),
            ("ind_ts", self.ind_ts_ms.to_string()),
            ("ind_high", self.ind_high.to_string()),
            ("ind_low", self.ind_low.to_string()),
            ("trigger", self.trigger.to_string()),
            ("stop", self.stop.to_string()),
        ]
    }

    /// `<symbol>:<ind_ts>:<side>` — the idempotency key a Router uses to
    /// de-duplicate dispatch per (bot_id, signal_id), per spec §4.3.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}:{}", self.symbol, self.ind_ts_ms, self.side)
    }
}

impl DisarmSignal {
    pub fn from_stream(map: &HashMap<String, String>) -> Result<Self, SignalParseError> {
        if field(map, "type")? != "disarm" {
            return Err(SignalParseError("type is not 'disarm'".into()));
        }
        Ok(Self {
            version: field(map, "v")?.to_string(),
            prev_side: parse_side(field(map, "prev_side")?)?,
            symbol: field(map, "sym")?.to_uppercase(),
            timeframe: field(map, "tf")?.to_string(),
            ts_ms: parse_i64(map, "ts")?,
            reason: field(map, "reason")?.to_string(),
            signal_msg_id: None,
        })
    }

    pub fn to_stream_map(&self) -> Vec<(&'static str, String)> {
        vec![
            ("v", self.version.clone()),
            ("type", "disarm".to_string()),
            ("prev_side", self.prev_side.to_string()),
            ("sym", self.symbol.clone()),
            ("tf", self.timeframe.clone()),
            ("ts", self.ts_ms.to_string()),
            ("reason", self.reason.clone()),
        ]
    }
}

impl Signal {
    pub fn from_stream(map: &HashMap<String, String>) -> Result<Self, SignalParseError> {
        match field(map, "type")? {
            "arm" => Ok(Signal::Arm(ArmSignal::from_stream(map)?)),
            "disarm" => Ok(Signal::Disarm(DisarmSignal::from_stream(map)?)),
            other => Err(SignalParseError(format!("unknown signal type '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn arm_map() -> HashMap<String, String> {
        [
            ("v", "1"),
            ("type", "arm"),
            ("side", "long"),
            ("sym", "BTCUSDT"),
            ("tf", "2m"),
            ("ts", "1700000000000"),
            ("ind_ts", "1699999880000"),
            ("ind_high", "35100.5"),
            ("ind_low", "34990.1"),
            ("trigger", "35100.6"),
            ("stop", "34990.0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn parses_valid_arm() {
        let sig = ArmSignal::from_stream(&arm_map()).unwrap();
        assert_eq!(sig.side, Side::Long);
        assert_eq!(sig.symbol, "BTCUSDT");
        assert_eq!(sig.trigger, dec!(35100.6));
        assert_eq!(sig.idempotency_key(), "BTCUSDT:1699999880000:long");
    }

    #[test]
    fn rejects_missing_field() {
        let mut map = arm_map();
        map.remove("trigger");
        assert!(ArmSignal::from_stream(&map).is_err());
    }

    #[test]
    fn rejects_bad_side() {
        let mut map = arm_map();
        map.insert("side".to_string(), "up".to_string());
        assert!(ArmSignal::from_stream(&map).is_err());
    }

    #[test]
    fn disarm_roundtrip_via_union() {
        let map: HashMap<String, String> = [
            ("v", "1"),
            ("type", "disarm"),
            ("prev_side", "short"),
            ("sym", "ETHUSDT"),
            ("tf", "2m"),
            ("ts", "1700000000000"),
            ("reason", "regime:short->neutral"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        match Signal::from_stream(&map).unwrap() {
            Signal::Disarm(d) => {
                assert_eq!(d.prev_side, Side::Short);
                assert_eq!(d.reason, "regime:short->neutral");
            }
            Signal::Arm(_) => panic!("expected disarm"),
        }
    }
}
