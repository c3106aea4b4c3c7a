// =============================================================================
// Calculator task — tails market.{SYMBOL:2m} and drives one SymbolProcessor
// =============================================================================
//
// Plain XREAD rather than a consumer group: a single process owns each
// symbol's calculator, so there is nothing to load-balance or redeliver.
// `SymbolProcessor`'s own resume watermark (read from the indicator/signal
// streams at construction) is what makes replaying from id "0" on every
// restart safe rather than a consumer-group offset.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::Candle;
use crate::streambus::{keys, StreamBus};

use super::processor::SymbolProcessor;

fn stringify(v: redis::Value) -> String {
    match v {
        redis::Value::Data(bytes) => String::from_utf8_lossy(&bytes).to_string(),
        redis::Value::Status(s) => s,
        redis::Value::Int(i) => i.to_string(),
        _ => String::new(),
    }
}

/// Runs the calculator loop for one symbol until the process is torn down.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    bus: Arc<StreamBus>,
    symbol: String,
    timeframe: String,
    tick_size: Decimal,
    maxlen_ind: u64,
    maxlen_signal: u64,
    catchup_threshold_ms: i64,
    block_ms: u64,
) {
    let stream = keys::market_2m(&symbol);
    let mut processor = SymbolProcessor::new(
        bus.clone(),
        symbol.clone(),
        timeframe,
        tick_size,
        maxlen_ind,
        maxlen_signal,
        catchup_threshold_ms,
    )
    .await;

    let mut last_id = "0".to_string();
    loop {
        match bus.xread_from(&stream, &last_id, block_ms, 100).await {
            Ok(reply) => {
                for key in reply.keys {
                    for entry in key.ids {
                        last_id = entry.id.clone();
                        let map: HashMap<String, String> =
                            entry.map.into_iter().map(|(k, v)| (k, stringify(v))).collect();

                        match Candle::from_stream_map(&map) {
                            Ok(candle) => {
                                let now_ms = chrono::Utc::now().timestamp_millis();
                                if let Err(e) = processor.on_candle(candle, now_ms).await {
                                    warn!(symbol = %symbol, error = %e, "failed to publish calculator output");
                                }
                            }
                            Err(e) => {
                                warn!(symbol = %symbol, entry_id = %entry.id, error = %e, "dropping malformed candle entry");
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "market stream read failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
