// =============================================================================
// Websocket ingestion — one task per symbol, kline_1m, closed bars only
// =============================================================================
//
// Reconnects with exponential backoff to a 30s ceiling on any disconnect or
// malformed-frame condition, matching spec §4.1's failure policy. Built on
// tokio-tungstenite the way the teacher's market-data feed handler frames a
// long-running read loop around `next()`.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::domain::Candle;
use crate::streambus::{dedupe, keys, StreamBus};

use super::aggregator::TwoMinuteAggregator;

const RECONNECT_CEILING: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct KlineEnvelope {
    k: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "o")]
    open: Decimal,
    #[serde(rename = "h")]
    high: Decimal,
    #[serde(rename = "l")]
    low: Decimal,
    #[serde(rename = "c")]
    close: Decimal,
    #[serde(rename = "v")]
    volume: Decimal,
    #[serde(rename = "n")]
    trades: i64,
    /// Whether this bar is closed; ignored mid-bar updates per spec §4.1.
    #[serde(rename = "x")]
    is_closed: bool,
}

fn stream_url(symbol: &str) -> String {
    format!("wss://fstream.binance.com/ws/{}@kline_1m", symbol.to_lowercase())
}

/// Runs the ingestion loop for one symbol until the process is torn down.
pub async fn run(bus: Arc<StreamBus>, symbol: String, maxlen_1m: u64, maxlen_2m: u64) {
    let mut aggregator = TwoMinuteAggregator::new();
    let mut backoff = Duration::from_secs(1);

    loop {
        match tokio_tungstenite::connect_async(stream_url(&symbol)).await {
            Ok((mut socket, _)) => {
                info!(symbol = %symbol, "websocket connected");
                backoff = Duration::from_secs(1);

                while let Some(msg) = socket.next().await {
                    match msg {
                        Ok(Message::Text(text)) => {
                            if let Err(e) = handle_frame(&bus, &symbol, &text, &mut aggregator, maxlen_1m, maxlen_2m).await {
                                warn!(symbol = %symbol, error = %e, "dropping malformed frame");
                            }
                        }
                        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                        Ok(Message::Close(frame)) => {
                            warn!(symbol = %symbol, ?frame, "websocket closed by peer");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(symbol = %symbol, error = %e, "websocket read error");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                error!(symbol = %symbol, error = %e, "websocket connect failed");
            }
        }

        warn!(symbol = %symbol, backoff_s = backoff.as_secs(), "reconnecting after backoff");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(RECONNECT_CEILING);
    }
}

async fn handle_frame(
    bus: &StreamBus,
    symbol: &str,
    text: &str,
    aggregator: &mut TwoMinuteAggregator,
    maxlen_1m: u64,
    maxlen_2m: u64,
) -> anyhow::Result<()> {
    let envelope: KlineEnvelope = serde_json::from_str(text)?;
    if !envelope.k.is_closed {
        return Ok(());
    }

    let candle = Candle::new(
        envelope.k.close_time,
        symbol,
        "1m",
        envelope.k.open,
        envelope.k.high,
        envelope.k.low,
        envelope.k.close,
        envelope.k.volume,
        envelope.k.trades,
    );
    debug!(symbol, open_time = envelope.k.open_time, ts = candle.ts_ms, "closed 1m bar received");

    let token = format!("source:{symbol}:1m:{}", candle.ts_ms);
    if dedupe::dedupe_once(bus, &token).await? {
        let id = format!("{}-0", candle.ts_ms);
        bus.xadd_with_id(&keys::market_1m(symbol), &id, maxlen_1m, &candle.to_stream_map())
            .await?;
    }

    if let Some(two_min) = aggregator.ingest(candle) {
        let token = format!("source:{symbol}:2m:{}", two_min.ts_ms);
        if dedupe::dedupe_once(bus, &token).await? {
            let id = format!("{}-0", two_min.ts_ms);
            bus.xadd_with_id(&keys::market_2m(symbol), &id, maxlen_2m, &two_min.to_stream_map())
                .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_lowercases_symbol() {
        assert_eq!(stream_url("BTCUSDT"), "wss://fstream.binance.com/ws/btcusdt@kline_1m");
    }

    #[test]
    fn ignores_unclosed_bar() {
        let raw = r#"{"k":{"t":1,"T":2,"o":"1","h":"1","l":"1","c":"1","v":"1","n":1,"x":false}}"#;
        let envelope: KlineEnvelope = serde_json::from_str(raw).unwrap();
        assert!(!envelope.k.is_closed);
    }
}
