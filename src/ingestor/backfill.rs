// =============================================================================
// Startup backfill — bootstraps MA200 via REST klines (spec §4.1 "Backfill")
// =============================================================================
//
// Ported from ingestor/backfill.py's `backfill_symbol`: fetch ascending by
// close time, replay through the aggregator, and write both streams
// forward-only (never re-publishing an entry at or before the current tail).
// =============================================================================

use std::sync::Arc;

use tracing::{info, warn};

use crate::exchange::ExchangeClient;
use crate::streambus::{dedupe, keys, StreamBus};

use super::aggregator::TwoMinuteAggregator;

#[derive(Debug, Default, Clone, Copy)]
pub struct BackfillCounts {
    pub bars_1m_written: u32,
    pub bars_2m_written: u32,
}

pub async fn backfill_symbol(
    bus: &StreamBus,
    exchange: &dyn ExchangeClient,
    symbol: &str,
    min_2m: u32,
    one_min_limit: u32,
    maxlen_1m: u64,
    maxlen_2m: u64,
) -> anyhow::Result<BackfillCounts> {
    let need_1m = (2 * min_2m).max(one_min_limit);
    let klines = exchange.get_klines(symbol, "1m", need_1m).await?;

    let last1 = last_entry_ts(bus, &keys::market_1m(symbol)).await;
    let last2 = last_entry_ts(bus, &keys::market_2m(symbol)).await;

    let mut watermark1 = last1;
    let mut watermark2 = last2;
    let mut aggregator = TwoMinuteAggregator::new();
    let mut counts = BackfillCounts::default();

    for bar in klines {
        if bar.ts_ms > watermark1 {
            let token = format!("source:{symbol}:1m:{}", bar.ts_ms);
            if dedupe::dedupe_once(bus, &token).await? {
                let id = format!("{}-0", bar.ts_ms);
                bus.xadd_with_id(&keys::market_1m(symbol), &id, maxlen_1m, &bar.to_stream_map())
                    .await?;
                counts.bars_1m_written += 1;
            }
            watermark1 = bar.ts_ms;
        }

        if let Some(two_min) = aggregator.ingest(bar) {
            if two_min.ts_ms > watermark2 {
                let token = format!("source:{symbol}:2m:{}", two_min.ts_ms);
                if dedupe::dedupe_once(bus, &token).await? {
                    let id = format!("{}-0", two_min.ts_ms);
                    bus.xadd_with_id(&keys::market_2m(symbol), &id, maxlen_2m, &two_min.to_stream_map())
                        .await?;
                    counts.bars_2m_written += 1;
                }
                watermark2 = two_min.ts_ms;
            }
        }
    }

    info!(
        symbol,
        written_1m = counts.bars_1m_written,
        written_2m = counts.bars_2m_written,
        "backfill complete"
    );
    Ok(counts)
}

async fn last_entry_ts(bus: &StreamBus, stream: &str) -> i64 {
    match bus.xrevrange_last(stream, 1).await {
        Ok(entries) => entries
            .first()
            .and_then(|(id, _)| id.split('-').next())
            .and_then(|ts| ts.parse::<i64>().ok())
            .unwrap_or(0),
        Err(e) => {
            warn!(stream, error = %e, "failed to read backfill watermark, defaulting to 0");
            0
        }
    }
}

/// Runs backfill for every configured symbol when the 2-minute stream is
/// thin, matching the startup gate in spec §4.1.
pub async fn backfill_on_start(
    bus: Arc<StreamBus>,
    exchange: Arc<dyn ExchangeClient>,
    symbols: &[String],
    min_2m: u32,
    one_min_limit: u32,
    maxlen_1m: u64,
    maxlen_2m: u64,
) {
    for symbol in symbols {
        let depth = bus
            .xrevrange_last(&keys::market_2m(symbol), min_2m as usize)
            .await
            .map(|v| v.len())
            .unwrap_or(0);
        if depth >= min_2m as usize {
            continue;
        }
        if let Err(e) = backfill_symbol(&bus, exchange.as_ref(), symbol, min_2m, one_min_limit, maxlen_1m, maxlen_2m).await {
            warn!(symbol, error = %e, "backfill failed, continuing with live ingestion only");
        }
    }
}
