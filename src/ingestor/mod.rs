// =============================================================================
// Ingestor — websocket kline_1m subscription, 2m aggregation, startup backfill
// =============================================================================

pub mod aggregator;
pub mod backfill;
pub mod ws;

pub use aggregator::TwoMinuteAggregator;
pub use backfill::{backfill_on_start, backfill_symbol, BackfillCounts};
