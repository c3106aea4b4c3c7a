// =============================================================================
// Signal Poller — per (symbol, timeframe) consumer of signal.{SYMBOL:TF}
// =============================================================================
//
// Grounded in spec §4.3: resolves subscribed bots via the symbol index,
// filters eligibility/whitelist, applies the idempotency ledger, and only
// acknowledges a stream entry once every per-bot dispatch has either
// succeeded or failed in a non-retryable way.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bot_cache::BotCache;
use crate::domain::{ArmSignal, BotConfig, DisarmSignal, Signal};
use crate::streambus::{dedupe, keys, StreamBus};

/// Outcome of a single per-bot dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Succeeded, or failed in a way with no point retrying (bad request,
    /// insufficient balance, skipped-whitelist, etc).
    Done,
    /// Failed due to an infrastructure problem; the entry should be
    /// redelivered so this bot gets another attempt.
    Retryable,
}

/// Implemented by the Executor (ARM) and its DISARM-handling counterpart.
/// A trait boundary so the Poller can be unit-tested without a live exchange.
#[async_trait]
pub trait SignalDispatcher: Send + Sync {
    async fn dispatch_arm(&self, bot: &BotConfig, arm: &ArmSignal) -> DispatchOutcome;
    async fn dispatch_disarm(&self, bot: &BotConfig, disarm: &DisarmSignal) -> DispatchOutcome;
}

pub struct Poller {
    bus: Arc<StreamBus>,
    bot_cache: Arc<BotCache>,
    dispatcher: Arc<dyn SignalDispatcher>,
    symbol: String,
    timeframe: String,
    group: String,
    consumer: String,
    block_ms: u64,
}

impl Poller {
    pub fn new(
        bus: Arc<StreamBus>,
        bot_cache: Arc<BotCache>,
        dispatcher: Arc<dyn SignalDispatcher>,
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        consumer: impl Into<String>,
        block_ms: u64,
    ) -> Self {
        Self {
            bus,
            bot_cache,
            dispatcher,
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            group: "router".to_string(),
            consumer: consumer.into(),
            block_ms,
        }
    }

    pub async fn run(&self) {
        let stream = keys::signal_2m(&self.symbol);
        // Crash-recovery path first: anything delivered but never ack'd.
        if let Ok(reply) = self.bus.xread_pending(&self.group, &self.consumer, &stream, 100).await {
            self.process_reply(&stream, reply).await;
        }
        loop {
            match self.bus.xread_group(&self.group, &self.consumer, &stream, self.block_ms, 100).await {
                Ok(reply) => self.process_reply(&stream, reply).await,
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, "signal stream read failed");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn process_reply(&self, stream: &str, reply: redis::streams::StreamReadReply) {
        for key in reply.keys {
            for entry in key.ids {
                let map: HashMap<String, String> = entry.map.into_iter().map(|(k, v)| (k, stringify(v))).collect();
                self.handle_entry(stream, &entry.id, map).await;
            }
        }
    }

    async fn handle_entry(&self, stream: &str, entry_id: &str, map: HashMap<String, String>) {
        let signal = match Signal::from_stream(&map) {
            Ok(s) => s,
            Err(e) => {
                // invalid_signal per spec §7: drop and log, but do not ACK so
                // a fix to the upstream producer can replay it.
                warn!(stream, entry_id, error = %e, "dropping unparseable signal, leaving unacknowledged");
                return;
            }
        };

        if let Some(mismatch) = self.symbol_timeframe_mismatch(&signal) {
            warn!(stream, entry_id, reason = mismatch, "signal routed to wrong stream, acknowledging without dispatch");
            self.ack(stream, entry_id).await;
            return;
        }

        let bot_ids = self.subscribed_bot_ids().await;
        let mut any_retryable = false;

        for bot_id in bot_ids {
            let bot = match self.bot_cache.get(bot_id).await {
                Some(b) if b.is_eligible() => b,
                _ => continue,
            };

            let outcome = match &signal {
                Signal::Arm(arm) => self.dispatch_arm_to_bot(&bot, arm).await,
                Signal::Disarm(disarm) => Some(self.dispatcher.dispatch_disarm(&bot, disarm).await),
            };

            if let Some(DispatchOutcome::Retryable) = outcome {
                any_retryable = true;
            }
        }

        if any_retryable {
            debug!(stream, entry_id, "leaving entry unacknowledged, at least one bot needs retry");
        } else {
            self.ack(stream, entry_id).await;
        }
    }

    async fn dispatch_arm_to_bot(&self, bot: &BotConfig, arm: &ArmSignal) -> Option<DispatchOutcome> {
        if !bot.side_whitelist.permits(arm.side) {
            return None;
        }
        let signal_id = arm.idempotency_key();
        let token = format!("{}:{}", bot.id, signal_id);
        match dedupe::dedupe_once(&self.bus, &token).await {
            Ok(true) => {}
            Ok(false) => return None, // already dispatched for this (bot_id, signal_id)
            Err(e) => {
                warn!(bot_id = %bot.id, error = %e, "dedupe check failed, treating as retryable");
                return Some(DispatchOutcome::Retryable);
            }
        }

        let outcome = self.dispatcher.dispatch_arm(bot, arm).await;
        if outcome == DispatchOutcome::Retryable {
            // Let this bot be retried on redelivery instead of staying claimed.
            let _ = dedupe::release(&self.bus, &token).await;
        }
        Some(outcome)
    }

    fn symbol_timeframe_mismatch(&self, signal: &Signal) -> Option<&'static str> {
        let (sym, tf) = match signal {
            Signal::Arm(a) => (a.symbol.as_str(), a.timeframe.as_str()),
            Signal::Disarm(d) => (d.symbol.as_str(), d.timeframe.as_str()),
        };
        if sym != self.symbol {
            Some("symbol mismatch")
        } else if tf != self.timeframe {
            Some("timeframe mismatch")
        } else {
            None
        }
    }

    async fn subscribed_bot_ids(&self) -> Vec<Uuid> {
        match self.bus.smembers(&keys::bot_index(&self.symbol)).await {
            Ok(members) => members.iter().filter_map(|s| Uuid::parse_str(s).ok()).collect(),
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "failed to read bot index set");
                Vec::new()
            }
        }
    }

    async fn ack(&self, stream: &str, entry_id: &str) {
        if let Err(e) = self.bus.xack(stream, &self.group, entry_id).await {
            warn!(stream, entry_id, error = %e, "failed to ack signal entry");
        }
    }
}

fn stringify(v: redis::Value) -> String {
    match v {
        redis::Value::Data(bytes) => String::from_utf8_lossy(&bytes).to_string(),
        redis::Value::Status(s) => s,
        redis::Value::Int(i) => i.to_string(),
        _ => String::new(),
    }
}
