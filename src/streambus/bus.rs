// =============================================================================
// StreamBus — Redis Streams wrapper (XADD/XREAD/XREVRANGE/XTRIM/consumer groups)
// =============================================================================
//
// Built from the connection/reconnect style of the teacher's mm-engine-rs
// Redis publisher, adapted from pub/sub to Streams semantics per the
// streams/consumer.py and streams/publisher.py wire contract. Uses
// `redis::aio::ConnectionManager` so transient disconnects are retried
// transparently rather than surfacing as hard errors mid-loop.
// =============================================================================

use redis::streams::{StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisResult};
use tracing::{info, warn};

pub struct StreamBus {
    manager: redis::aio::ConnectionManager,
}

impl StreamBus {
    pub async fn connect(redis_url: &str) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_tokio_connection_manager().await?;
        info!("connected to redis stream bus");
        Ok(Self { manager })
    }

    /// Appends an entry, trimming the stream to an approximate maxlen (`~`)
    /// so XTRIM cost stays O(1) amortised rather than exact.
    pub async fn xadd(&self, stream: &str, maxlen: u64, fields: &[(&str, String)]) -> RedisResult<String> {
        let mut conn = self.manager.clone();
        let id: String = conn
            .xadd_maxlen(stream, StreamMaxlen::Approx(maxlen as usize), "*", fields)
            .await?;
        Ok(id)
    }

    /// Appends an entry under an explicit id (e.g. `<close_ts>-0` or
    /// `<ts>-<seq>`) rather than letting Redis assign one, so forward-only
    /// watermark writes and per-bar sequence ordering are callers' choice.
    pub async fn xadd_with_id(&self, stream: &str, id: &str, maxlen: u64, fields: &[(&str, String)]) -> RedisResult<String> {
        let mut conn = self.manager.clone();
        let id: String = conn
            .xadd_maxlen(stream, StreamMaxlen::Approx(maxlen as usize), id, fields)
            .await?;
        Ok(id)
    }

    /// Reads new entries for a consumer group, blocking up to `block_ms`.
    /// Passing `>` as the per-call id means "only entries never delivered to
    /// this group", matching the original consumer's at-least-once contract.
    pub async fn xread_group(
        &self,
        group: &str,
        consumer: &str,
        stream: &str,
        block_ms: u64,
        count: usize,
    ) -> RedisResult<StreamReadReply> {
        let mut conn = self.manager.clone();
        self.ensure_group(stream, group).await?;

        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .block(block_ms as usize)
            .count(count);

        conn.xread_options(&[stream], &[">"], &opts).await
    }

    /// Plain (no consumer group) blocking read from `after_id` onward. Used
    /// by single-consumer tailers like the Calculator, which don't need
    /// ack/redelivery bookkeeping — the watermark in `SymbolProcessor` is the
    /// resume mechanism instead of a consumer group's delivery ledger.
    pub async fn xread_from(&self, stream: &str, after_id: &str, block_ms: u64, count: usize) -> RedisResult<StreamReadReply> {
        let mut conn = self.manager.clone();
        let opts = StreamReadOptions::default().block(block_ms as usize).count(count);
        conn.xread_options(&[stream], &[after_id], &opts).await
    }

    /// Re-reads a consumer's own pending entries (crash-recovery path: items
    /// delivered but never ack'd before a restart).
    pub async fn xread_pending(
        &self,
        group: &str,
        consumer: &str,
        stream: &str,
        count: usize,
    ) -> RedisResult<StreamReadReply> {
        let mut conn = self.manager.clone();
        let opts = StreamReadOptions::default().group(group, consumer).count(count);
        conn.xread_options(&[stream], &["0"], &opts).await
    }

    pub async fn xack(&self, stream: &str, group: &str, id: &str) -> RedisResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.xack(stream, group, &[id]).await?;
        Ok(())
    }

    /// Most recent `count` entries, newest first — used for warm-start reads
    /// (e.g. "last known regime") without a consumer group.
    pub async fn xrevrange_last(&self, stream: &str, count: usize) -> RedisResult<Vec<(String, Vec<(String, String)>)>> {
        let mut conn = self.manager.clone();
        let reply: Vec<(String, std::collections::HashMap<String, String>)> =
            conn.xrevrange_count(stream, "+", "-", count).await?;
        Ok(reply
            .into_iter()
            .map(|(id, fields)| (id, fields.into_iter().collect()))
            .collect())
    }

    /// Overwrites a single-entry "latest snapshot" stream: appends then trims
    /// to exactly one entry, so readers always see only the newest record.
    pub async fn overwrite_snapshot(&self, stream: &str, fields: &[(&str, String)]) -> RedisResult<String> {
        let mut conn = self.manager.clone();
        let id: String = conn.xadd_maxlen(stream, StreamMaxlen::Equals(1), "*", fields).await?;
        Ok(id)
    }

    pub async fn xtrim(&self, stream: &str, maxlen: u64) -> RedisResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .xtrim(stream, StreamMaxlen::Approx(maxlen as usize))
            .await?;
        Ok(())
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> RedisResult<()> {
        let mut conn = self.manager.clone();
        let result: RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "$").await;
        if let Err(e) = result {
            // BUSYGROUP means the group already exists — expected on every
            // call after the first, not a real failure.
            if !e.to_string().contains("BUSYGROUP") {
                warn!(stream, group, error = %e, "failed to ensure consumer group");
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn raw(&self) -> redis::aio::ConnectionManager {
        self.manager.clone()
    }

    /// Members of the bot-index set for a symbol (router's fan-out lookup).
    pub async fn smembers(&self, key: &str) -> RedisResult<Vec<String>> {
        let mut conn = self.manager.clone();
        conn.smembers(key).await
    }

    pub async fn sadd(&self, key: &str, member: &str) -> RedisResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.sadd(key, member).await?;
        Ok(())
    }

    pub async fn srem(&self, key: &str, member: &str) -> RedisResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.srem(key, member).await?;
        Ok(())
    }

    /// Writes a liveness key with an expiry, used by the heartbeat task.
    pub async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> RedisResult<()> {
        let mut conn = self.manager.clone();
        conn.set_ex(key, value, ttl_seconds).await
    }
}
