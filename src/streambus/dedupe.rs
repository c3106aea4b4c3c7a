// =============================================================================
// Dedup gate — SETNX+EXPIRE, ≥7-day TTL (ported from redis_io.py's dedupe_once)
// =============================================================================

use redis::AsyncCommands;
use tracing::debug;

use super::keys;
use super::bus::StreamBus;

/// 7 days, matching the retention window the original dedupe gate relied on
/// to survive weekend restarts without ever colliding with a stale key.
const DEDUPE_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Attempts to claim `token` for processing. Returns `true` if this call is
/// the first to claim it (caller should proceed), `false` if another
/// processor already claimed it (caller should skip — idempotency).
pub async fn dedupe_once(bus: &StreamBus, token: &str) -> redis::RedisResult<bool> {
    let mut conn = bus.raw();
    let key = keys::dedupe_key(token);
    let claimed: bool = redis::cmd("SET")
        .arg(&key)
        .arg(1)
        .arg("NX")
        .arg("EX")
        .arg(DEDUPE_TTL_SECONDS)
        .query_async(&mut conn)
        .await
        .map(|v: Option<String>| v.is_some())?;

    if !claimed {
        debug!(token, "dedupe gate rejected duplicate processing");
    }
    Ok(claimed)
}

/// Releases a claimed token early, used when a processing attempt fails in a
/// way that should allow a retry rather than being treated as delivered.
pub async fn release(bus: &StreamBus, token: &str) -> redis::RedisResult<()> {
    let mut conn = bus.raw();
    let key = keys::dedupe_key(token);
    let _: () = conn.del(&key).await?;
    Ok(())
}
