// =============================================================================
// Heartbeat — periodic liveness key so operators/alerting can detect a wedged
// worker process without relying on process-exit monitoring alone
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::streambus::StreamBus;

const HEARTBEAT_INTERVAL_SECONDS: u64 = 10;
const HEARTBEAT_TTL_SECONDS: u64 = 30;

/// Writes `health:{service}` every `HEARTBEAT_INTERVAL_SECONDS`, expiring in
/// `HEARTBEAT_TTL_SECONDS`. A monitor that reads a missing/expired key knows
/// the service has stopped ticking, not merely that it went quiet.
pub async fn run(bus: Arc<StreamBus>, service: &str) {
    let key = format!("health:{service}");
    let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECONDS));
    loop {
        interval.tick().await;
        let now = chrono::Utc::now().timestamp_millis().to_string();
        if let Err(e) = bus.set_ex(&key, &now, HEARTBEAT_TTL_SECONDS).await {
            warn!(service, error = %e, "heartbeat write failed");
        } else {
            info!(service, "heartbeat");
        }
    }
}
