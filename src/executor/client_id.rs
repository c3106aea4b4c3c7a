// =============================================================================
// Client-id discipline — bot prefix + exit-leg client ids (spec §4.4)
// =============================================================================
//
// Ported from order_executor.py's `_bot_client_prefix`/`_bot_exit_client_id`:
// the prefix lets the Monitor sweep orphaned exits by prefix match alone,
// even when the OrderState row that placed them is gone (crash before
// insert, or a row some other process deleted).
// =============================================================================

use rand::Rng;
use uuid::Uuid;

const MAX_CLIENT_ID_LEN: usize = 36;

/// `b` + first 20 hex chars of the bot id with dashes stripped.
pub fn bot_client_prefix(bot_id: Uuid) -> String {
    let hex = bot_id.simple().to_string();
    format!("b{}", &hex[..20])
}

/// `{prefix}-{label}-{6 hex chars}`, truncated to 36 chars (exchange limit).
pub fn exit_client_id(prefix: &str, label: &str) -> String {
    let nonce: String = {
        let mut rng = rand::thread_rng();
        (0..6).map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap()).collect()
    };
    let id = format!("{prefix}-{label}-{nonce}");
    if id.len() > MAX_CLIENT_ID_LEN {
        id[..MAX_CLIENT_ID_LEN].to_string()
    } else {
        id
    }
}

/// Whether `client_id` was tagged by this bot (prefix match), used by the
/// Monitor's orphan sweep (spec §4.5 step 5, §8 invariant 6).
pub fn is_tagged(client_id: &str, prefix: &str) -> bool {
    client_id.starts_with(prefix)
}
