// =============================================================================
// BotConfig — persistent, user-owned trading bot configuration
// =============================================================================
//
// Owned by an external admin path; read-only to the core (spec §3). Only one
// canonical side field is kept: `side_whitelist`. The source's `side_mode`
// overlapped it semantically and is dropped (see DESIGN.md open question 1).
// =============================================================================

use rust_decimal::Decimal;
use uuid::Uuid;

use super::enums::{BotStatus, Environment, SideWhitelist};

#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cred_id: Uuid,
    pub symbol: String,
    pub timeframe: String,
    pub enabled: bool,
    pub status: BotStatus,
    pub env: Environment,
    pub side_whitelist: SideWhitelist,
    pub leverage: u32,
    pub use_balance_pct: bool,
    pub balance_pct: Decimal,
    pub fixed_notional: Decimal,
    pub max_position_usdt: Decimal,
    pub tp_r_multiple: Decimal,
}

impl BotConfig {
    pub fn is_eligible(&self) -> bool {
        self.enabled && self.status == BotStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bot() -> BotConfig {
        BotConfig {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            cred_id: Uuid::new_v4(),
            symbol: "BTCUSDT".into(),
            timeframe: "2m".into(),
            enabled: true,
            status: BotStatus::Active,
            env: Environment::Testnet,
            side_whitelist: SideWhitelist::Both,
            leverage: 5,
            use_balance_pct: true,
            balance_pct: dec!(0.05),
            fixed_notional: dec!(0),
            max_position_usdt: dec!(0),
            tp_r_multiple: dec!(1.5),
        }
    }

    #[test]
    fn eligible_requires_enabled_and_active() {
        let mut b = bot();
        assert!(b.is_eligible());
        b.enabled = false;
        assert!(!b.is_eligible());
        b.enabled = true;
        b.status = BotStatus::Paused;
        assert!(!b.is_eligible());
    }
}
