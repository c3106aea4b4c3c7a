// =============================================================================
// Domain enums — side, regime, order status, environment
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position/signal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// The side that closes a position opened on `self`.
    pub fn exit_side(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Exchange order side for *opening* a position on this side.
    pub fn entry_order_side(self) -> &'static str {
        match self {
            Side::Long => "BUY",
            Side::Short => "SELL",
        }
    }

    /// Exchange order side for closing/reducing a position opened on this side.
    pub fn exit_order_side(self) -> &'static str {
        self.exit_side().entry_order_side()
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Which sides a bot is willing to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideWhitelist {
    Long,
    Short,
    Both,
}

impl SideWhitelist {
    pub fn permits(self, side: Side) -> bool {
        matches!(
            (self, side),
            (SideWhitelist::Both, _) | (SideWhitelist::Long, Side::Long) | (SideWhitelist::Short, Side::Short)
        )
    }
}

/// Candle color derived from open/close comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Green,
    Red,
}

/// Regime classification from the MA20/MA200 rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Long,
    Short,
    Neutral,
}

/// Exchange environment a bot/credential operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Testnet,
    Prod,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Testnet => write!(f, "testnet"),
            Environment::Prod => write!(f, "prod"),
        }
    }
}

/// Bot lifecycle status, distinct from `enabled` (a paused bot can be re-enabled
/// without losing its id; an ended bot is terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Active,
    Paused,
    Ended,
}

/// Finite-state order lifecycle, per spec §4.5's transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Armed,
    Pending,
    Filled,
    Closed,
    Cancelled,
    Failed,
    SkippedLowBalance,
    SkippedWhitelist,
}

impl OrderStatus {
    /// States that require a non-null `order_id` (invariant 1, spec §8).
    pub fn requires_order_id(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Filled | OrderStatus::Armed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Closed
                | OrderStatus::Cancelled
                | OrderStatus::Failed
                | OrderStatus::SkippedLowBalance
                | OrderStatus::SkippedWhitelist
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Armed => "armed",
            OrderStatus::Pending => "pending",
            OrderStatus::Filled => "filled",
            OrderStatus::Closed => "closed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
            OrderStatus::SkippedLowBalance => "skipped_low_balance",
            OrderStatus::SkippedWhitelist => "skipped_whitelist",
        };
        write!(f, "{s}")
    }
}

/// Error taxonomy mapped from the exchange layer (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeErrorKind {
    BadRequest,
    Auth,
    RateLimit,
    ExchangeDown,
    OrderNotFound,
    InsufficientBalance,
    Network,
}

impl ExchangeErrorKind {
    /// Whether this kind of failure should be retried with backoff.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ExchangeErrorKind::RateLimit | ExchangeErrorKind::ExchangeDown | ExchangeErrorKind::Network
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_whitelist_permits() {
        assert!(SideWhitelist::Both.permits(Side::Long));
        assert!(SideWhitelist::Both.permits(Side::Short));
        assert!(SideWhitelist::Long.permits(Side::Long));
        assert!(!SideWhitelist::Long.permits(Side::Short));
        assert!(!SideWhitelist::Short.permits(Side::Long));
    }

    #[test]
    fn exit_side_inverts() {
        assert_eq!(Side::Long.exit_side(), Side::Short);
        assert_eq!(Side::Short.exit_side(), Side::Long);
        assert_eq!(Side::Long.entry_order_side(), "BUY");
        assert_eq!(Side::Long.exit_order_side(), "SELL");
    }

    #[test]
    fn order_status_requires_id() {
        assert!(OrderStatus::Pending.requires_order_id());
        assert!(OrderStatus::Armed.requires_order_id());
        assert!(OrderStatus::Filled.requires_order_id());
        assert!(!OrderStatus::Cancelled.requires_order_id());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Closed.is_terminal());
        assert!(!OrderStatus::Closed.requires_order_id());
        assert!(!OrderStatus::Pending.is_terminal());
    }

    #[test]
    fn retryable_kinds() {
        assert!(ExchangeErrorKind::RateLimit.is_retryable());
        assert!(ExchangeErrorKind::ExchangeDown.is_retryable());
        assert!(!ExchangeErrorKind::BadRequest.is_retryable());
        assert!(!ExchangeErrorKind::InsufficientBalance.is_retryable());
    }
}
