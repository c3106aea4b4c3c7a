// =============================================================================
// ExchangeError — typed error taxonomy mapped from exchange responses (spec §7)
// =============================================================================

use std::fmt;

use crate::domain::ExchangeErrorKind;

#[derive(Debug)]
pub struct ExchangeError {
    pub kind: ExchangeErrorKind,
    pub message: String,
}

impl ExchangeError {
    pub fn new(kind: ExchangeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classifies a Binance futures error response by HTTP status and the
    /// exchange's own numeric `code` field where present.
    pub fn classify(status: reqwest::StatusCode, body: &serde_json::Value) -> Self {
        let code = body.get("code").and_then(|v| v.as_i64());
        let msg = body
            .get("msg")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown exchange error")
            .to_string();

        // Binance futures error codes: -1021 timestamp, -2014/-2015 bad api key,
        // -2011 unknown order, -1003 too many requests/rate limit.
        let kind = match code {
            Some(-2011) => ExchangeErrorKind::OrderNotFound,
            Some(-2014) | Some(-2015) => ExchangeErrorKind::Auth,
            Some(-1003) => ExchangeErrorKind::RateLimit,
            Some(-2019) | Some(-2018) => ExchangeErrorKind::InsufficientBalance,
            _ if status == reqwest::StatusCode::TOO_MANY_REQUESTS => ExchangeErrorKind::RateLimit,
            _ if status.is_server_error() => ExchangeErrorKind::ExchangeDown,
            _ if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN => {
                ExchangeErrorKind::Auth
            }
            _ if msg.to_lowercase().contains("unknown order") => ExchangeErrorKind::OrderNotFound,
            _ => ExchangeErrorKind::BadRequest,
        };

        Self::new(kind, format!("{status}: {msg}"))
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ExchangeErrorKind::Network, message)
    }

    pub fn is_order_not_found(&self) -> bool {
        self.kind == ExchangeErrorKind::OrderNotFound
    }
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ExchangeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_rate_limit_by_code() {
        let body = json!({"code": -1003, "msg": "Too many requests"});
        let e = ExchangeError::classify(reqwest::StatusCode::BAD_REQUEST, &body);
        assert_eq!(e.kind, ExchangeErrorKind::RateLimit);
        assert!(e.kind.is_retryable());
    }

    #[test]
    fn classifies_order_not_found() {
        let body = json!({"code": -2011, "msg": "Unknown order sent."});
        let e = ExchangeError::classify(reqwest::StatusCode::BAD_REQUEST, &body);
        assert!(e.is_order_not_found());
        assert!(!e.kind.is_retryable());
    }

    #[test]
    fn classifies_server_error_as_exchange_down() {
        let body = json!({"msg": "internal error"});
        let e = ExchangeError::classify(reqwest::StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert_eq!(e.kind, ExchangeErrorKind::ExchangeDown);
    }
}
