// =============================================================================
// BinanceFuturesClient — HMAC-SHA256 signed requests against USDⓈ-M futures
// =============================================================================
//
// SECURITY: the secret key is never logged or serialised. All signed requests
// carry X-MBX-APIKEY as a header and a recvWindow of 5 000 ms to tolerate
// minor clock drift between the worker and the exchange.
// =============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use crate::domain::Candle;
use super::errors::ExchangeError;

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW: u64 = 5000;

/// Order acknowledgement returned by `new_order`.
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: i64,
    pub client_order_id: String,
    pub status: String,
}

/// A snapshot of an order's exchange-side state.
#[derive(Debug, Clone)]
pub struct OrderInfo {
    pub order_id: i64,
    pub client_order_id: String,
    pub symbol: String,
    pub status: String,
    pub executed_qty: Decimal,
    pub avg_price: Decimal,
}

impl OrderInfo {
    pub fn is_filled_or_partial(&self) -> bool {
        matches!(self.status.as_str(), "FILLED" | "PARTIALLY_FILLED")
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status.as_str(), "NEW" | "PARTIALLY_FILLED" | "PENDING_NEW")
    }
}

/// New-order parameters shared by entry, stop, and take-profit legs.
pub struct NewOrderParams<'a> {
    pub symbol: &'a str,
    pub side: &'a str,
    pub order_type: &'a str,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub reduce_only: bool,
    pub time_in_force: Option<&'a str>,
    pub client_order_id: &'a str,
}

/// Subset of exchange operations the Executor/Monitor/Ingestor need (spec §6
/// "Exchange API"). A trait so tests can substitute an in-memory fake, and so
/// `DRY_RUN_MODE` can swap in a logging no-op without touching call sites.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_exchange_info(&self) -> Result<serde_json::Value, ExchangeError>;
    async fn get_available_balance(&self, asset: &str) -> Result<Decimal, ExchangeError>;
    async fn get_used_margin(&self, asset: &str) -> Result<Decimal, ExchangeError>;
    async fn change_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError>;
    async fn new_order(&self, params: NewOrderParams<'_>) -> Result<OrderAck, ExchangeError>;
    async fn get_order(&self, symbol: &str, order_id: i64) -> Result<OrderInfo, ExchangeError>;
    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<(), ExchangeError>;
    async fn list_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderInfo>, ExchangeError>;
    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;
    async fn get_open_position_qty(&self, symbol: &str) -> Result<Decimal, ExchangeError>;
    async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>, ExchangeError>;
}

/// Live client for Binance USDⓈ-M futures (`fapi.binance.com`).
pub struct BinanceFuturesClient {
    api_key: String,
    secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl BinanceFuturesClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let secret = secret.into();

        let mut default_headers = HeaderMap::new();
        if let Ok(val) = HeaderValue::from_str(&api_key) {
            default_headers.insert("X-MBX-APIKEY", val);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        debug!("BinanceFuturesClient initialised (base_url=https://fapi.binance.com)");

        Self {
            api_key,
            secret,
            base_url: "https://fapi.binance.com".to_string(),
            client,
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow={RECV_WINDOW}")
        } else {
            format!("{params}&timestamp={ts}&recvWindow={RECV_WINDOW}")
        };
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    async fn get_signed(&self, path: &str, params: &str) -> Result<serde_json::Value, ExchangeError> {
        let qs = self.signed_query(params);
        let url = format!("{}{}?{}", self.base_url, path, qs);
        let resp = self.client.get(&url).send().await.map_err(|e| ExchangeError::network(e.to_string()))?;
        Self::parse_response(resp).await
    }

    async fn post_signed(&self, path: &str, params: &str) -> Result<serde_json::Value, ExchangeError> {
        let qs = self.signed_query(params);
        let url = format!("{}{}?{}", self.base_url, path, qs);
        let resp = self.client.post(&url).send().await.map_err(|e| ExchangeError::network(e.to_string()))?;
        Self::parse_response(resp).await
    }

    async fn delete_signed(&self, path: &str, params: &str) -> Result<serde_json::Value, ExchangeError> {
        let qs = self.signed_query(params);
        let url = format!("{}{}?{}", self.base_url, path, qs);
        let resp = self.client.delete(&url).send().await.map_err(|e| ExchangeError::network(e.to_string()))?;
        Self::parse_response(resp).await
    }

    async fn parse_response(resp: reqwest::Response) -> Result<serde_json::Value, ExchangeError> {
        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ExchangeError::network(format!("failed to parse response body: {e}")))?;
        if !status.is_success() {
            return Err(ExchangeError::classify(status, &body));
        }
        Ok(body)
    }

    fn order_info_from_json(v: &serde_json::Value) -> Result<OrderInfo, ExchangeError> {
        let order_id = v.get("orderId").and_then(|x| x.as_i64()).ok_or_else(|| {
            ExchangeError::new(crate::domain::ExchangeErrorKind::BadRequest, "order response missing orderId")
        })?;
        let symbol = v.get("symbol").and_then(|x| x.as_str()).unwrap_or("").to_string();
        let status = v.get("status").and_then(|x| x.as_str()).unwrap_or("").to_string();
        let client_order_id = v
            .get("clientOrderId")
            .and_then(|x| x.as_str())
            .unwrap_or("")
            .to_string();
        let executed_qty = parse_decimal_field(v, "executedQty").unwrap_or(Decimal::ZERO);
        let avg_price = parse_decimal_field(v, "avgPrice").unwrap_or(Decimal::ZERO);
        Ok(OrderInfo {
            order_id,
            client_order_id,
            symbol,
            status,
            executed_qty,
            avg_price,
        })
    }
}

fn parse_decimal_field(v: &serde_json::Value, key: &str) -> Option<Decimal> {
    let raw = v.get(key)?;
    if let Some(s) = raw.as_str() {
        s.parse::<Decimal>().ok()
    } else if let Some(n) = raw.as_f64() {
        Decimal::try_from(n).ok()
    } else {
        None
    }
}

#[async_trait]
impl ExchangeClient for BinanceFuturesClient {
    #[instrument(skip(self), name = "exchange::get_exchange_info")]
    async fn get_exchange_info(&self) -> Result<serde_json::Value, ExchangeError> {
        let url = format!("{}/fapi/v1/exchangeInfo", self.base_url);
        let resp = self.client.get(&url).send().await.map_err(|e| ExchangeError::network(e.to_string()))?;
        Self::parse_response(resp).await
    }

    #[instrument(skip(self), name = "exchange::get_available_balance")]
    async fn get_available_balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        let body = self.get_signed("/fapi/v2/balance", "").await?;
        let arr = body.as_array().ok_or_else(|| {
            ExchangeError::new(crate::domain::ExchangeErrorKind::BadRequest, "balance response not an array")
        })?;
        for entry in arr {
            if entry.get("asset").and_then(|v| v.as_str()) == Some(asset) {
                let avail = parse_decimal_field(entry, "availableBalance").unwrap_or(Decimal::ZERO);
                debug!(asset, %avail, "available balance fetched");
                return Ok(avail);
            }
        }
        warn!(asset, "asset not found in futures balance — returning 0");
        Ok(Decimal::ZERO)
    }

    #[instrument(skip(self), name = "exchange::get_used_margin")]
    async fn get_used_margin(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        let body = self.get_signed("/fapi/v2/account", "").await?;
        let assets = body.get("assets").and_then(|v| v.as_array()).ok_or_else(|| {
            ExchangeError::new(crate::domain::ExchangeErrorKind::BadRequest, "account response missing 'assets'")
        })?;
        for entry in assets {
            if entry.get("asset").and_then(|v| v.as_str()) == Some(asset) {
                return Ok(parse_decimal_field(entry, "initialMargin").unwrap_or(Decimal::ZERO));
            }
        }
        Ok(Decimal::ZERO)
    }

    #[instrument(skip(self), name = "exchange::change_leverage")]
    async fn change_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        let params = format!("symbol={symbol}&leverage={leverage}");
        self.post_signed("/fapi/v1/leverage", &params).await?;
        Ok(())
    }

    #[instrument(skip(self, params), name = "exchange::new_order")]
    async fn new_order(&self, params: NewOrderParams<'_>) -> Result<OrderAck, ExchangeError> {
        let mut qs = format!(
            "symbol={}&side={}&type={}&quantity={}",
            params.symbol, params.side, params.order_type, params.quantity
        );
        if let Some(p) = params.price {
            qs.push_str(&format!("&price={p}"));
        }
        if let Some(sp) = params.stop_price {
            qs.push_str(&format!("&stopPrice={sp}"));
        }
        if params.reduce_only {
            qs.push_str("&reduceOnly=true");
        }
        if let Some(tif) = params.time_in_force {
            qs.push_str(&format!("&timeInForce={tif}"));
        }
        qs.push_str(&format!("&newClientOrderId={}", params.client_order_id));

        let body = self.post_signed("/fapi/v1/order", &qs).await?;
        let order_id = body.get("orderId").and_then(|v| v.as_i64()).ok_or_else(|| {
            ExchangeError::new(crate::domain::ExchangeErrorKind::BadRequest, "order response missing orderId")
        })?;
        let status = body.get("status").and_then(|v| v.as_str()).unwrap_or("NEW").to_string();

        debug!(symbol = params.symbol, order_id, "order placed");
        Ok(OrderAck {
            order_id,
            client_order_id: params.client_order_id.to_string(),
            status,
        })
    }

    #[instrument(skip(self), name = "exchange::get_order")]
    async fn get_order(&self, symbol: &str, order_id: i64) -> Result<OrderInfo, ExchangeError> {
        let params = format!("symbol={symbol}&orderId={order_id}");
        let body = self.get_signed("/fapi/v1/order", &params).await?;
        Self::order_info_from_json(&body)
    }

    #[instrument(skip(self), name = "exchange::cancel_order")]
    async fn cancel_order(&self, symbol: &str, order_id: i64) -> Result<(), ExchangeError> {
        let params = format!("symbol={symbol}&orderId={order_id}");
        match self.delete_signed("/fapi/v1/order", &params).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_order_not_found() => {
                // Idempotent per spec §7: cancelling a vanished order is a success.
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), name = "exchange::list_open_orders")]
    async fn list_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderInfo>, ExchangeError> {
        let params = match symbol {
            Some(s) => format!("symbol={s}"),
            None => String::new(),
        };
        let body = self.get_signed("/fapi/v1/openOrders", &params).await?;
        let arr = body.as_array().ok_or_else(|| {
            ExchangeError::new(crate::domain::ExchangeErrorKind::BadRequest, "openOrders response not an array")
        })?;
        arr.iter().map(Self::order_info_from_json).collect()
    }

    #[instrument(skip(self), name = "exchange::get_mark_price")]
    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let url = format!("{}/fapi/v1/premiumIndex?symbol={}", self.base_url, symbol);
        let resp = self.client.get(&url).send().await.map_err(|e| ExchangeError::network(e.to_string()))?;
        let body = Self::parse_response(resp).await?;
        Ok(parse_decimal_field(&body, "markPrice").unwrap_or(Decimal::ZERO))
    }

    #[instrument(skip(self), name = "exchange::get_open_position_qty")]
    async fn get_open_position_qty(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let params = format!("symbol={symbol}");
        let body = self.get_signed("/fapi/v2/positionRisk", &params).await?;
        let arr = body.as_array().ok_or_else(|| {
            ExchangeError::new(crate::domain::ExchangeErrorKind::BadRequest, "positionRisk response not an array")
        })?;
        for entry in arr {
            if entry.get("symbol").and_then(|v| v.as_str()) == Some(symbol) {
                return Ok(parse_decimal_field(entry, "positionAmt").unwrap_or(Decimal::ZERO));
            }
        }
        Ok(Decimal::ZERO)
    }

    #[instrument(skip(self), name = "exchange::get_klines")]
    async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>, ExchangeError> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );
        let resp = self.client.get(&url).send().await.map_err(|e| ExchangeError::network(e.to_string()))?;
        let body = Self::parse_response(resp).await?;
        let raw = body.as_array().ok_or_else(|| {
            ExchangeError::new(crate::domain::ExchangeErrorKind::BadRequest, "klines response not an array")
        })?;

        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            let arr = entry.as_array().ok_or_else(|| {
                ExchangeError::new(crate::domain::ExchangeErrorKind::BadRequest, "kline entry not an array")
            })?;
            if arr.len() < 9 {
                warn!("skipping malformed kline entry with {} elements", arr.len());
                continue;
            }
            let close_time = arr[6].as_i64().unwrap_or(0);
            let open = parse_decimal_array(&arr[1])?;
            let high = parse_decimal_array(&arr[2])?;
            let low = parse_decimal_array(&arr[3])?;
            let close = parse_decimal_array(&arr[4])?;
            let volume = parse_decimal_array(&arr[5])?;
            let trades = arr[8].as_i64().unwrap_or(0);
            candles.push(Candle::new(close_time, symbol, interval, open, high, low, close, volume, trades));
        }
        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

fn parse_decimal_array(v: &serde_json::Value) -> Result<Decimal, ExchangeError> {
    if let Some(s) = v.as_str() {
        s.parse::<Decimal>()
            .map_err(|e| ExchangeError::new(crate::domain::ExchangeErrorKind::BadRequest, format!("bad decimal '{s}': {e}")))
    } else if let Some(n) = v.as_f64() {
        Decimal::try_from(n).map_err(|e| ExchangeError::new(crate::domain::ExchangeErrorKind::BadRequest, e.to_string()))
    } else {
        Err(ExchangeError::new(crate::domain::ExchangeErrorKind::BadRequest, "expected string or number"))
    }
}

impl std::fmt::Debug for BinanceFuturesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceFuturesClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}
