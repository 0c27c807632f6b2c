//! REST client for the Bybit v5 API.
//!
//! Covers: klines, wallet balance, positions, order creation.
//! Private endpoints are rate-limited and HMAC-signed.

use common::{Error, OrderAck, Position, RawCandle, Side, SizedOrder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::error::Error as StdError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::BybitAuth;
use crate::rate_limit::RateLimiter;

const TESTNET_BASE_URL: &str = "https://api-testnet.bybit.com";
const MAINNET_BASE_URL: &str = "https://api.bybit.com";

/// retCode Bybit uses for "too many visits".
const RET_CODE_RATE_LIMIT: i64 = 10006;

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn resolve_rest_base_url(use_testnet: bool) -> String {
    if let Ok(override_url) = std::env::var("BYBIT_API_BASE_URL") {
        let normalized = normalize_base_url(&override_url);
        if !normalized.is_empty() {
            info!("Using BYBIT_API_BASE_URL override: {}", normalized);
            return normalized;
        }
        warn!("Ignoring empty BYBIT_API_BASE_URL override");
    }

    if use_testnet {
        TESTNET_BASE_URL.to_string()
    } else {
        MAINNET_BASE_URL.to_string()
    }
}

fn format_reqwest_error(err: &reqwest::Error) -> String {
    // Keep chained causes so network failures (DNS/TLS/socket) are visible.
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

fn summarize_response_body(raw: &str) -> String {
    const MAX_CHARS: usize = 800;
    let compact = raw.replace(['\n', '\r'], " ");
    if compact.chars().count() > MAX_CHARS {
        let truncated: String = compact.chars().take(MAX_CHARS).collect();
        format!("{}…", truncated)
    } else {
        compact
    }
}

// ── Wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse<T> {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletAccount {
    #[serde(default)]
    coin: Vec<WalletCoin>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletCoin {
    coin: String,
    #[serde(default)]
    wallet_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRow {
    symbol: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    size: String,
    #[serde(default)]
    avg_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResult {
    order_id: String,
    #[serde(default)]
    order_link_id: String,
}

// ── Parsing helpers ───────────────────────────────────────────────────

/// Bybit sends decimals as strings; empty means zero.
fn parse_decimal(raw: &str, field: &str) -> Result<f64, Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| Error::MalformedData(format!("{field}: not a number: {trimmed:?}")))
}

/// Convert kline rows (newest first) into ascending candles.
///
/// Row layout: `[startTime, open, high, low, close, volume, turnover]`.
fn parse_klines(rows: Vec<Vec<String>>) -> Result<Vec<RawCandle>, Error> {
    let mut candles = Vec::with_capacity(rows.len());

    for row in rows.iter().rev() {
        if row.len() < 5 {
            return Err(Error::MalformedData(format!(
                "kline row has {} fields, expected at least 5",
                row.len()
            )));
        }
        let open_time = row[0]
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::MalformedData(format!("kline start time {:?}", row[0])))?;
        candles.push(RawCandle::new(
            open_time,
            parse_decimal(&row[1], "open")?,
            parse_decimal(&row[2], "high")?,
            parse_decimal(&row[3], "low")?,
            parse_decimal(&row[4], "close")?,
        ));
    }

    if candles.windows(2).any(|w| w[1].open_time <= w[0].open_time) {
        return Err(Error::MalformedData(
            "kline feed is not strictly time-ordered".into(),
        ));
    }

    Ok(candles)
}

fn parse_positions(rows: Vec<PositionRow>) -> Result<Vec<Position>, Error> {
    rows.into_iter()
        .map(|row| {
            Ok(Position {
                side: Side::from_wire(&row.side),
                size: parse_decimal(&row.size, "size")?,
                avg_price: parse_decimal(&row.avg_price, "avgPrice")?,
                symbol: row.symbol,
            })
        })
        .collect()
}

fn parse_wallet_balance(accounts: Vec<WalletAccount>, coin: &str) -> Result<f64, Error> {
    let entry = accounts
        .into_iter()
        .flat_map(|a| a.coin)
        .find(|c| c.coin.eq_ignore_ascii_case(coin))
        .ok_or_else(|| Error::MalformedData(format!("no {coin} balance in wallet response")))?;

    parse_decimal(&entry.wallet_balance, "walletBalance")
}

/// Number of decimals implied by a lot size (1 -> 0, 0.1 -> 1, 0.001 -> 3).
fn lot_decimals(lot_size: f64) -> usize {
    let text = format!("{}", lot_size);
    text.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
}

fn format_quantity(quantity: f64, lot_size: f64) -> String {
    format!("{:.*}", lot_decimals(lot_size), quantity)
}

/// Plain decimal without float noise (`0.32899999999999996` -> `0.329`).
fn format_price(price: f64) -> String {
    let text = format!("{:.8}", price);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

// ── Client ────────────────────────────────────────────────────────────

/// Async REST client for the Bybit v5 API.
#[derive(Debug, Clone)]
pub struct BybitRestClient {
    client: reqwest::Client,
    auth: Option<BybitAuth>,
    base_url: String,
    category: String,
    limiter: RateLimiter,
}

impl BybitRestClient {
    /// Create a new REST client.
    ///
    /// `auth` may be `None` when only public market data is needed.
    pub fn new(auth: Option<BybitAuth>, use_testnet: bool, category: &str) -> Result<Self, Error> {
        let base_url = resolve_rest_base_url(use_testnet);

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Ok(Self {
            client,
            auth,
            base_url,
            category: category.to_string(),
            limiter: RateLimiter::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_credentials(&self) -> bool {
        self.auth.is_some()
    }

    fn auth(&self) -> Result<&BybitAuth, Error> {
        self.auth
            .as_ref()
            .ok_or_else(|| Error::Auth("API credentials not configured".into()))
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response, what: &str) -> Result<T, Error> {
        let status_code = resp.status().as_u16();
        if status_code == 429 {
            warn!("Rate limited on {}", what);
            return Err(Error::RateLimited {
                retry_after_ms: 1000,
            });
        }

        let raw_body = resp.text().await.unwrap_or_default();
        if status_code != 200 {
            return Err(Error::ExchangeApi {
                status: status_code,
                code: -1,
                message: summarize_response_body(&raw_body),
            });
        }

        // Error envelopes often carry `"result":{}`, so check retCode before
        // decoding the typed result.
        let envelope: ApiResponse<serde_json::Value> = serde_json::from_str(&raw_body).map_err(|e| {
            Error::Http(format!(
                "Error decoding {} response: {}; body={}",
                what,
                e,
                summarize_response_body(&raw_body)
            ))
        })?;

        if envelope.ret_code == RET_CODE_RATE_LIMIT {
            warn!("Rate limited on {}: {}", what, envelope.ret_msg);
            return Err(Error::RateLimited {
                retry_after_ms: 1000,
            });
        }
        if envelope.ret_code != 0 {
            return Err(Error::ExchangeApi {
                status: status_code,
                code: envelope.ret_code,
                message: envelope.ret_msg,
            });
        }

        let result = envelope
            .result
            .ok_or_else(|| Error::MalformedData(format!("{} response has no result", what)))?;
        serde_json::from_value(result)
            .map_err(|e| Error::MalformedData(format!("{} result: {}", what, e)))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<T, Error> {
        self.limiter.wait_read().await;

        let query = encode_query(params);
        let url = format!("{}{}?{}", self.base_url, path, query);

        let mut req = self.client.get(&url);
        if signed {
            req = req.headers(self.auth()?.headers(&query)?);
        }

        debug!("GET {}", url);
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Self::decode(resp, path).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T, Error> {
        self.limiter.wait_write().await;

        let payload = serde_json::to_string(body)?;
        let headers = self.auth()?.headers(&payload)?;

        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .headers(headers)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Self::decode(resp, path).await
    }

    // ── Read endpoints ────────────────────────────────────────────────

    /// Fetch the most recent `limit` klines, oldest first.
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<RawCandle>, Error> {
        let result: ListResult<Vec<String>> = self
            .get(
                "/v5/market/kline",
                &[
                    ("category", self.category.clone()),
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
                false,
            )
            .await?;

        let candles = parse_klines(result.list)?;
        debug!("Fetched {} klines for {}", candles.len(), symbol);
        Ok(candles)
    }

    /// Wallet balance of `coin` on the unified account.
    pub async fn get_wallet_balance(&self, coin: &str) -> Result<f64, Error> {
        let result: ListResult<WalletAccount> = self
            .get(
                "/v5/account/wallet-balance",
                &[
                    ("accountType", "UNIFIED".to_string()),
                    ("coin", coin.to_string()),
                ],
                true,
            )
            .await?;

        parse_wallet_balance(result.list, coin)
    }

    /// All position slots for `symbol`.
    pub async fn get_positions(&self, symbol: &str) -> Result<Vec<Position>, Error> {
        let result: ListResult<PositionRow> = self
            .get(
                "/v5/position/list",
                &[
                    ("category", self.category.clone()),
                    ("symbol", symbol.to_string()),
                ],
                true,
            )
            .await?;

        let positions = parse_positions(result.list)?;
        debug!("Fetched {} position slots for {}", positions.len(), symbol);
        Ok(positions)
    }

    // ── Write endpoints ───────────────────────────────────────────────

    /// Place a market order with attached stop-loss and take-profit.
    pub async fn create_order(
        &self,
        symbol: &str,
        order: &SizedOrder,
        lot_size: f64,
    ) -> Result<OrderAck, Error> {
        let order_link_id = Uuid::new_v4().to_string();
        let body = json!({
            "category": self.category,
            "symbol": symbol,
            "side": order.side.as_str(),
            "orderType": "Market",
            "qty": format_quantity(order.quantity, lot_size),
            "stopLoss": format_price(order.stop_loss),
            "takeProfit": format_price(order.take_profit),
            "orderLinkId": order_link_id,
        });

        debug!("Creating order: {}", body);

        let result: OrderResult = self.post("/v5/order/create", &body).await?;

        debug!(
            "Order accepted: id={} link={}",
            result.order_id, result.order_link_id
        );

        Ok(OrderAck {
            order_id: result.order_id,
            order_link_id: result.order_link_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_klines_reverses_to_ascending() {
        let rows = vec![
            row(&["1700000120000", "0.341", "0.345", "0.339", "0.344", "1000", "340"]),
            row(&["1700000060000", "0.338", "0.342", "0.337", "0.341", "900", "305"]),
            row(&["1700000000000", "0.336", "0.339", "0.335", "0.338", "800", "270"]),
        ];
        let candles = parse_klines(rows).unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].open_time, 1_700_000_000_000);
        assert_eq!(candles[2].open_time, 1_700_000_120_000);
        assert_eq!(candles[2].close, 0.344);
        assert_eq!(candles[0].low, 0.335);
    }

    #[test]
    fn test_parse_klines_rejects_bad_rows() {
        assert!(matches!(
            parse_klines(vec![row(&["1700000000000", "0.3", "0.4"])]),
            Err(Error::MalformedData(_))
        ));
        assert!(matches!(
            parse_klines(vec![row(&["1700000000000", "x", "0.4", "0.2", "0.3"])]),
            Err(Error::MalformedData(_))
        ));
        // Feed not newest-first.
        assert!(matches!(
            parse_klines(vec![
                row(&["1700000000000", "1", "1", "1", "1"]),
                row(&["1700000060000", "1", "1", "1", "1"]),
            ]),
            Err(Error::MalformedData(_))
        ));
    }

    #[test]
    fn test_parse_positions() {
        let body = r#"{"list":[
            {"symbol":"ADAUSDT","side":"Buy","size":"46","avgPrice":"0.3412"},
            {"symbol":"ADAUSDT","side":"","size":"0","avgPrice":""}
        ]}"#;
        let result: ListResult<PositionRow> = serde_json::from_str(body).unwrap();
        let positions = parse_positions(result.list).unwrap();

        assert_eq!(positions[0].side, Some(Side::Buy));
        assert_eq!(positions[0].size, 46.0);
        assert_eq!(positions[0].avg_price, 0.3412);
        assert_eq!(positions[1].side, None);
        assert_eq!(positions[1].size, 0.0);
    }

    #[test]
    fn test_parse_wallet_balance() {
        let body = r#"{"list":[{"totalEquity":"12.3","coin":[
            {"coin":"BTC","walletBalance":"0.01"},
            {"coin":"USDT","walletBalance":"5.25"}
        ]}]}"#;
        let result: ListResult<WalletAccount> = serde_json::from_str(body).unwrap();
        assert_eq!(parse_wallet_balance(result.list, "USDT").unwrap(), 5.25);

        let empty: ListResult<WalletAccount> = serde_json::from_str(r#"{"list":[]}"#).unwrap();
        assert!(parse_wallet_balance(empty.list, "USDT").is_err());
    }

    #[test]
    fn test_envelope_decoding() {
        let ok: ApiResponse<OrderResult> = serde_json::from_str(
            r#"{"retCode":0,"retMsg":"OK","result":{"orderId":"abc","orderLinkId":"def"},"time":1}"#,
        )
        .unwrap();
        assert_eq!(ok.ret_code, 0);
        assert_eq!(ok.result.unwrap().order_id, "abc");

        let err: ApiResponse<OrderResult> =
            serde_json::from_str(r#"{"retCode":10001,"retMsg":"params error","result":null}"#)
                .unwrap();
        assert_eq!(err.ret_code, 10001);
        assert!(err.result.is_none());
    }

    #[test]
    fn test_quantity_and_price_formatting() {
        assert_eq!(format_quantity(7.0, 1.0), "7");
        assert_eq!(format_quantity(6.6000000000000005, 0.1), "6.6");
        assert_eq!(format_quantity(0.123, 0.001), "0.123");
        assert_eq!(format_price(0.32899999999999996), "0.329");
        assert_eq!(format_price(110.5), "110.5");
        assert_eq!(format_price(42.0), "42");
    }

    #[test]
    fn test_encode_query_keeps_order() {
        let q = encode_query(&[("category", "linear".into()), ("symbol", "ADAUSDT".into())]);
        assert_eq!(q, "category=linear&symbol=ADAUSDT");
    }

    #[test]
    fn test_summarize_truncates() {
        let long = "x".repeat(2000);
        assert_eq!(summarize_response_body(&long).chars().count(), 801);
        assert_eq!(summarize_response_body("a\nb"), "a b");
    }

    #[test]
    fn test_private_call_without_auth_fails_fast() {
        let client = BybitRestClient::new(None, true, "linear").unwrap();
        assert!(!client.has_credentials());
        assert!(matches!(client.auth(), Err(Error::Auth(_))));
    }
}
