//! Binance spot REST client.
//!
//! Only the surface the engine consumes is implemented. Signed endpoints use
//! the standard HMAC-SHA256 query signature.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use crate::core::domain::{current_time_ms, Order, TimeInForce};
use crate::core::exchange::api::{ExchangeApi, ExchangeInfo, SymbolInfo};
use crate::core::exchange::limitations::SymbolLimits;
use crate::error::{Error, Result};

use super::convert::{order_from_rest, RestOrder};
use super::EXCHANGE_NAME;

type HmacSha256 = Hmac<Sha256>;

pub struct BinanceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl BinanceClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        })
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn get_public<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).send().await?;
        Self::parse_response(path, response).await
    }

    async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let mut query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!("timestamp={}", current_time_ms()));
        let signature = self.sign(&query);
        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query, signature
        );

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        Self::parse_response(path, response).await
    }

    async fn parse_response<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("{} {}: {}", status, path, body)));
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Open a user-data stream; the key expires unless kept alive.
    pub async fn create_listen_key(&self) -> Result<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ListenKeyResponse {
            listen_key: String,
        }

        let url = format!("{}/api/v3/userDataStream", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let parsed: ListenKeyResponse =
            Self::parse_response("/api/v3/userDataStream", response).await?;
        Ok(parsed.listen_key)
    }

    pub async fn keepalive_listen_key(&self, listen_key: &str) -> Result<()> {
        let url = format!(
            "{}/api/v3/userDataStream?listenKey={}",
            self.base_url, listen_key
        );
        let response = self
            .http
            .put(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let _: serde_json::Value = Self::parse_response("/api/v3/userDataStream", response).await?;
        Ok(())
    }

    async fn place_order(&self, order: &Order, params: &[(&str, String)]) -> Result<Order> {
        debug!(client_order_id = %order.client_order_id, "Placing order");
        let raw: serde_json::Value = self
            .send_signed(Method::POST, "/api/v3/order", params)
            .await?;
        let rest: RestOrder = serde_json::from_value(raw.clone())?;

        // Keep our creation metadata; take the exchange's view of the rest.
        let mut result = order.clone();
        result.status = order_from_rest(&rest, raw.clone())?.status;
        result.exchange = EXCHANGE_NAME.into();
        result.exchange_order_id = Some(rest.order_id);
        result.transaction_time_ms = rest.transact_time;
        result.updated_at_ms = current_time_ms();
        result.raw = Some(raw);
        Ok(result)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolDto {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    status: String,
    #[serde(default)]
    filters: Vec<FilterDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterDto {
    filter_type: String,
    #[serde(default)]
    tick_size: Option<String>,
    #[serde(default)]
    step_size: Option<String>,
    #[serde(default)]
    min_notional: Option<String>,
}

fn limits_from_filters(filters: &[FilterDto]) -> SymbolLimits {
    let mut limits = SymbolLimits::default();
    for filter in filters {
        match filter.filter_type.as_str() {
            "PRICE_FILTER" => {
                limits.min_price_step = parse_step(filter.tick_size.as_deref());
            }
            "LOT_SIZE" => {
                limits.min_volume_step = parse_step(filter.step_size.as_deref());
            }
            // The filter was renamed NOTIONAL at some point; accept both.
            "MIN_NOTIONAL" | "NOTIONAL" => {
                limits.min_notional = parse_step(filter.min_notional.as_deref());
            }
            _ => {}
        }
    }
    limits
}

/// Parse a filter value, dropping the trailing zeros Binance pads with
/// ("0.00100000" → 0.001).
fn parse_step(value: Option<&str>) -> Option<rust_decimal::Decimal> {
    value
        .and_then(|v| v.parse::<rust_decimal::Decimal>().ok())
        .map(|d| d.normalize())
        .filter(|d| !d.is_zero())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    taker_commission: f64,
    balances: Vec<AccountBalance>,
}

#[derive(Debug, Deserialize)]
struct AccountBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeFeeEntry {
    symbol: String,
    taker_commission: String,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    symbol: String,
    price: String,
}

#[async_trait]
impl ExchangeApi for BinanceClient {
    fn name(&self) -> &'static str {
        EXCHANGE_NAME
    }

    async fn exchange_info(&self) -> Result<ExchangeInfo> {
        let response: ExchangeInfoResponse = self.get_public("/api/v3/exchangeInfo").await?;
        let symbols = response
            .symbols
            .into_iter()
            .filter(|s| s.status == "TRADING")
            .map(|s| SymbolInfo {
                limits: limits_from_filters(&s.filters),
                symbol: s.symbol,
                base_asset: s.base_asset,
                quote_asset: s.quote_asset,
            })
            .collect();
        Ok(ExchangeInfo { symbols })
    }

    async fn trade_fees(&self) -> Result<HashMap<String, f64>> {
        let entries: Vec<TradeFeeEntry> = self
            .send_signed(Method::GET, "/sapi/v1/asset/tradeFee", &[])
            .await?;
        Ok(entries
            .into_iter()
            .filter_map(|e| e.taker_commission.parse().ok().map(|fee| (e.symbol, fee)))
            .collect())
    }

    async fn default_trade_fee(&self) -> Result<Option<f64>> {
        let account: AccountResponse = self
            .send_signed(Method::GET, "/api/v3/account", &[])
            .await?;
        // Reported in basis points.
        Ok(Some(account.taker_commission * 0.0001))
    }

    async fn balances(&self) -> Result<HashMap<String, f64>> {
        let account: AccountResponse = self
            .send_signed(Method::GET, "/api/v3/account", &[])
            .await?;
        Ok(account
            .balances
            .into_iter()
            .filter_map(|b| b.free.parse::<f64>().ok().map(|free| (b.asset, free)))
            .filter(|(_, free)| *free > 0.0)
            .collect())
    }

    async fn latest_prices(&self) -> Result<HashMap<String, f64>> {
        let entries: Vec<PriceEntry> = self.get_public("/api/v3/ticker/price").await?;
        Ok(entries
            .into_iter()
            .filter_map(|e| e.price.parse().ok().map(|price| (e.symbol, price)))
            .collect())
    }

    async fn put_limit_order(&self, order: &Order, time_in_force: TimeInForce) -> Result<Order> {
        let params = [
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", time_in_force.as_str().to_string()),
            ("quantity", order.quantity.to_string()),
            ("price", order.price.to_string()),
            ("newClientOrderId", order.client_order_id.clone()),
        ];
        self.place_order(order, &params).await
    }

    async fn put_market_order(&self, order: &Order) -> Result<Order> {
        let params = [
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", order.quantity.to_string()),
            ("newClientOrderId", order.client_order_id.clone()),
        ];
        self.place_order(order, &params).await
    }

    async fn open_orders(&self) -> Result<Vec<Order>> {
        let raw: Vec<serde_json::Value> = self
            .send_signed(Method::GET, "/api/v3/openOrders", &[])
            .await?;
        raw.into_iter()
            .map(|value| {
                let rest: RestOrder = serde_json::from_value(value.clone())?;
                order_from_rest(&rest, value)
            })
            .collect()
    }

    async fn cancel_order(&self, symbol: &str, client_order_id: &str) -> Result<()> {
        let params = [
            ("symbol", symbol.to_string()),
            ("origClientOrderId", client_order_id.to_string()),
        ];
        let _: serde_json::Value = self
            .send_signed(Method::DELETE, "/api/v3/order", &params)
            .await?;
        Ok(())
    }
}
