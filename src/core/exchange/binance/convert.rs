//! Conversions between Binance wire payloads and domain types.

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::core::domain::{
    current_time_ms, parse_arbitrage_hash8, Market, Order, OrderSide, OrderStatus, Ticker,
    CLIENT_ORDER_ID_SEPARATOR,
};
use crate::error::{Error, Result};

/// `<symbol>@bookTicker` stream payload.
#[derive(Debug, Clone, Deserialize)]
pub struct BookTickerEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub best_bid: String,
    #[serde(rename = "B")]
    pub best_bid_qty: String,
    #[serde(rename = "a")]
    pub best_ask: String,
    #[serde(rename = "A")]
    pub best_ask_qty: String,
}

/// Combined-stream envelope: `{"stream": "...", "data": {...}}`.
#[derive(Debug, Deserialize)]
pub struct StreamEnvelope<T> {
    pub stream: String,
    pub data: T,
}

pub fn ticker_from_event(event: &BookTickerEvent, market: Market) -> Result<Ticker> {
    Ok(Ticker::new(
        market,
        parse_f64(&event.best_bid, "best bid")?,
        parse_f64(&event.best_bid_qty, "best bid qty")?,
        parse_f64(&event.best_ask, "best ask")?,
        parse_f64(&event.best_ask_qty, "best ask qty")?,
    ))
}

/// User-data `executionReport` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionReportEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    /// Set on cancellations, echoing the id the order was created with.
    #[serde(rename = "C", default)]
    pub orig_client_order_id: Option<String>,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "X")]
    pub status: String,
    #[serde(rename = "i")]
    pub order_id: i64,
    #[serde(rename = "T")]
    pub transaction_time: i64,
}

impl ExecutionReportEvent {
    /// The id we stamped at creation. Cancellations report it in `C` while
    /// `c` carries the cancel request's own id.
    fn created_client_order_id(&self) -> &str {
        if self.client_order_id.contains(CLIENT_ORDER_ID_SEPARATOR) {
            &self.client_order_id
        } else {
            self.orig_client_order_id
                .as_deref()
                .unwrap_or(&self.client_order_id)
        }
    }
}

pub fn order_from_execution_report(
    event: &ExecutionReportEvent,
    raw: serde_json::Value,
) -> Result<Order> {
    let client_order_id = event.created_client_order_id().to_string();
    let mut order = Order::new(
        client_order_id,
        parse_side(&event.side)?,
        event.symbol.clone(),
        parse_decimal(&event.quantity, "quantity")?,
        parse_decimal(&event.price, "price")?,
    );
    order.status = parse_status(&event.status);
    order.arbitrage_hash8 = parse_arbitrage_hash8(&order.client_order_id);
    order.exchange = super::EXCHANGE_NAME.into();
    order.exchange_order_id = Some(event.order_id);
    order.transaction_time_ms = Some(event.transaction_time);
    order.raw = Some(raw);
    Ok(order)
}

/// REST order payload, shared by order placement responses and `openOrders`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestOrder {
    pub symbol: String,
    pub order_id: i64,
    pub client_order_id: String,
    pub price: String,
    pub orig_qty: String,
    pub side: String,
    pub status: String,
    #[serde(default)]
    pub transact_time: Option<i64>,
    /// Creation time, present on `openOrders` items.
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub update_time: Option<i64>,
}

pub fn order_from_rest(rest: &RestOrder, raw: serde_json::Value) -> Result<Order> {
    let mut order = Order::new(
        rest.client_order_id.clone(),
        parse_side(&rest.side)?,
        rest.symbol.clone(),
        parse_decimal(&rest.orig_qty, "origQty")?,
        parse_decimal(&rest.price, "price")?,
    );
    order.status = parse_status(&rest.status);
    order.arbitrage_hash8 = parse_arbitrage_hash8(&order.client_order_id);
    order.exchange = super::EXCHANGE_NAME.into();
    order.exchange_order_id = Some(rest.order_id);
    order.transaction_time_ms = rest.transact_time;
    if let Some(created) = rest.time {
        order.created_at_ms = created;
    }
    order.updated_at_ms = rest.update_time.unwrap_or_else(current_time_ms);
    order.raw = Some(raw);
    Ok(order)
}

fn parse_side(name: &str) -> Result<OrderSide> {
    OrderSide::from_name(name)
        .ok_or_else(|| Error::Exchange(format!("unknown order side '{}'", name)))
}

fn parse_status(name: &str) -> OrderStatus {
    OrderStatus::from_name(name).unwrap_or_else(|| {
        warn!(status = name, "Unknown exchange order status, treating as NEW");
        OrderStatus::New
    })
}

fn parse_f64(value: &str, what: &str) -> Result<f64> {
    value
        .parse()
        .map_err(|_| Error::Exchange(format!("bad {} '{}'", what, value)))
}

fn parse_decimal(value: &str, what: &str) -> Result<Decimal> {
    value
        .parse()
        .map_err(|_| Error::Exchange(format!("bad {} '{}'", what, value)))
}
