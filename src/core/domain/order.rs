//! Limit orders and their client-id encoding.
//!
//! The client order id carries the originating chain's hash8 as
//! `<hash8>_order_<leg>`. Exchange events only echo the client id back, so
//! this encoding is the one link between an execution report and the
//! arbitrage that produced it.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::current_time_ms;

/// Separator inside a client order id, between hash8 and leg index.
pub const CLIENT_ORDER_ID_SEPARATOR: &str = "_order_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    #[serde(rename = "GTC")]
    Gtc,
    #[serde(rename = "IOC")]
    Ioc,
    #[serde(rename = "FOK")]
    Fok,
    /// Good till crossing, post-only.
    #[serde(rename = "GTX")]
    Gtx,
}

impl TimeInForce {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
            Self::Fok => "FOK",
            Self::Gtx => "GTX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
    /// Submission failed on our side; never reached the exchange book.
    Error,
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Canceled => "CANCELED",
            Self::PendingCancel => "PENDING_CANCEL",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::Error => "ERROR",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "NEW" => Some(Self::New),
            "PARTIALLY_FILLED" => Some(Self::PartiallyFilled),
            "FILLED" => Some(Self::Filled),
            "CANCELED" => Some(Self::Canceled),
            "PENDING_CANCEL" => Some(Self::PendingCancel),
            "REJECTED" => Some(Self::Rejected),
            "EXPIRED" => Some(Self::Expired),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A limit order as it travels from TradeManager through the executor pool
/// and back from exchange events. Identity is the client order id.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub client_order_id: String,
    pub side: OrderSide,
    /// Exchange wire symbol, no separator.
    pub symbol: String,
    /// Base-coin quantity.
    pub quantity: Decimal,
    pub price: Decimal,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    /// Stamped right before submission.
    pub fired_at_ms: Option<i64>,
    pub status: OrderStatus,
    pub arbitrage_hash8: Option<u32>,
    pub exchange: String,
    pub exchange_order_id: Option<i64>,
    pub transaction_time_ms: Option<i64>,
    pub comment: String,
    /// Last raw exchange payload observed for this order.
    pub raw: Option<serde_json::Value>,
}

impl Order {
    pub fn new(
        client_order_id: impl Into<String>,
        side: OrderSide,
        symbol: impl Into<String>,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        let now = current_time_ms();
        Self {
            client_order_id: client_order_id.into(),
            side,
            symbol: symbol.into(),
            quantity,
            price,
            created_at_ms: now,
            updated_at_ms: now,
            fired_at_ms: None,
            status: OrderStatus::New,
            arbitrage_hash8: None,
            exchange: String::new(),
            exchange_order_id: None,
            transaction_time_ms: None,
            comment: String::new(),
            raw: None,
        }
    }

    #[must_use]
    pub fn is_buy(&self) -> bool {
        self.side == OrderSide::Buy
    }

    /// Volume of the coin this order debits: quote for a BUY, base for a SELL.
    #[must_use]
    pub fn proposed_volume(&self) -> Decimal {
        if self.is_buy() {
            self.quantity * self.price
        } else {
            self.quantity
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} {} {} @ {}]",
            self.client_order_id, self.side, self.quantity, self.symbol, self.price
        )
    }
}

/// Build a client order id for one leg of a chain. Legs are 1-based.
#[must_use]
pub fn format_client_order_id(hash8: u32, leg: usize) -> String {
    format!("{}{}{}", hash8, CLIENT_ORDER_ID_SEPARATOR, leg)
}

/// Recover the chain hash8 from a client order id, `None` for foreign ids.
#[must_use]
pub fn parse_arbitrage_hash8(client_order_id: &str) -> Option<u32> {
    let (prefix, _) = client_order_id.split_once(CLIENT_ORDER_ID_SEPARATOR)?;
    prefix.parse().ok()
}

/// Whether a client order id has the exact `<hash8>_order_<leg>` shape we
/// stamp on arbitrage legs. Used to tell our open orders from anything placed
/// manually on the same account.
#[must_use]
pub fn is_arbitrage_client_id(client_order_id: &str) -> bool {
    let Some((prefix, suffix)) = client_order_id.split_once(CLIENT_ORDER_ID_SEPARATOR) else {
        return false;
    };
    if prefix.is_empty() || prefix.parse::<u32>().map_or(true, |h| h >= 100_000_000) {
        return false;
    }
    matches!(suffix.parse::<usize>(), Ok(leg) if (1..=3).contains(&leg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn proposed_volume_by_side() {
        let buy = Order::new("1_order_1", OrderSide::Buy, "BTCUSDT", dec!(2), dec!(30000));
        assert_eq!(buy.proposed_volume(), dec!(60000));

        let sell = Order::new("1_order_2", OrderSide::Sell, "BTCUSDT", dec!(2), dec!(30000));
        assert_eq!(sell.proposed_volume(), dec!(2));
    }

    #[test]
    fn client_order_id_roundtrip() {
        let id = format_client_order_id(12345678, 2);
        assert_eq!(id, "12345678_order_2");
        assert_eq!(parse_arbitrage_hash8(&id), Some(12345678));
        assert!(is_arbitrage_client_id(&id));
    }

    #[test]
    fn foreign_client_ids_rejected() {
        assert_eq!(parse_arbitrage_hash8("web_abc123"), None);
        assert!(!is_arbitrage_client_id("web_abc123"));
        assert!(!is_arbitrage_client_id("12345678_order_4"));
        assert!(!is_arbitrage_client_id("12345678_order_"));
        assert!(!is_arbitrage_client_id("999999999_order_1"));
        assert!(!is_arbitrage_client_id("_order_1"));
    }

    #[test]
    fn side_and_status_names_roundtrip() {
        for side in [OrderSide::Buy, OrderSide::Sell] {
            assert_eq!(OrderSide::from_name(side.as_str()), Some(side));
        }
        for status in [
            OrderStatus::New,
            OrderStatus::PartiallyFilled,
            OrderStatus::Filled,
            OrderStatus::Canceled,
            OrderStatus::PendingCancel,
            OrderStatus::Rejected,
            OrderStatus::Expired,
            OrderStatus::Error,
        ] {
            assert_eq!(OrderStatus::from_name(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::from_name("HALTED"), None);
    }
}
