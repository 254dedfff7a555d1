//! Persisted forms of chains and orders.
//!
//! Everything that crosses the persistence boundary goes through these types:
//! sides and statuses as their names, prices and quantities as exact decimal
//! strings (binary floats never leak into serialized payloads).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::chain::{Chain, ChainStep};
use super::market::Market;
use super::order::{Order, OrderSide, OrderStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStepRecord {
    pub market: String,
    pub side: String,
    pub price: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRecord {
    pub uid: String,
    pub hash8: u32,
    pub initial_coin: String,
    pub steps: Vec<ChainStepRecord>,
    pub roi: f64,
    pub profit: f64,
    pub profit_usd: f64,
    pub time_ms: i64,
    pub comment: String,
}

impl From<&Chain> for ChainRecord {
    fn from(chain: &Chain) -> Self {
        Self {
            uid: chain.uid(),
            hash8: chain.hash8(),
            initial_coin: chain.initial_coin.clone(),
            steps: chain
                .steps
                .iter()
                .map(|s| ChainStepRecord {
                    market: s.market.to_string(),
                    side: s.side.as_str().to_string(),
                    price: s.price,
                    volume: s.volume,
                })
                .collect(),
            roi: chain.roi,
            profit: chain.profit,
            profit_usd: chain.profit_usd,
            time_ms: chain.time_ms,
            comment: chain.comment.clone(),
        }
    }
}

impl TryFrom<ChainRecord> for Chain {
    type Error = Error;

    fn try_from(record: ChainRecord) -> Result<Self> {
        let steps: Vec<ChainStep> = record
            .steps
            .iter()
            .map(|s| {
                let market = Market::parse(&s.market)
                    .ok_or_else(|| Error::Store(format!("bad market in record: {}", s.market)))?;
                let side = OrderSide::from_name(&s.side)
                    .ok_or_else(|| Error::Store(format!("bad side in record: {}", s.side)))?;
                Ok(ChainStep::new(market, side, s.price, s.volume))
            })
            .collect::<Result<_>>()?;

        let steps: [ChainStep; 3] = steps
            .try_into()
            .map_err(|_| Error::Store("chain record must have exactly three steps".into()))?;

        Ok(Chain {
            initial_coin: record.initial_coin,
            steps,
            roi: record.roi,
            profit: record.profit,
            profit_usd: record.profit_usd,
            time_ms: record.time_ms,
            comment: record.comment,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub client_order_id: String,
    pub side: String,
    pub symbol: String,
    pub quantity: String,
    pub price: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub fired_at_ms: Option<i64>,
    pub status: String,
    pub arbitrage_hash8: Option<u32>,
    pub exchange: String,
    pub exchange_order_id: Option<i64>,
    pub transaction_time_ms: Option<i64>,
    pub comment: String,
    pub raw: Option<serde_json::Value>,
}

impl From<&Order> for OrderRecord {
    fn from(order: &Order) -> Self {
        Self {
            client_order_id: order.client_order_id.clone(),
            side: order.side.as_str().to_string(),
            symbol: order.symbol.clone(),
            quantity: order.quantity.to_string(),
            price: order.price.to_string(),
            created_at_ms: order.created_at_ms,
            updated_at_ms: order.updated_at_ms,
            fired_at_ms: order.fired_at_ms,
            status: order.status.as_str().to_string(),
            arbitrage_hash8: order.arbitrage_hash8,
            exchange: order.exchange.clone(),
            exchange_order_id: order.exchange_order_id,
            transaction_time_ms: order.transaction_time_ms,
            comment: order.comment.clone(),
            raw: order.raw.clone(),
        }
    }
}

impl TryFrom<OrderRecord> for Order {
    type Error = Error;

    fn try_from(record: OrderRecord) -> Result<Self> {
        let side = OrderSide::from_name(&record.side)
            .ok_or_else(|| Error::Store(format!("bad side in record: {}", record.side)))?;
        let status = OrderStatus::from_name(&record.status)
            .ok_or_else(|| Error::Store(format!("bad status in record: {}", record.status)))?;
        let quantity: Decimal = record
            .quantity
            .parse()
            .map_err(|_| Error::Store(format!("bad quantity in record: {}", record.quantity)))?;
        let price: Decimal = record
            .price
            .parse()
            .map_err(|_| Error::Store(format!("bad price in record: {}", record.price)))?;

        Ok(Order {
            client_order_id: record.client_order_id,
            side,
            symbol: record.symbol,
            quantity,
            price,
            created_at_ms: record.created_at_ms,
            updated_at_ms: record.updated_at_ms,
            fired_at_ms: record.fired_at_ms,
            status,
            arbitrage_hash8: record.arbitrage_hash8,
            exchange: record.exchange,
            exchange_order_id: record.exchange_order_id,
            transaction_time_ms: record.transaction_time_ms,
            comment: record.comment,
            raw: record.raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_chain() -> Chain {
        let mut chain = Chain::new(
            "USDT",
            [
                ChainStep::new(
                    Market::new("BTC", "USDT"),
                    OrderSide::Buy,
                    50_000.0,
                    0.01,
                ),
                ChainStep::new(Market::new("ETH", "BTC"), OrderSide::Buy, 0.05, 5.0),
                ChainStep::new(Market::new("ETH", "USDT"), OrderSide::Sell, 2_500.0, 5.0),
            ],
            0.002,
            1.0,
            1.0,
        );
        chain.comment = "Orders created successfully".into();
        chain
    }

    #[test]
    fn chain_roundtrips_through_record() {
        let chain = sample_chain();
        let record = ChainRecord::from(&chain);
        assert_eq!(record.uid, chain.uid());
        assert_eq!(record.hash8, chain.hash8());

        let restored = Chain::try_from(record).unwrap();
        assert_eq!(restored, chain);
    }

    #[test]
    fn chain_record_rejects_wrong_step_count() {
        let chain = sample_chain();
        let mut record = ChainRecord::from(&chain);
        record.steps.pop();
        assert!(Chain::try_from(record).is_err());
    }

    #[test]
    fn order_roundtrips_through_record() {
        let mut order = Order::new(
            "12345678_order_1",
            OrderSide::Sell,
            "ETHUSDT",
            dec!(5.000),
            dec!(2500.01),
        );
        order.arbitrage_hash8 = Some(12_345_678);
        order.exchange = "binance".into();
        order.fired_at_ms = Some(order.created_at_ms + 3);
        order.status = OrderStatus::Filled;
        order.comment = "filled on first try".into();
        order.raw = Some(serde_json::json!({"orderId": 42}));

        let record = OrderRecord::from(&order);
        // Exact decimal serialization, no float formatting.
        assert_eq!(record.quantity, "5.000");
        assert_eq!(record.price, "2500.01");
        assert_eq!(record.side, "SELL");

        let restored = Order::try_from(record).unwrap();
        assert_eq!(restored, order);
    }

    #[test]
    fn order_record_rejects_unknown_side() {
        let order = Order::new("1_order_1", OrderSide::Buy, "BTCUSDT", dec!(1), dec!(1));
        let mut record = OrderRecord::from(&order);
        record.side = "SHORT".into();
        assert!(Order::try_from(record).is_err());
    }
}
