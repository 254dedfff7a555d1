//! Diesel row types and their conversions to persisted records.
//!
//! Decimals live as TEXT columns; chain steps as a JSON column. The record
//! types in the domain stay the single source of field semantics.

use diesel::prelude::*;

use crate::core::domain::{ChainRecord, ChainStepRecord, OrderRecord};
use crate::error::{Error, Result};

use super::schema::{chains, orders};

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = orders)]
pub struct OrderRow {
    pub client_order_id: String,
    pub side: String,
    pub symbol: String,
    pub quantity: String,
    pub price: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub fired_at_ms: Option<i64>,
    pub status: String,
    pub arbitrage_hash8: Option<i64>,
    pub exchange: String,
    pub exchange_order_id: Option<i64>,
    pub transaction_time_ms: Option<i64>,
    pub comment: String,
    pub raw: Option<String>,
}

impl From<&OrderRecord> for OrderRow {
    fn from(record: &OrderRecord) -> Self {
        Self {
            client_order_id: record.client_order_id.clone(),
            side: record.side.clone(),
            symbol: record.symbol.clone(),
            quantity: record.quantity.clone(),
            price: record.price.clone(),
            created_at_ms: record.created_at_ms,
            updated_at_ms: record.updated_at_ms,
            fired_at_ms: record.fired_at_ms,
            status: record.status.clone(),
            arbitrage_hash8: record.arbitrage_hash8.map(i64::from),
            exchange: record.exchange.clone(),
            exchange_order_id: record.exchange_order_id,
            transaction_time_ms: record.transaction_time_ms,
            comment: record.comment.clone(),
            raw: record.raw.as_ref().map(ToString::to_string),
        }
    }
}

impl TryFrom<OrderRow> for OrderRecord {
    type Error = Error;

    fn try_from(row: OrderRow) -> Result<Self> {
        let raw = row
            .raw
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let arbitrage_hash8 = row
            .arbitrage_hash8
            .map(|h| {
                u32::try_from(h)
                    .map_err(|_| Error::Store(format!("hash8 out of range: {}", h)))
            })
            .transpose()?;
        Ok(Self {
            client_order_id: row.client_order_id,
            side: row.side,
            symbol: row.symbol,
            quantity: row.quantity,
            price: row.price,
            created_at_ms: row.created_at_ms,
            updated_at_ms: row.updated_at_ms,
            fired_at_ms: row.fired_at_ms,
            status: row.status,
            arbitrage_hash8,
            exchange: row.exchange,
            exchange_order_id: row.exchange_order_id,
            transaction_time_ms: row.transaction_time_ms,
            comment: row.comment,
            raw,
        })
    }
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = chains)]
pub struct ChainRow {
    pub uid: String,
    pub hash8: i64,
    pub initial_coin: String,
    pub steps: String,
    pub roi: f64,
    pub profit: f64,
    pub profit_usd: f64,
    pub time_ms: i64,
    pub comment: String,
}

impl TryFrom<&ChainRecord> for ChainRow {
    type Error = Error;

    fn try_from(record: &ChainRecord) -> Result<Self> {
        Ok(Self {
            uid: record.uid.clone(),
            hash8: i64::from(record.hash8),
            initial_coin: record.initial_coin.clone(),
            steps: serde_json::to_string(&record.steps)?,
            roi: record.roi,
            profit: record.profit,
            profit_usd: record.profit_usd,
            time_ms: record.time_ms,
            comment: record.comment.clone(),
        })
    }
}

impl TryFrom<ChainRow> for ChainRecord {
    type Error = Error;

    fn try_from(row: ChainRow) -> Result<Self> {
        let steps: Vec<ChainStepRecord> = serde_json::from_str(&row.steps)?;
        let hash8 = u32::try_from(row.hash8)
            .map_err(|_| Error::Store(format!("hash8 out of range: {}", row.hash8)))?;
        Ok(Self {
            uid: row.uid,
            hash8,
            initial_coin: row.initial_coin,
            steps,
            roi: row.roi,
            profit: row.profit,
            profit_usd: row.profit_usd,
            time_ms: row.time_ms,
            comment: row.comment,
        })
    }
}
