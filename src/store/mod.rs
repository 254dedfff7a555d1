//! Durable stores for orders and arbitrage telemetry.
//!
//! The engine only talks to the two traits here; the bundled backends are
//! sqlite (production) and in-memory (tests, dry runs).

mod memory;
pub mod sqlite;

pub use memory::{MemoryOrderStore, MemoryTelemetrySink};
pub use sqlite::SqliteStore;

use crate::core::domain::{Chain, Order, OrderRecord};
use crate::error::Result;

/// Keyed by client order id. `upsert` preserves the original creation time
/// and backfills the arbitrage hash8 when a later event omits it.
pub trait OrderStore: Send + Sync {
    fn upsert(&self, order: &Order) -> Result<()>;

    fn get(&self, client_order_id: &str) -> Result<Option<OrderRecord>>;
}

/// Sink for evaluated chains: profitable ones individually, the full
/// evaluation firehose in batches.
pub trait TelemetrySink: Send + Sync {
    fn record_chain(&self, chain: &Chain) -> Result<()>;

    fn record_batch(&self, chains: &[Chain]) -> Result<()>;
}
