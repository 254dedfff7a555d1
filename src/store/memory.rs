//! In-memory store backends for tests and dry runs.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::core::domain::{current_time_ms, Chain, ChainRecord, Order, OrderRecord};
use crate::error::Result;

use super::{OrderStore, TelemetrySink};

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<HashMap<String, OrderRecord>>,
}

impl MemoryOrderStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn all(&self) -> Vec<OrderRecord> {
        self.orders.lock().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OrderStore for MemoryOrderStore {
    fn upsert(&self, order: &Order) -> Result<()> {
        let mut record = OrderRecord::from(order);
        let mut orders = self.orders.lock();
        if let Some(previous) = orders.get(&record.client_order_id) {
            record.created_at_ms = previous.created_at_ms;
            record.updated_at_ms = current_time_ms();
            if record.arbitrage_hash8.is_none() {
                record.arbitrage_hash8 = previous.arbitrage_hash8;
            }
            if record.fired_at_ms.is_none() {
                record.fired_at_ms = previous.fired_at_ms;
            }
        }
        orders.insert(record.client_order_id.clone(), record);
        Ok(())
    }

    fn get(&self, client_order_id: &str) -> Result<Option<OrderRecord>> {
        Ok(self.orders.lock().get(client_order_id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryTelemetrySink {
    chains: Mutex<Vec<ChainRecord>>,
    batches: Mutex<Vec<Vec<ChainRecord>>>,
}

impl MemoryTelemetrySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn chains(&self) -> Vec<ChainRecord> {
        self.chains.lock().clone()
    }

    #[must_use]
    pub fn batches(&self) -> Vec<Vec<ChainRecord>> {
        self.batches.lock().clone()
    }
}

impl TelemetrySink for MemoryTelemetrySink {
    fn record_chain(&self, chain: &Chain) -> Result<()> {
        self.chains.lock().push(ChainRecord::from(chain));
        Ok(())
    }

    fn record_batch(&self, chains: &[Chain]) -> Result<()> {
        self.batches
            .lock()
            .push(chains.iter().map(ChainRecord::from).collect());
        Ok(())
    }
}
