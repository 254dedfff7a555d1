//! De-duplication of arbitrage sightings.
//!
//! The same book state tends to produce the same chain with the same ROI
//! many times per second; only the first sighting within the window should
//! fire orders.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::core::domain::{current_time_ms, Chain};

/// Opportunistic eviction kicks in above this many distinct keys. Expected
/// cardinality is on the order of thousands.
const EVICTION_THRESHOLD: usize = 16_384;

/// TTL cache keyed by chain markets sequence + ROI.
pub struct RecentArbitragersFilter {
    ttl_ms: i64,
    seen: Mutex<HashMap<String, i64>>,
}

impl RecentArbitragersFilter {
    #[must_use]
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            ttl_ms,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Register the chain's sighting at *now*; returns true iff the previous
    /// sighting of the same key was within the TTL.
    pub fn register_and_contained(&self, chain: &Chain) -> bool {
        let key = Self::key(chain);
        let now = current_time_ms();

        let mut seen = self.seen.lock();
        if seen.len() > EVICTION_THRESHOLD {
            let ttl = self.ttl_ms;
            seen.retain(|_, last_seen| now - *last_seen < ttl);
        }
        let previous = seen.insert(key, now);

        matches!(previous, Some(last_seen) if now - last_seen < self.ttl_ms)
    }

    fn key(chain: &Chain) -> String {
        format!("{}_roi_{}", chain.markets_sequence(), chain.roi)
    }
}
