//! Locally cached coin balances and exchange rates.
//!
//! # Optimistic decrement contract
//!
//! TradeManager calls [`reduce`](BalancesRegistry::reduce) the moment an
//! order is queued, so chains fired between two balance refreshes cannot
//! spend the same coins twice. The decrements are deliberately approximate:
//! every [`update_balances`](BalancesRegistry::update_balances) wholesale
//! refresh DISCARDS them and replaces the cache with the exchange's view.
//! The refresh is the correction step for any drift the decrements
//! accumulate (unfilled orders, fees, partial fills). Do not "fix" this by
//! merging refreshes with pending reductions.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::warn;

use crate::core::market::is_usd_coin;

#[derive(Default)]
struct Inner {
    balances: HashMap<String, f64>,
    /// Market symbol → latest price, used to express balances in USD.
    rates: HashMap<String, f64>,
}

/// Thread-safe balances cache. All access goes through one mutex; readers
/// receive value snapshots, never references into the maps.
pub struct BalancesRegistry {
    usd_coin: String,
    inner: Mutex<Inner>,
}

impl BalancesRegistry {
    #[must_use]
    pub fn new(usd_coin: impl Into<String>) -> Self {
        Self {
            usd_coin: usd_coin.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Wholesale replace of all balances; discards prior optimistic
    /// reductions (see module docs).
    pub fn update_balances(&self, balances: HashMap<String, f64>) {
        self.inner.lock().balances = balances;
    }

    /// Wholesale replace of all exchange rates.
    pub fn update_rates(&self, rates: HashMap<String, f64>) {
        self.inner.lock().rates = rates;
    }

    /// Optimistically subtract an in-flight spend from a coin's balance.
    ///
    /// A negative result is a tolerated transient (the order may never fill);
    /// it is logged and stored as-is until the next refresh corrects it.
    pub fn reduce(&self, coin: &str, amount: f64) {
        let mut inner = self.inner.lock();
        let balance = inner.balances.entry(coin.to_string()).or_insert(0.0);
        *balance -= amount;
        if *balance < 0.0 {
            warn!(coin, balance = *balance, "Balance went negative after reduction");
        }
    }

    #[must_use]
    pub fn balance(&self, coin: &str) -> Option<f64> {
        self.inner.lock().balances.get(coin).copied()
    }

    /// USD value of a coin's balance. USD stables are taken at face value,
    /// cross rates between them neglected. `None` when the registry is empty,
    /// the coin is unknown, or no rate to the USD coin is cached.
    #[must_use]
    pub fn balance_usd(&self, coin: &str) -> Option<f64> {
        let inner = self.inner.lock();
        if inner.balances.is_empty() {
            return None;
        }
        let balance = inner.balances.get(coin).copied()?;
        if is_usd_coin(coin) {
            return Some(balance);
        }
        let market = format!("{}{}", coin, self.usd_coin);
        match inner.rates.get(&market) {
            Some(rate) => Some(balance * rate),
            None => {
                warn!(coin, market, "No exchange rate for USD valuation");
                None
            }
        }
    }

    /// True until the first `update_balances`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().balances.is_empty()
    }
}
