//! Book-top tickers, the only liquidity information the engine consumes.

use super::current_time_ms;
use super::market::Market;

/// Best bid/ask with sizes for one market at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub market: Market,
    pub best_bid: f64,
    pub best_bid_qty: f64,
    pub best_ask: f64,
    pub best_ask_qty: f64,
    pub observed_at_ms: i64,
}

impl Ticker {
    pub fn new(
        market: Market,
        best_bid: f64,
        best_bid_qty: f64,
        best_ask: f64,
        best_ask_qty: f64,
    ) -> Self {
        Self {
            market,
            best_bid,
            best_bid_qty,
            best_ask,
            best_ask_qty,
            observed_at_ms: current_time_ms(),
        }
    }
}
