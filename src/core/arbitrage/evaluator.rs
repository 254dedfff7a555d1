//! Triangle evaluation against the live book-top snapshot.

use std::collections::HashMap;

use tracing::trace;

use crate::core::domain::{Chain, ChainStep, Market, OrderSide, Ticker};
use crate::core::market::{is_usd_coin, MarketData};

use super::sizing;

/// Evaluates every cycle touching a set of updated markets.
///
/// Pure with respect to [`MarketData`]: evaluation only reads tickers and the
/// cycle index. Designed for single-threaded invocation from the arbitrage
/// loop, once per ticker.
pub struct TriangleEvaluator {
    /// Taker fee per wire symbol.
    fees: HashMap<String, f64>,
    /// Applied to markets missing from the fee table.
    default_fee: f64,
}

impl TriangleEvaluator {
    #[must_use]
    pub fn new(fees: HashMap<String, f64>, default_fee: f64) -> Self {
        Self { fees, default_fee }
    }

    /// Evaluate all cycles touching `updated`. Cycles with any missing ticker
    /// are skipped entirely.
    #[must_use]
    pub fn find(&self, data: &MarketData, updated: &[Market]) -> Vec<Chain> {
        self.find_with(data, updated, |_| {})
    }

    /// Like [`find`](Self::find), invoking `on_positive` for every chain with
    /// positive profit as soon as it is evaluated.
    pub fn find_with(
        &self,
        data: &MarketData,
        updated: &[Market],
        mut on_positive: impl FnMut(&Chain),
    ) -> Vec<Chain> {
        let mut chains = Vec::new();

        for (cycle, markets) in data.filter_cycles_by_markets(updated) {
            let (Some(t0), Some(t1), Some(t2)) = (
                data.ticker(&markets[0]),
                data.ticker(&markets[1]),
                data.ticker(&markets[2]),
            ) else {
                trace!(%cycle, "Skipping cycle with missing ticker");
                continue;
            };

            let mut steps = [
                self.step_towards(cycle.coin_after(0), &t0),
                self.step_towards(cycle.coin_after(1), &t1),
                self.step_towards(cycle.coin_after(2), &t2),
            ];

            let roi = 1.0
                - steps
                    .iter()
                    .map(|s| if s.is_buy() { s.price } else { 1.0 / s.price })
                    .product::<f64>();

            let initial_volume = sizing::resolve_max_volume(&mut steps);
            let profit = initial_volume * roi;

            let initial_coin = cycle.initial_coin();
            let profit_usd = if is_usd_coin(initial_coin) {
                profit
            } else {
                // -1 marks "USD value unknown"; such chains never pass the
                // profit threshold gate downstream.
                data.usd_price(initial_coin)
                    .map_or(-1.0, |price| profit * price)
            };

            let chain = Chain::new(initial_coin, steps, roi, profit, profit_usd);
            if profit > 0.0 {
                on_positive(&chain);
            }
            chains.push(chain);
        }

        chains
    }

    /// Build the step that converts the ticker's market towards `target`.
    ///
    /// Acquiring the base coin is a BUY against the ask; acquiring the quote
    /// coin is a SELL against the bid. Prices carry the trade fee.
    fn step_towards(&self, target: &str, ticker: &Ticker) -> ChainStep {
        let market = &ticker.market;
        let fee = self.fee_for(market);
        if market.base() == target {
            let price = ticker.best_ask * (1.0 + fee);
            ChainStep::new(market.clone(), OrderSide::Buy, price, ticker.best_ask_qty)
        } else {
            let price = ticker.best_bid * (1.0 - fee);
            ChainStep::new(
                market.clone(),
                OrderSide::Sell,
                price,
                ticker.best_bid_qty * price,
            )
        }
    }

    fn fee_for(&self, market: &Market) -> f64 {
        self.fees
            .get(&market.symbol())
            .copied()
            .unwrap_or(self.default_fee)
    }
}
