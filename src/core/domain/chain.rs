//! Arbitrage chains: three conversion steps forming a closed cycle.

use std::fmt;
use std::hash::Hasher;

use fnv::FnvHasher;

use super::current_time_ms;
use super::market::Market;
use super::order::OrderSide;

/// One leg of a chain.
///
/// `price` is always quoted in the market's own quote currency; `volume` is
/// the base-coin amount the leg trades. What the leg actually debits and
/// credits depends on the side, see [`spending_coin`](Self::spending_coin).
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStep {
    pub market: Market,
    pub side: OrderSide,
    pub price: f64,
    pub volume: f64,
}

impl ChainStep {
    pub fn new(market: Market, side: OrderSide, price: f64, volume: f64) -> Self {
        Self {
            market,
            side,
            price,
            volume,
        }
    }

    #[must_use]
    pub fn is_buy(&self) -> bool {
        self.side == OrderSide::Buy
    }

    /// Coin this step debits from the portfolio.
    ///
    /// Buying `BTC/USDT` spends USDT; selling it spends BTC.
    #[must_use]
    pub fn spending_coin(&self) -> &str {
        if self.is_buy() {
            self.market.quote()
        } else {
            self.market.base()
        }
    }

    /// Coin this step credits to the portfolio.
    #[must_use]
    pub fn received_coin(&self) -> &str {
        if self.is_buy() {
            self.market.base()
        } else {
            self.market.quote()
        }
    }

    /// Volume of the spending coin this step consumes.
    #[must_use]
    pub fn proposed_volume(&self) -> f64 {
        if self.is_buy() {
            self.volume * self.price
        } else {
            self.volume
        }
    }

    /// Volume of the received coin this step acquires.
    #[must_use]
    pub fn received_volume(&self) -> f64 {
        if self.is_buy() {
            self.volume
        } else {
            self.volume * self.price
        }
    }
}

impl fmt::Display for ChainStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} {} @ {}]",
            self.side, self.volume, self.market, self.price
        )
    }
}

/// A full three-leg cycle with its evaluation results.
///
/// Invariant: each step's received coin is the next step's spending coin, and
/// the last step returns to `initial_coin`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub initial_coin: String,
    pub steps: [ChainStep; 3],
    pub roi: f64,
    /// Profit in units of the initial coin.
    pub profit: f64,
    pub profit_usd: f64,
    pub time_ms: i64,
    /// Filled in by TradeManager with the processing outcome.
    pub comment: String,
}

impl Chain {
    pub fn new(
        initial_coin: impl Into<String>,
        steps: [ChainStep; 3],
        roi: f64,
        profit: f64,
        profit_usd: f64,
    ) -> Self {
        Self {
            initial_coin: initial_coin.into(),
            steps,
            roi,
            profit,
            profit_usd,
            time_ms: current_time_ms(),
            comment: String::new(),
        }
    }

    /// The markets sequence, e.g. `[BTC/USDT -> ETH/BTC -> ETH/USDT]`.
    /// This string is the chain's stable identity.
    #[must_use]
    pub fn markets_sequence(&self) -> String {
        let markets: Vec<String> = self.steps.iter().map(|s| s.market.to_string()).collect();
        format!("[{}]", markets.join(" -> "))
    }

    /// Stable 8-decimal-digit identity derived from the markets sequence.
    ///
    /// FNV-1a so the value survives restarts: it is embedded in client order
    /// ids and observed externally.
    #[must_use]
    pub fn hash8(&self) -> u32 {
        let mut hasher = FnvHasher::default();
        hasher.write(self.markets_sequence().as_bytes());
        (hasher.finish() % 100_000_000) as u32
    }

    /// Identity of this particular observation of the cycle.
    #[must_use]
    pub fn uid(&self) -> String {
        let symbols: Vec<String> = self.steps.iter().map(|s| s.market.symbol()).collect();
        format!("{}_{}", symbols.join("-"), self.time_ms)
    }

    #[must_use]
    pub fn is_same_cycle(&self, other: &Chain) -> bool {
        self.steps
            .iter()
            .zip(other.steps.iter())
            .all(|(a, b)| a.market == b.market)
    }

    #[must_use]
    pub fn to_user_readable(&self) -> String {
        format!(
            "{}, roi = {:.4}%, profit = {:.7} {} (${:.7})",
            self.markets_sequence(),
            self.roi * 100.0,
            self.profit,
            self.initial_coin,
            self.profit_usd
        )
    }
}
