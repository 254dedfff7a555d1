//! Pre-computed triangular cycle index.
//!
//! Built once from the coin→markets adjacency; evaluation then restricts to
//! the cycles touching a just-updated market in O(cycles touching it).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::core::domain::Market;

/// An oriented coin cycle `A → B → C → A`. Orientation and starting coin both
/// matter: each of the six traversals of one coin triangle is its own cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoinCycle {
    coins: [String; 3],
}

impl CoinCycle {
    pub fn new(a: impl Into<String>, b: impl Into<String>, c: impl Into<String>) -> Self {
        Self {
            coins: [a.into(), b.into(), c.into()],
        }
    }

    #[must_use]
    pub fn coins(&self) -> &[String; 3] {
        &self.coins
    }

    /// Coin held before step `i` executes.
    #[must_use]
    pub fn coin_at(&self, i: usize) -> &str {
        &self.coins[i % 3]
    }

    /// Coin held after step `i` executes.
    #[must_use]
    pub fn coin_after(&self, i: usize) -> &str {
        &self.coins[(i + 1) % 3]
    }

    #[must_use]
    pub fn initial_coin(&self) -> &str {
        &self.coins[0]
    }
}

impl fmt::Display for CoinCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} -> {} -> {}",
            self.coins[0], self.coins[1], self.coins[2], self.coins[0]
        )
    }
}

/// The realized market triple of a coin cycle, in whatever orientation each
/// pair actually trades on the exchange.
pub type MarketCycle = [Market; 3];

/// All triangular cycles over a market set, with a reverse index by market.
#[derive(Debug, Default)]
pub struct TrianglePaths {
    paths3: HashMap<CoinCycle, MarketCycle>,
    market_to_cycles: HashMap<Market, HashSet<CoinCycle>>,
}

impl TrianglePaths {
    /// Enumerate every `A → B → C → A` over the adjacency: pick `A → B` from
    /// `market_paths[A]`, then `B → C`, then close back to `A`, rejecting
    /// coin repeats except the closing step and degenerate edges.
    #[must_use]
    pub fn build(market_paths: &HashMap<String, BTreeSet<Market>>) -> Self {
        let mut paths3 = HashMap::new();
        let mut market_to_cycles: HashMap<Market, HashSet<CoinCycle>> = HashMap::new();

        for (coin_a, a_markets) in market_paths {
            for m1 in a_markets {
                let Some(coin_b) = m1.other_coin(coin_a) else {
                    continue;
                };
                if coin_b == coin_a {
                    continue;
                }
                let Some(b_markets) = market_paths.get(coin_b) else {
                    continue;
                };
                for m2 in b_markets {
                    if m2 == m1 {
                        continue;
                    }
                    let Some(coin_c) = m2.other_coin(coin_b) else {
                        continue;
                    };
                    if coin_c == coin_a || coin_c == coin_b {
                        continue;
                    }
                    // Closing edge C -> A, whichever orientation exists.
                    let Some(m3) = market_paths
                        .get(coin_c)
                        .and_then(|ms| ms.iter().find(|m| m.touches(coin_a)))
                    else {
                        continue;
                    };

                    let cycle = CoinCycle::new(coin_a, coin_b, coin_c);
                    let markets = [m1.clone(), m2.clone(), m3.clone()];
                    for market in &markets {
                        market_to_cycles
                            .entry(market.clone())
                            .or_default()
                            .insert(cycle.clone());
                    }
                    paths3.insert(cycle, markets);
                }
            }
        }

        Self {
            paths3,
            market_to_cycles,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths3.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths3.is_empty()
    }

    #[must_use]
    pub fn market_cycle(&self, cycle: &CoinCycle) -> Option<&MarketCycle> {
        self.paths3.get(cycle)
    }

    #[must_use]
    pub fn cycles_for_market(&self, market: &Market) -> Option<&HashSet<CoinCycle>> {
        self.market_to_cycles.get(market)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CoinCycle, &MarketCycle)> {
        self.paths3.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjacency(markets: &[&str]) -> HashMap<String, BTreeSet<Market>> {
        let mut paths: HashMap<String, BTreeSet<Market>> = HashMap::new();
        for canonical in markets {
            let market = Market::parse(canonical).unwrap();
            paths
                .entry(market.base().to_string())
                .or_default()
                .insert(market.clone());
            paths
                .entry(market.quote().to_string())
                .or_default()
                .insert(market);
        }
        paths
    }

    #[test]
    fn one_triangle_yields_six_oriented_cycles() {
        let paths = TrianglePaths::build(&adjacency(&["BTC/USDT", "ETH/BTC", "ETH/USDT"]));
        assert_eq!(paths.len(), 6);

        // Every cycle of a single triangle touches every market.
        let market = Market::parse("BTC/USDT").unwrap();
        assert_eq!(paths.cycles_for_market(&market).unwrap().len(), 6);
    }

    #[test]
    fn cycle_resolves_to_realized_markets() {
        let paths = TrianglePaths::build(&adjacency(&["BTC/USDT", "ETH/BTC", "ETH/USDT"]));
        let cycle = CoinCycle::new("USDT", "BTC", "ETH");
        let markets = paths.market_cycle(&cycle).unwrap();
        assert_eq!(markets[0], Market::parse("BTC/USDT").unwrap());
        assert_eq!(markets[1], Market::parse("ETH/BTC").unwrap());
        assert_eq!(markets[2], Market::parse("ETH/USDT").unwrap());
    }

    #[test]
    fn open_path_produces_no_cycles() {
        // No market closes ETH back to USDT.
        let paths = TrianglePaths::build(&adjacency(&["BTC/USDT", "ETH/BTC"]));
        assert!(paths.is_empty());
    }

    #[test]
    fn two_triangles_share_an_edge() {
        let paths = TrianglePaths::build(&adjacency(&[
            "BTC/USDT",
            "ETH/BTC",
            "ETH/USDT",
            "BNB/BTC",
            "BNB/USDT",
        ]));
        assert_eq!(paths.len(), 12);

        // The shared edge participates in both triangles.
        let shared = Market::parse("BTC/USDT").unwrap();
        assert_eq!(paths.cycles_for_market(&shared).unwrap().len(), 12);
        // An outer edge participates in one.
        let outer = Market::parse("BNB/BTC").unwrap();
        assert_eq!(paths.cycles_for_market(&outer).unwrap().len(), 6);
    }
}
