//! In-memory market data: current book-tops plus the triangle index.

mod paths;

pub use paths::{CoinCycle, MarketCycle, TrianglePaths};

use std::collections::{BTreeSet, HashMap, HashSet};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::core::domain::{Market, Ticker};

/// USD-equivalent coins, probed in this order when expressing a value in USD.
pub const USD_COINS: [&str; 3] = ["USDT", "BUSD", "USDC"];

/// Whether a coin counts as a USD stable for valuation purposes.
/// Cross rates between stables are neglected.
#[must_use]
pub fn is_usd_coin(coin: &str) -> bool {
    coin.contains("USD")
}

/// Current book-top per market plus the pre-computed cycle index.
///
/// One writer (the exchange listener via [`put`](Self::put)), many readers.
/// The ticker map is sharded (`DashMap`); readers always receive owned
/// snapshots, never references into the map.
pub struct MarketData {
    /// Wire symbol → canonical market, allowlist-filtered.
    markets: HashMap<String, Market>,
    market_paths: HashMap<String, BTreeSet<Market>>,
    paths: TrianglePaths,
    data: DashMap<Market, Ticker>,
}

impl MarketData {
    /// Build from the exchange's `symbol → "BASE/QUOTE"` mapping.
    ///
    /// Markets whose base or quote falls outside a non-empty `allowlist` are
    /// dropped here and rejected by `put` later.
    #[must_use]
    pub fn new(
        symbol_to_base_quote: HashMap<String, String>,
        allowlist: Option<HashSet<String>>,
    ) -> Self {
        let allowlist = allowlist.filter(|coins| !coins.is_empty());

        let mut markets = HashMap::new();
        let mut market_paths: HashMap<String, BTreeSet<Market>> = HashMap::new();
        for (symbol, canonical) in symbol_to_base_quote {
            let Some(market) = Market::parse(&canonical) else {
                debug!(%symbol, %canonical, "Skipping unparseable market");
                continue;
            };
            if let Some(coins) = &allowlist {
                if !coins.contains(market.base()) || !coins.contains(market.quote()) {
                    continue;
                }
            }
            market_paths
                .entry(market.base().to_string())
                .or_default()
                .insert(market.clone());
            market_paths
                .entry(market.quote().to_string())
                .or_default()
                .insert(market.clone());
            markets.insert(symbol, market);
        }

        let paths = TrianglePaths::build(&market_paths);
        info!(
            markets = markets.len(),
            coins = market_paths.len(),
            cycles = paths.len(),
            "Market data initialized"
        );

        Self {
            markets,
            market_paths,
            paths,
            data: DashMap::new(),
        }
    }

    #[must_use]
    pub fn market_for_symbol(&self, symbol: &str) -> Option<&Market> {
        self.markets.get(symbol)
    }

    #[must_use]
    pub fn market_count(&self) -> usize {
        self.markets.len()
    }

    #[must_use]
    pub fn cycle_count(&self) -> usize {
        self.paths.len()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.markets.keys().map(String::as_str)
    }

    #[must_use]
    pub fn coins(&self) -> Vec<String> {
        self.market_paths.keys().cloned().collect()
    }

    /// Replace the stored book-top for the ticker's market.
    ///
    /// Tickers for markets outside the allowlist are rejected.
    pub fn put(&self, ticker: Ticker) -> bool {
        if !self
            .market_paths
            .get(ticker.market.base())
            .is_some_and(|ms| ms.contains(&ticker.market))
        {
            debug!(market = %ticker.market, "Rejecting ticker for unknown market");
            return false;
        }
        self.data.insert(ticker.market.clone(), ticker);
        true
    }

    /// Current book-top of one market.
    #[must_use]
    pub fn ticker(&self, market: &Market) -> Option<Ticker> {
        self.data.get(market).map(|entry| entry.value().clone())
    }

    /// Snapshot of the whole ticker map.
    #[must_use]
    pub fn get(&self) -> HashMap<Market, Ticker> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// All cycles touching any of the given markets, resolved to their
    /// realized market triples.
    #[must_use]
    pub fn filter_cycles_by_markets(
        &self,
        updated: &[Market],
    ) -> Vec<(&CoinCycle, &MarketCycle)> {
        let mut seen: HashSet<&CoinCycle> = HashSet::new();
        let mut result = Vec::new();
        for market in updated {
            let Some(cycles) = self.paths.cycles_for_market(market) else {
                continue;
            };
            for cycle in cycles {
                if seen.insert(cycle) {
                    if let Some(markets) = self.paths.market_cycle(cycle) {
                        result.push((cycle, markets));
                    }
                }
            }
        }
        result
    }

    /// Best-effort USD price of a coin from the current book-tops: the best
    /// bid of `coin/<stable>`, or the reciprocal best ask of `<stable>/coin`.
    #[must_use]
    pub fn usd_price(&self, coin: &str) -> Option<f64> {
        for stable in USD_COINS {
            if let Some(ticker) = self.ticker(&Market::new(coin, stable)) {
                return Some(ticker.best_bid);
            }
            if let Some(ticker) = self.ticker(&Market::new(stable, coin)) {
                if ticker.best_ask > 0.0 {
                    return Some(1.0 / ticker.best_ask);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol_map(markets: &[(&str, &str)]) -> HashMap<String, String> {
        markets
            .iter()
            .map(|(symbol, canonical)| (symbol.to_string(), canonical.to_string()))
            .collect()
    }

    fn triangle() -> MarketData {
        MarketData::new(
            symbol_map(&[
                ("BTCUSDT", "BTC/USDT"),
                ("ETHBTC", "ETH/BTC"),
                ("ETHUSDT", "ETH/USDT"),
            ]),
            None,
        )
    }

    fn ticker(canonical: &str, bid: f64, bid_qty: f64, ask: f64, ask_qty: f64) -> Ticker {
        Ticker::new(Market::parse(canonical).unwrap(), bid, bid_qty, ask, ask_qty)
    }

    #[test]
    fn allowlist_drops_markets() {
        let data = MarketData::new(
            symbol_map(&[
                ("BTCUSDT", "BTC/USDT"),
                ("ETHBTC", "ETH/BTC"),
                ("ETHUSDT", "ETH/USDT"),
                ("DOGEBTC", "DOGE/BTC"),
            ]),
            Some(["BTC", "ETH", "USDT"].into_iter().map(String::from).collect()),
        );
        assert_eq!(data.market_count(), 3);
        assert!(data.market_for_symbol("DOGEBTC").is_none());
        assert!(!data.put(ticker("DOGE/BTC", 1.0, 1.0, 2.0, 1.0)));
    }

    #[test]
    fn empty_allowlist_means_everything() {
        let data = MarketData::new(
            symbol_map(&[("BTCUSDT", "BTC/USDT")]),
            Some(HashSet::new()),
        );
        assert_eq!(data.market_count(), 1);
    }

    #[test]
    fn put_replaces_and_get_snapshots() {
        let data = triangle();
        assert!(data.put(ticker("BTC/USDT", 55_100.0, 1.22, 55_200.0, 2.01)));
        assert!(data.put(ticker("BTC/USDT", 55_150.0, 1.0, 55_250.0, 2.0)));

        let market = Market::parse("BTC/USDT").unwrap();
        let stored = data.ticker(&market).unwrap();
        assert_eq!(stored.best_bid, 55_150.0);

        let snapshot = data.get();
        assert_eq!(snapshot.len(), 1);
        // Snapshot is detached from later writes.
        data.put(ticker("BTC/USDT", 1.0, 1.0, 2.0, 1.0));
        assert_eq!(snapshot[&market].best_bid, 55_150.0);
    }

    #[test]
    fn filter_cycles_restricts_and_dedupes() {
        let data = triangle();
        let market = Market::parse("ETH/BTC").unwrap();
        let cycles = data.filter_cycles_by_markets(std::slice::from_ref(&market));
        assert_eq!(cycles.len(), 6);

        // Passing two markets of the same triangle must not duplicate cycles.
        let both = [market, Market::parse("BTC/USDT").unwrap()];
        assert_eq!(data.filter_cycles_by_markets(&both).len(), 6);

        let unknown = Market::parse("XRP/USDT").unwrap();
        assert!(data
            .filter_cycles_by_markets(std::slice::from_ref(&unknown))
            .is_empty());
    }

    #[test]
    fn usd_price_prefers_direct_market() {
        let data = triangle();
        data.put(ticker("BTC/USDT", 55_100.0, 1.22, 55_200.0, 2.01));
        assert_eq!(data.usd_price("BTC"), Some(55_100.0));
        assert!(data.usd_price("ETH").is_none());
    }

    #[test]
    fn usd_price_falls_back_to_reverse_market() {
        let data = MarketData::new(
            symbol_map(&[
                ("USDTTRY", "USDT/TRY"),
                ("BTCTRY", "BTC/TRY"),
                ("BTCUSDT", "BTC/USDT"),
            ]),
            None,
        );
        data.put(ticker("USDT/TRY", 8.0, 100.0, 8.5, 100.0));
        assert_eq!(data.usd_price("TRY"), Some(1.0 / 8.5));
    }

    #[test]
    fn usd_coin_detection() {
        assert!(is_usd_coin("USDT"));
        assert!(is_usd_coin("BUSD"));
        assert!(!is_usd_coin("BTC"));
    }
}
