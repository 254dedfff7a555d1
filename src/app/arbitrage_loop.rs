//! The evaluation loop: one evaluator pass per consumed ticker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::core::arbitrage::TriangleEvaluator;
use crate::core::domain::{current_time_ms, Chain, Ticker};
use crate::core::market::MarketData;
use crate::core::service::Bus;

/// Rolling latency stats are logged once per this many evaluator runs.
const STATS_EVERY: u64 = 1_000;

pub struct ArbitrageLoop {
    bus: Arc<Bus>,
    market_data: Arc<MarketData>,
    evaluator: TriangleEvaluator,
    fire_chain_asap: bool,
    startup_delay: Duration,
}

impl ArbitrageLoop {
    #[must_use]
    pub fn new(
        bus: Arc<Bus>,
        market_data: Arc<MarketData>,
        evaluator: TriangleEvaluator,
        fire_chain_asap: bool,
    ) -> Self {
        Self {
            bus,
            market_data,
            evaluator,
            fire_chain_asap,
            startup_delay: Duration::from_secs(3),
        }
    }

    #[must_use]
    pub fn with_startup_delay(mut self, startup_delay: Duration) -> Self {
        self.startup_delay = startup_delay;
        self
    }

    pub async fn run(
        self,
        mut tickers: mpsc::Receiver<Ticker>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        // Let the first book-tops arrive before evaluating anything.
        tokio::select! {
            () = tokio::time::sleep(self.startup_delay) => {}
            _ = shutdown.changed() => return,
        }
        debug!("Starting");

        let mut invocations: u64 = 0;
        let mut spent_ms: i64 = 0;
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                ticker = tickers.recv() => match ticker {
                    None => break,
                    Some(ticker) => {
                        let started = current_time_ms();
                        let chains = self
                            .evaluator
                            .find(&self.market_data, std::slice::from_ref(&ticker.market));
                        spent_ms += current_time_ms() - started;

                        self.publish(chains).await;

                        invocations += 1;
                        if invocations % STATS_EVERY == 0 {
                            info!(
                                invocations,
                                avg_eval_ms = spent_ms as f64 / STATS_EVERY as f64,
                                "Arbitrage evaluation stats"
                            );
                            spent_ms = 0;
                        }
                    }
                }
            }
        }
        debug!("Ending");
    }

    async fn publish(&self, chains: Vec<Chain>) {
        if chains.is_empty() {
            return;
        }

        let positives: Vec<Chain> = chains.iter().filter(|c| c.profit > 0.0).cloned().collect();
        if !positives.is_empty() {
            if self.fire_chain_asap {
                for chain in positives {
                    self.bus.publish_positive_batch(vec![chain]).await;
                }
            } else {
                self.bus.publish_positive_batch(positives).await;
            }
        }

        self.bus.publish_all_batch(chains);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::core::domain::Market;

    fn profitable_market_data() -> Arc<MarketData> {
        let symbols: HashMap<String, String> = [
            ("BTCUSDT", "BTC/USDT"),
            ("ETHBTC", "ETH/BTC"),
            ("ETHUSDT", "ETH/USDT"),
        ]
        .into_iter()
        .map(|(s, c)| (s.to_string(), c.to_string()))
        .collect();
        let data = MarketData::new(symbols, None);

        let put = |market: &str, bid: f64, ask: f64| {
            data.put(Ticker::new(Market::parse(market).unwrap(), bid, 10.0, ask, 10.0));
        };
        put("BTC/USDT", 49_900.0, 50_000.0);
        put("ETH/BTC", 0.0499, 0.05);
        put("ETH/USDT", 2_600.0, 2_610.0);
        Arc::new(data)
    }

    #[tokio::test]
    async fn evaluates_tickers_and_publishes_batches() {
        let data = profitable_market_data();
        let (bus, mut consumers) = Bus::new();
        let mut all_cycles = bus.subscribe_all_cycles();

        let evaluator = TriangleEvaluator::new(HashMap::new(), 0.0);
        let arb_loop = ArbitrageLoop::new(Arc::clone(&bus), data, evaluator, false)
            .with_startup_delay(Duration::ZERO);

        let ticker = Ticker::new(Market::new("BTC", "USDT"), 49_900.0, 10.0, 50_000.0, 10.0);
        bus.publish_ticker(ticker).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(arb_loop.run(consumers.tickers, shutdown_rx));

        let positives = consumers.positive_cycles.recv().await.unwrap();
        assert!(!positives.is_empty());
        assert!(positives.iter().all(|c| c.profit > 0.0));

        let all = all_cycles.recv().await.unwrap();
        assert_eq!(all.len(), 6);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn fire_asap_sends_singleton_batches() {
        let data = profitable_market_data();
        let (bus, mut consumers) = Bus::new();

        let evaluator = TriangleEvaluator::new(HashMap::new(), 0.0);
        let arb_loop = ArbitrageLoop::new(Arc::clone(&bus), data, evaluator, true)
            .with_startup_delay(Duration::ZERO);

        let ticker = Ticker::new(Market::new("BTC", "USDT"), 49_900.0, 10.0, 50_000.0, 10.0);
        bus.publish_ticker(ticker).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(arb_loop.run(consumers.tickers, shutdown_rx));

        let batch = consumers.positive_cycles.recv().await.unwrap();
        assert_eq!(batch.len(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_during_startup_delay_exits_immediately() {
        let data = profitable_market_data();
        let (bus, consumers) = Bus::new();
        let evaluator = TriangleEvaluator::new(HashMap::new(), 0.0);
        // Default startup delay is seconds; shutdown must cut through it.
        let arb_loop = ArbitrageLoop::new(Arc::clone(&bus), data, evaluator, false);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(arb_loop.run(consumers.tickers, shutdown_rx));
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not exit on shutdown")
            .unwrap();
    }
}
