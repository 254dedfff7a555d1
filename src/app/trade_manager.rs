//! Turns positive chains into executable order bundles.
//!
//! Consumes batches from the positive-cycles queue, applies every gate, and
//! pushes surviving orders to the execution queue. Every chain of the batch
//! is forwarded to the store-cycles queue with its outcome comment, fired or
//! not.

use std::cmp::Ordering;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::config::{BreakEvenMode, TradeConfig};
use crate::core::domain::{format_client_order_id, Chain, ChainStep, Order};
use crate::core::exchange::ExchangeLimitations;
use crate::core::service::{BalancesRegistry, Bus, RecentArbitragersFilter};

pub struct TradeManager {
    bus: Arc<Bus>,
    limitations: Arc<ExchangeLimitations>,
    registry: Arc<BalancesRegistry>,
    filter: RecentArbitragersFilter,
    config: TradeConfig,
}

impl TradeManager {
    #[must_use]
    pub fn new(
        bus: Arc<Bus>,
        limitations: Arc<ExchangeLimitations>,
        registry: Arc<BalancesRegistry>,
        config: TradeConfig,
    ) -> Self {
        let filter = RecentArbitragersFilter::new(config.duplication_timeframe_ms);
        Self {
            bus,
            limitations,
            registry,
            filter,
            config,
        }
    }

    pub async fn run(
        self,
        mut positive_cycles: mpsc::Receiver<Vec<Chain>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!("Starting");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                batch = positive_cycles.recv() => match batch {
                    None => break,
                    Some(batch) => self.process_batch(batch).await,
                }
            }
        }
        debug!("Ending");
    }

    async fn process_batch(&self, mut batch: Vec<Chain>) {
        if batch.is_empty() {
            return;
        }

        if self.config.sort_by_roi {
            batch.sort_by(|a, b| b.roi.partial_cmp(&a.roi).unwrap_or(Ordering::Equal));
        } else {
            batch.sort_by(|a, b| b.profit.partial_cmp(&a.profit).unwrap_or(Ordering::Equal));
        }

        let mut skipped = if self.config.fire_only_top && batch.len() > 1 {
            batch.split_off(1)
        } else {
            Vec::new()
        };
        for chain in &mut skipped {
            chain.comment = "Not the top chain of the batch, skipping".into();
        }

        for mut chain in batch {
            let comment = self.process_chain(&mut chain).await;
            debug!(chain = %chain.to_user_readable(), comment = %comment, "Chain processed");
            chain.comment = comment;
            self.bus.publish_store_chain(chain).await;
        }
        for chain in skipped {
            self.bus.publish_store_chain(chain).await;
        }
    }

    /// Run one chain through every gate; the returned comment is the
    /// processing outcome recorded with the chain.
    async fn process_chain(&self, chain: &mut Chain) -> String {
        if self.bus.is_stop_trading() {
            return "Stop trading flag is set, ignoring arbitrage chain".into();
        }
        if self.filter.register_and_contained(chain) {
            return "Skipping as a duplicate (same chain and ROI within the timeframe)".into();
        }
        if chain.profit_usd < self.config.profit_threshold_usd {
            return format!(
                "Chain profit ${:.6} is below threshold ${}",
                chain.profit_usd, self.config.profit_threshold_usd
            );
        }
        if let Some(comment) = self.find_depleted_balance(chain) {
            return comment;
        }

        self.shrink_volumes(chain);

        let mut orders = match self.create_orders(chain) {
            Ok(orders) => orders,
            Err(comment) => return comment,
        };
        for order in &mut orders {
            self.limitations.adjust(order);
        }
        // A single failing leg drops the whole chain; partial submission is
        // never allowed.
        for order in &orders {
            if let Err(reason) = self.limitations.check(order) {
                warn!(%order, reason = %reason, "Order does not meet exchange filters, skipping the whole chain");
                return format!("Order does not meet exchange filters ({})", reason);
            }
        }

        self.fire(orders, chain).await;
        "Orders created and fired".into()
    }

    fn find_depleted_balance(&self, chain: &Chain) -> Option<String> {
        for step in &chain.steps {
            // An unknown balance is no information, not a zero; let it pass.
            if let Some(balance) = self.registry.balance(step.spending_coin()) {
                if balance <= 0.0 {
                    return Some(format!(
                        "{} balance is 0 or below: {}",
                        step.spending_coin(),
                        balance
                    ));
                }
            }
        }
        None
    }

    /// Cut every leg's volume by the same factor when any leg would consume
    /// more than the allowed fraction of its spending-coin balance. Scaling
    /// all three together keeps the chain proportions intact.
    fn shrink_volumes(&self, chain: &mut Chain) {
        if self.registry.is_empty() {
            debug!("No balances set");
            return;
        }
        let max_allowed = self.config.max_balance_ratio_per_order;
        let mut max_ratio: f64 = 0.0;
        for step in &chain.steps {
            let Some(balance) = self.registry.balance(step.spending_coin()) else {
                continue;
            };
            if balance <= 0.0 {
                continue;
            }
            let ratio = step.proposed_volume() / balance;
            if ratio > max_allowed {
                max_ratio = max_ratio.max(ratio);
            }
        }
        if max_ratio > 0.0 {
            let shrink_factor = max_ratio / max_allowed;
            warn!(
                shrink_factor,
                "Cutting order volumes, balance insufficient for the full chain volume"
            );
            for step in &mut chain.steps {
                step.volume /= shrink_factor;
            }
        }
    }

    fn create_orders(&self, chain: &Chain) -> Result<Vec<Order>, String> {
        let hash8 = chain.hash8();
        let mut orders = Vec::with_capacity(3);
        for (index, step) in chain.steps.iter().enumerate() {
            let price = self.break_even_price(step, chain);
            let (Some(quantity), Some(price)) =
                (Decimal::from_f64(step.volume), Decimal::from_f64(price))
            else {
                return Err(format!(
                    "Step volume/price not representable: {} @ {}",
                    step.volume, step.price
                ));
            };
            let mut order = Order::new(
                format_client_order_id(hash8, index + 1),
                step.side,
                step.market.symbol(),
                quantity,
                price,
            );
            order.arbitrage_hash8 = Some(hash8);
            orders.push(order);
        }
        Ok(orders)
    }

    /// Break-even price: move BUY legs up and SELL legs down by the chain's
    /// ROI so each leg still closes flat if the book shifts against us.
    fn break_even_price(&self, step: &ChainStep, chain: &Chain) -> f64 {
        let spread = match self.config.break_even {
            BreakEvenMode::Full => chain.roi,
            BreakEvenMode::PerLeg => chain.roi / chain.steps.len() as f64,
        };
        if step.is_buy() {
            step.price * (1.0 + spread)
        } else {
            step.price * (1.0 - spread)
        }
    }

    /// Queue the legs in random order and optimistically debit each leg's
    /// spending coin, so chains fired before the next balance refresh cannot
    /// double-spend.
    async fn fire(&self, orders: Vec<Order>, chain: &Chain) {
        let mut legs: Vec<(Order, String)> = orders
            .into_iter()
            .zip(chain.steps.iter())
            .map(|(order, step)| (order, step.spending_coin().to_string()))
            .collect();
        legs.shuffle(&mut rand::thread_rng());

        for (order, spending_coin) in legs {
            let proposed = order.proposed_volume().to_f64().unwrap_or(0.0);
            debug!(%order, "Firing order");
            self.bus.fire_order(order).await;
            self.registry.reduce(&spending_coin, proposed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    use rust_decimal_macros::dec;

    use crate::core::domain::{Market, OrderSide};
    use crate::core::exchange::SymbolLimits;
    use crate::core::service::{BusConsumers, ExecutorCommand};

    fn chain(profit_usd: f64) -> Chain {
        Chain::new(
            "USDT",
            [
                ChainStep::new(Market::new("BTC", "USDT"), OrderSide::Buy, 30_000.0, 0.01),
                ChainStep::new(Market::new("ETH", "BTC"), OrderSide::Buy, 0.05, 5.0),
                ChainStep::new(Market::new("ETH", "USDT"), OrderSide::Sell, 2_500.0, 5.0),
            ],
            0.003,
            0.9,
            profit_usd,
        )
    }

    fn registry(balances: &[(&str, f64)]) -> Arc<BalancesRegistry> {
        let registry = Arc::new(BalancesRegistry::new("USDT"));
        if !balances.is_empty() {
            registry.update_balances(
                balances
                    .iter()
                    .map(|(coin, amount)| (coin.to_string(), *amount))
                    .collect(),
            );
        }
        registry
    }

    fn manager(
        registry: Arc<BalancesRegistry>,
        limitations: ExchangeLimitations,
        config: TradeConfig,
    ) -> (TradeManager, Arc<Bus>, BusConsumers) {
        let (bus, consumers) = Bus::new();
        let manager = TradeManager::new(
            Arc::clone(&bus),
            Arc::new(limitations),
            registry,
            config,
        );
        (manager, bus, consumers)
    }

    async fn drain_fired(bus: &Bus) -> Vec<Order> {
        let receiver = bus.fire_orders_receiver();
        let mut receiver = receiver.lock().await;
        let mut fired = Vec::new();
        while let Ok(command) = receiver.try_recv() {
            if let ExecutorCommand::Fire(order) = command {
                fired.push(order);
            }
        }
        fired
    }

    #[tokio::test]
    async fn happy_path_fires_three_orders_with_shared_hash8() {
        let registry = registry(&[("USDT", 10_000.0), ("BTC", 10.0), ("ETH", 100.0)]);
        let (manager, bus, mut consumers) =
            manager(registry, ExchangeLimitations::default(), TradeConfig::default());

        manager.process_batch(vec![chain(5.0)]).await;

        let fired = drain_fired(&bus).await;
        assert_eq!(fired.len(), 3);

        let hashes: HashSet<_> = fired.iter().map(|o| o.arbitrage_hash8).collect();
        assert_eq!(hashes.len(), 1);
        let hash8 = chain(5.0).hash8();
        let legs: HashSet<String> = fired
            .iter()
            .map(|o| o.client_order_id.clone())
            .collect();
        for leg in 1..=3 {
            assert!(legs.contains(&format!("{}_order_{}", hash8, leg)));
        }

        let stored = consumers.store_cycles.recv().await.unwrap();
        assert_eq!(stored.comment, "Orders created and fired");
    }

    #[tokio::test]
    async fn fired_legs_debit_spending_coins() {
        let registry = registry(&[("USDT", 10_000.0), ("BTC", 10.0), ("ETH", 100.0)]);
        let (manager, bus, _consumers) = manager(
            Arc::clone(&registry),
            ExchangeLimitations::default(),
            TradeConfig::default(),
        );

        manager.process_batch(vec![chain(5.0)]).await;
        drain_fired(&bus).await;

        // BUY 0.01 BTC @ ~30k spends USDT; exact spend depends on the
        // break-even spread, so just check the direction of each change.
        assert!(registry.balance("USDT").unwrap() < 10_000.0);
        assert!(registry.balance("BTC").unwrap() < 10.0);
        assert!(registry.balance("ETH").unwrap() < 100.0);
    }

    #[tokio::test]
    async fn stop_flag_skips_but_still_records() {
        let registry = registry(&[("USDT", 10_000.0), ("BTC", 10.0), ("ETH", 100.0)]);
        let (manager, bus, mut consumers) =
            manager(registry, ExchangeLimitations::default(), TradeConfig::default());
        bus.set_stop_trading(true);

        manager.process_batch(vec![chain(5.0)]).await;

        assert!(drain_fired(&bus).await.is_empty());
        let stored = consumers.store_cycles.recv().await.unwrap();
        assert_eq!(stored.comment, "Stop trading flag is set, ignoring arbitrage chain");
    }

    #[tokio::test]
    async fn duplicate_within_timeframe_is_dropped() {
        let registry = registry(&[("USDT", 10_000.0), ("BTC", 10.0), ("ETH", 100.0)]);
        let (manager, bus, mut consumers) =
            manager(registry, ExchangeLimitations::default(), TradeConfig::default());

        manager.process_batch(vec![chain(5.0)]).await;
        manager.process_batch(vec![chain(5.0)]).await;

        assert_eq!(drain_fired(&bus).await.len(), 3);
        let _first = consumers.store_cycles.recv().await.unwrap();
        let second = consumers.store_cycles.recv().await.unwrap();
        assert!(second.comment.contains("duplicate"));
    }

    #[tokio::test]
    async fn low_profit_is_dropped() {
        let registry = registry(&[("USDT", 10_000.0), ("BTC", 10.0), ("ETH", 100.0)]);
        let (manager, bus, mut consumers) =
            manager(registry, ExchangeLimitations::default(), TradeConfig::default());

        manager.process_batch(vec![chain(0.001)]).await;

        assert!(drain_fired(&bus).await.is_empty());
        let stored = consumers.store_cycles.recv().await.unwrap();
        assert!(stored.comment.contains("below threshold"));
    }

    #[tokio::test]
    async fn depleted_balance_is_dropped() {
        let registry = registry(&[("USDT", 0.0), ("BTC", 10.0), ("ETH", 100.0)]);
        let (manager, bus, mut consumers) =
            manager(registry, ExchangeLimitations::default(), TradeConfig::default());

        manager.process_batch(vec![chain(5.0)]).await;

        assert!(drain_fired(&bus).await.is_empty());
        let stored = consumers.store_cycles.recv().await.unwrap();
        assert!(stored.comment.contains("USDT balance is 0 or below"));
    }

    #[tokio::test]
    async fn empty_registry_skips_shrink_but_fires() {
        let registry = registry(&[]);
        let (manager, bus, _consumers) =
            manager(registry, ExchangeLimitations::default(), TradeConfig::default());

        manager.process_batch(vec![chain(5.0)]).await;

        let fired = drain_fired(&bus).await;
        assert_eq!(fired.len(), 3);
        // Volumes untouched: the BUY BTC leg still carries the full 0.01.
        let btc_leg = fired.iter().find(|o| o.symbol == "BTCUSDT").unwrap();
        assert_eq!(btc_leg.quantity, dec!(0.01));
    }

    #[tokio::test]
    async fn failing_exchange_filter_drops_whole_chain() {
        let limits = HashMap::from([(
            "ETHBTC".to_string(),
            SymbolLimits {
                min_price_step: None,
                min_volume_step: None,
                min_notional: Some(dec!(1000)),
            },
        )]);
        let registry = registry(&[("USDT", 10_000.0), ("BTC", 10.0), ("ETH", 100.0)]);
        let (manager, bus, mut consumers) = manager(
            registry,
            ExchangeLimitations::new(limits),
            TradeConfig::default(),
        );

        manager.process_batch(vec![chain(5.0)]).await;

        assert!(drain_fired(&bus).await.is_empty());
        let stored = consumers.store_cycles.recv().await.unwrap();
        assert!(stored.comment.contains("exchange filters"));
    }

    #[tokio::test]
    async fn fire_only_top_retains_best_roi() {
        let registry = registry(&[("USDT", 10_000.0), ("BTC", 10.0), ("ETH", 100.0)]);
        let (manager, bus, mut consumers) =
            manager(registry, ExchangeLimitations::default(), TradeConfig::default());

        let mut low = chain(5.0);
        low.roi = 0.001;
        let mut high = chain(5.0);
        high.roi = 0.01;
        // Different cycle so the duplicate filter can't interfere.
        high.steps[0].market = Market::new("BNB", "USDT");
        high.steps[1].market = Market::new("ETH", "BNB");

        manager.process_batch(vec![low, high.clone()]).await;

        let fired = drain_fired(&bus).await;
        assert_eq!(fired.len(), 3);
        assert_eq!(fired[0].arbitrage_hash8, Some(high.hash8()));

        let first = consumers.store_cycles.recv().await.unwrap();
        assert_eq!(first.comment, "Orders created and fired");
        let second = consumers.store_cycles.recv().await.unwrap();
        assert!(second.comment.contains("Not the top chain"));
    }

    #[test]
    fn shrink_scales_all_legs_by_the_worst_ratio() {
        let registry = registry(&[("BTC", 20.0), ("USDT", 500.0), ("ETH", 10.0)]);
        let (manager, _bus, _consumers) = manager(
            registry,
            ExchangeLimitations::default(),
            TradeConfig {
                max_balance_ratio_per_order: 0.3,
                ..TradeConfig::default()
            },
        );

        let mut chain = chain(5.0);
        manager.shrink_volumes(&mut chain);

        assert!((chain.steps[0].volume - 0.005).abs() < 1e-12);
        assert!((chain.steps[1].volume - 2.5).abs() < 1e-12);
        assert!((chain.steps[2].volume - 2.5).abs() < 1e-12);
    }

    #[test]
    fn shrink_leaves_small_chains_alone() {
        let registry = registry(&[("BTC", 200.0), ("USDT", 50_000.0), ("ETH", 10_000.0)]);
        let (manager, _bus, _consumers) = manager(
            registry,
            ExchangeLimitations::default(),
            TradeConfig {
                max_balance_ratio_per_order: 0.3,
                ..TradeConfig::default()
            },
        );

        let mut chain = chain(5.0);
        manager.shrink_volumes(&mut chain);

        assert_eq!(chain.steps[0].volume, 0.01);
        assert_eq!(chain.steps[1].volume, 5.0);
        assert_eq!(chain.steps[2].volume, 5.0);
    }

    #[test]
    fn break_even_moves_buys_up_and_sells_down() {
        let registry = registry(&[]);
        let (manager, _bus, _consumers) = manager(
            registry,
            ExchangeLimitations::default(),
            TradeConfig {
                break_even: BreakEvenMode::Full,
                ..TradeConfig::default()
            },
        );

        let chain = chain(5.0);
        let buy_price = manager.break_even_price(&chain.steps[0], &chain);
        assert!((buy_price - 30_000.0 * 1.003).abs() < 1e-6);
        let sell_price = manager.break_even_price(&chain.steps[2], &chain);
        assert!((sell_price - 2_500.0 * 0.997).abs() < 1e-6);
    }

    #[test]
    fn per_leg_break_even_divides_spread_by_three() {
        let registry = registry(&[]);
        let (manager, _bus, _consumers) = manager(
            registry,
            ExchangeLimitations::default(),
            TradeConfig::default(),
        );

        let chain = chain(5.0);
        let buy_price = manager.break_even_price(&chain.steps[0], &chain);
        assert!((buy_price - 30_000.0 * (1.0 + 0.001)).abs() < 1e-6);
    }
}
