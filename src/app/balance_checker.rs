//! Stop-loss watchdog over the total portfolio value.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::core::service::{BalancesRegistry, Bus};

pub struct BalancesChecker {
    bus: Arc<Bus>,
    registry: Arc<BalancesRegistry>,
    coins_of_interest: HashSet<String>,
    stop_loss_ratio: f64,
    period: Duration,
    /// Latched on the first non-empty reading.
    initial_balance: Option<f64>,
    stop_loss_balance: f64,
}

impl BalancesChecker {
    #[must_use]
    pub fn new(
        bus: Arc<Bus>,
        registry: Arc<BalancesRegistry>,
        coins_of_interest: HashSet<String>,
        stop_loss_ratio: f64,
        period: Duration,
    ) -> Self {
        let mut coins: Vec<&String> = coins_of_interest.iter().collect();
        coins.sort();
        info!(?coins, "Watching balance for these coins");
        info!(
            "Stop loss: trading stops if their total USD value falls by {}%",
            stop_loss_ratio * 100.0
        );
        Self {
            bus,
            registry,
            coins_of_interest,
            stop_loss_ratio,
            period,
            initial_balance: None,
            stop_loss_balance: 0.0,
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => self.check_balance(),
            }
        }
        debug!("Balance checker stopped");
    }

    /// One observation: compute total value, latch the initial reading,
    /// engage or release the stop flag. The flag changes at most once per
    /// call, there is no flapping within a tick.
    pub fn check_balance(&mut self) {
        if self.registry.is_empty() {
            warn!("Balances registry is still empty, skipping check");
            return;
        }

        let total_usd: f64 = self
            .coins_of_interest
            .iter()
            .filter_map(|coin| self.registry.balance_usd(coin))
            .sum();
        debug!(total_usd, "Balance check");

        let Some(_initial) = self.initial_balance else {
            self.initial_balance = Some(total_usd);
            self.stop_loss_balance = total_usd * (1.0 - self.stop_loss_ratio);
            info!(
                initial_usd = total_usd,
                stop_loss_usd = self.stop_loss_balance,
                "Latched initial balance"
            );
            return;
        };

        if total_usd <= self.stop_loss_balance {
            error!(
                total_usd,
                stop_loss_usd = self.stop_loss_balance,
                "Balance fell to stop loss, stopping trading"
            );
            self.bus.set_stop_trading(true);
        } else if self.bus.is_stop_trading() {
            info!(
                total_usd,
                stop_loss_usd = self.stop_loss_balance,
                "Balance recovered above stop loss, resuming trading"
            );
            self.bus.set_stop_trading(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn checker_with_usdt(amount: f64) -> (BalancesChecker, Arc<Bus>, Arc<BalancesRegistry>) {
        let (bus, _consumers) = Bus::new();
        let registry = Arc::new(BalancesRegistry::new("USDT"));
        registry.update_balances(HashMap::from([("USDT".to_string(), amount)]));
        let checker = BalancesChecker::new(
            Arc::clone(&bus),
            Arc::clone(&registry),
            HashSet::from(["USDT".to_string()]),
            0.2,
            Duration::from_secs(10),
        );
        (checker, bus, registry)
    }

    fn set_usdt(registry: &BalancesRegistry, amount: f64) {
        registry.update_balances(HashMap::from([("USDT".to_string(), amount)]));
    }

    #[test]
    fn empty_registry_is_skipped() {
        let (bus, _consumers) = Bus::new();
        let registry = Arc::new(BalancesRegistry::new("USDT"));
        let mut checker = BalancesChecker::new(
            Arc::clone(&bus),
            registry,
            HashSet::from(["USDT".to_string()]),
            0.2,
            Duration::from_secs(10),
        );
        checker.check_balance();
        assert!(checker.initial_balance.is_none());
        assert!(!bus.is_stop_trading());
    }

    #[test]
    fn stop_loss_latches_and_recovers() {
        let (mut checker, bus, registry) = checker_with_usdt(100.0);

        // First tick latches initial=100, stop loss=80, never trips.
        checker.check_balance();
        assert_eq!(checker.initial_balance, Some(100.0));
        assert!((checker.stop_loss_balance - 80.0).abs() < 1e-12);
        assert!(!bus.is_stop_trading());

        // Fall to 79: trading stops.
        set_usdt(&registry, 79.0);
        checker.check_balance();
        assert!(bus.is_stop_trading());

        // Recover to 81: trading resumes.
        set_usdt(&registry, 81.0);
        checker.check_balance();
        assert!(!bus.is_stop_trading());
    }

    #[test]
    fn initial_reading_is_not_re_latched() {
        let (mut checker, bus, registry) = checker_with_usdt(100.0);
        checker.check_balance();

        // A later richer reading must not move the stop loss level.
        set_usdt(&registry, 1_000.0);
        checker.check_balance();
        assert_eq!(checker.initial_balance, Some(100.0));
        assert!((checker.stop_loss_balance - 80.0).abs() < 1e-12);
        assert!(!bus.is_stop_trading());
    }

    #[test]
    fn boundary_value_trips_the_stop() {
        let (mut checker, bus, registry) = checker_with_usdt(100.0);
        checker.check_balance();

        // Exactly at the stop loss counts as tripped.
        set_usdt(&registry, 80.0);
        checker.check_balance();
        assert!(bus.is_stop_trading());
    }
}
