//! Periodic refresh of the balances registry from the exchange.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::core::exchange::ExchangeApi;
use crate::core::service::BalancesRegistry;

pub struct BalanceUpdater {
    api: Arc<dyn ExchangeApi>,
    registry: Arc<BalancesRegistry>,
    period: Duration,
}

impl BalanceUpdater {
    #[must_use]
    pub fn new(
        api: Arc<dyn ExchangeApi>,
        registry: Arc<BalancesRegistry>,
        period: Duration,
    ) -> Self {
        Self {
            api,
            registry,
            period,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => self.refresh().await,
            }
        }
        debug!("Balance updater stopped");
    }

    /// Each refresh wholesale-replaces the registry, deliberately discarding
    /// the optimistic reductions accumulated since the last one.
    async fn refresh(&self) {
        match self.api.balances().await {
            Ok(balances) => {
                debug!(coins = balances.len(), "Refreshed balances");
                self.registry.update_balances(balances);
            }
            Err(e) => warn!(error = %e, "Failed to refresh balances"),
        }
        match self.api.latest_prices().await {
            Ok(rates) => self.registry.update_rates(rates),
            Err(e) => warn!(error = %e, "Failed to refresh exchange rates"),
        }
    }
}
