//! Cancellation of our own stale open orders.
//!
//! With IOC/FOK time-in-force this is a safety net; with GTC it is what
//! keeps half-filled chains from resting on the book forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::domain::{current_time_ms, is_arbitrage_client_id};
use crate::core::exchange::ExchangeApi;

pub struct OrderCancelator {
    api: Arc<dyn ExchangeApi>,
    order_ttl_ms: i64,
    period: Duration,
}

impl OrderCancelator {
    #[must_use]
    pub fn new(api: Arc<dyn ExchangeApi>, order_ttl_ms: i64, period: Duration) -> Self {
        Self {
            api,
            order_ttl_ms,
            period,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(order_ttl_ms = self.order_ttl_ms, "Order cancelator running");
        let mut interval = tokio::time::interval(self.period);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => self.cancel_stale().await,
            }
        }
        debug!("Order cancelator stopped");
    }

    async fn cancel_stale(&self) {
        let open_orders = match self.api.open_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "Failed to fetch open orders");
                return;
            }
        };

        let now = current_time_ms();
        let stale: Vec<_> = open_orders
            .into_iter()
            // Only orders we stamped ourselves; the account may carry others.
            .filter(|o| is_arbitrage_client_id(&o.client_order_id))
            .filter(|o| now - o.created_at_ms > self.order_ttl_ms)
            .collect();
        if stale.is_empty() {
            return;
        }

        info!(count = stale.len(), "Cancelling stale orders");
        for order in stale {
            if let Err(e) = self
                .api
                .cancel_order(&order.symbol, &order.client_order_id)
                .await
            {
                warn!(error = %e, %order, "Failed to cancel order");
            }
        }
    }
}
