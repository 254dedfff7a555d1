//! Order executor pool.
//!
//! N identical workers drain the fire-orders queue. Workers share nothing
//! mutable beyond the bus and the store; a shutdown sentinel taken by one
//! worker is re-enqueued so the whole pool drains.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::core::domain::{current_time_ms, Order, OrderStatus, TimeInForce};
use crate::core::exchange::ExchangeApi;
use crate::core::service::{Bus, ExecutorCommand};
use crate::store::OrderStore;

pub struct OrderExecutor {
    id: usize,
    bus: Arc<Bus>,
    api: Arc<dyn ExchangeApi>,
    store: Arc<dyn OrderStore>,
    time_in_force: TimeInForce,
}

impl OrderExecutor {
    #[must_use]
    pub fn new(
        id: usize,
        bus: Arc<Bus>,
        api: Arc<dyn ExchangeApi>,
        store: Arc<dyn OrderStore>,
        time_in_force: TimeInForce,
    ) -> Self {
        Self {
            id,
            bus,
            api,
            store,
            time_in_force,
        }
    }

    pub async fn run(self) {
        debug!(worker = self.id, "Starting");
        let receiver = self.bus.fire_orders_receiver();
        loop {
            // Hold the lock only for the take, not for the submission.
            let command = { receiver.lock().await.recv().await };
            match command {
                None => break,
                Some(ExecutorCommand::Shutdown) => {
                    debug!(worker = self.id, "Got shutdown sentinel, stopping");
                    self.bus.shutdown_executors().await;
                    break;
                }
                Some(ExecutorCommand::Fire(order)) => self.execute(order).await,
            }
        }
        debug!(worker = self.id, "Ending");
    }

    async fn execute(&self, mut order: Order) {
        order.fired_at_ms = Some(current_time_ms());
        info!(worker = self.id, %order, "Placing order");

        let result = match self.api.put_limit_order(&order, self.time_in_force).await {
            Ok(result) => result,
            Err(e) => {
                // No retry: the window is gone by the time we could.
                error!(worker = self.id, %order, error = %e, "Error placing order");
                order.status = OrderStatus::Error;
                order.comment = e.to_string();
                order
            }
        };

        if let Err(e) = self.store.upsert(&result) {
            error!(
                error = %e,
                client_order_id = %result.client_order_id,
                "Failed to persist order outcome"
            );
        }
    }
}
