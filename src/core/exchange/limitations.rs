//! Per-market exchange filters: price tick, lot step, minimum notional.
//!
//! Rounding happens on exact decimal representation so the values we later
//! serialize towards the exchange are lossless.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::trace;

use crate::core::domain::Order;

use super::api::ExchangeInfo;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolLimits {
    /// Price tick size.
    pub min_price_step: Option<Decimal>,
    /// Quantity lot step.
    pub min_volume_step: Option<Decimal>,
    /// Quote-side minimum order value.
    pub min_notional: Option<Decimal>,
}

/// All symbol filters declared by the exchange.
#[derive(Debug, Default)]
pub struct ExchangeLimitations {
    limits: HashMap<String, SymbolLimits>,
}

impl ExchangeLimitations {
    #[must_use]
    pub fn new(limits: HashMap<String, SymbolLimits>) -> Self {
        Self { limits }
    }

    #[must_use]
    pub fn from_exchange_info(info: &ExchangeInfo) -> Self {
        Self {
            limits: info
                .symbols
                .iter()
                .map(|s| (s.symbol.clone(), s.limits.clone()))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&SymbolLimits> {
        self.limits.get(symbol)
    }

    /// Round the order's price and quantity down to the market's steps.
    /// Unknown symbols pass through untouched.
    pub fn adjust(&self, order: &mut Order) {
        let Some(limits) = self.limits.get(&order.symbol) else {
            trace!(symbol = %order.symbol, "No limits for symbol");
            return;
        };
        if let Some(step) = limits.min_price_step {
            order.price = round_down_to_step(order.price, step);
        }
        if let Some(step) = limits.min_volume_step {
            order.quantity = round_down_to_step(order.quantity, step);
        }
    }

    /// Verify the order clears the minimum notional; the reason is returned
    /// for chain annotation.
    pub fn check(&self, order: &Order) -> Result<(), String> {
        let Some(min_notional) = self.limits.get(&order.symbol).and_then(|l| l.min_notional)
        else {
            return Ok(());
        };
        let notional = order.quantity * order.price;
        if notional < min_notional {
            return Err(format!(
                "{} {} ({} in quote coin) < MIN_NOTIONAL {}",
                order.quantity, order.symbol, notional, min_notional
            ));
        }
        Ok(())
    }
}

fn round_down_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).floor() * step
}
