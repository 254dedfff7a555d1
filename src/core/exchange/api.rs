//! The exchange surface the engine consumes.
//!
//! Deliberately minimal: implement this trait to plug in another venue.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::domain::{Order, TimeInForce};
use crate::error::Result;

use super::limitations::SymbolLimits;

/// One tradable symbol as declared by the exchange.
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub limits: SymbolLimits,
}

/// The exchange's declared symbol universe.
#[derive(Debug, Clone, Default)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

impl ExchangeInfo {
    /// `symbol → "BASE/QUOTE"`, resolving symbol ambiguities like `USDTUSD`.
    #[must_use]
    pub fn symbol_to_base_quote(&self) -> HashMap<String, String> {
        self.symbols
            .iter()
            .map(|s| {
                (
                    s.symbol.clone(),
                    format!("{}/{}", s.base_asset, s.quote_asset),
                )
            })
            .collect()
    }

    #[must_use]
    pub fn all_markets(&self) -> Vec<String> {
        self.symbols.iter().map(|s| s.symbol.clone()).collect()
    }
}

#[async_trait]
pub trait ExchangeApi: Send + Sync {
    fn name(&self) -> &'static str;

    async fn exchange_info(&self) -> Result<ExchangeInfo>;

    /// Taker fee per symbol.
    async fn trade_fees(&self) -> Result<HashMap<String, f64>>;

    /// Account-level taker fee, `None` when the exchange doesn't report one.
    async fn default_trade_fee(&self) -> Result<Option<f64>>;

    /// Free balance per coin.
    async fn balances(&self) -> Result<HashMap<String, f64>>;

    /// Latest trade price per symbol.
    async fn latest_prices(&self) -> Result<HashMap<String, f64>>;

    /// Submit a limit order; the returned order carries the exchange's
    /// response (id, status, transaction time, raw payload).
    async fn put_limit_order(&self, order: &Order, time_in_force: TimeInForce) -> Result<Order>;

    async fn put_market_order(&self, order: &Order) -> Result<Order>;

    async fn open_orders(&self) -> Result<Vec<Order>>;

    async fn cancel_order(&self, symbol: &str, client_order_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_info_projections() {
        let info = ExchangeInfo {
            symbols: vec![
                SymbolInfo {
                    symbol: "BTCUSDT".into(),
                    base_asset: "BTC".into(),
                    quote_asset: "USDT".into(),
                    limits: SymbolLimits::default(),
                },
                SymbolInfo {
                    symbol: "ETHBTC".into(),
                    base_asset: "ETH".into(),
                    quote_asset: "BTC".into(),
                    limits: SymbolLimits::default(),
                },
            ],
        };

        let mapping = info.symbol_to_base_quote();
        assert_eq!(mapping["BTCUSDT"], "BTC/USDT");
        assert_eq!(mapping["ETHBTC"], "ETH/BTC");
        assert_eq!(info.all_markets().len(), 2);
    }
}
