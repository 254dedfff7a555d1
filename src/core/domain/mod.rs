//! Pure domain types: markets, tickers, chains, orders, persisted records.

mod chain;
mod market;
mod order;
mod record;
mod ticker;

pub use chain::{Chain, ChainStep};
pub use market::Market;
pub use order::{
    format_client_order_id, is_arbitrage_client_id, parse_arbitrage_hash8, Order, OrderSide,
    OrderStatus, TimeInForce, CLIENT_ORDER_ID_SEPARATOR,
};
pub use record::{ChainRecord, ChainStepRecord, OrderRecord};
pub use ticker::Ticker;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
