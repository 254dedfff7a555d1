//! Binance spot adapter: REST client, WebSocket listeners, converters.

mod client;
mod convert;
mod stream;

pub use client::BinanceClient;
pub use convert::{
    order_from_execution_report, order_from_rest, ticker_from_event, BookTickerEvent,
    ExecutionReportEvent, RestOrder, StreamEnvelope,
};
pub use stream::BinanceStream;

pub const EXCHANGE_NAME: &str = "binance";
