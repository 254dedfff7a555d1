//! Binance WebSocket listeners.
//!
//! Two streams are consumed: combined `bookTicker` market data, chunked under
//! the per-connection subscription cap, and the user-data stream whose
//! `executionReport` events keep the order store current. Both reconnect
//! until shutdown.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

use crate::core::domain::Ticker;
use crate::core::market::MarketData;
use crate::core::service::Bus;
use crate::error::Result;
use crate::store::OrderStore;

use super::client::BinanceClient;
use super::convert::{
    order_from_execution_report, ticker_from_event, BookTickerEvent, ExecutionReportEvent,
    StreamEnvelope,
};

const MAX_STREAMS_PER_CONNECTION: usize = 512;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const LISTEN_KEY_KEEPALIVE: Duration = Duration::from_secs(30 * 60);

pub struct BinanceStream {
    ws_url: String,
}

impl BinanceStream {
    #[must_use]
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }

    /// Listen to book-top updates for every market in `market_data`, writing
    /// each ticker into the market data map and onto the bus.
    pub async fn run_book_tickers(
        &self,
        market_data: Arc<MarketData>,
        bus: Arc<Bus>,
        shutdown: watch::Receiver<bool>,
    ) {
        let symbols: Vec<String> = market_data.symbols().map(str::to_lowercase).collect();
        info!(markets = symbols.len(), "Starting market data streams");

        let mut handles = Vec::new();
        for chunk in symbols.chunks(MAX_STREAMS_PER_CONNECTION) {
            let streams = chunk
                .iter()
                .map(|s| format!("{}@bookTicker", s))
                .collect::<Vec<_>>()
                .join("/");
            let url = format!("{}/stream?streams={}", self.ws_url, streams);
            handles.push(tokio::spawn(book_ticker_connection(
                url,
                Arc::clone(&market_data),
                Arc::clone(&bus),
                shutdown.clone(),
            )));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Listen to the user-data stream, persisting order execution reports.
    pub async fn run_user_stream(
        &self,
        client: Arc<BinanceClient>,
        store: Arc<dyn OrderStore>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self
                .user_stream_once(&client, store.as_ref(), &mut shutdown)
                .await
            {
                Ok(()) if *shutdown.borrow() => break,
                Ok(()) => info!("User stream ended, reconnecting"),
                Err(e) => warn!(error = %e, "User stream failed, reconnecting"),
            }
            tokio::select! {
                () = tokio::time::sleep(RECONNECT_DELAY) => {}
                _ = shutdown.changed() => break,
            }
        }
        debug!("User stream listener stopped");
    }

    async fn user_stream_once(
        &self,
        client: &BinanceClient,
        store: &dyn OrderStore,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let listen_key = client.create_listen_key().await?;
        let url = format!("{}/ws/{}", self.ws_url, listen_key);

        let (ws, response) = connect_async(&url).await?;
        info!(status = %response.status(), "User stream connected");
        let (mut write, mut read) = ws.split();

        let mut keepalive = tokio::time::interval(LISTEN_KEY_KEEPALIVE);
        keepalive.tick().await; // first tick completes immediately

        loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    if let Err(e) = client.keepalive_listen_key(&listen_key).await {
                        warn!(error = %e, "Listen key keepalive failed");
                    }
                }
                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => match msg {
                    None => return Ok(()),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(Message::Text(text))) => handle_user_event(&text, store),
                    Some(Ok(Message::Ping(payload))) => {
                        write.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "Server closed user stream");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn book_ticker_connection(
    url: String,
    market_data: Arc<MarketData>,
    bus: Arc<Bus>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        match book_tickers_once(&url, &market_data, &bus, &mut shutdown).await {
            Ok(()) if *shutdown.borrow() => break,
            Ok(()) => info!("Market data stream ended, reconnecting"),
            Err(e) => warn!(error = %e, "Market data stream failed, reconnecting"),
        }
        tokio::select! {
            () = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = shutdown.changed() => break,
        }
    }
    debug!("Market data listener stopped");
}

async fn book_tickers_once(
    url: &str,
    market_data: &MarketData,
    bus: &Bus,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    let (ws, response) = connect_async(url).await?;
    info!(status = %response.status(), "Market data stream connected");
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            msg = read.next() => match msg {
                None => return Ok(()),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => handle_book_ticker(&text, market_data, bus).await,
                Some(Ok(Message::Ping(payload))) => {
                    write.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Server closed market data stream");
                    return Ok(());
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

async fn handle_book_ticker(text: &str, market_data: &MarketData, bus: &Bus) {
    let envelope: StreamEnvelope<BookTickerEvent> = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            trace!(error = %e, "Ignoring non-ticker frame");
            return;
        }
    };
    // Unknown symbol means the market fell outside the coin allowlist.
    let Some(market) = market_data.market_for_symbol(&envelope.data.symbol) else {
        return;
    };
    let ticker: Ticker = match ticker_from_event(&envelope.data, market.clone()) {
        Ok(ticker) => ticker,
        Err(e) => {
            warn!(error = %e, "Bad book ticker event");
            return;
        }
    };
    market_data.put(ticker.clone());
    bus.publish_ticker(ticker).await;
}

fn handle_user_event(text: &str, store: &dyn OrderStore) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };
    if value.get("e").and_then(|v| v.as_str()) != Some("executionReport") {
        return;
    }
    debug!("Got order execution report");
    let event: ExecutionReportEvent = match serde_json::from_value(value.clone()) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Bad execution report");
            return;
        }
    };
    match order_from_execution_report(&event, value) {
        Ok(order) => {
            if let Err(e) = store.upsert(&order) {
                warn!(error = %e, client_order_id = %order.client_order_id, "Failed to persist order event");
            }
        }
        Err(e) => warn!(error = %e, "Cannot convert execution report"),
    }
}
