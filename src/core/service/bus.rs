//! Typed in-process queues coupling the worker loops.
//!
//! Every queue is bounded and FIFO. Producers await on saturation, with one
//! exception: the all-cycles telemetry feed is a broadcast ring, so a slow
//! telemetry drainer loses the oldest batches instead of stalling the
//! evaluation path. There is no ordering across queues.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, warn};

use crate::core::domain::{Chain, Order, Ticker};

const TICKERS_CAPACITY: usize = 10_000;
const POSITIVE_CYCLES_CAPACITY: usize = 1_024;
const STORE_CYCLES_CAPACITY: usize = 10_000;
const FIRE_ORDERS_CAPACITY: usize = 1_024;
const ALL_CYCLES_CAPACITY: usize = 1_024;

/// Message consumed by the order executor pool.
#[derive(Debug)]
pub enum ExecutorCommand {
    Fire(Order),
    /// Sentinel: a worker that takes this re-enqueues it for its peers and
    /// exits, draining the whole pool.
    Shutdown,
}

/// The bus endpoints held by producers, plus the shared stop-trading flag.
pub struct Bus {
    tickers_tx: mpsc::Sender<Ticker>,
    positive_tx: mpsc::Sender<Vec<Chain>>,
    store_tx: mpsc::Sender<Chain>,
    all_tx: broadcast::Sender<Vec<Chain>>,
    fire_tx: mpsc::Sender<ExecutorCommand>,
    fire_rx: Arc<Mutex<mpsc::Receiver<ExecutorCommand>>>,
    stop_trading: AtomicBool,
}

/// Single-consumer receiving ends, taken once by the orchestrator.
pub struct BusConsumers {
    pub tickers: mpsc::Receiver<Ticker>,
    pub positive_cycles: mpsc::Receiver<Vec<Chain>>,
    pub store_cycles: mpsc::Receiver<Chain>,
}

impl Bus {
    #[must_use]
    pub fn new() -> (Arc<Self>, BusConsumers) {
        let (tickers_tx, tickers_rx) = mpsc::channel(TICKERS_CAPACITY);
        let (positive_tx, positive_rx) = mpsc::channel(POSITIVE_CYCLES_CAPACITY);
        let (store_tx, store_rx) = mpsc::channel(STORE_CYCLES_CAPACITY);
        let (fire_tx, fire_rx) = mpsc::channel(FIRE_ORDERS_CAPACITY);
        let (all_tx, _) = broadcast::channel(ALL_CYCLES_CAPACITY);

        let bus = Arc::new(Self {
            tickers_tx,
            positive_tx,
            store_tx,
            all_tx,
            fire_tx,
            fire_rx: Arc::new(Mutex::new(fire_rx)),
            stop_trading: AtomicBool::new(false),
        });
        let consumers = BusConsumers {
            tickers: tickers_rx,
            positive_cycles: positive_rx,
            store_cycles: store_rx,
        };
        (bus, consumers)
    }

    pub async fn publish_ticker(&self, ticker: Ticker) {
        if self.tickers_tx.send(ticker).await.is_err() {
            warn!("Tickers queue closed, dropping ticker");
        }
    }

    /// One batch per evaluator invocation.
    pub async fn publish_positive_batch(&self, chains: Vec<Chain>) {
        if self.positive_tx.send(chains).await.is_err() {
            warn!("Positive cycles queue closed, dropping batch");
        }
    }

    pub async fn publish_store_chain(&self, chain: Chain) {
        if self.store_tx.send(chain).await.is_err() {
            warn!("Store cycles queue closed, dropping chain");
        }
    }

    /// Telemetry feed of every evaluated batch. Never blocks; saturated
    /// subscribers lose the oldest batches.
    pub fn publish_all_batch(&self, chains: Vec<Chain>) {
        // No subscribers is fine (telemetry disabled).
        let _ = self.all_tx.send(chains);
    }

    pub async fn fire_order(&self, order: Order) {
        if self.fire_tx.send(ExecutorCommand::Fire(order)).await.is_err() {
            warn!("Fire orders queue closed, dropping order");
        }
    }

    /// Push the shutdown sentinel for the executor pool.
    pub async fn shutdown_executors(&self) {
        if self.fire_tx.send(ExecutorCommand::Shutdown).await.is_err() {
            debug!("Fire orders queue already closed");
        }
    }

    #[must_use]
    pub fn subscribe_all_cycles(&self) -> broadcast::Receiver<Vec<Chain>> {
        self.all_tx.subscribe()
    }

    /// Shared receiving end of the fire-orders queue; every executor worker
    /// locks it to take one command at a time.
    #[must_use]
    pub fn fire_orders_receiver(&self) -> Arc<Mutex<mpsc::Receiver<ExecutorCommand>>> {
        Arc::clone(&self.fire_rx)
    }

    #[must_use]
    pub fn is_stop_trading(&self) -> bool {
        self.stop_trading.load(Ordering::Relaxed)
    }

    pub fn set_stop_trading(&self, stop: bool) {
        self.stop_trading.store(stop, Ordering::Relaxed);
    }
}
