//! Construction and supervision of the whole worker fleet.
//!
//! Workers communicate exclusively through the bus; nothing here holds a
//! reference into another worker's state. Shutdown is a watch signal plus the
//! executor-pool sentinel, then a bounded join on every task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::core::arbitrage::TriangleEvaluator;
use crate::core::exchange::binance::{BinanceClient, BinanceStream};
use crate::core::exchange::{ExchangeApi, ExchangeLimitations};
use crate::core::market::MarketData;
use crate::core::service::{BalancesRegistry, Bus};
use crate::error::{Error, Result};
use crate::store::{OrderStore, SqliteStore, TelemetrySink};

use super::arbitrage_loop::ArbitrageLoop;
use super::balance_checker::BalancesChecker;
use super::balance_updater::BalanceUpdater;
use super::cancelator::OrderCancelator;
use super::executor::OrderExecutor;
use super::telemetry::TelemetryWriter;
use super::trade_manager::TradeManager;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run the engine until a shutdown signal arrives.
pub async fn run(config: Config) -> Result<()> {
    let (api_key, api_secret) = config.exchange.credentials()?;
    let client = Arc::new(BinanceClient::new(
        config.exchange.api_url.clone(),
        api_key,
        api_secret,
        Duration::from_secs(config.exchange.request_timeout_secs),
    )?);
    let api: Arc<dyn ExchangeApi> = client.clone();

    info!(exchange = api.name(), "Fetching exchange info");
    let info = api.exchange_info().await?;
    let limitations = Arc::new(ExchangeLimitations::from_exchange_info(&info));

    let fees = match api.trade_fees().await {
        Ok(fees) => fees,
        Err(e) => {
            warn!(error = %e, "Failed to fetch trade fees, falling back to default");
            Default::default()
        }
    };
    let default_fee = match api.default_trade_fee().await {
        Ok(Some(fee)) => fee,
        _ => config.arbitrage.default_fee,
    };

    let market_data = Arc::new(MarketData::new(
        info.symbol_to_base_quote(),
        Some(config.arbitrage.coins.clone()),
    ));
    if market_data.cycle_count() == 0 {
        return Err(Error::Config(
            "no triangular cycles within the configured coin allowlist".into(),
        ));
    }

    let evaluator = TriangleEvaluator::new(fees, default_fee);
    let (bus, consumers) = Bus::new();
    let registry = Arc::new(BalancesRegistry::new(config.balance.usd_coin.clone()));

    let store = Arc::new(SqliteStore::open(&config.telemetry.database_url)?);
    let order_store: Arc<dyn OrderStore> = store.clone();
    let telemetry_sink: Arc<dyn TelemetrySink> = store;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    // Exchange listeners.
    {
        let stream = BinanceStream::new(config.exchange.ws_url.clone());
        let market_data = Arc::clone(&market_data);
        let bus = Arc::clone(&bus);
        let shutdown = shutdown_rx.clone();
        tasks.push((
            "market-data-listener",
            tokio::spawn(async move {
                stream.run_book_tickers(market_data, bus, shutdown).await;
            }),
        ));
    }
    {
        let stream = BinanceStream::new(config.exchange.ws_url.clone());
        let client = Arc::clone(&client);
        let order_store = Arc::clone(&order_store);
        let shutdown = shutdown_rx.clone();
        tasks.push((
            "user-data-listener",
            tokio::spawn(async move {
                stream.run_user_stream(client, order_store, shutdown).await;
            }),
        ));
    }

    // Evaluation path.
    {
        let arb_loop = ArbitrageLoop::new(
            Arc::clone(&bus),
            Arc::clone(&market_data),
            evaluator,
            config.arbitrage.fire_chain_asap,
        );
        tasks.push((
            "arbitrage-loop",
            tokio::spawn(arb_loop.run(consumers.tickers, shutdown_rx.clone())),
        ));
    }
    {
        let manager = TradeManager::new(
            Arc::clone(&bus),
            Arc::clone(&limitations),
            Arc::clone(&registry),
            config.trade.clone(),
        );
        tasks.push((
            "trade-manager",
            tokio::spawn(manager.run(consumers.positive_cycles, shutdown_rx.clone())),
        ));
    }

    // Executor pool; terminated by the sentinel, not the watch signal.
    for id in 0..config.trade.executors {
        let executor = OrderExecutor::new(
            id,
            Arc::clone(&bus),
            Arc::clone(&api),
            Arc::clone(&order_store),
            config.exchange.time_in_force,
        );
        tasks.push(("order-executor", tokio::spawn(executor.run())));
    }

    // Balance sideband.
    {
        let updater = BalanceUpdater::new(
            Arc::clone(&api),
            Arc::clone(&registry),
            Duration::from_secs(config.balance.updater_period_secs),
        );
        tasks.push((
            "balance-updater",
            tokio::spawn(updater.run(shutdown_rx.clone())),
        ));
    }
    {
        let checker = BalancesChecker::new(
            Arc::clone(&bus),
            Arc::clone(&registry),
            config.arbitrage.coins.clone(),
            config.balance.stop_loss_ratio,
            Duration::from_secs(config.balance.checker_period_secs),
        );
        tasks.push((
            "balance-checker",
            tokio::spawn(checker.run(shutdown_rx.clone())),
        ));
    }

    if config.cancelator.enabled {
        let cancelator = OrderCancelator::new(
            Arc::clone(&api),
            config.cancelator.order_ttl_ms,
            Duration::from_millis(config.cancelator.run_period_ms),
        );
        tasks.push((
            "order-cancelator",
            tokio::spawn(cancelator.run(shutdown_rx.clone())),
        ));
    }

    // Telemetry drainers.
    {
        let writer = TelemetryWriter::new(
            Arc::clone(&telemetry_sink),
            config.telemetry.max_batch_size,
        );
        tasks.push((
            "store-cycles-writer",
            tokio::spawn(writer.run_store_cycles(consumers.store_cycles, shutdown_rx.clone())),
        ));
    }
    {
        let writer = TelemetryWriter::new(
            Arc::clone(&telemetry_sink),
            config.telemetry.max_batch_size,
        );
        let all_cycles = bus.subscribe_all_cycles();
        tasks.push((
            "all-cycles-writer",
            tokio::spawn(writer.run_all_cycles(all_cycles, shutdown_rx.clone())),
        ));
    }

    info!(
        workers = tasks.len(),
        markets = market_data.market_count(),
        cycles = market_data.cycle_count(),
        "Engine started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping workers");
    let _ = shutdown_tx.send(true);
    bus.shutdown_executors().await;

    for (name, mut task) in tasks {
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!(worker = name, "Worker did not stop in time, aborting");
            task.abort();
        }
    }
    info!("Engine stopped");
    Ok(())
}
