use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use triarb::config::Config;
use triarb::core::exchange::binance::BinanceClient;
use triarb::core::exchange::ExchangeApi;
use triarb::core::market::MarketData;

#[derive(Parser)]
#[command(
    name = "triarb",
    version,
    about = "Triangular arbitrage engine for crypto spot exchanges"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the trading engine (default).
    Run,
    /// Validate configuration and exchange connectivity.
    Check,
    /// Print the triangular cycle universe for the configured coins.
    Cycles,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        match Config::load(&cli.config) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    config.init_logging();
    info!("triarb starting");

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => triarb::app::run(config).await.map_err(anyhow::Error::from),
        Command::Check => check(config).await,
        Command::Cycles => cycles(config).await,
    };

    if let Err(e) = result {
        error!(error = %e, "Fatal error");
        std::process::exit(1);
    }

    info!("triarb stopped");
}

fn public_client(config: &Config) -> anyhow::Result<BinanceClient> {
    Ok(BinanceClient::new(
        config.exchange.api_url.clone(),
        String::new(),
        String::new(),
        std::time::Duration::from_secs(config.exchange.request_timeout_secs),
    )?)
}

async fn check(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    println!("Configuration OK");

    match config.exchange.credentials() {
        Ok(_) => println!("API credentials present"),
        Err(_) => println!("API credentials missing (BINANCE_API_KEY / BINANCE_API_SECRET)"),
    }

    let client = public_client(&config)?;
    let info = client.exchange_info().await?;
    println!("Exchange reachable: {} trading symbols", info.symbols.len());

    Ok(())
}

async fn cycles(config: Config) -> anyhow::Result<()> {
    let client = public_client(&config)?;
    let info = client.exchange_info().await?;

    let market_data = MarketData::new(
        info.symbol_to_base_quote(),
        Some(config.arbitrage.coins.clone()),
    );
    println!(
        "{} markets across {} coins form {} triangular cycles",
        market_data.market_count(),
        config.arbitrage.coins.len(),
        market_data.cycle_count()
    );

    Ok(())
}
