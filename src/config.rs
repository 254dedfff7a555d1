//! Runtime configuration.
//!
//! Loaded from a TOML file with every section optional; missing sections fall
//! back to defaults mirroring the behaviour the engine was tuned with.
//! Exchange credentials are never read from the file, only from the
//! environment (`BINANCE_API_KEY` / `BINANCE_API_SECRET`, `.env` supported).

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::core::domain::TimeInForce;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub arbitrage: ArbitrageConfig,
    #[serde(default)]
    pub trade: TradeConfig,
    #[serde(default)]
    pub balance: BalanceConfig,
    #[serde(default)]
    pub cancelator: CancelatorConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub api_url: String,
    pub ws_url: String,
    /// Timeout applied to every REST call.
    pub request_timeout_secs: u64,
    pub time_in_force: TimeInForce,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.binance.com".into(),
            ws_url: "wss://stream.binance.com:9443".into(),
            request_timeout_secs: 10,
            time_in_force: TimeInForce::Ioc,
        }
    }
}

impl ExchangeConfig {
    /// Read API credentials from the environment.
    pub fn credentials(&self) -> Result<(String, String)> {
        let key = std::env::var("BINANCE_API_KEY")
            .map_err(|_| Error::Config("BINANCE_API_KEY is not set".into()))?;
        let secret = std::env::var("BINANCE_API_SECRET")
            .map_err(|_| Error::Config("BINANCE_API_SECRET is not set".into()))?;
        Ok((key, secret))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArbitrageConfig {
    /// Coin allowlist. Markets whose base or quote falls outside this set are
    /// ignored entirely. An empty set means "trade everything".
    pub coins: HashSet<String>,
    /// Fire each profitable chain the moment it is found instead of batching
    /// all findings of one evaluation pass into a single message.
    pub fire_chain_asap: bool,
    /// Fee applied to markets missing from the exchange fee table.
    pub default_fee: f64,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            coins: ["USDT", "BUSD", "BTC", "ETH", "BNB", "EUR", "DOGE"]
                .into_iter()
                .map(String::from)
                .collect(),
            fire_chain_asap: false,
            default_fee: 0.001,
        }
    }
}

/// Break-even price spread applied to fired orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakEvenMode {
    /// Spread each leg's price by the whole chain ROI.
    Full,
    /// Spread each leg's price by ROI divided across the three legs.
    PerLeg,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradeConfig {
    /// Chains below this USD profit are recorded but never fired.
    pub profit_threshold_usd: f64,
    /// Maximum fraction of a coin balance a single order may consume.
    pub max_balance_ratio_per_order: f64,
    /// Identical chain+ROI sightings within this window are dropped.
    pub duplication_timeframe_ms: i64,
    /// Only fire the most profitable chain of each batch.
    pub fire_only_top: bool,
    /// Sort batches by ROI; when false, by absolute profit.
    pub sort_by_roi: bool,
    pub break_even: BreakEvenMode,
    /// Number of order executor workers.
    pub executors: usize,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            profit_threshold_usd: 0.01,
            max_balance_ratio_per_order: 1.0,
            duplication_timeframe_ms: 1_000,
            fire_only_top: true,
            sort_by_roi: true,
            break_even: BreakEvenMode::PerLeg,
            executors: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub updater_period_secs: u64,
    pub checker_period_secs: u64,
    /// Fraction of the initial portfolio value we tolerate losing before the
    /// stop-loss flag halts trading.
    pub stop_loss_ratio: f64,
    /// Coin used to express portfolio value.
    pub usd_coin: String,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            updater_period_secs: 5,
            checker_period_secs: 10,
            stop_loss_ratio: 0.2,
            usd_coin: "USDT".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CancelatorConfig {
    pub enabled: bool,
    /// Open orders older than this are cancelled.
    pub order_ttl_ms: i64,
    pub run_period_ms: u64,
}

impl Default for CancelatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            order_ttl_ms: 3_000,
            run_period_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub database_url: String,
    /// Upper bound on one batched write of evaluated chains.
    pub max_batch_size: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            database_url: "triarb.sqlite".into(),
            max_batch_size: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.exchange.api_url.is_empty() {
            return Err(Error::Config("exchange.api_url cannot be empty".into()));
        }
        if self.exchange.ws_url.is_empty() {
            return Err(Error::Config("exchange.ws_url cannot be empty".into()));
        }
        if self.trade.executors == 0 {
            return Err(Error::Config("trade.executors must be at least 1".into()));
        }
        if self.trade.max_balance_ratio_per_order <= 0.0
            || self.trade.max_balance_ratio_per_order > 1.0
        {
            return Err(Error::Config(
                "trade.max_balance_ratio_per_order must be within (0, 1]".into(),
            ));
        }
        if self.balance.stop_loss_ratio <= 0.0 || self.balance.stop_loss_ratio >= 1.0 {
            return Err(Error::Config(
                "balance.stop_loss_ratio must be within (0, 1)".into(),
            ));
        }
        if self.telemetry.max_batch_size == 0 {
            return Err(Error::Config(
                "telemetry.max_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn init_logging(&self) {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.logging.level.clone()));

        if self.logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        } else {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
