use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

use crate::infrastructure::connection_manager::{BrokerConnectionConfig, ConnectionTradingMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerMode {
    Fake,
    Http,
}

impl FromStr for BrokerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fake" | "mock" => Ok(BrokerMode::Fake),
            "http" | "live" => Ok(BrokerMode::Http),
            _ => anyhow::bail!("invalid BROKER_MODE: {s}. Must be 'fake' or 'http'"),
        }
    }
}

/// Guardrails consulted by the Safety Gate's readiness verdict and by the
/// Order Submitter's pre-submit validation when `live_trading_mode` is on
/// (spec §4.14), grounded in `original_source/packages/live_config`'s
/// `LiveConfig` field set.
#[derive(Debug, Clone)]
pub struct LiveGuardrails {
    pub live_max_order_size: Decimal,
    pub live_max_order_value_usd: Decimal,
    /// Empty whitelist means no symbol restriction.
    pub live_symbol_whitelist: Vec<String>,
    pub live_daily_loss_limit_usd: Option<Decimal>,
    pub live_require_safety_checks: bool,
    pub live_require_manual_approval: bool,
}

impl Default for LiveGuardrails {
    fn default() -> Self {
        Self {
            live_max_order_size: Decimal::from(10_000),
            live_max_order_value_usd: Decimal::from(50_000),
            live_symbol_whitelist: Vec::new(),
            live_daily_loss_limit_usd: None,
            live_require_safety_checks: true,
            live_require_manual_approval: true,
        }
    }
}

/// Process-wide configuration, assembled from environment variables with
/// `.env` loaded first (spec §6.7).
#[derive(Debug, Clone)]
pub struct Config {
    pub broker_mode: BrokerMode,
    pub http_broker_base_url: String,
    pub http_broker_api_key: String,
    pub fake_broker_starting_cash: Decimal,

    pub audit_log_path: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_retention_days: i64,

    pub feature_flags_path: Option<PathBuf>,

    pub proposal_store_max_entries: usize,
    pub approval_token_ttl_minutes: i64,

    pub market_data_snapshot_ttl: Duration,
    pub market_data_bars_ttl: Duration,
    pub market_data_cache_max_entries: usize,
    pub volatility_lookback_days: usize,

    pub broker_connection: BrokerConnectionConfig,
    pub live_guardrails: LiveGuardrails,

    pub order_poll_max_attempts: u32,
    pub order_poll_interval: Duration,

    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let broker_mode_str = env::var("BROKER_MODE").unwrap_or_else(|_| "fake".to_string());
        let broker_mode = BrokerMode::from_str(&broker_mode_str)?;

        let audit_log_path = env::var("AUDIT_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./audit.jsonl"));

        let fake_broker_starting_cash = env::var("FAKE_BROKER_STARTING_CASH")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or(Decimal::from(1_000_000));

        Ok(Self {
            broker_mode,
            http_broker_base_url: env::var("BROKER_BASE_URL").unwrap_or_default(),
            http_broker_api_key: env::var("BROKER_API_KEY").unwrap_or_default(),
            fake_broker_starting_cash,

            audit_log_path,
            backup_dir: env::var("BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./backups")),
            backup_retention_days: env_parse("BACKUP_RETENTION_DAYS", 30)?,

            feature_flags_path: env::var("FEATURE_FLAGS_PATH").ok().map(PathBuf::from),

            proposal_store_max_entries: env_parse("PROPOSAL_STORE_MAX_ENTRIES", 10_000)?,
            approval_token_ttl_minutes: env_parse("APPROVAL_TOKEN_TTL_MINUTES", 5)?,

            market_data_snapshot_ttl: Duration::from_secs(env_parse(
                "MARKET_DATA_SNAPSHOT_TTL_SECS",
                5,
            )?),
            market_data_bars_ttl: Duration::from_secs(env_parse("MARKET_DATA_BARS_TTL_SECS", 300)?),
            market_data_cache_max_entries: env_parse("MARKET_DATA_CACHE_MAX_ENTRIES", 1_000)?,
            volatility_lookback_days: env_parse("VOLATILITY_LOOKBACK_DAYS", 30)?,

            broker_connection: BrokerConnectionConfig {
                host: env::var("IBKR_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env_parse("IBKR_PORT", 7497)?,
                client_id: env_parse("IBKR_CLIENT_ID", 1)?,
                mode: env::var("IBKR_MODE")
                    .ok()
                    .map(|v| ConnectionTradingMode::from_str(&v))
                    .transpose()?
                    .unwrap_or(ConnectionTradingMode::Paper),
                connect_timeout: Duration::from_secs(env_parse("IBKR_CONNECT_TIMEOUT", 10)?),
                read_timeout: Duration::from_secs(env_parse("IBKR_READ_TIMEOUT", 60)?),
                reconnect_enabled: env::var("IBKR_RECONNECT_ENABLED")
                    .map(|v| v != "false")
                    .unwrap_or(true),
                reconnect_max_retries: env_parse("IBKR_RECONNECT_MAX_RETRIES", 5)?,
                reconnect_delay_base: env_parse("IBKR_RECONNECT_DELAY_BASE", 2.0)?,
                readonly_mode: env::var("IBKR_READONLY_MODE")
                    .map(|v| v == "true")
                    .unwrap_or(false),
                failure_threshold: env_parse("BROKER_CIRCUIT_FAILURE_THRESHOLD", 3)?,
                success_threshold: env_parse("BROKER_CIRCUIT_SUCCESS_THRESHOLD", 2)?,
                circuit_timeout: Duration::from_secs(env_parse("BROKER_CIRCUIT_TIMEOUT_SECS", 60)?),
            },
            live_guardrails: LiveGuardrails {
                live_max_order_size: env::var("LIVE_MAX_ORDER_SIZE")
                    .ok()
                    .and_then(|v| Decimal::from_str(&v).ok())
                    .unwrap_or_else(|| LiveGuardrails::default().live_max_order_size),
                live_max_order_value_usd: env::var("LIVE_MAX_ORDER_VALUE_USD")
                    .ok()
                    .and_then(|v| Decimal::from_str(&v).ok())
                    .unwrap_or_else(|| LiveGuardrails::default().live_max_order_value_usd),
                live_symbol_whitelist: env::var("LIVE_SYMBOL_WHITELIST")
                    .ok()
                    .map(|v| {
                        v.split(',')
                            .map(|s| s.trim().to_uppercase())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                live_daily_loss_limit_usd: env::var("LIVE_DAILY_LOSS_LIMIT_USD")
                    .ok()
                    .and_then(|v| Decimal::from_str(&v).ok()),
                live_require_safety_checks: env::var("LIVE_REQUIRE_SAFETY_CHECKS")
                    .map(|v| v != "false")
                    .unwrap_or(true),
                live_require_manual_approval: env::var("LIVE_REQUIRE_MANUAL_APPROVAL")
                    .map(|v| v != "false")
                    .unwrap_or(true),
            },

            order_poll_max_attempts: env_parse("ORDER_POLL_MAX_ATTEMPTS", 30)?,
            order_poll_interval: Duration::from_millis(env_parse("ORDER_POLL_INTERVAL_MS", 1000)?),

            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
        })
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}"))
            .context(format!("parsing env var {key}")),
        Err(_) => Ok(default),
    }
}
