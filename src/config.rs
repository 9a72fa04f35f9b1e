//! Configuration loading and validation
//!
//! Sources, lowest precedence first: built-in defaults (which honour the
//! plain variable names such as `RPC_URL` and `TARGET_ADDRESS`), an optional
//! TOML file, then `SWEEPER__SECTION__KEY` environment variables.

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::batch::BatchConfig;
use crate::emergency::EmergencyConfig;
use crate::monitor::MonitorConfig;
use crate::sweep::engine::MAX_SUBMIT_ATTEMPTS;
use crate::sweep::{FeeConfig, SweepConfig};
use crate::units::{parse_ether, parse_gwei};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub fees: FeeSettings,
    #[serde(default)]
    pub sweep: SweepSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub emergency: EmergencySettings,
    #[serde(default)]
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// HTTP JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// WebSocket endpoint for new-block notifications
    #[serde(default = "default_ws_url")]
    pub ws_url: Option<String>,
    /// Expected chain id; not enforced when unset
    #[serde(default = "default_chain_id")]
    pub chain_id: Option<u64>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_ws_ping_interval_secs")]
    pub ws_ping_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_recheck_interval_ms")]
    pub recheck_interval_ms: u64,
    #[serde(default = "default_use_websocket")]
    pub use_websocket: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeSettings {
    /// Fee acceleration as a percentage (150 = 1.5x)
    #[serde(default = "default_gas_multiplier_pct")]
    pub gas_multiplier_pct: u32,
    #[serde(default = "default_max_gas_price_gwei")]
    pub max_gas_price_gwei: String,
    #[serde(default = "default_fallback_gas_price_gwei")]
    pub fallback_gas_price_gwei: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepSettings {
    #[serde(default = "default_minimum_balance_eth")]
    pub minimum_balance_eth: String,
    #[serde(default = "default_burn_threshold_eth")]
    pub burn_threshold_eth: String,
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
    #[serde(default = "default_max_submit_attempts")]
    pub max_submit_attempts: u32,
    #[serde(default)]
    pub estimate_gas: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmergencySettings {
    #[serde(default = "default_emergency_multiplier_pct")]
    pub gas_multiplier_pct: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Hex signing key of the monitored account
    #[serde(default = "default_private_key")]
    pub private_key: Option<String>,
    /// Default sweep destination
    #[serde(default = "default_target_address")]
    pub target_address: Option<String>,
}

/// Non-empty value of the first variable that is set
fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_first(&[name]).and_then(|value| value.parse().ok())
}

/// Convert a float multiplier ("1.5") into an integer percentage (150)
pub fn multiplier_to_pct(value: &str) -> Option<u32> {
    let multiplier: f64 = value.trim().parse().ok()?;
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return None;
    }
    Some((multiplier * 100.0).round() as u32)
}

/// Parse a hex account address
pub fn parse_address(value: &str) -> crate::Result<Address> {
    Address::from_str(value.trim())
        .map_err(|e| crate::Error::InvalidAddress(format!("{}: {}", value, e)))
}

fn default_rpc_url() -> String {
    env_first(&["RPC_URL", "MAINNET_RPC_URL"]).unwrap_or_default()
}

fn default_ws_url() -> Option<String> {
    env_first(&["WS_URL", "MAINNET_WS_URL"])
}

fn default_chain_id() -> Option<u64> {
    env_parse("CHAIN_ID")
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_receipt_poll_interval_ms() -> u64 {
    1_000
}

fn default_ws_ping_interval_secs() -> u64 {
    30
}

fn default_recheck_interval_ms() -> u64 {
    env_parse("RECHECK_INTERVAL").unwrap_or(3_000)
}

fn default_use_websocket() -> bool {
    env_first(&["USE_WEBSOCKET"])
        .map(|value| value == "true")
        .unwrap_or(true)
}

fn default_gas_multiplier_pct() -> u32 {
    env_first(&["GAS_MULTIPLIER"])
        .and_then(|value| multiplier_to_pct(&value))
        .unwrap_or(150)
}

fn default_max_gas_price_gwei() -> String {
    env_first(&["MAX_GAS_PRICE"]).unwrap_or_else(|| "200".to_string())
}

fn default_fallback_gas_price_gwei() -> String {
    "20".to_string()
}

fn default_minimum_balance_eth() -> String {
    env_first(&["MINIMUM_BALANCE"]).unwrap_or_else(|| "0.001".to_string())
}

fn default_burn_threshold_eth() -> String {
    env_first(&["BURN_THRESHOLD"]).unwrap_or_else(|| "0.001".to_string())
}

fn default_confirmation_timeout_ms() -> u64 {
    env_parse("CONFIRMATION_TIMEOUT").unwrap_or(30_000)
}

fn default_max_submit_attempts() -> u32 {
    2
}

fn default_batch_size() -> usize {
    env_parse("BATCH_SIZE").unwrap_or(5)
}

fn default_stagger_ms() -> u64 {
    100
}

fn default_chunk_delay_ms() -> u64 {
    1_000
}

fn default_emergency_multiplier_pct() -> u32 {
    env_first(&["EMERGENCY_GAS_MULTIPLIER"])
        .and_then(|value| multiplier_to_pct(&value))
        .unwrap_or(300)
}

fn default_private_key() -> Option<String> {
    env_first(&["PRIVATE_KEY"])
}

fn default_target_address() -> Option<String> {
    env_first(&["TARGET_ADDRESS", "SECURE_WALLET_ADDRESS"])
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            ws_url: default_ws_url(),
            chain_id: default_chain_id(),
            connect_timeout_ms: default_connect_timeout_ms(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            ws_ping_interval_secs: default_ws_ping_interval_secs(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            recheck_interval_ms: default_recheck_interval_ms(),
            use_websocket: default_use_websocket(),
        }
    }
}

impl Default for FeeSettings {
    fn default() -> Self {
        Self {
            gas_multiplier_pct: default_gas_multiplier_pct(),
            max_gas_price_gwei: default_max_gas_price_gwei(),
            fallback_gas_price_gwei: default_fallback_gas_price_gwei(),
        }
    }
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            minimum_balance_eth: default_minimum_balance_eth(),
            burn_threshold_eth: default_burn_threshold_eth(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
            max_submit_attempts: default_max_submit_attempts(),
            estimate_gas: false,
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            stagger_ms: default_stagger_ms(),
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

impl Default for EmergencySettings {
    fn default() -> Self {
        Self {
            gas_multiplier_pct: default_emergency_multiplier_pct(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key: default_private_key(),
            target_address: default_target_address(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SWEEPER__)
            .add_source(
                config::Environment::with_prefix("SWEEPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.trim().is_empty() {
            anyhow::bail!("network.rpc_url is required (or set RPC_URL)");
        }

        if self.fees.gas_multiplier_pct == 0 {
            anyhow::bail!("fees.gas_multiplier_pct must be positive");
        }

        if self.emergency.gas_multiplier_pct == 0 {
            anyhow::bail!("emergency.gas_multiplier_pct must be positive");
        }

        if self.batch.batch_size == 0 {
            anyhow::bail!("batch.batch_size must be positive");
        }

        if !(1..=MAX_SUBMIT_ATTEMPTS).contains(&self.sweep.max_submit_attempts) {
            anyhow::bail!(
                "sweep.max_submit_attempts must be between 1 and {}, got {}",
                MAX_SUBMIT_ATTEMPTS,
                self.sweep.max_submit_attempts
            );
        }

        // Amounts must parse before anything connects
        self.fee_config()?;
        self.sweep_config()?;
        self.monitor_config()?;

        if self.monitor.use_websocket && self.network.ws_url.is_none() {
            tracing::warn!("monitor.use_websocket is set but network.ws_url is not; monitoring will poll");
        }

        Ok(())
    }

    /// Whether sessions should try new-block notifications first
    pub fn use_push(&self) -> bool {
        self.monitor.use_websocket && self.network.ws_url.is_some()
    }

    /// Configured default target, parsed
    pub fn target_address(&self) -> crate::Result<Option<Address>> {
        self.wallet
            .target_address
            .as_deref()
            .map(parse_address)
            .transpose()
    }

    pub fn fee_config(&self) -> crate::Result<FeeConfig> {
        Ok(FeeConfig {
            multiplier_pct: self.fees.gas_multiplier_pct,
            max_fee_price: parse_gwei(&self.fees.max_gas_price_gwei)?,
            fallback_fee_price: parse_gwei(&self.fees.fallback_gas_price_gwei)?,
        })
    }

    pub fn sweep_config(&self) -> crate::Result<SweepConfig> {
        Ok(SweepConfig {
            minimum_balance: parse_ether(&self.sweep.minimum_balance_eth)?,
            confirmation_timeout: Duration::from_millis(self.sweep.confirmation_timeout_ms),
            max_submit_attempts: self.sweep.max_submit_attempts,
            default_target: self.target_address()?,
            estimate_gas: self.sweep.estimate_gas,
        })
    }

    pub fn monitor_config(&self) -> crate::Result<MonitorConfig> {
        Ok(MonitorConfig {
            recheck_interval: Duration::from_millis(self.monitor.recheck_interval_ms),
            use_push: self.use_push(),
            burn_threshold: parse_ether(&self.sweep.burn_threshold_eth)?,
        })
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch.batch_size,
            stagger: Duration::from_millis(self.batch.stagger_ms),
            chunk_delay: Duration::from_millis(self.batch.chunk_delay_ms),
        }
    }

    pub fn emergency_config(&self) -> EmergencyConfig {
        EmergencyConfig {
            fee_multiplier_pct: self.emergency.gas_multiplier_pct,
        }
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Network:
    rpc_url: {}
    ws_url: {}
    chain_id: {}
    connect_timeout: {}ms
  Monitor:
    recheck_interval: {}ms
    use_websocket: {}
  Fees:
    gas_multiplier: {}%
    max_gas_price: {} gwei
    fallback_gas_price: {} gwei
  Sweep:
    minimum_balance: {} ETH
    burn_threshold: {} ETH
    confirmation_timeout: {}ms
    max_submit_attempts: {}
  Batch:
    batch_size: {}
    stagger: {}ms
    chunk_delay: {}ms
  Emergency:
    gas_multiplier: {}%
  Wallet:
    private_key: {}
    target_address: {}
"#,
            mask_url(&self.network.rpc_url),
            self.network
                .ws_url
                .as_deref()
                .map(mask_url)
                .unwrap_or_else(|| "(not set)".to_string()),
            self.network
                .chain_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "(any)".to_string()),
            self.network.connect_timeout_ms,
            self.monitor.recheck_interval_ms,
            self.monitor.use_websocket,
            self.fees.gas_multiplier_pct,
            self.fees.max_gas_price_gwei,
            self.fees.fallback_gas_price_gwei,
            self.sweep.minimum_balance_eth,
            self.sweep.burn_threshold_eth,
            self.sweep.confirmation_timeout_ms,
            self.sweep.max_submit_attempts,
            self.batch.batch_size,
            self.batch.stagger_ms,
            self.batch.chunk_delay_ms,
            self.emergency.gas_multiplier_pct,
            if self.wallet.private_key.is_some() {
                "***"
            } else {
                "(not set)"
            },
            self.wallet.target_address.as_deref().unwrap_or("(not set)"),
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{ETHER, GWEI};

    fn valid() -> Config {
        let mut config = Config::default();
        config.network.rpc_url = "http://127.0.0.1:8545".to_string();
        config
    }

    #[test]
    fn test_multiplier_to_pct() {
        assert_eq!(multiplier_to_pct("1.5"), Some(150));
        assert_eq!(multiplier_to_pct("3.0"), Some(300));
        assert_eq!(multiplier_to_pct("0"), None);
        assert_eq!(multiplier_to_pct("fast"), None);
    }

    #[test]
    fn test_validate_rejects_missing_rpc() {
        let mut config = valid();
        config.network.rpc_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = valid();
        config.sweep.max_submit_attempts = 4;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.batch.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.fees.max_gas_price_gwei = "-5".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_address() {
        let address = parse_address("0x000000000000000000000000000000000000dEaD").unwrap();
        assert_eq!(address, Address::from_low_u64_be(0xdead));
        assert!(matches!(
            parse_address("0x1234"),
            Err(crate::Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweeper.toml");
        std::fs::write(
            &path,
            r#"
[network]
rpc_url = "https://rpc.example.com?apikey=secret"
chain_id = 1

[fees]
gas_multiplier_pct = 200
max_gas_price_gwei = "50"

[sweep]
burn_threshold_eth = "0.5"
max_submit_attempts = 3

[wallet]
private_key = "0x0123"
target_address = "0x000000000000000000000000000000000000dEaD"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.network.chain_id, Some(1));

        let fees = config.fee_config().unwrap();
        assert_eq!(fees.multiplier_pct, 200);
        assert_eq!(fees.max_fee_price, 50 * GWEI);

        let sweep = config.sweep_config().unwrap();
        assert_eq!(sweep.max_submit_attempts, 3);
        assert_eq!(sweep.default_target, Some(Address::from_low_u64_be(0xdead)));

        let monitor = config.monitor_config().unwrap();
        assert_eq!(monitor.burn_threshold, ETHER / 2);

        let display = config.masked_display();
        assert!(display.contains("https://rpc.example.com?***"));
        assert!(!display.contains("secret"));
        assert!(!display.contains("0x0123"));
    }

    #[test]
    fn test_use_push_requires_ws_url() {
        let mut config = valid();
        config.monitor.use_websocket = true;
        config.network.ws_url = None;
        assert!(!config.use_push());

        config.network.ws_url = Some("wss://node.example.com".to_string());
        assert!(config.use_push());
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://api.example.com?key=secret"),
            "https://api.example.com?***"
        );
        assert_eq!(mask_url("https://api.example.com"), "https://api.example.com");
    }
}
