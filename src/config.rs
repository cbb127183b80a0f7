//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` (or the file named by `LADDER_CONFIG`) and
//! deserializes into strongly-typed structs. Secrets (private key, API key)
//! are referenced by env-var name in the config and resolved at runtime.

use anyhow::{bail, ensure, Context, Result};
use ethers::signers::LocalWallet;
use ethers::types::Address;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::api::oneinch::DEFAULT_BASE_URL;
use crate::api::retry::RetryConfig;
use crate::chain::signer::AGGREGATION_ROUTER_V6;
use crate::engine::ladder::quantity_steps;
use crate::engine::lifecycle::MIN_SETTLE_DELAY;
use crate::engine::program::ProgramSettings;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const CONFIG_PATH_ENV: &str = "LADDER_CONFIG";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub chain: ChainConfig,
    pub api: ApiConfig,
    pub pair: PairConfig,
    pub ladder: LadderConfig,
    pub clearing: ClearingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Ether,
    Avax,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Ether => 1,
            Network::Avax => 43114,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    #[serde(default)]
    pub network: Network,
    pub rpc_url: String,
    pub private_key_env: String,
    #[serde(default = "default_router")]
    pub router_address: String,
}

/// Where sweeps send their cancel batch.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CancelMode {
    /// Router `cancelOrders` transaction.
    #[default]
    Onchain,
    /// Orderbook cancel-batch endpoint.
    Api,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key_env: String,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_poll_quantum_ms")]
    pub poll_quantum_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cancel_mode: CancelMode,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PairConfig {
    pub input_asset: String,
    pub output_asset: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LadderConfig {
    pub order_count: u32,
    pub min_quantity: Decimal,
    pub max_quantity: Decimal,
    /// Percent markup added per rung.
    pub order_step: Decimal,
    /// Second-valued fields accept fractions (`0.5`).
    pub delay_per_order_secs: f64,
    pub cycle_delay_secs: f64,
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClearingConfig {
    pub cancel_delay_secs: f64,
    pub order_expiration_secs: f64,
}

fn default_router() -> String {
    AGGREGATION_ROUTER_V6.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_min_interval_ms() -> u64 {
    1500
}

fn default_poll_quantum_ms() -> u64 {
    250
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_settle_delay_ms() -> u64 {
    2050
}

fn default_error_backoff_secs() -> f64 {
    3.0
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Path from `LADDER_CONFIG`, falling back to `config.toml`.
    pub fn path_from_env() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let l = &self.ladder;
        ensure!(l.order_count > 0, "ladder.order_count must be positive");
        ensure!(l.min_quantity > Decimal::ZERO, "ladder.min_quantity must be positive");
        ensure!(l.max_quantity > Decimal::ZERO, "ladder.max_quantity must be positive");
        ensure!(
            l.min_quantity <= l.max_quantity,
            "ladder.min_quantity ({}) exceeds ladder.max_quantity ({})",
            l.min_quantity,
            l.max_quantity
        );
        ensure!(l.order_step > Decimal::ZERO, "ladder.order_step must be positive");
        quantity_steps(l.min_quantity, l.max_quantity).context("ladder.max_quantity")?;
        positive_secs("ladder.delay_per_order_secs", l.delay_per_order_secs)?;
        positive_secs("ladder.cycle_delay_secs", l.cycle_delay_secs)?;
        positive_secs("ladder.error_backoff_secs", l.error_backoff_secs)?;

        let c = &self.clearing;
        positive_secs("clearing.cancel_delay_secs", c.cancel_delay_secs)?;
        positive_secs("clearing.order_expiration_secs", c.order_expiration_secs)?;

        let a = &self.api;
        ensure!(a.min_interval_ms > 0, "api.min_interval_ms must be positive");
        ensure!(a.poll_quantum_ms > 0, "api.poll_quantum_ms must be positive");
        ensure!(a.timeout_secs > 0, "api.timeout_secs must be positive");
        ensure!(
            a.settle_delay_ms >= MIN_SETTLE_DELAY.as_millis() as u64,
            "api.settle_delay_ms must be at least {}",
            MIN_SETTLE_DELAY.as_millis()
        );
        ensure!(a.retry.max_attempts >= 1, "api.retry.max_attempts must be at least 1");
        ensure!(!a.api_key_env.is_empty(), "api.api_key_env must name an env var");
        ensure!(!self.chain.private_key_env.is_empty(), "chain.private_key_env must name an env var");
        ensure!(!self.chain.rpc_url.is_empty(), "chain.rpc_url must not be empty");

        let input = self.input_asset()?;
        let output = self.output_asset()?;
        ensure!(input != output, "pair.input_asset and pair.output_asset must differ");
        self.router_address()?;
        Ok(())
    }

    pub fn chain_id(&self) -> u64 {
        self.chain.network.chain_id()
    }

    pub fn input_asset(&self) -> Result<Address> {
        parse_address("pair.input_asset", &self.pair.input_asset)
    }

    pub fn output_asset(&self) -> Result<Address> {
        parse_address("pair.output_asset", &self.pair.output_asset)
    }

    pub fn router_address(&self) -> Result<Address> {
        parse_address("chain.router_address", &self.chain.router_address)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.api.min_interval_ms)
    }

    pub fn poll_quantum(&self) -> Duration {
        Duration::from_millis(self.api.poll_quantum_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.api.settle_delay_ms)
    }

    pub fn order_expiration(&self) -> Duration {
        secs(self.clearing.order_expiration_secs)
    }

    /// Expiration offset written into maker traits, which carry whole
    /// seconds. Rounded up.
    pub fn signed_expiration_secs(&self) -> u64 {
        let expiration = self.order_expiration();
        expiration.as_secs() + u64::from(expiration.subsec_nanos() > 0)
    }

    pub fn program_settings(&self) -> ProgramSettings {
        ProgramSettings {
            min_quantity: self.ladder.min_quantity,
            max_quantity: self.ladder.max_quantity,
            delay_per_order: secs(self.ladder.delay_per_order_secs),
            cycle_delay: secs(self.ladder.cycle_delay_secs),
            error_backoff: secs(self.ladder.error_backoff_secs),
            clearing_period: secs(self.clearing.cancel_delay_secs),
        }
    }

    /// Orderbook API key from the env var named by `api.api_key_env`.
    pub fn api_key(&self) -> Result<SecretString> {
        let key = Self::resolve_env(&self.api.api_key_env)?;
        if key.trim().is_empty() {
            bail!("{} is empty", self.api.api_key_env);
        }
        Ok(SecretString::new(key))
    }

    /// Signing wallet from the env var named by `chain.private_key_env`.
    /// The key may carry a `0x` prefix.
    pub fn wallet(&self) -> Result<LocalWallet> {
        let key = SecretString::new(Self::resolve_env(&self.chain.private_key_env)?);
        parse_wallet(&key).with_context(|| format!("{} is not a valid private key", self.chain.private_key_env))
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

fn positive_secs(field: &str, value: f64) -> Result<()> {
    ensure!(
        value > 0.0 && Duration::try_from_secs_f64(value).is_ok(),
        "{field} must be a positive number of seconds, got {value}"
    );
    Ok(())
}

/// Validated seconds to a `Duration`.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    let raw = value.trim();
    let hex = raw
        .strip_prefix("0x")
        .with_context(|| format!("{field} must be a 0x-prefixed address, got {raw:?}"))?;
    ensure!(
        hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        "{field} must be 20 bytes of hex, got {raw:?}"
    );
    raw.parse::<Address>()
        .with_context(|| format!("{field} is not a valid address: {raw:?}"))
}

fn parse_wallet(key: &SecretString) -> Result<LocalWallet> {
    let raw = key.expose_secret().trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    raw.parse::<LocalWallet>().map_err(|e| anyhow::anyhow!("{e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
