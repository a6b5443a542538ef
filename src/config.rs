use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::xrpl::address::{decode_seed, is_valid_classic_address};
use crate::xrpl::scanner::UNBOUNDED_LEDGER;

/// Main configuration for the relayer
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub contract: ContractConfig,
    pub xrpl: XrplConfig,
    pub relayer: RelayerConfig,
    pub fees: FeeClaimConfig,
    pub api: ApiConfig,
}

/// Contract chain configuration
#[derive(Clone, Deserialize)]
pub struct ContractConfig {
    /// Tendermint RPC, used to confirm the chain id at startup
    pub rpc_url: String,
    pub lcd_url: String,
    pub chain_id: String,
    pub contract_address: String,
    pub mnemonic: String,
    #[serde(default = "default_address_prefix")]
    pub address_prefix: String,
    #[serde(default = "default_hd_path")]
    pub hd_path: String,
    #[serde(default = "default_gas_price")]
    pub gas_price: f64,
    #[serde(default = "default_fee_denom")]
    pub fee_denom: String,
    /// Multiplier applied to simulated gas
    #[serde(default = "default_gas_adjustment")]
    pub gas_adjustment: f64,
}

/// Custom Debug that redacts the mnemonic to prevent accidental log leakage.
impl fmt::Debug for ContractConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractConfig")
            .field("rpc_url", &self.rpc_url)
            .field("lcd_url", &self.lcd_url)
            .field("chain_id", &self.chain_id)
            .field("contract_address", &self.contract_address)
            .field("mnemonic", &"<redacted>")
            .field("address_prefix", &self.address_prefix)
            .field("hd_path", &self.hd_path)
            .field("gas_price", &self.gas_price)
            .field("fee_denom", &self.fee_denom)
            .field("gas_adjustment", &self.gas_adjustment)
            .finish()
    }
}

/// XRPL configuration
#[derive(Clone, Deserialize)]
pub struct XrplConfig {
    pub rpc_url: String,
    pub bridge_address: String,
    /// Family seed of this relayer's signing key
    pub seed: String,
    /// First ledger to scan, -1 for the earliest available
    #[serde(default = "default_start_ledger")]
    pub start_ledger: i64,
}

/// Custom Debug that redacts the seed to prevent accidental log leakage.
impl fmt::Debug for XrplConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XrplConfig")
            .field("rpc_url", &self.rpc_url)
            .field("bridge_address", &self.bridge_address)
            .field("seed", &"<redacted>")
            .field("start_ledger", &self.start_ledger)
            .finish()
    }
}

/// Relay loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_evidence_retry_attempts")]
    pub evidence_retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Warn once fewer tickets than this remain available
    #[serde(default = "default_tickets_warning_threshold")]
    pub tickets_warning_threshold: usize,
}

impl RelayerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Relayer fee claiming
#[derive(Debug, Clone, Deserialize)]
pub struct FeeClaimConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Per-denom amount below which fees are left to accrue
    #[serde(default = "default_min_fees_to_claim")]
    pub min_amount: u128,
}

/// Health and metrics server
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_address_prefix() -> String {
    "orai".to_string()
}

fn default_hd_path() -> String {
    "m/44'/118'/0'/0/0".to_string()
}

fn default_gas_price() -> f64 {
    0.001
}

fn default_fee_denom() -> String {
    "orai".to_string()
}

fn default_gas_adjustment() -> f64 {
    1.3
}

fn default_start_ledger() -> i64 {
    UNBOUNDED_LEDGER
}

fn default_poll_interval() -> u64 {
    3000
}

fn default_evidence_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_tickets_warning_threshold() -> usize {
    5
}

fn default_min_fees_to_claim() -> u128 {
    1_000_000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    9090
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| eyre!("{} environment variable is required", name))
}

/// Optional variable; present but unparsable is an error rather than a silent default
fn optional<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|e| eyre!("{} has an invalid value {:?}: {}", name, value, e)),
        _ => Ok(default),
    }
}

impl Config {
    /// Load from a specific .env file path, if present, then from the environment
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        let contract = ContractConfig {
            rpc_url: required("CONTRACT_RPC_URL")?,
            lcd_url: required("CONTRACT_LCD_URL")?,
            chain_id: required("CONTRACT_CHAIN_ID")?,
            contract_address: required("CONTRACT_ADDRESS")?,
            mnemonic: required("CONTRACT_MNEMONIC")?,
            address_prefix: optional("CONTRACT_ADDRESS_PREFIX", default_address_prefix())?,
            hd_path: optional("CONTRACT_HD_PATH", default_hd_path())?,
            gas_price: optional("CONTRACT_GAS_PRICE", default_gas_price())?,
            fee_denom: optional("CONTRACT_FEE_DENOM", default_fee_denom())?,
            gas_adjustment: optional("CONTRACT_GAS_ADJUSTMENT", default_gas_adjustment())?,
        };

        let xrpl = XrplConfig {
            rpc_url: required("XRPL_RPC_URL")?,
            bridge_address: required("XRPL_BRIDGE_ADDRESS")?,
            seed: required("XRPL_SEED")?,
            start_ledger: optional("XRPL_START_LEDGER", default_start_ledger())?,
        };

        let relayer = RelayerConfig {
            poll_interval_ms: optional("POLL_INTERVAL_MS", default_poll_interval())?,
            evidence_retry_attempts: optional(
                "EVIDENCE_RETRY_ATTEMPTS",
                default_evidence_retry_attempts(),
            )?,
            retry_delay_ms: optional("RETRY_DELAY_MS", default_retry_delay())?,
            tickets_warning_threshold: optional(
                "TICKETS_WARNING_THRESHOLD",
                default_tickets_warning_threshold(),
            )?,
        };

        let fees = FeeClaimConfig {
            enabled: optional("CLAIM_FEES_ENABLED", false)?,
            min_amount: optional("MIN_FEES_TO_CLAIM", default_min_fees_to_claim())?,
        };

        let api = ApiConfig {
            bind_address: optional("API_BIND_ADDRESS", default_bind_address())?,
            port: optional("API_PORT", default_api_port())?,
        };

        let config = Config {
            contract,
            xrpl,
            relayer,
            fees,
            api,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.contract.rpc_url.is_empty() {
            return Err(eyre!("contract.rpc_url cannot be empty"));
        }

        if self.contract.lcd_url.is_empty() {
            return Err(eyre!("contract.lcd_url cannot be empty"));
        }

        if self.contract.chain_id.is_empty() {
            return Err(eyre!("contract.chain_id cannot be empty"));
        }

        let (prefix, _, _) = bech32::decode(&self.contract.contract_address).map_err(|e| {
            eyre!(
                "contract.contract_address {} is not a bech32 address: {}",
                self.contract.contract_address,
                e
            )
        })?;
        if prefix != self.contract.address_prefix {
            return Err(eyre!(
                "contract.contract_address has prefix {} but {} was configured",
                prefix,
                self.contract.address_prefix
            ));
        }

        let mnemonic_words: Vec<&str> = self.contract.mnemonic.split_whitespace().collect();
        if mnemonic_words.len() < 12 {
            return Err(eyre!("contract.mnemonic must have at least 12 words"));
        }

        if self.contract.gas_price < 0.0 {
            return Err(eyre!("contract.gas_price cannot be negative"));
        }

        if self.contract.gas_adjustment < 1.0 {
            return Err(eyre!("contract.gas_adjustment must be at least 1.0"));
        }

        if self.xrpl.rpc_url.is_empty() {
            return Err(eyre!("xrpl.rpc_url cannot be empty"));
        }

        if !is_valid_classic_address(&self.xrpl.bridge_address) {
            return Err(eyre!(
                "xrpl.bridge_address {} is not a valid classic address",
                self.xrpl.bridge_address
            ));
        }

        decode_seed(&self.xrpl.seed).wrap_err("xrpl.seed is not a valid family seed")?;

        if self.xrpl.start_ledger < UNBOUNDED_LEDGER {
            return Err(eyre!("xrpl.start_ledger must be -1 or a ledger index"));
        }

        if self.relayer.poll_interval_ms == 0 {
            return Err(eyre!("relayer.poll_interval_ms must be positive"));
        }

        if self.relayer.evidence_retry_attempts == 0 {
            return Err(eyre!("relayer.evidence_retry_attempts must be at least 1"));
        }

        Ok(())
    }
}
