//! Relayer configuration.
//!
//! Values come from an optional `relayer.toml` (path overridable with
//! `RELAYER_CONFIG`) with environment variables layered on top. The signing
//! key is only ever read from the environment.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;

use anyhow::{bail, Context, Result};
use cabal_common::args::parse_address;
use cabal_common::{ChainConfig, MIN_RELAYER_BALANCE_WEI};
use ethers::types::{Address, U256};
use serde::Deserialize;
use tracing::warn;

// ═══════════════════════════════════════════════════════════════════════════════
// ENVIRONMENT VARIABLES
// ═══════════════════════════════════════════════════════════════════════════════

const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";
const RPC_URL_PREFIX: &str = "RPC_URL_";
const RPC_URL_ENV: &str = "RPC_URL";
const CHAIN_ID_ENV: &str = "CHAIN_ID";
const CABAL_ADDRESS_ENV: &str = "CABAL_ADDRESS";
const MIN_BALANCE_ENV: &str = "MIN_BALANCE_WEI";
const SUBMIT_ENV: &str = "RELAY_SUBMIT";
const PORT_ENV: &str = "PORT";
const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
const CONFIG_PATH_ENV: &str = "RELAYER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "relayer.toml";
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" | "" => Ok(LogFormat::Text),
            other => bail!("unknown {}: {:?} (expected text or json)", LOG_FORMAT_ENV, other),
        }
    }
}

/// Settings that may be provided by `relayer.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub port: Option<u16>,
    pub submit: Option<bool>,
    pub min_balance_wei: Option<String>,
    pub cabal_address: Option<String>,
    pub default_chain_id: Option<u64>,
    pub log_format: Option<String>,
    /// chain id -> RPC URL
    pub rpc_urls: BTreeMap<String, String>,
}

impl FileSettings {
    /// Load `path` if it exists. A missing file yields the defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()
            .with_context(|| format!("Failed to read {}", path))?;
        settings
            .try_deserialize()
            .with_context(|| format!("Invalid settings in {}", path))
    }
}

/// Relayer configuration.
#[derive(Clone)]
pub struct RelayerConfig {
    /// Hex private key of the gas-paying account.
    pub private_key: String,
    /// Chains with an explicit `RPC_URL_<chainId>`.
    pub chains: Vec<ChainConfig>,
    /// `RPC_URL` for the standalone routes.
    pub default_rpc_url: Option<String>,
    /// `CHAIN_ID` paired with `RPC_URL`. Queried from the node when unset.
    pub default_chain_id: Option<u64>,
    /// Cabal used by legacy execute bodies that omit `cabal`.
    pub default_cabal: Option<Address>,
    pub min_balance: U256,
    /// Send the transaction after a successful simulation.
    pub submit: bool,
    pub port: u16,
    pub log_format: LogFormat,
}

impl fmt::Debug for RelayerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayerConfig")
            .field("private_key", &"<redacted>")
            .field("chains", &self.chains)
            .field("default_rpc_url", &self.default_rpc_url)
            .field("default_chain_id", &self.default_chain_id)
            .field("default_cabal", &self.default_cabal)
            .field("min_balance", &self.min_balance)
            .field("submit", &self.submit)
            .field("port", &self.port)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl RelayerConfig {
    /// Load configuration from `relayer.toml` and environment variables.
    pub fn from_env() -> Result<Self> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let file = FileSettings::load(&path)?;
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(&vars, file)
    }

    /// Build configuration from an explicit variable map layered over `file`.
    pub fn from_vars(vars: &HashMap<String, String>, file: FileSettings) -> Result<Self> {
        let private_key = vars
            .get(PRIVATE_KEY_ENV)
            .cloned()
            .context("PRIVATE_KEY must be set")?;
        let digits = private_key.strip_prefix("0x").unwrap_or(&private_key);
        if digits.len() != 64 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("PRIVATE_KEY must be 32 bytes of hex");
        }

        let min_balance = match vars.get(MIN_BALANCE_ENV).or(file.min_balance_wei.as_ref()) {
            Some(raw) => U256::from_dec_str(raw.trim())
                .map_err(|e| anyhow::anyhow!("{} is not a decimal integer: {:?}", MIN_BALANCE_ENV, e))?,
            None => U256::from(MIN_RELAYER_BALANCE_WEI),
        };

        let mut rpc_urls: BTreeMap<u64, String> = BTreeMap::new();
        for (raw_id, url) in &file.rpc_urls {
            match raw_id.parse::<u64>() {
                Ok(id) => {
                    rpc_urls.insert(id, url.clone());
                }
                Err(_) => warn!("Ignoring rpc_urls entry with non-numeric chain id {:?}", raw_id),
            }
        }
        for (key, url) in vars {
            let Some(suffix) = key.strip_prefix(RPC_URL_PREFIX) else {
                continue;
            };
            match suffix.parse::<u64>() {
                Ok(id) => {
                    rpc_urls.insert(id, url.clone());
                }
                Err(_) => warn!("Ignoring {} with non-numeric chain id", key),
            }
        }
        let chains = rpc_urls
            .into_iter()
            .filter(|(_, url)| !url.trim().is_empty())
            .map(|(id, url)| ChainConfig::new(id, url).with_min_balance(min_balance))
            .collect();

        let default_rpc_url = vars
            .get(RPC_URL_ENV)
            .filter(|url| !url.trim().is_empty())
            .cloned();
        let default_chain_id = match vars.get(CHAIN_ID_ENV) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("{} must be numeric, got {:?}", CHAIN_ID_ENV, raw))?,
            ),
            None => file.default_chain_id,
        };

        let default_cabal = match vars.get(CABAL_ADDRESS_ENV).or(file.cabal_address.as_ref()) {
            Some(raw) => Some(
                parse_address(raw.trim())
                    .with_context(|| format!("{} is not a valid address", CABAL_ADDRESS_ENV))?,
            ),
            None => None,
        };

        let submit = match vars.get(SUBMIT_ENV) {
            Some(raw) => parse_bool(raw)
                .with_context(|| format!("{} must be true or false", SUBMIT_ENV))?,
            None => file.submit.unwrap_or(false),
        };

        let port = match vars.get(PORT_ENV) {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a port number", PORT_ENV))?,
            None => file.port.unwrap_or(DEFAULT_PORT),
        };

        let log_format = match vars.get(LOG_FORMAT_ENV).or(file.log_format.as_ref()) {
            Some(raw) => LogFormat::parse(raw)?,
            None => LogFormat::default(),
        };

        Ok(Self {
            private_key,
            chains,
            default_rpc_url,
            default_chain_id,
            default_cabal,
            min_balance,
            submit,
            port,
            log_format,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
