// Configuration management module
// This file handles loading and parsing of configuration settings
// from environment variables and an optional YAML file
//
// Numan Thabit 2025 Nov

use crate::chain::{ChainDirectory, ChainInfo, EstimationVariant};
use crate::swap::TokenDirectory;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_FILE_ENV: &str = "RELAY_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP API bind address
    #[serde(default = "default_api_addr")]
    pub api_addr: SocketAddr,
    /// YAML wallet directory (wallet records and account secrets)
    pub wallets_file: Option<PathBuf>,
    /// Chains the relay can estimate and broadcast on
    #[serde(default)]
    pub chains: Vec<ChainInfo>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Token symbols used when rendering swap routes
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub address: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub estimation_variant: EstimationVariant,
    /// Upper bound on waiting for the Bluetooth adapter
    #[serde(default = "default_device_wait_secs")]
    pub device_wait_secs: u64,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    /// Total retry budget for read-only RPC calls
    #[serde(default = "default_rpc_retry_secs")]
    pub rpc_retry_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            estimation_variant: EstimationVariant::default(),
            device_wait_secs: default_device_wait_secs(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            rpc_retry_secs: default_rpc_retry_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn device_wait(&self) -> Duration {
        Duration::from_secs(self.device_wait_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn rpc_retry_budget(&self) -> Duration {
        Duration::from_secs(self.rpc_retry_secs)
    }
}

fn default_api_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_device_wait_secs() -> u64 {
    60
}

fn default_rpc_timeout_secs() -> u64 {
    15
}

fn default_rpc_retry_secs() -> u64 {
    10
}

impl AppConfig {
    /// Load from `RELAY_CONFIG` (if set) overlaid with `RELAY__*` variables.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path).required(true));
        }
        let cfg = builder
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("build configuration sources")?;
        let app: Self = cfg.try_deserialize().context("deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Yaml))
            .build()?;
        let app: Self = cfg.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.eth_chain_id) {
                bail!("duplicate chain id in configuration: {}", chain.eth_chain_id);
            }
        }
        if self.pipeline.device_wait_secs == 0 {
            bail!("pipeline.device_wait_secs must be positive");
        }
        Ok(())
    }

    pub fn chain_directory(&self) -> ChainDirectory {
        ChainDirectory::new(self.chains.iter().cloned())
    }

    pub fn token_directory(&self) -> TokenDirectory {
        let mut tokens = TokenDirectory::new();
        for entry in &self.tokens {
            tokens.insert(&entry.address, entry.symbol.clone());
        }
        tokens
    }
}
