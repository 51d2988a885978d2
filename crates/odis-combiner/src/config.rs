//! Combiner configuration with validation.
//!
//! Loaded from an optional TOML file, then overridden by `ODIS_*`
//! environment variables. PNP (including legacy PNP) and domains each
//! have their own signer set and key versions.

use odis_common::chain::{ChainConfig, ChainProvider};
use odis_common::KeyVersionInfo;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main combiner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinerConfig {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub pnp: SignerSetConfig,
    pub domains: SignerSetConfig,
    pub discrepancy: DiscrepancyConfig,
    pub chain: ChainConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Bound on a whole client request, fan-out included
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8081,
            timeout: Duration::from_secs(8),
        }
    }
}

/// Per-API switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub pnp_enabled: bool,
    pub legacy_pnp_enabled: bool,
    pub domains_enabled: bool,
    /// Accept PNP requests at the front door when the chain cannot be read
    pub should_fail_open: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            pnp_enabled: true,
            legacy_pnp_enabled: true,
            domains_enabled: true,
            should_fail_open: false,
        }
    }
}

/// Signers and public key material of one keyspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerSetConfig {
    /// Signer base URLs, e.g. `http://signer-0:8080`
    pub signers: Vec<String>,
    /// Bound on one signer call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub current_version: u32,
    pub keys: Vec<KeyVersionInfo>,
}

impl Default for SignerSetConfig {
    fn default() -> Self {
        Self {
            signers: Vec::new(),
            timeout: Duration::from_secs(5),
            current_version: 1,
            keys: Vec::new(),
        }
    }
}

/// How far apart signer measurements may drift
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscrepancyConfig {
    /// Above this the quota request fails
    pub max_total_quota_discrepancy: u64,
    /// Above this a warning is attached
    pub max_query_count_discrepancy: u64,
    /// Above this a warning is attached
    pub max_block_discrepancy: u64,
}

impl Default for DiscrepancyConfig {
    fn default() -> Self {
        Self {
            max_total_quota_discrepancy: 5,
            max_query_count_discrepancy: 5,
            max_block_discrepancy: 3,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(String),

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Invalid environment override {name}: {value}")]
    InvalidEnv { name: String, value: String },

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid signer set: {0}")]
    InvalidSigners(String),

    #[error("Invalid chain retry configuration: {0}")]
    InvalidRetry(String),

    #[error("Invalid key configuration: {0}")]
    InvalidKeys(String),
}

impl CombinerConfig {
    /// Reads `path` if given, applies environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text =
                    std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Applies `ODIS_*` overrides read through `lookup`.
    ///
    /// Signer lists are comma separated.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        fn parse<T: std::str::FromStr>(name: &str, value: String) -> Result<T, ConfigError> {
            value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            })
        }

        if let Some(v) = lookup("ODIS_PORT") {
            self.server.port = parse("ODIS_PORT", v)?;
        }
        if let Some(v) = lookup("ODIS_SHOULD_FAIL_OPEN") {
            self.api.should_fail_open = parse("ODIS_SHOULD_FAIL_OPEN", v)?;
        }
        if let Some(v) = lookup("ODIS_PNP_ENABLED") {
            self.api.pnp_enabled = parse("ODIS_PNP_ENABLED", v)?;
        }
        if let Some(v) = lookup("ODIS_LEGACY_PNP_ENABLED") {
            self.api.legacy_pnp_enabled = parse("ODIS_LEGACY_PNP_ENABLED", v)?;
        }
        if let Some(v) = lookup("ODIS_DOMAINS_ENABLED") {
            self.api.domains_enabled = parse("ODIS_DOMAINS_ENABLED", v)?;
        }
        if let Some(v) = lookup("ODIS_PNP_SIGNERS") {
            self.pnp.signers = split_list(&v);
        }
        if let Some(v) = lookup("ODIS_DOMAINS_SIGNERS") {
            self.domains.signers = split_list(&v);
        }
        if let Some(v) = lookup("ODIS_SIGNER_TIMEOUT_MS") {
            let timeout = Duration::from_millis(parse("ODIS_SIGNER_TIMEOUT_MS", v)?);
            self.pnp.timeout = timeout;
            self.domains.timeout = timeout;
        }
        if let Some(v) = lookup("ODIS_RPC_URL") {
            self.chain.rpc_url = v;
            self.chain.provider = ChainProvider::JsonRpc;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "server timeout cannot be 0".into(),
            ));
        }
        self.chain
            .retry
            .validate()
            .map_err(ConfigError::InvalidRetry)?;

        let pnp_needed = self.api.pnp_enabled || self.api.legacy_pnp_enabled;
        validate_signer_set("pnp", &self.pnp, pnp_needed, self.server.timeout)?;
        validate_signer_set(
            "domains",
            &self.domains,
            self.api.domains_enabled,
            self.server.timeout,
        )?;
        Ok(())
    }

    /// Server bind address
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn validate_signer_set(
    name: &str,
    set: &SignerSetConfig,
    required: bool,
    server_timeout: Duration,
) -> Result<(), ConfigError> {
    if !required {
        return Ok(());
    }
    if set.signers.is_empty() {
        return Err(ConfigError::InvalidSigners(format!("{name}: no signers")));
    }
    if set.timeout.is_zero() {
        return Err(ConfigError::InvalidTimeout(format!(
            "{name}: signer timeout cannot be 0"
        )));
    }
    // the outer guard would cut the fan-out short
    if set.timeout >= server_timeout {
        return Err(ConfigError::InvalidTimeout(format!(
            "{name}: signer timeout must be below the server timeout"
        )));
    }
    if !set.keys.iter().any(|k| k.version == set.current_version) {
        return Err(ConfigError::InvalidKeys(format!(
            "{name}: current version {} is not configured",
            set.current_version
        )));
    }
    for key in &set.keys {
        if key.threshold == 0 || key.threshold as usize > set.signers.len() {
            return Err(ConfigError::InvalidKeys(format!(
                "{name}: version {} needs {} of {} signers",
                key.version,
                key.threshold,
                set.signers.len()
            )));
        }
    }
    Ok(())
}
