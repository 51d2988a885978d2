//! Signer configuration with validation.
//!
//! Loaded from an optional TOML file, then overridden by `ODIS_*`
//! environment variables.

use odis_common::chain::{ChainConfig, ChainProvider};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main signer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub keys: KeysConfig,
    pub quota: QuotaConfig,
    pub chain: ChainConfig,
    pub storage: StorageConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Bound on a single request
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            timeout: Duration::from_secs(5),
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
    /// Serve PNP requests when the chain cannot be read
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

/// One private key share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShareConfig {
    pub version: u32,
    /// Hex `index ‖ scalar`
    pub share: String,
}

/// Shares of one keyspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySetConfig {
    pub current_version: u32,
    pub shares: Vec<KeyShareConfig>,
}

impl Default for KeySetConfig {
    fn default() -> Self {
        Self {
            current_version: 1,
            shares: Vec::new(),
        }
    }
}

/// Key shares for PNP and for domains
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub pnp: KeySetConfig,
    pub domains: KeySetConfig,
}

/// Quota parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Wei of the payment token per query
    pub query_price_wei: u64,
    /// Legacy flow: free queries for a verified account
    pub unverified_query_max: u64,
    pub additional_verified_query_max: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            query_price_wei: 1_000_000_000_000_000,
            unverified_query_max: 10,
            additional_verified_query_max: 30,
        }
    }
}

/// Storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Rocksdb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
    /// fsync after each commit
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("./data/signer"),
            sync_writes: true,
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

    #[error("Invalid key configuration: {0}")]
    InvalidKeys(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl SignerConfig {
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
    /// `ODIS_PNP_SHARE` and `ODIS_DOMAINS_SHARE` replace the share of the
    /// current version of their keyspace.
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
        if let Some(v) = lookup("ODIS_RPC_URL") {
            self.chain.rpc_url = v;
            self.chain.provider = ChainProvider::JsonRpc;
        }
        if let Some(v) = lookup("ODIS_DB_PATH") {
            self.storage.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ODIS_PNP_SHARE") {
            set_current_share(&mut self.keys.pnp, v);
        }
        if let Some(v) = lookup("ODIS_DOMAINS_SHARE") {
            set_current_share(&mut self.keys.domains, v);
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
            .map_err(|reason| ConfigError::Invalid(format!("chain retry: {reason}")))?;
        if self.quota.query_price_wei == 0 {
            return Err(ConfigError::Invalid("query_price_wei cannot be 0".into()));
        }

        let pnp_needed = self.api.pnp_enabled || self.api.legacy_pnp_enabled;
        validate_key_set("pnp", &self.keys.pnp, pnp_needed)?;
        validate_key_set("domains", &self.keys.domains, self.api.domains_enabled)?;
        Ok(())
    }

    /// Server bind address
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

fn set_current_share(keys: &mut KeySetConfig, share: String) {
    let version = keys.current_version;
    keys.shares.retain(|entry| entry.version != version);
    keys.shares.push(KeyShareConfig { version, share });
}

fn validate_key_set(name: &str, keys: &KeySetConfig, required: bool) -> Result<(), ConfigError> {
    let mut versions: Vec<u32> = keys.shares.iter().map(|s| s.version).collect();
    versions.sort_unstable();
    if versions.windows(2).any(|w| w[0] == w[1]) {
        return Err(ConfigError::InvalidKeys(format!(
            "{name}: duplicate key version"
        )));
    }
    if required && !versions.contains(&keys.current_version) {
        return Err(ConfigError::InvalidKeys(format!(
            "{name}: no share for current version {}",
            keys.current_version
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with_shares() -> SignerConfig {
        let mut config = SignerConfig::default();
        config.keys.pnp.shares.push(KeyShareConfig {
            version: 1,
            share: "00".into(),
        });
        config.keys.domains.shares.push(KeyShareConfig {
            version: 1,
            share: "00".into(),
        });
        config
    }

    #[test]
    fn test_defaults() {
        let config = SignerConfig::default();
        assert_eq!(config.server.timeout, Duration::from_secs(5));
        assert_eq!(config.quota.query_price_wei, 1_000_000_000_000_000);
        assert_eq!(config.quota.unverified_query_max, 10);
        assert_eq!(config.quota.additional_verified_query_max, 30);
        assert!(!config.api.should_fail_open);
    }

    #[test]
    fn test_missing_current_share_rejected() {
        assert!(matches!(
            SignerConfig::default().validate(),
            Err(ConfigError::InvalidKeys(_))
        ));
        assert!(with_shares().validate().is_ok());

        let mut disabled = SignerConfig::default();
        disabled.api.pnp_enabled = false;
        disabled.api.legacy_pnp_enabled = false;
        disabled.api.domains_enabled = false;
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = with_shares();
        config.server.timeout = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_retry_factor_rejected() {
        let mut config = with_shares();
        config.chain.retry.factor = f64::NAN;
        assert!(config.validate().is_err());
        config.chain.retry.factor = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_parsing() {
        let config = SignerConfig::from_toml(
            r#"
            [server]
            port = 9001
            timeout = "2s"

            [api]
            should_fail_open = true

            [keys.pnp]
            current_version = 2
            shares = [{ version = 1, share = "aa" }, { version = 2, share = "bb" }]

            [chain.retry]
            initial_delay = "10ms"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.timeout, Duration::from_secs(2));
        assert!(config.api.should_fail_open);
        assert_eq!(config.keys.pnp.current_version, 2);
        assert_eq!(config.keys.pnp.shares.len(), 2);
        assert_eq!(config.chain.retry.initial_delay, Duration::from_millis(10));
        assert_eq!(config.chain.retry.retries, 5);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ODIS_PORT", "9100"),
            ("ODIS_SHOULD_FAIL_OPEN", "true"),
            ("ODIS_PNP_SHARE", "cafe"),
            ("ODIS_RPC_URL", "http://node:8545"),
        ]
        .into_iter()
        .collect();
        let mut config = with_shares();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 9100);
        assert!(config.api.should_fail_open);
        assert_eq!(config.keys.pnp.shares.len(), 1);
        assert_eq!(config.keys.pnp.shares[0].share, "cafe");
        assert_eq!(config.chain.provider, ChainProvider::JsonRpc);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = SignerConfig::default();
        let result = config.apply_env(|name| (name == "ODIS_PORT").then(|| "http".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }
}
