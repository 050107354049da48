use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

use bitcoincore_rpc::bitcoin::Network;

/// Upper bound on the status-poll attempt budget
pub const MAX_ATTEMPT_BUDGET: u32 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Per-poll `POLL` target events
    pub enable_tracing: bool,
    pub rail: RailConfig,
    #[serde(default)]
    pub poller: PollerSettings,
    /// Network BTC destination addresses must belong to
    #[serde(default)]
    pub btc_network: BtcNetwork,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RailConfig {
    /// Base URL of the payment/crypto backend, e.g. `https://api.example.com/v1`
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl RailConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PollerSettings {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            max_attempts: MAX_ATTEMPT_BUDGET,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BtcNetwork {
    #[default]
    Bitcoin,
    Testnet,
    Signet,
    Regtest,
}

impl BtcNetwork {
    pub fn network(&self) -> Network {
        match self {
            BtcNetwork::Bitcoin => Network::Bitcoin,
            BtcNetwork::Testnet => Network::Testnet,
            BtcNetwork::Signet => Network::Signet,
            BtcNetwork::Regtest => Network::Regtest,
        }
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        Self::from_file(&format!("config/{}.yaml", env))
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rail.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("rail.base_url is empty".into()));
        }
        if self.rail.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "rail.request_timeout_ms must be > 0".into(),
            ));
        }
        if self.poller.interval_ms == 0 {
            return Err(ConfigError::Invalid("poller.interval_ms must be > 0".into()));
        }
        if self.poller.max_attempts == 0 || self.poller.max_attempts > MAX_ATTEMPT_BUDGET {
            return Err(ConfigError::Invalid(format!(
                "poller.max_attempts must be in 1..={}",
                MAX_ATTEMPT_BUDGET
            )));
        }
        Ok(())
    }
}
