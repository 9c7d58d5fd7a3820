use anyhow::{Context, Result};
use distribute_protocol::ProtocolConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub protocol: ProtocolConfig,
    pub logging: LoggingConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
    pub file_output: Option<PathBuf>,
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: None,
            module_filters: HashMap::new(),
        }
    }
}

/// Starting state of the in-memory ledgers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Currency held by the token pool at genesis.
    pub initial_pool: u64,
    /// Tokens minted to the genesis holder.
    pub initial_supply: u64,
    /// Reputation granted on registration.
    pub reputation_grant: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_pool: 1_000_000,
            initial_supply: 1_000_000,
            reputation_grant: 10_000,
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.protocol
            .validate()
            .context("invalid [protocol] section")?;
        if self.ledger.initial_pool == 0 || self.ledger.initial_supply == 0 {
            anyhow::bail!("ledger pool and supply must be positive");
        }
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("DISTRIBUTE_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
        if let Ok(format) = env::var("DISTRIBUTE_LOG_FORMAT") {
            if !format.is_empty() {
                self.logging.format = format;
            }
        }
        if let Ok(pool) = env::var("DISTRIBUTE_INITIAL_POOL") {
            if let Ok(pool) = pool.parse() {
                self.ledger.initial_pool = pool;
            }
        }
    }
}
