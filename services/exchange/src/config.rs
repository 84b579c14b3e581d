//! Node configuration
//!
//! Loaded from TOML; every field has a default so an empty file (or no file)
//! yields the stock market table with file persistence under `data/`.

use persistence::{FlushPolicy, FsyncPolicy, StoreConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use types::ids::MarketId;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Symbol and numeric id of one tradable market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub symbol: String,
    pub id: u32,
}

impl MarketConfig {
    pub fn new(symbol: impl Into<String>, id: u32) -> Self {
        Self {
            symbol: symbol.into(),
            id,
        }
    }
}

/// When journal writes are forced to stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsyncMode {
    EveryWrite,
    EveryN,
    OnRotation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub data_dir: PathBuf,
    pub compress_snapshots: bool,
    pub snapshots_retained: usize,
    pub compact_journal: bool,
    pub max_journal_file_size: u64,
    pub fsync: FsyncMode,
    /// Writes between fsyncs with `fsync = "every_n"`
    pub fsync_every: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: PathBuf::from("data"),
            compress_snapshots: false,
            snapshots_retained: 1,
            compact_journal: true,
            max_journal_file_size: 64 * 1024 * 1024,
            fsync: FsyncMode::EveryWrite,
            fsync_every: 64,
        }
    }
}

impl PersistenceConfig {
    /// Store settings for the file provider
    pub fn store_config(&self) -> StoreConfig {
        let (flush_policy, fsync_policy) = match self.fsync {
            FsyncMode::EveryWrite => (FlushPolicy::EveryWrite, FsyncPolicy::EveryWrite),
            FsyncMode::EveryN => (
                FlushPolicy::EveryWrite,
                FsyncPolicy::EveryN(self.fsync_every),
            ),
            FsyncMode::OnRotation => (FlushPolicy::EveryWrite, FsyncPolicy::OnRotation),
        };
        StoreConfig {
            data_dir: self.data_dir.clone(),
            compress_snapshots: self.compress_snapshots,
            snapshots_retained: self.snapshots_retained,
            compact_journal: self.compact_journal,
            max_journal_file_size: self.max_journal_file_size,
            flush_policy,
            fsync_policy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Market returned when a numeric id is not configured
    pub default_market: String,
    /// Largest relative move from the first fill a market order may sweep
    pub slippage_limit: Decimal,
    /// Operations between automatic snapshots of a market
    pub snapshot_interval: u64,
    pub persistence: PersistenceConfig,
    pub markets: Vec<MarketConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_market: "BTC-USDC".to_string(),
            slippage_limit: Decimal::new(5, 2),
            snapshot_interval: 100,
            persistence: PersistenceConfig::default(),
            markets: default_markets(),
        }
    }
}

/// Stock market table
pub fn default_markets() -> Vec<MarketConfig> {
    [
        ("BTC-USDC", 4),
        ("ETH-USDC", 3),
        ("SOL-USDC", 5),
        ("DOGE-USDC", 6),
        ("ADA-USDC", 7),
        ("TSLA", 8),
        ("NVDA", 9),
        ("META", 10),
        ("PLTR", 11),
        ("SNOW", 12),
        ("UBER", 13),
        ("HOOD", 14),
        ("ABNB", 15),
    ]
    .into_iter()
    .map(|(symbol, id)| MarketConfig::new(symbol, id))
    .collect()
}

impl EngineConfig {
    /// Read, parse and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.markets.is_empty() {
            return Err(ConfigError::Invalid("at least one market is required".into()));
        }

        let mut symbols = HashSet::new();
        let mut ids = HashSet::new();
        for market in &self.markets {
            if MarketId::try_new(market.symbol.as_str()).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "invalid market symbol {:?}",
                    market.symbol
                )));
            }
            if !symbols.insert(market.symbol.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "market {} configured twice",
                    market.symbol
                )));
            }
            if !ids.insert(market.id) {
                return Err(ConfigError::Invalid(format!(
                    "numeric id {} used by more than one market",
                    market.id
                )));
            }
        }

        if !symbols.contains(self.default_market.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "default market {} is not configured",
                self.default_market
            )));
        }
        if self.slippage_limit <= Decimal::ZERO || self.slippage_limit > Decimal::ONE {
            return Err(ConfigError::Invalid(format!(
                "slippage_limit must be in (0, 1], got {}",
                self.slippage_limit
            )));
        }
        if self.snapshot_interval == 0 {
            return Err(ConfigError::Invalid("snapshot_interval must be >= 1".into()));
        }
        if self.persistence.snapshots_retained == 0 {
            return Err(ConfigError::Invalid("snapshots_retained must be >= 1".into()));
        }
        if self.persistence.fsync == FsyncMode::EveryN && self.persistence.fsync_every == 0 {
            return Err(ConfigError::Invalid("fsync_every must be >= 1".into()));
        }
        Ok(())
    }
}
