//! Configuration types shared across crates.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a full cache chain: optional memory and disk layers in
/// front of the network transfer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Memory layer; omit to skip the layer.
    #[serde(default)]
    pub memory: Option<MemoryCacheConfig>,
    /// Disk layer; omit to skip the layer.
    #[serde(default)]
    pub disk: Option<DiskCacheConfig>,
    /// Network transfer settings.
    #[serde(default)]
    pub network: NetworkConfig,
}

impl ChainConfig {
    /// Load configuration from an optional TOML file merged with
    /// `STRATA_`-prefixed environment variables (`STRATA_DISK__DIRECTORY`
    /// style nesting).
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("STRATA_").split("__"));
        figment
            .extract()
            .map_err(|e| crate::Error::Config(e.to_string()))
    }
}

/// Memory cache layer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Byte budget for resident fragments.
    #[serde(default = "default_memory_budget")]
    pub budget_bytes: u64,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: default_memory_budget(),
        }
    }
}

/// Disk cache layer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskCacheConfig {
    /// Directory holding one `<hex fingerprint>.part` file per asset.
    pub directory: PathBuf,
    /// Byte budget for cached fragment bodies.
    #[serde(default = "default_disk_budget")]
    pub budget_bytes: u64,
}

/// Network transfer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Connect timeout for origin fetches, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Overall per-fetch timeout, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_memory_budget() -> u64 {
    crate::DEFAULT_MEMORY_BUDGET
}

fn default_disk_budget() -> u64 {
    crate::DEFAULT_DISK_BUDGET
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    300
}
