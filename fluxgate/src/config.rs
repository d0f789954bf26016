//! Bootstrap and runtime configuration model.
//!
//! The bootstrap file names the configurator endpoint; everything else is
//! fetched at startup as one JSON blob and deserialised here. Unknown keys
//! are ignored throughout.

use crate::event::Node;
use fluxgate_execution::{AssetName, Symbol};
use fluxgate_integration::bus::StreamConfig;
use serde::Deserialize;
use smol_str::SmolStr;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Bootstrap file: where to fetch the runtime configuration from.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    pub configurator: ConfiguratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfiguratorConfig {
    pub base_url: String,
    pub exchange_id: String,
    pub instance: String,
}

impl BootstrapConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}

/// Runtime configuration blob served by the configurator.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub algo: SmolStr,
    pub data: DataConfig,
}

impl RuntimeConfig {
    pub fn gate_config(&self) -> &GateConfig {
        &self.data.configs.gate_config
    }

    /// Configured ticker universe.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.data
            .markets
            .iter()
            .map(|market| market.common_symbol.clone())
            .collect()
    }

    /// Configured asset universe.
    pub fn assets(&self) -> Vec<AssetName> {
        self.data
            .assets_labels
            .iter()
            .map(|label| label.common.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub assets_labels: Vec<AssetLabel>,
    #[serde(default)]
    pub markets: Vec<Market>,
    pub configs: Configs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetLabel {
    pub common: AssetName,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Market {
    pub common_symbol: Symbol,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configs {
    pub gate_config: GateConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    pub exchange: ExchangeConfig,
    pub rate_limits: RateLimits,
    pub gate: GateSettings,
    pub data_collection_method: DataCollectionMethods,
    pub info: InfoConfig,
    pub aeron: BusConfig,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    #[serde(default)]
    pub accounts: Option<Vec<Credentials>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub exchange_id: SmolStr,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimits {
    #[serde(default, alias = "enable_ccxt_rate_limiter")]
    pub enable_rate_limiter: bool,

    /// Upper bound on a single `watch_*` call, in seconds.
    #[serde(default)]
    pub subscribe_timeout: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateSettings {
    pub order_book_depth: usize,
    #[serde(default = "default_delay")]
    pub order_book_delay: f64,
    #[serde(default = "default_delay")]
    pub balance_delay: f64,
    #[serde(default = "default_delay")]
    pub order_status_delay: f64,
}

fn default_delay() -> f64 {
    1.0
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionMethod {
    Websocket,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataCollectionMethods {
    pub order_book: CollectionMethod,
    pub balance: CollectionMethod,
    pub order: CollectionMethod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfoConfig {
    pub node: Node,
    pub exchange: SmolStr,
    pub instance: SmolStr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    pub publishers: PublisherConfig,
    pub subscribers: SubscriberConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    pub orderbooks: StreamConfig,
    pub balances: StreamConfig,
    pub core: StreamConfig,
    pub logs: StreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberConfig {
    pub core: StreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub uri: String,
}
