//! Sink configuration.
//!
//! Configuration is loaded with precedence: CLI args > Env vars > Config file > Defaults
//!
//! # Example config file (sink.toml)
//! ```toml
//! delivery_guarantee = "exactly-once"
//! transactional_id_prefix = "orders-sink"
//! naming_strategy = "pooling"
//! topics = ["orders", "orders-audit"]
//! previous_prefixes = ["orders-sink-v1"]
//! ```

mod defaults;

pub use defaults::*;

use crate::naming::TransactionNamingStrategy;
use crate::strategy::AbortStrategy;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Delivery guarantee of the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryGuarantee {
    /// Fire and forget.
    None,
    /// Flush on checkpoint, duplicates possible after a failure.
    #[default]
    AtLeastOnce,
    /// Write inside broker transactions committed on checkpoint completion.
    ExactlyOnce,
}

/// Transactional sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub delivery_guarantee: DeliveryGuarantee,
    /// Prefix for the ids of all transactions this sink opens.
    pub transactional_id_prefix: Option<String>,
    pub naming_strategy: TransactionNamingStrategy,
    /// Overrides the abort strategy implied by the naming strategy.
    pub abort_strategy: Option<AbortStrategy>,
    /// Topics the sink writes to; listing only looks at transactions touching them.
    pub topics: Vec<String>,
    /// Prefixes used by earlier runs of the job, aborted on recovery as well.
    pub previous_prefixes: Vec<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            delivery_guarantee: DeliveryGuarantee::default(),
            transactional_id_prefix: None,
            naming_strategy: TransactionNamingStrategy::default(),
            abort_strategy: None,
            topics: default_topics(),
            previous_prefixes: Vec::new(),
        }
    }
}

impl SinkConfig {
    /// Load configuration with precedence: CLI args > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - CLI overrides to apply on top
    pub fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(SinkConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX));
        figment = figment.merge(Serialized::defaults(overrides));

        let config: SinkConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    /// Reject combinations the sink cannot recover from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(prefix) = &self.transactional_id_prefix {
            if prefix.is_empty() {
                return Err(ConfigError::invalid(
                    "transactional_id_prefix must not be empty",
                ));
            }
        }
        if self.delivery_guarantee != DeliveryGuarantee::ExactlyOnce {
            return Ok(());
        }
        if self.transactional_id_prefix.is_none() {
            return Err(ConfigError::invalid(
                "exactly-once delivery requires transactional_id_prefix",
            ));
        }
        if self.previous_prefixes.iter().any(String::is_empty) {
            return Err(ConfigError::invalid("previous_prefixes must not be empty"));
        }
        match (self.naming_strategy, self.effective_abort_strategy()) {
            (TransactionNamingStrategy::Pooling, AbortStrategy::Probing) => {
                Err(ConfigError::invalid(
                    "pooling naming reuses slots and requires the listing abort strategy",
                ))
            }
            (_, AbortStrategy::Listing) if self.topics.is_empty() => Err(ConfigError::invalid(
                "listing abort strategy requires at least one topic",
            )),
            _ => Ok(()),
        }
    }

    pub fn effective_abort_strategy(&self) -> AbortStrategy {
        self.abort_strategy
            .unwrap_or_else(|| self.naming_strategy.default_abort_strategy())
    }

    /// Current prefix plus every previous one, deduplicated.
    pub fn known_prefixes(&self) -> BTreeSet<String> {
        self.transactional_id_prefix
            .iter()
            .chain(self.previous_prefixes.iter())
            .cloned()
            .collect()
    }

    pub fn is_transactional(&self) -> bool {
        self.delivery_guarantee == DeliveryGuarantee::ExactlyOnce
    }
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_guarantee: Option<DeliveryGuarantee>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transactional_id_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub naming_strategy: Option<TransactionNamingStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_strategy: Option<AbortStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_prefixes: Option<Vec<String>>,
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("configuration error: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }
}
