// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Configuration module for the Istanbul validator
//!
//! Values come from an optional TOML file, then `ISTANBUL_*` environment
//! variables, then command-line flags, each layer overriding the previous.

use istanbul_types::ConsensusConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Validator node configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub consensus: ConsensusConfig,
    pub devnet: DevnetConfig,
}

/// In-process devnet parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    /// Number of validators
    pub validators: u32,

    /// Stop once every node has imported this many blocks
    pub blocks: u64,

    /// Indices of validators whose outbound messages are discarded
    pub silent: Vec<u32>,

    /// Give up after this many seconds
    pub timeout_secs: u64,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            validators: 4,
            blocks: 10,
            silent: Vec::new(),
            timeout_secs: 120,
        }
    }
}

fn parse_env<T: std::str::FromStr>(
    name: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> ConfigResult<Option<T>> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        None => Ok(None),
    }
}

impl NodeConfig {
    /// Read `path` if given, otherwise start from defaults; then apply the
    /// process environment.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_toml(source: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Load configuration overrides from environment variables
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        let consensus = &mut self.consensus;
        if let Some(v) = parse_env("ISTANBUL_ROUND_TIMEOUT_MS", &lookup)? {
            consensus.round_timeout_base_ms = v;
        }
        if let Some(v) = parse_env("ISTANBUL_MAILBOX_CAPACITY", &lookup)? {
            consensus.mailbox_capacity = v;
        }
        if let Some(v) = parse_env("ISTANBUL_FUTURE_MESSAGE_LIMIT", &lookup)? {
            consensus.future_message_limit = v;
        }
        if let Some(v) = parse_env("ISTANBUL_FUTURE_HEIGHT_WINDOW", &lookup)? {
            consensus.future_height_window = v;
        }
        if let Some(v) = parse_env("ISTANBUL_VALIDATOR_CACHE_SIZE", &lookup)? {
            consensus.validator_cache_size = v;
        }

        let devnet = &mut self.devnet;
        if let Some(v) = parse_env("ISTANBUL_DEVNET_VALIDATORS", &lookup)? {
            devnet.validators = v;
        }
        if let Some(v) = parse_env("ISTANBUL_DEVNET_BLOCKS", &lookup)? {
            devnet.blocks = v;
        }
        if let Some(v) = parse_env("ISTANBUL_DEVNET_TIMEOUT_SECS", &lookup)? {
            devnet.timeout_secs = v;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.consensus.round_timeout_base_ms == 0 {
            return Err(ConfigError::Invalid(
                "round_timeout_base_ms must be positive".to_string(),
            ));
        }
        if self.consensus.mailbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "mailbox_capacity must be positive".to_string(),
            ));
        }
        if self.devnet.validators == 0 {
            return Err(ConfigError::Invalid(
                "devnet needs at least one validator".to_string(),
            ));
        }
        if let Some(index) = self
            .devnet
            .silent
            .iter()
            .find(|i| **i >= self.devnet.validators)
        {
            return Err(ConfigError::Invalid(format!(
                "silent validator {} out of range 0..{}",
                index, self.devnet.validators
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_toml_sections_with_defaults() {
        let config = NodeConfig::from_toml(
            r#"
            [consensus]
            round_timeout_base_ms = 500

            [devnet]
            validators = 7
            silent = [1, 2]
            "#,
        )
        .unwrap();
        assert_eq!(config.consensus.round_timeout_base_ms, 500);
        assert_eq!(
            config.consensus.mailbox_capacity,
            ConsensusConfig::default().mailbox_capacity
        );
        assert_eq!(config.devnet.validators, 7);
        assert_eq!(config.devnet.silent, vec![1, 2]);
        assert_eq!(config.devnet.blocks, DevnetConfig::default().blocks);
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = NodeConfig::default();
        config
            .apply_env(env(&[
                ("ISTANBUL_ROUND_TIMEOUT_MS", "250"),
                ("ISTANBUL_DEVNET_BLOCKS", " 3 "),
            ]))
            .unwrap();
        assert_eq!(config.consensus.round_timeout_base_ms, 250);
        assert_eq!(config.devnet.blocks, 3);
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let mut config = NodeConfig::default();
        let err = config
            .apply_env(env(&[("ISTANBUL_MAILBOX_CAPACITY", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { name: "ISTANBUL_MAILBOX_CAPACITY", .. }
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_silent_node() {
        let mut config = NodeConfig::default();
        config.devnet.silent = vec![4];
        assert!(config.validate().is_err());

        config.devnet.silent = vec![3];
        config.validate().unwrap();

        config.consensus.round_timeout_base_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "[devnet]\nblocks = 2\n").unwrap();
        let config = NodeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.devnet.blocks, 2);
    }
}
