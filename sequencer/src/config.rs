//! Sequencer configuration.
//!
//! Loaded from a TOML file under a `[sequencer]` table. Environment variables
//! with the `SEQUENCER_` prefix override file values, using `__` to descend
//! into sections (e.g. `SEQUENCER_POOL__SHARD_COUNT=32`).

use std::{path::Path, path::PathBuf, time::Duration};

use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::hash::{self, Hash};

/// Top-level table holding the sequencer settings.
const CONFIG_SECTION: &str = "sequencer";

/// A rejected configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be at most {max}, got {value}")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },
}

/// Hash-chain engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PohConfig {
    /// Maximum consecutive empty events before the chain halts
    pub empty_event_ceiling: u64,
    /// Persist a checkpoint every this many heights (0 disables interval
    /// checkpoints; block events are persisted regardless)
    pub checkpoint_interval: u64,
    /// Retries for a failed checkpoint write, after the first attempt
    pub persist_max_retries: u32,
    /// Base backoff between checkpoint retries, doubled on each retry
    pub persist_backoff_ms: u64,
    /// Interval between heartbeat ticks (0 disables the ticker)
    pub tick_interval_ms: u64,
}

impl Default for PohConfig {
    fn default() -> Self {
        Self {
            empty_event_ceiling: 1_000_000,
            checkpoint_interval: 1_024,
            persist_max_retries: 3,
            persist_backoff_ms: 10,
            tick_interval_ms: 25,
        }
    }
}

impl PohConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.empty_event_ceiling == 0 {
            return Err(ConfigError::Zero {
                field: "poh.empty_event_ceiling",
            });
        }
        if self.persist_max_retries > 16 {
            return Err(ConfigError::TooLarge {
                field: "poh.persist_max_retries",
                value: self.persist_max_retries as u64,
                max: 16,
            });
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Option<Duration> {
        (self.tick_interval_ms > 0).then(|| Duration::from_millis(self.tick_interval_ms))
    }
}

/// Transaction pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of independently locked shards
    pub shard_count: usize,
    /// Ring buffer capacity of each shard
    pub shard_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            shard_count: 16,
            shard_capacity: 4_096,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_count == 0 {
            return Err(ConfigError::Zero {
                field: "pool.shard_count",
            });
        }
        if self.shard_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "pool.shard_capacity",
            });
        }
        Ok(())
    }

    /// Upper bound on live entries across all shards.
    pub fn total_capacity(&self) -> usize {
        self.shard_count.saturating_mul(self.shard_capacity)
    }
}

/// Fee parameters committed to by every block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeRule {
    /// Fee charged per signature
    pub lamports_per_signature: u64,
    /// Multiplier applied on top of the base fee, in basis points
    pub priority_multiplier_bps: u64,
}

impl Default for FeeRule {
    fn default() -> Self {
        Self {
            lamports_per_signature: 5_000,
            priority_multiplier_bps: 10_000,
        }
    }
}

impl FeeRule {
    pub fn rule_hash(&self) -> Hash {
        hash::hashv(&[
            b"fee-rule".as_slice(),
            &self.lamports_per_signature.to_le_bytes(),
            &self.priority_multiplier_bps.to_le_bytes(),
        ])
    }
}

/// Block assembler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Nominal slot length
    pub slot_duration_ms: u64,
    /// Maximum transactions pulled from the pool per block
    pub max_tx_per_block: usize,
    /// Protocol limit on the summed transaction size of a block body
    pub max_block_bytes: u64,
    /// Fee rule committed to by block headers
    pub fee_rule: FeeRule,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            slot_duration_ms: 500,
            max_tx_per_block: 2_048,
            max_block_bytes: 8 * 1024 * 1024,
            fee_rule: FeeRule::default(),
        }
    }
}

impl AssemblerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_duration_ms == 0 {
            return Err(ConfigError::Zero {
                field: "assembler.slot_duration_ms",
            });
        }
        if self.max_block_bytes == 0 {
            return Err(ConfigError::Zero {
                field: "assembler.max_block_bytes",
            });
        }
        Ok(())
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::from_millis(self.slot_duration_ms)
    }
}

/// [`StorageConfig`] sets where the chain store keeps its database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/sequencer.redb"),
        }
    }
}

/// Node-level settings for the [`crate::context::NodeContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// File holding the node identity seed; generated when missing
    pub identity_path: Option<PathBuf>,
    /// Number of transaction outcomes remembered for status queries
    pub status_cache_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity_path: None,
            status_cache_capacity: 65_536,
        }
    }
}

/// Complete sequencer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub poh: PohConfig,
    pub pool: PoolConfig,
    pub assembler: AssemblerConfig,
    pub storage: StorageConfig,
    pub node: NodeConfig,
}

impl SequencerConfig {
    /// Load configuration from a file path.
    ///
    /// # Example config (TOML)
    /// ```toml
    /// [sequencer.pool]
    /// shard_count = 16
    /// shard_capacity = 4096
    ///
    /// [sequencer.assembler]
    /// slot_duration_ms = 500
    /// max_tx_per_block = 2048
    /// ```
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Err(anyhow::anyhow!("Config file must have a .toml extension"));
        };
        if ext != "toml" {
            return Err(anyhow::anyhow!(
                "Unsupported config file format: {}. Use .toml",
                ext
            ));
        }

        let figment = Self::defaults()
            .merge(Toml::file(path))
            .merge(Self::env());

        Self::extract(figment)
    }

    /// Builds configuration from defaults and environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::extract(Self::defaults().merge(Self::env()))
    }

    fn defaults() -> Figment {
        Figment::from(Serialized::default(
            CONFIG_SECTION,
            SequencerConfig::default(),
        ))
    }

    fn env() -> Env {
        Env::prefixed("SEQUENCER_")
            .split("__")
            .map(|key| format!("{CONFIG_SECTION}.{key}").into())
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: SequencerConfig = figment
            .extract_inner(CONFIG_SECTION)
            .map_err(anyhow::Error::msg)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.poh.validate()?;
        self.pool.validate()?;
        self.assembler.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = SequencerConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.pool.total_capacity(), 16 * 4_096);
        assert_eq!(config.assembler.slot_duration(), Duration::from_millis(500));
    }

    #[test]
    fn zero_shards_rejected() {
        let mut config = SequencerConfig::default();
        config.pool.shard_count = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "pool.shard_count"
            })
        );
    }

    #[test]
    fn zero_ceiling_rejected() {
        let config = PohConfig {
            empty_event_ceiling: 0,
            ..PohConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn disabled_ticker_has_no_interval() {
        let config = PohConfig {
            tick_interval_ms: 0,
            ..PohConfig::default()
        };
        assert_eq!(config.tick_interval(), None);
    }

    #[test]
    fn fee_rule_hash_tracks_parameters() {
        let a = FeeRule::default();
        let b = FeeRule {
            lamports_per_signature: 1,
            ..a
        };
        assert_ne!(a.rule_hash(), b.rule_hash());
        assert_eq!(a.rule_hash(), FeeRule::default().rule_hash());
    }

    #[test]
    fn from_path_reads_nested_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sequencer.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[sequencer.pool]\nshard_count = 4\nshard_capacity = 8\n\n[sequencer.assembler]\nmax_tx_per_block = 3"
        )
        .unwrap();

        let config = SequencerConfig::from_path(&path).unwrap();
        assert_eq!(config.pool.shard_count, 4);
        assert_eq!(config.pool.shard_capacity, 8);
        assert_eq!(config.assembler.max_tx_per_block, 3);
        assert_eq!(config.assembler.slot_duration_ms, 500);
    }

    #[test]
    fn from_path_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sequencer.toml");
        std::fs::write(&path, "[sequencer.pool]\nshard_capacity = 0\n").unwrap();
        let err = SequencerConfig::from_path(&path).unwrap_err();
        assert!(err.to_string().contains("shard_capacity"));
    }

    #[test]
    fn from_path_unsupported_extension() {
        let result = SequencerConfig::from_path("config.json");
        assert!(result.unwrap_err().to_string().contains("Unsupported"));
    }

    #[test]
    fn from_path_no_extension() {
        let result = SequencerConfig::from_path("config");
        assert!(result.unwrap_err().to_string().contains("extension"));
    }

    #[test]
    fn config_serde_roundtrip() {
        let config = SequencerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SequencerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
