//! Configuration loading and validation (ambient stack, SPEC_FULL.md).
//!
//! Layered TOML-plus-environment configuration via `figment`, mirroring
//! the teacher's `config.rs` `Provider` impl: a `GatewayConfig` struct
//! derives `Deserialize`, is merged from a file provider and an `APP_`-
//! prefixed environment provider, and is validated once after parsing
//! rather than failing lazily at use time.

use std::collections::HashMap;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub nodes: HashMap<String, NodeConfig>,

    #[serde(default)]
    pub paths: Vec<PathConfig>,

    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stats_interval() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(flatten)]
    pub settings: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathConfig {
    pub name: String,
    pub source: String,
    pub destinations: Vec<String>,
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,
    #[serde(default = "default_sample_length")]
    pub sample_length: usize,
    /// Omitted or zero means forward-on-arrival; a positive value
    /// rate-controls the send side at that many hertz.
    pub rate_hz: Option<f64>,
    #[serde(default)]
    pub hooks: Vec<HookConfig>,
    /// A disabled path is parsed and validated but never built into a
    /// running [`crate::path::Path`] (§6 `enabled`).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// When set, this entry also yields an implicit second path with
    /// source and destination swapped (§6 `reverse`, §8 "Reverse path
    /// creation"). Only valid with exactly one destination.
    #[serde(default)]
    pub reverse: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_queue_length() -> usize {
    1024
}

fn default_sample_length() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(flatten)]
    pub settings: serde_json::Value,
}

impl GatewayConfig {
    /// Load configuration from `path` (if given) layered with `APP_`
    /// environment overrides, e.g. `APP_LOG_LEVEL=debug`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("APP_").split("_"));
        let config: GatewayConfig = figment
            .extract()
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation beyond what `serde` can express (§7
    /// `config-error`): every path's source/destinations must name a
    /// declared node, and every path must have at least one destination.
    pub fn validate(&self) -> Result<()> {
        for path in &self.paths {
            if path.destinations.is_empty() {
                return Err(GatewayError::NoDestinations(path.name.clone()));
            }
            if !self.nodes.contains_key(&path.source) {
                return Err(GatewayError::Validation(format!(
                    "path '{}' references unknown source node '{}'",
                    path.name, path.source
                )));
            }
            for dest in &path.destinations {
                if !self.nodes.contains_key(dest) {
                    return Err(GatewayError::Validation(format!(
                        "path '{}' references unknown destination node '{}'",
                        path.name, dest
                    )));
                }
            }
            if let Some(rate) = path.rate_hz {
                if rate <= 0.0 {
                    return Err(GatewayError::Validation(format!(
                        "path '{}' has non-positive rate_hz {}",
                        path.name, rate
                    )));
                }
            }
            if path.reverse && path.destinations.len() != 1 {
                return Err(GatewayError::Validation(format!(
                    "path '{}' sets reverse=true but has {} destinations, expected exactly 1",
                    path.name,
                    path.destinations.len()
                )));
            }
        }
        Ok(())
    }

    /// Expand every `reverse: true` entry into its implicit mirror path
    /// (§6, §8 "Reverse path creation"), so callers downstream of
    /// validation only ever see plain forward paths.
    pub fn expand_reverse_paths(&self) -> Vec<PathConfig> {
        let mut expanded = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            expanded.push(path.clone());
            if path.reverse {
                let mirrored_dest = path.source.clone();
                expanded.push(PathConfig {
                    name: format!("{}-reverse", path.name),
                    source: path.destinations[0].clone(),
                    destinations: vec![mirrored_dest],
                    queue_length: path.queue_length,
                    sample_length: path.sample_length,
                    rate_hz: path.rate_hz,
                    hooks: path.hooks.clone(),
                    enabled: path.enabled,
                    reverse: false,
                });
            }
        }
        expanded
    }
}
