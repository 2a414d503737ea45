//! A real-time gateway that routes time-stamped sample vectors between
//! heterogeneous nodes over directional, hook-bearing, rate-controlled
//! paths.
//!
//! The module layout mirrors the data's own lifecycle: a [`Sample`] is
//! drawn from a [`pool::Pool`], carried through a [`path::Path`]'s
//! [`hook`] chain and [`queue::Queue`], and written out by a
//! [`node::Node`]. [`config`] loads and validates the TOML description of
//! nodes and paths that wires a running gateway together.

pub mod config;
pub mod error;
pub mod hook;
pub mod node;
pub mod path;
pub mod pool;
pub mod protocol;
pub mod queue;
pub mod sample;
pub mod signal;
pub mod stats;

pub use error::{GatewayError, Result};
pub use sample::Sample;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{info, warn};

use config::GatewayConfig;
use hook::{Hook, HookChain, HookKind, LimitHook, LoggingHook, ScaleHook, SkipFirstHook, StatsHook};
use node::NodeRegistry;
use path::{DeliveryMode, Path};
use stats::PathStats;

/// A fully assembled, not-yet-started gateway: every node and path built
/// from a [`GatewayConfig`] against a [`NodeRegistry`].
pub struct Gateway {
    paths: Vec<Arc<Path>>,
    stats: Vec<(String, Arc<PathStats>)>,
    stats_interval: std::time::Duration,
    shutdown: Arc<AtomicBool>,
}

impl Gateway {
    /// Build every node and path declared in `config`, using `registry`
    /// to construct node instances by type name.
    pub fn build(config: &GatewayConfig, registry: &NodeRegistry) -> Result<Self> {
        let path_configs = config.expand_reverse_paths();
        let mut paths = Vec::with_capacity(path_configs.len());
        let mut stats = Vec::with_capacity(path_configs.len());

        for path_config in &path_configs {
            if !path_config.enabled {
                info!(path = %path_config.name, "path disabled, skipping");
                continue;
            }
            let source_config = config
                .nodes
                .get(&path_config.source)
                .ok_or_else(|| GatewayError::UnknownNode(path_config.source.clone()))?;
            let source = registry.create(
                &source_config.type_name,
                &path_config.source,
                &source_config.settings,
            )?;

            let mut destinations = Vec::with_capacity(path_config.destinations.len());
            for dest_name in &path_config.destinations {
                let dest_config = config
                    .nodes
                    .get(dest_name)
                    .ok_or_else(|| GatewayError::UnknownNode(dest_name.clone()))?;
                destinations.push(registry.create(
                    &dest_config.type_name,
                    dest_name,
                    &dest_config.settings,
                )?);
            }

            let hooks = build_hooks(&path_config.hooks)?;
            let mode = match path_config.rate_hz {
                Some(rate) if rate > 0.0 => DeliveryMode::RateControlled(rate),
                _ => DeliveryMode::OnArrival,
            };

            let mut path = Path::new(
                path_config.name.clone(),
                source,
                destinations,
                path_config.queue_length,
                path_config.sample_length,
                hooks,
                mode,
            )?;
            path.prepare()?;
            let path = Arc::new(path);
            stats.push((path_config.name.clone(), path.stats()));
            paths.push(path);
        }

        Ok(Self {
            paths,
            stats,
            stats_interval: std::time::Duration::from_secs(config.stats_interval_secs),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start every path's threads and the stats reporter. Returns once
    /// everything is running; call [`Gateway::shutdown`] to tear down.
    pub fn start(&self) -> Result<()> {
        for path in &self.paths {
            info!(path = path.name(), "starting path");
            path.start()?;
        }
        let stats = self.stats.clone();
        let interval = self.stats_interval;
        let shutdown = self.shutdown.clone();
        std::thread::Builder::new()
            .name("stats-reporter".to_string())
            .spawn(move || stats::run_reporter(stats, interval, shutdown))
            .expect("failed to spawn stats reporter thread");
        Ok(())
    }

    /// Signal every path to stop and join their threads.
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown
            .store(true, std::sync::atomic::Ordering::Release);
        for path in &self.paths {
            info!(path = path.name(), "stopping path");
            if let Err(err) = path.stop() {
                warn!(path = path.name(), error = %err, "error stopping path");
            }
        }
        Ok(())
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }
}

/// Builds one hook per configured entry, routed through its own
/// `parse`/`check` (§4.3) rather than reading `settings` ad hoc here, so a
/// malformed or missing hook-level field surfaces as a `config-error`
/// (§7) from the hook itself.
fn build_hooks(configs: &[config::HookConfig]) -> Result<HookChain> {
    let mut hooks: Vec<Box<dyn Hook>> = Vec::with_capacity(configs.len());
    for hook_config in configs {
        let mut hook: Box<dyn Hook> = match hook_config.type_name.as_str() {
            "limit" => Box::new(LimitHook::new(HookKind::PathRead, 0)),
            "skip_first" => Box::new(SkipFirstHook::new(HookKind::PathRead, 0)),
            "scale" => Box::new(ScaleHook::new(HookKind::PathRead, 1.0)),
            "logging" => Box::new(LoggingHook::new(HookKind::PathRead, hook_config.type_name.as_str())),
            "stats" => Box::new(StatsHook::new()),
            other => {
                return Err(GatewayError::Config(format!("unknown hook type '{other}'")));
            }
        };
        hook.parse(&hook_config.settings)?;
        hook.check()?;
        hooks.push(hook);
    }
    Ok(HookChain::new(hooks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn minimal_config() -> GatewayConfig {
        let mut nodes = HashMap::new();
        nodes.insert(
            "src".to_string(),
            config::NodeConfig {
                type_name: "loopback".into(),
                settings: serde_json::json!({ "channel": "gateway-test" }),
            },
        );
        nodes.insert(
            "dst".to_string(),
            config::NodeConfig {
                type_name: "loopback".into(),
                settings: serde_json::json!({ "channel": "gateway-test-out" }),
            },
        );
        GatewayConfig {
            log_level: "info".into(),
            nodes,
            paths: vec![config::PathConfig {
                name: "p1".into(),
                source: "src".into(),
                destinations: vec!["dst".into()],
                queue_length: 8,
                sample_length: 2,
                rate_hz: None,
                hooks: vec![],
                enabled: true,
                reverse: false,
            }],
            stats_interval_secs: 60,
        }
    }

    #[test]
    fn build_assembles_one_path_per_config_entry() {
        let registry = NodeRegistry::with_builtins();
        let gateway = Gateway::build(&minimal_config(), &registry).unwrap();
        assert_eq!(gateway.path_count(), 1);
    }

    #[test]
    fn build_fails_on_unknown_node_reference() {
        let mut config = minimal_config();
        config.paths[0].source = "ghost".into();
        let registry = NodeRegistry::with_builtins();
        let err = Gateway::build(&config, &registry).unwrap_err();
        assert!(matches!(err, GatewayError::UnknownNode(_)));
    }

    #[test]
    fn start_and_shutdown_round_trip_cleanly() {
        let registry = NodeRegistry::with_builtins();
        let gateway = Gateway::build(&minimal_config(), &registry).unwrap();
        gateway.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        gateway.shutdown().unwrap();
    }

    #[test]
    fn disabled_path_is_skipped_at_build_time() {
        let mut config = minimal_config();
        config.paths[0].enabled = false;
        let registry = NodeRegistry::with_builtins();
        let gateway = Gateway::build(&config, &registry).unwrap();
        assert_eq!(gateway.path_count(), 0);
    }

    /// §8 "Reverse path creation": a `reverse: true` entry yields two
    /// independently running paths.
    #[test]
    fn reverse_path_builds_two_independent_paths() {
        let mut config = minimal_config();
        config.paths[0].reverse = true;
        let registry = NodeRegistry::with_builtins();
        let gateway = Gateway::build(&config, &registry).unwrap();
        assert_eq!(gateway.path_count(), 2);
        gateway.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        gateway.shutdown().unwrap();
    }
}
