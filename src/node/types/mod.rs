//! Built-in node types (§4.4, SPEC_FULL.md supplemented node types).

mod file;
mod loopback;
mod signal_generator;

pub use file::FileNode;
pub use loopback::LoopbackNode;
pub use signal_generator::SignalNode;

use super::NodeRegistry;

/// Register every built-in node type on `registry`.
pub(crate) fn register_builtins(registry: &NodeRegistry) {
    registry.register("signal", |name, config| {
        SignalNode::from_config(name, config).map(|n| Box::new(n) as Box<dyn super::Node>)
    });
    registry.register("file", |name, config| {
        FileNode::from_config(name, config).map(|n| Box::new(n) as Box<dyn super::Node>)
    });
    registry.register("loopback", |name, config| {
        LoopbackNode::from_config(name, config).map(|n| Box::new(n) as Box<dyn super::Node>)
    });
}
