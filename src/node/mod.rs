//! Node plug-in contract and type registry (§4.4).
//!
//! The original C implementation dispatches through a vtable of function
//! pointers per node type (see DESIGN.md: we looked at and rejected the
//! teacher's `daq-plugin-api`'s `abi_stable`-based dynamic-loading
//! equivalent of the same idea). In-process Rust gets the same capability
//! table for free as a trait object, so nodes here are `Box<dyn Node>`
//! produced by a factory registered under the node type's name — directly
//! generalizing the teacher's `instrument::registry_v2::InstrumentRegistryV2`
//! from one concrete `Instrument` type to an open set of node types.

pub mod types;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{GatewayError, Result};
use crate::sample::Sample;
use crate::signal::SignalDesc;

/// Opaque identity of a node, used as the weak back-reference stored on
/// every sample it produces (§3: "a weak reference back to the source
/// node, for diagnostics").
pub struct NodeHandle {
    pub name: String,
}

/// A handle that unblocks a thread parked inside this node's `read`/`write`,
/// callable without acquiring the node's own lock (§9 redesign note:
/// "broker-style nodes expose a `wake()` that unblocks their thread for
/// clean teardown"). Captured once by [`crate::path::Path::prepare`], before
/// any path thread exists, so invoking it later from [`crate::path::Path::stop`]
/// can never contend with a thread currently inside a blocking call.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// The capability table every node type implements (§4.4).
///
/// `read`/`write` are blocking calls made from a path's dedicated OS
/// thread (§4.5 mandates thread-per-path, not an async executor), mirroring
/// the blocking hardware I/O calls the teacher's `HardwareAdapter` trait
/// wraps in `async_trait` — here made synchronous because the routing
/// engine owns its own threads rather than borrowing a runtime's.
pub trait Node: Send {
    /// Stable type name this node was registered under (e.g. `"signal"`).
    fn type_name(&self) -> &str;

    /// Instance name as given in configuration.
    fn name(&self) -> &str;

    /// Signal layout this node produces or expects, in channel order.
    fn signals(&self) -> Arc<Vec<SignalDesc>>;

    /// Maximum number of samples this node accepts per `read`/`write`
    /// call (§4.4 "Vectorize"). A node that cannot batch (e.g. one HTTP
    /// PUT per write) returns 1 and the owning path loops; a node that
    /// requires a fixed batch (e.g. a hardware DMA transfer) fails
    /// cleanly from `read`/`write` when handed a different count.
    fn vectorize(&self) -> usize {
        1
    }

    /// One-time validation of this node's parsed configuration (§7
    /// `config-error` path); called before any path using it starts.
    fn check(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once before any path using this node starts producing or
    /// consuming samples.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once after every path using this node has stopped.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Block until at least one sample is available (or the node is
    /// shutting down), then write up to `samples.len()` values into the
    /// given pre-acquired samples. Returns the number actually filled.
    /// A negative/error outcome is reported as [`GatewayError::Io`], which
    /// is fatal for the owning path (§7).
    fn read(&mut self, samples: &mut [Sample]) -> Result<usize>;

    /// Write `samples` to the underlying sink. Returns the number actually
    /// written; a short write (`< samples.len()`) advances the path's read
    /// cursor by the partial count and the unsent tail is lost (§9 Open
    /// Question (b)).
    fn write(&mut self, samples: &[Sample]) -> Result<usize>;

    /// Returns a handle that can be invoked to unblock this node's `read`/
    /// `write` without locking it (§9). Node types whose I/O never blocks
    /// indefinitely can leave this at the default `None`; broker-style
    /// nodes with a genuinely blocking `read` (e.g. `loopback`) override it.
    fn waker(&self) -> Option<Waker> {
        None
    }
}

type NodeFactory = Box<dyn Fn(&str, &serde_json::Value) -> Result<Box<dyn Node>> + Send + Sync>;

/// Registry mapping node type names (as used in configuration) to
/// factories producing boxed [`Node`] trait objects.
///
/// Grounded directly on `instrument::registry_v2::InstrumentRegistryV2`:
/// same `Arc<Mutex<HashMap<String, Factory>>>` shape, `register`/`create`
/// API, generalized from one concrete instrument type to any [`Node`] impl.
#[derive(Clone)]
pub struct NodeRegistry {
    factories: Arc<Mutex<HashMap<String, NodeFactory>>>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a node type under `type_name`. Registering the built-in
    /// types (`signal`, `file`, `loopback`) happens once at startup via
    /// [`NodeRegistry::with_builtins`].
    pub fn register<F>(&self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&str, &serde_json::Value) -> Result<Box<dyn Node>> + Send + Sync + 'static,
    {
        self.factories
            .lock()
            .expect("node registry mutex poisoned")
            .insert(type_name.into(), Box::new(factory));
    }

    /// Construct a node instance named `instance_name` of type `type_name`
    /// from its parsed configuration body.
    pub fn create(
        &self,
        type_name: &str,
        instance_name: &str,
        config: &serde_json::Value,
    ) -> Result<Box<dyn Node>> {
        let factories = self.factories.lock().expect("node registry mutex poisoned");
        let factory = factories
            .get(type_name)
            .ok_or_else(|| GatewayError::UnknownNodeType(type_name.to_string()))?;
        factory(instance_name, config)
    }

    pub fn type_names(&self) -> Vec<String> {
        self.factories
            .lock()
            .expect("node registry mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// A registry pre-populated with every node type shipped with the
    /// gateway.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        types::register_builtins(&registry);
        registry
    }
}
