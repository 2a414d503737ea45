//! Crate-wide error taxonomy.
//!
//! `GatewayError` is the typed replacement for the `errno`-like error
//! reporting a C daemon would use (see DESIGN.md, redesign note on global
//! errors): every fallible step in the routing engine returns one of these
//! variants instead of a bare integer, and `#[from]` conversions let the
//! `?` operator do the propagation work all the way up to `main.rs`, where
//! `anyhow` takes over at the process boundary.

use thiserror::Error;

/// Convenience alias for results using the gateway's error type.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration failed to parse or load.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration parsed but is semantically invalid (§7 `config-error`).
    #[error("configuration validation error: {0}")]
    Validation(String),

    /// A node type name was not found in the registry.
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    /// A node name referenced by a path does not exist.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// A sample was released to a Pool it does not belong to.
    #[error("foreign sample released to pool")]
    ForeignSample,

    /// Node `read`/`write` returned a negative count (§7 `io-error`, fatal for the path).
    #[error("I/O fault in node '{node}': {message}")]
    Io { node: String, message: String },

    /// A hook rejected or failed a sample (§7 `hook-reject`).
    #[error("hook '{hook}' rejected sample: {message}")]
    HookReject { hook: String, message: String },

    /// A path was configured with no destinations.
    #[error("path '{0}' has no destinations")]
    NoDestinations(String),

    /// A path reader was registered after the path became active.
    #[error("reader registered after queue activity on path '{0}'")]
    LateRegistration(String),

    /// C37.118-style protocol decode/encode failure (§4.6).
    #[error("protocol error: {0}")]
    Protocol(#[from] crate::protocol::c37118::FrameError),

    /// Underlying I/O error (files, sockets used by node types).
    #[error("I/O error: {0}")]
    StdIo(#[from] std::io::Error),

    /// A thread-fatal condition: the path must tear itself down.
    #[error("fatal error in path '{path}': {message}")]
    Fatal { path: String, message: String },
}

impl GatewayError {
    /// True for errors that should abort configuration loading before any
    /// thread starts, per §7 propagation rules.
    pub fn is_config_time(&self) -> bool {
        matches!(
            self,
            GatewayError::Config(_)
                | GatewayError::Validation(_)
                | GatewayError::UnknownNodeType(_)
                | GatewayError::UnknownNode(_)
                | GatewayError::NoDestinations(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_time_errors_are_classified() {
        assert!(GatewayError::Config("bad toml".into()).is_config_time());
        assert!(GatewayError::NoDestinations("p1".into()).is_config_time());
        assert!(!GatewayError::ForeignSample.is_config_time());
    }

    #[test]
    fn io_fault_formats_with_node_name() {
        let err = GatewayError::Io {
            node: "sink".into(),
            message: "broken pipe".into(),
        };
        assert_eq!(err.to_string(), "I/O fault in node 'sink': broken pipe");
    }
}
