//! Error types for configuration loading, route compilation and dispatch.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::HttpMethod;

/// Errors raised before the server binds.
///
/// Every variant is fatal: a configuration that fails to load or compile
/// never produces a partially working server.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON or does not fit the schema.
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration is not valid YAML or does not fit the schema.
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A route descriptor is structurally invalid.
    #[error("route {index} ({method} {path}): {reason}")]
    InvalidRoute {
        index: usize,
        method: HttpMethod,
        path: String,
        reason: String,
    },

    /// Two descriptors share the same method and path.
    #[error("route {index}: duplicate route {method} {path}")]
    DuplicateRoute {
        index: usize,
        method: HttpMethod,
        path: String,
    },

    /// A global setting is unusable.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// The HTTP router refused a path pattern (e.g. overlapping captures).
    #[error("route pattern {path} conflicts with another route: {reason}")]
    RouterConflict { path: String, reason: String },
}

impl ConfigError {
    /// True for errors in the parsed configuration rather than in reading it.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ConfigError::InvalidRoute { .. }
                | ConfigError::DuplicateRoute { .. }
                | ConfigError::InvalidSettings(_)
                | ConfigError::RouterConflict { .. }
        )
    }
}

/// Unexpected failures while computing a response.
///
/// These never reach the client verbatim; the dispatcher logs them and
/// answers with a generic 500.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to encode response body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to build response: {0}")]
    Build(#[from] axum::http::Error),
}
