//! Error types for the publishflow pipeline.
//!
//! Only run-level failures are modelled as errors. Row-level problems
//! (field validation, unresolved parents, failed individual writes) are
//! reported as [`PublishMessage`](crate::core::PublishMessage)s and counted,
//! never returned past a batch boundary.

use thiserror::Error;

/// The main error type for publishflow operations.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The manifest could not be built.
    #[error("{0}")]
    Manifest(#[from] ManifestError),

    /// A remote call failed at a point where it is run-fatal.
    #[error("{0}")]
    Remote(#[from] RemoteError),

    /// The run configuration is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The remote system reports a version older than the one required.
    #[error("Remote system version {found} is not supported; at least {required} is required")]
    IncompatibleVersion {
        /// The version reported by the remote system.
        found: String,
        /// The minimum configured version.
        required: String,
    },

    /// The run was cancelled.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// An unexpected failure raised by a publisher implementation.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl PublishError {
    /// Renders the error with its full source chain, one cause per segment.
    #[must_use]
    pub fn detail(&self) -> String {
        if let Self::Unexpected(err) = self {
            return format!("{err:#}");
        }

        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !out.ends_with(&text) {
                out.push_str(": ");
                out.push_str(&text);
            }
            source = cause.source();
        }
        out
    }
}

/// Errors raised while grouping and ordering data source types.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    /// A configured instance names a type with no registered publisher.
    #[error("No publisher is registered for data source type '{type_name}' (instance '{instance}')")]
    UnknownPublisher {
        /// The unknown type name.
        type_name: String,
        /// The first instance referring to it.
        instance: String,
    },

    /// The type-level dependency graph contains a cycle.
    #[error("{0}")]
    Cycle(#[from] CycleDetectedError),
}

/// Error raised when data source types depend on each other in a cycle.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in data source dependencies: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of type names forming the cycle.
    pub cycle_path: Vec<String>,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        Self { cycle_path }
    }
}

/// Errors reported by remote record services.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote system could not be reached.
    #[error("Remote system unreachable: {0}")]
    Unreachable(String),

    /// No service is registered for the entity.
    #[error("No remote service registered for entity '{0}'")]
    UnknownEntity(String),

    /// The service does not support the named operation.
    #[error("Operation '{operation}' is not supported by '{entity}'")]
    UnknownOperation {
        /// The entity name.
        entity: String,
        /// The operation name.
        operation: String,
    },

    /// The remote system rejected the request.
    #[error("'{entity}' rejected the request: {message}")]
    Rejected {
        /// The entity name.
        entity: String,
        /// The rejection message.
        message: String,
    },

    /// A transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors raised by an import row store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowStoreError {
    /// The import does not exist.
    #[error("Import '{0}' not found")]
    UnknownImport(String),

    /// The store failed to read rows.
    #[error("Failed to read rows of import '{import}': {message}")]
    Read {
        /// The import id.
        import: String,
        /// The failure message.
        message: String,
    },
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The field name.
        field: &'static str,
        /// Why it is invalid.
        reason: String,
    },

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
