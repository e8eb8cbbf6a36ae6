//! Configuration error types shared by the provider crates.

use std::io;

use thiserror::Error;

/// Errors raised while loading configuration or credential material.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A PEM file referenced from the configuration could not be read.
    #[error("Failed to read {what} from {path}: {source}")]
    Read {
        what: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    /// An endpoint is not available for the selected environment.
    #[error("No {provider} endpoint configured for the {environment} environment")]
    MissingEndpoint {
        provider: &'static str,
        environment: String,
    },

    /// A gateway address was not of the form `host:port`.
    #[error("Invalid gateway address '{0}', expected host:port")]
    InvalidAddress(String),
}

/// Specialized `Result` type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
