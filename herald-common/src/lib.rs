pub mod config;
pub mod environment;
pub mod error;
pub mod logging;
pub mod response;

pub use tracing;

pub use environment::Environment;
pub use error::{ConfigError, ConfigResult};
pub use response::{Outcome, Provider, RecipientResult, Response, RetryAfter};

/// Shortens a device token for log output, keeping only its first eight characters.
#[must_use]
pub fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}
