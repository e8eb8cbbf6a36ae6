//! Deployment environments and the provider endpoints each one uses.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// The environment a sender is deployed in.
///
/// `Testing` points every provider at local simulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Testing,
    #[default]
    Development,
    Staging,
    Sandbox,
    Production,
}

const GCM_URL: &str = "https://android.googleapis.com/gcm/send";
const C2DM_URL: &str = "http://android.apis.google.com/c2dm/send";
const ADM_URL: &str = "https://api.amazon.com";

impl Environment {
    /// Whether APNs traffic goes to Apple's sandbox rather than production.
    #[must_use]
    pub const fn is_sandbox(self) -> bool {
        !matches!(self, Self::Production)
    }

    /// `host:port` of the APNs binary gateway.
    #[must_use]
    pub const fn apns_gateway(self) -> &'static str {
        match self {
            Self::Testing => "localhost:5555",
            Self::Development | Self::Staging | Self::Sandbox => {
                "gateway.sandbox.push.apple.com:2195"
            }
            Self::Production => "gateway.push.apple.com:2195",
        }
    }

    /// `host:port` of the APNs feedback service.
    #[must_use]
    pub const fn apns_feedback(self) -> &'static str {
        match self {
            Self::Testing => "localhost:5556",
            Self::Development | Self::Staging | Self::Sandbox => {
                "feedback.sandbox.push.apple.com:2196"
            }
            Self::Production => "feedback.push.apple.com:2196",
        }
    }

    /// GCM send URL.
    #[must_use]
    pub const fn gcm_url(self) -> &'static str {
        match self {
            Self::Testing => "http://localhost:5556",
            _ => GCM_URL,
        }
    }

    /// C2DM send URL.
    #[must_use]
    pub const fn c2dm_url(self) -> &'static str {
        match self {
            Self::Testing => "http://localhost:5556",
            _ => C2DM_URL,
        }
    }

    /// ADM API base URL. ADM has no simulator endpoint, so `Testing` has none.
    pub fn adm_url(self) -> ConfigResult<&'static str> {
        match self {
            Self::Testing => Err(ConfigError::MissingEndpoint {
                provider: "ADM",
                environment: self.to_string(),
            }),
            _ => Ok(ADM_URL),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Testing => "testing",
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        })
    }
}

/// Splits a `host:port` gateway address.
pub fn split_address(address: &str) -> ConfigResult<(&str, u16)> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::InvalidAddress(address.to_string()))?;
    let port = port
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(address.to_string()))?;

    if host.is_empty() {
        return Err(ConfigError::InvalidAddress(address.to_string()));
    }

    Ok((host.trim_start_matches('[').trim_end_matches(']'), port))
}
