use herald_common::{
    Environment,
    config::{ApnsTimeouts, Credentials},
};
use serde::{Deserialize, Serialize};

use crate::pool::DEFAULT_POOL_SIZE;

/// Settings for an [`ApnsClient`](crate::ApnsClient) and its feedback listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApnsConfig {
    /// `host:port` of the notification gateway.
    pub gateway: String,

    /// `host:port` of the feedback service.
    pub feedback: String,

    pub credentials: Credentials,

    /// Number of gateway connections kept by the client.
    ///
    /// Default: 20
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default)]
    pub timeouts: ApnsTimeouts,
}

const fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

impl ApnsConfig {
    /// Configuration pointing at the gateway and feedback service of `environment`.
    #[must_use]
    pub fn for_environment(environment: Environment, credentials: Credentials) -> Self {
        Self {
            gateway: environment.apns_gateway().to_string(),
            feedback: environment.apns_feedback().to_string(),
            credentials,
            pool_size: DEFAULT_POOL_SIZE,
            timeouts: ApnsTimeouts::default(),
        }
    }

    #[must_use]
    pub const fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: ApnsTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}
