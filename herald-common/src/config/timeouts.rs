//! Timeout configuration for the provider clients.
//!
//! The APNs binary protocol sends nothing back when a notification is
//! accepted, so `read_timeout_ms` is the window in which an error reply can
//! still be observed. It trades throughput against the chance of missing a
//! late error frame; it is a tunable, not a correctness guarantee.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeouts for the APNs gateway and feedback sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApnsTimeouts {
    /// How long a send waits for an error reply before treating silence as success.
    ///
    /// Default: 150 milliseconds
    #[serde(default = "defaults::read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Advisory delay attached to Retry outcomes caused by transport failures.
    ///
    /// Default: 5 seconds
    #[serde(default = "defaults::transport_retry_secs")]
    pub transport_retry_secs: u64,

    /// Bound on dialing and handshaking with the feedback endpoint.
    ///
    /// Default: 5 seconds
    #[serde(default = "defaults::feedback_connect_secs")]
    pub feedback_connect_secs: u64,

    /// How long the feedback listener waits for the next frame before giving up.
    ///
    /// Default: 5 seconds
    #[serde(default = "defaults::feedback_idle_secs")]
    pub feedback_idle_secs: u64,
}

impl Default for ApnsTimeouts {
    fn default() -> Self {
        Self {
            read_timeout_ms: defaults::read_timeout_ms(),
            transport_retry_secs: defaults::transport_retry_secs(),
            feedback_connect_secs: defaults::feedback_connect_secs(),
            feedback_idle_secs: defaults::feedback_idle_secs(),
        }
    }
}

impl ApnsTimeouts {
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    #[must_use]
    pub const fn transport_retry(&self) -> Duration {
        Duration::from_secs(self.transport_retry_secs)
    }

    #[must_use]
    pub const fn feedback_connect(&self) -> Duration {
        Duration::from_secs(self.feedback_connect_secs)
    }

    #[must_use]
    pub const fn feedback_idle(&self) -> Duration {
        Duration::from_secs(self.feedback_idle_secs)
    }
}

/// Timeouts for the HTTP provider clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTimeouts {
    /// Overall request timeout, covering connect, send and body read.
    ///
    /// Default: 20 seconds
    #[serde(default = "defaults::request_secs")]
    pub request_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            request_secs: defaults::request_secs(),
        }
    }
}

impl HttpTimeouts {
    #[must_use]
    pub const fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

mod defaults {
    pub const fn read_timeout_ms() -> u64 {
        150
    }
    pub const fn transport_retry_secs() -> u64 {
        5
    }
    pub const fn feedback_connect_secs() -> u64 {
        5
    }
    pub const fn feedback_idle_secs() -> u64 {
        5
    }
    pub const fn request_secs() -> u64 {
        20
    }
}
