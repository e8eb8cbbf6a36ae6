//! Client certificate credentials for the APNs socket and feedback connections.
//!
//! One certificate and private key pair is issued per application and used for
//! both the gateway and the feedback handshakes.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Where a piece of PEM material comes from.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PemSource {
    /// A file on disk.
    Path(PathBuf),
    /// PEM text embedded directly in the configuration.
    Inline(String),
}

impl PemSource {
    /// Returns the raw PEM bytes.
    ///
    /// `what` names the material in error messages ("certificate", "key").
    pub fn read(&self, what: &'static str) -> ConfigResult<Vec<u8>> {
        match self {
            Self::Path(path) => std::fs::read(path).map_err(|source| ConfigError::Read {
                what,
                path: path.display().to_string(),
                source,
            }),
            Self::Inline(pem) => Ok(pem.as_bytes().to_vec()),
        }
    }
}

impl fmt::Debug for PemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Inline(_) => f.write_str("Inline(..)"),
        }
    }
}

/// TLS certificate validation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TlsCertificatePolicy {
    /// Whether to accept invalid gateway certificates (self-signed, expired, etc.).
    ///
    /// **SECURITY WARNING**: only for local gateway simulators.
    ///
    /// Default: `false`
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

/// Certificate and key pair presented during the TLS client handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub certificate: PemSource,
    pub key: PemSource,
    #[serde(default)]
    pub policy: TlsCertificatePolicy,
}

impl Credentials {
    /// Credentials read from a certificate file and a key file.
    #[must_use]
    pub fn from_files(certificate: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            certificate: PemSource::Path(certificate.into()),
            key: PemSource::Path(key.into()),
            policy: TlsCertificatePolicy::default(),
        }
    }

    /// Credentials built from PEM text held in memory.
    #[must_use]
    pub fn from_pem(certificate: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            certificate: PemSource::Inline(certificate.into()),
            key: PemSource::Inline(key.into()),
            policy: TlsCertificatePolicy::default(),
        }
    }

    /// Disables gateway certificate validation.
    ///
    /// **WARNING**: only use against local simulators.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.policy.accept_invalid_certs = accept;
        self
    }

    /// Returns `true` if invalid gateway certificates should be accepted.
    #[must_use]
    pub const fn accepts_invalid_certs(&self) -> bool {
        self.policy.accept_invalid_certs
    }
}
