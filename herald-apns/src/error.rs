//! Error types for the APNs client.
//!
//! Delivery verdicts (Retry, RemoveToken, ...) are not errors; they are carried
//! in [`herald_common::Response`]. The types here cover conditions where no
//! verdict exists: input rejected before any I/O, unusable credentials, or a
//! gateway that could not be reached at all.

use std::io;

use thiserror::Error;

/// Errors that can occur while loading TLS credentials.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Failed to read or parse the client certificate.
    #[error("Failed to load client certificate: {0}")]
    CertificateLoad(String),

    /// Failed to read or parse the client private key.
    #[error("Failed to load client private key: {0}")]
    KeyLoad(String),

    /// The certificate source contained no PEM certificates.
    #[error("No certificates found in client certificate")]
    NoCertificates,

    /// The gateway host cannot be used as a TLS server name.
    #[error("Invalid server name: {0}")]
    InvalidServerName(String),

    /// Rustls library error.
    #[error("TLS error: {0}")]
    Rustls(String),
}

impl From<tokio_rustls::rustls::Error> for TlsError {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::Rustls(err.to_string())
    }
}

/// Errors that can occur when sending through the APNs gateway.
#[derive(Debug, Error)]
pub enum ApnsError {
    /// The serialised payload exceeds the gateway's size cap.
    #[error("Payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    /// The device token is not valid hex, or has an unusable length.
    #[error("Invalid device token: {0}")]
    InvalidToken(String),

    /// The payload could not be serialised.
    #[error("Failed to serialise payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Credential or TLS configuration error.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Dialing or handshaking with the gateway failed.
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// I/O error outside of the send cycle.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Specialized `Result` type for APNs operations.
pub type Result<T> = std::result::Result<T, ApnsError>;

/// Specialized `Result` type for TLS credential loading.
pub type TlsResult<T> = std::result::Result<T, TlsError>;
