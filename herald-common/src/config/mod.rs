//! Configuration types shared by the provider clients.
//!
//! - [`tls`]: client certificate credentials and certificate validation policy
//! - [`timeouts`]: socket and HTTP timeouts

pub mod timeouts;
pub mod tls;

pub use timeouts::{ApnsTimeouts, HttpTimeouts};
pub use tls::{Credentials, PemSource, TlsCertificatePolicy};
