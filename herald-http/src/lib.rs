//! HTTP clients for the GCM, ADM and C2DM push providers.
//!
//! Every client returns a [`herald_common::Response`] built with the same
//! classifier the APNs socket client uses, so callers handle one result
//! shape regardless of provider.

pub mod adm;
pub mod c2dm;
pub mod error;
pub mod gcm;

use herald_common::{RetryAfter, config::HttpTimeouts};
use reqwest::{Client, Url, header::RETRY_AFTER};

pub use adm::{AdmClient, AdmMessage};
pub use c2dm::{C2dmClient, C2dmMessage};
pub use error::{HttpError, Result};
pub use gcm::{GcmClient, GcmMessage};

/// Builds the shared HTTP client, optionally routing every request through `proxy`.
pub(crate) fn http_client(timeouts: &HttpTimeouts, proxy: Option<&str>) -> Result<Client> {
    let mut builder = Client::builder().timeout(timeouts.request());

    if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}

/// Parses a configured endpoint, rejecting an empty one.
pub(crate) fn endpoint(url: &str) -> Result<Url> {
    if url.is_empty() {
        return Err(HttpError::MissingUrl);
    }

    Url::parse(url).map_err(|source| HttpError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

/// The provider's `Retry-After` hint, if it sent one.
pub(crate) fn retry_after(response: &reqwest::Response) -> RetryAfter {
    RetryAfter::from_header(
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok()),
    )
}
