//! Error types for the HTTP provider clients.
//!
//! As with the socket client, provider verdicts are carried in a
//! [`herald_common::Response`]; these errors mean no verdict could be had.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    /// The client was constructed without an endpoint.
    #[error("Provider URL not provided")]
    MissingUrl,

    /// The endpoint is not a valid URL.
    #[error("Invalid provider URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The message names no device.
    #[error("No registration id")]
    MissingRegistrationId,

    /// The message carries no data.
    #[error("No payload")]
    EmptyPayload,

    /// The encoded message is over the provider's size limit.
    #[error("Message of {size} bytes exceeds the {max} byte limit")]
    MessageTooBig { size: usize, max: usize },

    /// The provider rejected the request as unparseable or invalid.
    #[error("Malformed request ({status}): {body}")]
    Malformed { status: u16, body: String },

    /// The provider answered with a status it does not document.
    #[error("Unexpected response ({status}): {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The request could not be sent or the reply could not be read.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider's reply body is not the JSON it documents.
    #[error("Failed to parse provider reply: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HttpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        assert_eq!(HttpError::MissingUrl.to_string(), "Provider URL not provided");
        assert_eq!(
            HttpError::MessageTooBig {
                size: 1100,
                max: 1024
            }
            .to_string(),
            "Message of 1100 bytes exceeds the 1024 byte limit"
        );
        assert_eq!(
            HttpError::Malformed {
                status: 400,
                body: "bad json".to_string()
            }
            .to_string(),
            "Malformed request (400): bad json"
        );
    }

    #[test]
    fn test_invalid_url_keeps_source() {
        let source = url::Url::parse("not a url").unwrap_err();
        let err = HttpError::InvalidUrl {
            url: "not a url".to_string(),
            source,
        };
        assert!(std::error::Error::source(&err).is_some());
    }
}
