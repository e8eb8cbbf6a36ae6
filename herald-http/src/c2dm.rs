//! Android Cloud to Device Messaging client.
//!
//! C2DM takes a form-encoded body and answers 200 with a plain-text
//! `id=...` or `Error=...` line.

use std::collections::BTreeMap;

use herald_common::{
    Outcome, Provider, Response, config::HttpTimeouts, incoming, internal, outgoing,
    response::classify_provider_error, token_prefix, tracing,
};
use herald_tracing::traced;
use reqwest::{
    Client, Url,
    header::{AUTHORIZATION, CONTENT_TYPE},
};

use crate::{
    endpoint,
    error::{HttpError, Result},
    http_client, retry_after,
};

/// Encoded requests must stay below this many bytes.
pub const MAX_MESSAGE_SIZE: usize = 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A message for a single Android device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct C2dmMessage {
    pub registration_id: String,
    pub collapse_key: Option<String>,
    /// Sent as `data.<key>` form fields.
    pub data: BTreeMap<String, String>,
}

impl C2dmMessage {
    pub fn new(registration_id: impl Into<String>) -> Self {
        Self {
            registration_id: registration_id.into(),
            ..Self::default()
        }
    }

    pub fn set_data(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn with_collapse_key(mut self, key: impl Into<String>) -> Self {
        self.collapse_key = Some(key.into());
        self
    }

    /// The form body, after checking the message is sendable.
    pub fn encode(&self) -> Result<String> {
        if self.registration_id.is_empty() {
            return Err(HttpError::MissingRegistrationId);
        }
        if self.data.is_empty() {
            return Err(HttpError::EmptyPayload);
        }

        let mut form = url::form_urlencoded::Serializer::new(String::new());
        form.append_pair("registration_id", &self.registration_id);
        if let Some(collapse_key) = &self.collapse_key {
            form.append_pair("collapse_key", collapse_key);
        }
        for (key, value) in &self.data {
            form.append_pair(&format!("data.{key}"), value);
        }

        let encoded = form.finish();
        if encoded.len() >= MAX_MESSAGE_SIZE {
            return Err(HttpError::MessageTooBig {
                size: encoded.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        Ok(encoded)
    }
}

/// What a 200 reply body says.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply<'a> {
    Accepted(&'a str),
    Rejected(&'a str),
    Unrecognised,
}

fn parse_reply(body: &str) -> Reply<'_> {
    for line in body.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix("Error=") {
            return Reply::Rejected(name);
        }
        if let Some(id) = line.strip_prefix("id=") {
            return Reply::Accepted(id);
        }
    }
    Reply::Unrecognised
}

#[derive(Debug, Clone)]
pub struct C2dmClient {
    http: Client,
    url: Url,
    auth_token: String,
}

impl C2dmClient {
    /// Creates a client posting to `url` with a ClientLogin `auth_token`.
    pub fn new(url: &str, auth_token: impl Into<String>, timeouts: &HttpTimeouts) -> Result<Self> {
        Ok(Self {
            url: endpoint(url)?,
            http: http_client(timeouts, None)?,
            auth_token: auth_token.into(),
        })
    }

    /// Posts `message` and classifies the reply.
    ///
    /// The message is validated and size-checked before any request is made.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, fields(token = token_prefix(&message.registration_id))), timing(precision = "ms"))]
    pub async fn send(&self, message: &C2dmMessage) -> Result<Response> {
        let form = message.encode()?;

        outgoing!(level = DEBUG, url = %self.url, bytes = form.len(), "Posting C2DM message");

        let response = self
            .http
            .post(self.url.clone())
            .header(AUTHORIZATION, format!("GoogleLogin auth={}", self.auth_token))
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let retry_after = retry_after(&response);
        let body = response.text().await?;

        incoming!(level = DEBUG, status, "C2DM replied");

        let response = match status {
            200 => match parse_reply(&body) {
                Reply::Accepted(id) => {
                    Response::new(Provider::C2dm, status, Outcome::Success).with_identifier(id)
                }
                Reply::Rejected(name) => Response::new(
                    Provider::C2dm,
                    status,
                    classify_provider_error(name, &retry_after),
                ),
                Reply::Unrecognised => return Err(HttpError::UnexpectedStatus { status, body }),
            },
            401 => Response::new(Provider::C2dm, status, Outcome::TokenExpired),
            500 | 503 => Response::new(Provider::C2dm, status, Outcome::retry(&retry_after)),
            400 => return Err(HttpError::Malformed { status, body }),
            _ => return Err(HttpError::UnexpectedStatus { status, body }),
        };

        internal!(level = DEBUG, status, outcome = %response.outcome, "C2DM reply classified");

        Ok(response)
    }
}
