//! Amazon Device Messaging client.

use std::collections::BTreeMap;

use herald_common::{
    Outcome, Provider, Response, config::HttpTimeouts, incoming, internal, outgoing,
    response::classify_provider_error, token_prefix, tracing,
};
use herald_tracing::traced;
use reqwest::{
    Client, Url,
    header::{ACCEPT, AUTHORIZATION, HeaderMap},
};
use serde::{Deserialize, Serialize};

use crate::{
    endpoint,
    error::{HttpError, Result},
    http_client, retry_after,
};

const TYPE_VERSION_HEADER: &str = "X-Amzn-Type-Version";
const TYPE_VERSION: &str = "com.amazon.device.messaging.ADMMessage@1.0";
const ACCEPT_TYPE_HEADER: &str = "X-Amzn-Accept-Type";
const ACCEPT_TYPE: &str = "com.amazon.device.messaging.ADMSendResult@1.0";
const REQUEST_ID_HEADER: &str = "X-Amzn-RequestId";
const DATA_MD5_HEADER: &str = "X-Amzn-Data-md5";

/// A message for a single Kindle device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmMessage {
    pub data: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consolidation_key: Option<String>,
    /// Seconds ADM keeps the message while the device is offline.
    #[serde(rename = "expiresAfter", skip_serializing_if = "Option::is_none")]
    pub expires_after: Option<u32>,
    /// Goes in the request path, not the body.
    #[serde(skip)]
    pub registration_id: String,
}

impl AdmMessage {
    pub fn new(registration_id: impl Into<String>) -> Self {
        Self {
            data: BTreeMap::new(),
            consolidation_key: None,
            expires_after: None,
            registration_id: registration_id.into(),
        }
    }

    pub fn set_data(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn with_consolidation_key(mut self, key: impl Into<String>) -> Self {
        self.consolidation_key = Some(key.into());
        self
    }

    #[must_use]
    pub const fn with_expires_after(mut self, seconds: u32) -> Self {
        self.expires_after = Some(seconds);
        self
    }
}

/// JSON body of an ADM reply. Successful replies carry `registrationID`,
/// failed ones carry `reason`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdmReply {
    #[serde(rename = "registrationID")]
    pub registration_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AdmClient {
    http: Client,
    base: Url,
    access_token: String,
}

impl AdmClient {
    /// Creates a client for the ADM service at `base_url`, authenticating
    /// with an OAuth `access_token`.
    pub fn new(
        base_url: &str,
        access_token: impl Into<String>,
        timeouts: &HttpTimeouts,
    ) -> Result<Self> {
        let base = endpoint(base_url)?;
        if base.cannot_be_a_base() {
            return Err(HttpError::InvalidUrl {
                url: base_url.to_string(),
                source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
            });
        }

        Ok(Self {
            http: http_client(timeouts, None)?,
            base,
            access_token: access_token.into(),
        })
    }

    fn message_url(&self, registration_id: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "messaging",
                "registrations",
                registration_id,
                "messages",
            ]);
        }
        url
    }

    /// Posts `message` to its registration and classifies the reply.
    ///
    /// The ADM request id becomes the response identifier. A status ADM does
    /// not document is an error rather than a guess.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, fields(token = token_prefix(&message.registration_id))), timing(precision = "ms"))]
    pub async fn send(&self, message: &AdmMessage) -> Result<Response> {
        if message.registration_id.is_empty() {
            return Err(HttpError::MissingRegistrationId);
        }

        let url = self.message_url(&message.registration_id);
        outgoing!(level = DEBUG, url = %url, "Posting ADM message");

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .header(ACCEPT, "application/json")
            .header(TYPE_VERSION_HEADER, TYPE_VERSION)
            .header(ACCEPT_TYPE_HEADER, ACCEPT_TYPE)
            .json(message)
            .send()
            .await?;

        let status = response.status().as_u16();
        let retry_after = retry_after(&response);
        let request_id = header(response.headers(), REQUEST_ID_HEADER);
        let md5 = header(response.headers(), DATA_MD5_HEADER);
        let body = response.text().await?;

        incoming!(
            level = DEBUG,
            status,
            request_id = request_id.as_deref(),
            md5 = md5.as_deref(),
            "ADM replied"
        );

        let outcome = match status {
            200 => {
                let reply: AdmReply = serde_json::from_str(&body)?;
                match reply.registration_id {
                    Some(current) if !current.is_empty() && current != message.registration_id => {
                        Outcome::UpdateToken { token: current }
                    }
                    _ => Outcome::Success,
                }
            }
            400 => {
                let reply: AdmReply = serde_json::from_str(&body)?;
                let reason = reply.reason.unwrap_or_default();
                classify_provider_error(&reason, &retry_after)
            }
            401 => Outcome::TokenExpired,
            413 => Outcome::Error(
                reason(&body).unwrap_or_else(|| "MessageTooLarge".to_string()),
            ),
            429 | 500 | 503 => Outcome::retry(&retry_after),
            _ => return Err(HttpError::UnexpectedStatus { status, body }),
        };

        internal!(level = DEBUG, status, %outcome, "ADM reply classified");

        let response = Response::new(Provider::Adm, status, outcome);
        Ok(match request_id {
            Some(id) => response.with_identifier(id),
            None => response,
        })
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// The `reason` of an error body, if the body is the JSON ADM documents.
fn reason(body: &str) -> Option<String> {
    serde_json::from_str::<AdmReply>(body).ok()?.reason
}
