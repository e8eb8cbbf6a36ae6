//! Google Cloud Messaging client.
//!
//! One request fans out to up to 1000 registration ids; the reply carries a
//! result per recipient, in request order.

use herald_common::{
    Outcome, Provider, RecipientResult, Response, RetryAfter, config::HttpTimeouts, incoming,
    internal, outgoing,
    response::{classify_http_status, classify_provider_error},
    tracing,
};
use herald_tracing::traced;
use reqwest::{Client, Url, header::AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    endpoint,
    error::{HttpError, Result},
    http_client, retry_after,
};

/// Four weeks, the longest GCM keeps an undelivered message.
pub const DEFAULT_TIME_TO_LIVE: u32 = 2_419_200;

/// A message for one or more Android devices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GcmMessage {
    pub registration_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub delay_while_idle: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

impl GcmMessage {
    /// A message for `ids`, held while the device is idle and kept for four weeks.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            registration_ids: ids.into_iter().map(Into::into).collect(),
            collapse_key: None,
            data: Map::new(),
            delay_while_idle: true,
            time_to_live: Some(DEFAULT_TIME_TO_LIVE),
            dry_run: false,
        }
    }

    pub fn add_recipients<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registration_ids.extend(ids.into_iter().map(Into::into));
    }

    /// Sets one key of the data payload delivered to the application.
    pub fn set_payload(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn with_collapse_key(mut self, key: impl Into<String>) -> Self {
        self.collapse_key = Some(key.into());
        self
    }

    /// Asks GCM to validate the request without delivering it.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Per-recipient entry of a GCM reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GcmResult {
    pub message_id: Option<String>,
    /// Canonical id replacing the one the message was sent to.
    pub registration_id: Option<String>,
    pub error: Option<String>,
}

impl GcmResult {
    fn classify(&self, index: usize, retry_after: &RetryAfter) -> RecipientResult {
        let outcome = match (&self.error, &self.registration_id) {
            (Some(name), _) => classify_provider_error(name, retry_after),
            (None, Some(token)) => Outcome::UpdateToken {
                token: token.clone(),
            },
            (None, None) => Outcome::Success,
        };

        RecipientResult {
            index,
            message_id: self.message_id.clone(),
            outcome,
        }
    }
}

/// Body of a 200 reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GcmReply {
    pub multicast_id: i64,
    pub success: u32,
    pub failure: u32,
    pub canonical_ids: u32,
    pub results: Vec<GcmResult>,
}

#[derive(Debug, Clone)]
pub struct GcmClient {
    http: Client,
    url: Url,
    key: String,
}

impl GcmClient {
    /// Creates a client posting to `url` with the sender's API `key`,
    /// optionally through an HTTP `proxy`.
    pub fn new(
        url: &str,
        key: impl Into<String>,
        proxy: Option<&str>,
        timeouts: &HttpTimeouts,
    ) -> Result<Self> {
        Ok(Self {
            url: endpoint(url)?,
            http: http_client(timeouts, proxy)?,
            key: key.into(),
        })
    }

    /// Posts `message` and classifies the reply.
    ///
    /// A 200 reply is classified per recipient and the overall outcome is the
    /// most severe of them. The multicast id becomes the response identifier.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, fields(recipients = message.registration_ids.len())), timing(precision = "ms"))]
    pub async fn send(&self, message: &GcmMessage) -> Result<Response> {
        if message.registration_ids.is_empty() {
            return Err(HttpError::MissingRegistrationId);
        }

        outgoing!(
            level = DEBUG,
            url = %self.url,
            recipients = message.registration_ids.len(),
            "Posting GCM message"
        );

        let response = self
            .http
            .post(self.url.clone())
            .header(AUTHORIZATION, format!("key={}", self.key))
            .json(message)
            .send()
            .await?;

        let status = response.status().as_u16();
        let retry_after = retry_after(&response);
        let body = response.text().await?;

        incoming!(level = DEBUG, status, "GCM replied");

        if status == 400 {
            return Err(HttpError::Malformed { status, body });
        }

        if let Some(outcome) = classify_http_status(status, &retry_after) {
            return Ok(Response::new(Provider::Gcm, status, outcome));
        }

        if status != 200 {
            internal!(level = WARN, status, "Unexpected GCM status, retrying");
            return Ok(Response::new(
                Provider::Gcm,
                status,
                Outcome::retry(&retry_after),
            ));
        }

        let reply: GcmReply = serde_json::from_str(&body)?;
        let recipients: Vec<_> = reply
            .results
            .iter()
            .enumerate()
            .map(|(index, result)| result.classify(index, &retry_after))
            .collect();
        let outcome = Outcome::aggregate(recipients.iter().map(|r| &r.outcome));

        internal!(
            level = DEBUG,
            multicast_id = reply.multicast_id,
            success = reply.success,
            failure = reply.failure,
            canonical_ids = reply.canonical_ids,
            %outcome,
            "GCM reply classified"
        );

        Ok(Response::new(Provider::Gcm, status, outcome)
            .with_identifier(reply.multicast_id.to_string())
            .with_recipients(recipients))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_new_message_defaults() {
        let message = GcmMessage::new(["a", "b"]);
        assert_eq!(message.registration_ids, vec!["a", "b"]);
        assert!(message.delay_while_idle);
        assert_eq!(message.time_to_live, Some(DEFAULT_TIME_TO_LIVE));
        assert!(!message.dry_run);
    }

    #[test]
    fn test_message_serialisation() {
        let mut message = GcmMessage::new(["a"]).with_collapse_key("score");
        message.add_recipients(["b"]);
        message.set_payload("msg", "hello");

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "registration_ids": ["a", "b"],
                "collapse_key": "score",
                "data": {"msg": "hello"},
                "delay_while_idle": true,
                "time_to_live": 2_419_200,
            })
        );
    }

    #[test]
    fn test_result_classification() {
        let retry = RetryAfter::None;
        let result = |json: Value| serde_json::from_value::<GcmResult>(json).unwrap();

        assert_eq!(
            result(json!({"message_id": "1:08"})).classify(0, &retry).outcome,
            Outcome::Success
        );
        assert_eq!(
            result(json!({"message_id": "1:09", "registration_id": "fresh"}))
                .classify(1, &retry)
                .outcome,
            Outcome::UpdateToken {
                token: "fresh".to_string()
            }
        );
        assert_eq!(
            result(json!({"error": "NotRegistered"}))
                .classify(2, &retry)
                .outcome,
            Outcome::RemoveToken
        );
        assert_eq!(
            result(json!({"error": "Unavailable"}))
                .classify(3, &retry)
                .outcome,
            Outcome::Retry { after: None }
        );
    }

    #[test]
    fn test_client_rejects_missing_url() {
        assert!(matches!(
            GcmClient::new("", "key", None, &HttpTimeouts::default()),
            Err(HttpError::MissingUrl)
        ));
    }
}
