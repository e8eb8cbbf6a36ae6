//! The APNs notification model.
//!
//! A [`Notification`] always holds a payload that fits the gateway's size cap.
//! Every mutation re-serialises the payload and is rejected, leaving the
//! notification untouched, if the result would be too large.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    codec::MAX_PAYLOAD_SIZE,
    error::{ApnsError, Result},
};

/// Default delivery priority: send immediately.
pub const DEFAULT_PRIORITY: u8 = 10;

/// Upper bound (exclusive) of generated notification identifiers.
const IDENTIFIER_RANGE: u32 = 9999;

/// Localisable alert fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AlertDictionary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_loc_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loc_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_image: Option<String>,
}

/// The `alert` value: either plain text or a dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Alert {
    Text(String),
    Dictionary(AlertDictionary),
}

impl From<&str> for Alert {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Alert {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<AlertDictionary> for Alert {
    fn from(dictionary: AlertDictionary) -> Self {
        Self::Dictionary(dictionary)
    }
}

/// The `aps` dictionary understood by the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<Alert>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
}

impl Aps {
    #[must_use]
    pub fn alert(alert: impl Into<Alert>) -> Self {
        Self {
            alert: Some(alert.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_badge(mut self, badge: u32) -> Self {
        self.badge = Some(badge);
        self
    }

    #[must_use]
    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }
}

/// A notification ready to be framed for the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    identifier: u32,
    expiry: u32,
    priority: u8,
    device_token: String,
    token: Vec<u8>,
    payload: Map<String, Value>,
    encoded: Vec<u8>,
}

/// Serialises `payload`, enforcing the gateway's size cap.
fn encode_payload(payload: &Map<String, Value>) -> Result<Vec<u8>> {
    let encoded = serde_json::to_vec(payload)?;
    if encoded.len() > MAX_PAYLOAD_SIZE {
        return Err(ApnsError::PayloadTooLarge {
            size: encoded.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok(encoded)
}

impl Notification {
    /// Creates a notification for the hex `device_token` with payload `{"aps": aps}`.
    ///
    /// `expiry` is in epoch seconds; 0 asks the gateway not to store the
    /// notification for later delivery. The identifier is random and can be
    /// overridden with [`Notification::with_identifier`].
    pub fn new(device_token: impl Into<String>, aps: &Aps, expiry: u32) -> Result<Self> {
        let device_token = device_token.into();
        let token = hex::decode(&device_token)
            .map_err(|err| ApnsError::InvalidToken(format!("{device_token}: {err}")))?;

        if token.is_empty() || u16::try_from(token.len()).is_err() {
            return Err(ApnsError::InvalidToken(format!(
                "{device_token}: {} bytes",
                token.len()
            )));
        }

        let mut payload = Map::new();
        payload.insert("aps".to_string(), serde_json::to_value(aps)?);
        let encoded = encode_payload(&payload)?;

        Ok(Self {
            identifier: rand::rng().random_range(0..IDENTIFIER_RANGE),
            expiry,
            priority: DEFAULT_PRIORITY,
            device_token,
            token,
            payload,
            encoded,
        })
    }

    #[must_use]
    pub const fn with_identifier(mut self, identifier: u32) -> Self {
        self.identifier = identifier;
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Adds or replaces a custom top-level payload field.
    ///
    /// Rejected with [`ApnsError::PayloadTooLarge`] when the resulting payload
    /// would exceed the cap; the notification is unchanged in that case.
    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let mut payload = self.payload.clone();
        payload.insert(key.into(), serde_json::to_value(value)?);

        self.encoded = encode_payload(&payload)?;
        self.payload = payload;
        Ok(())
    }

    /// A custom payload field, or the `aps` dictionary.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    #[must_use]
    pub const fn identifier(&self) -> u32 {
        self.identifier
    }

    #[must_use]
    pub const fn expiry(&self) -> u32 {
        self.expiry
    }

    #[must_use]
    pub const fn priority(&self) -> u8 {
        self.priority
    }

    /// The device token as hex text.
    #[must_use]
    pub fn device_token(&self) -> &str {
        &self.device_token
    }

    /// The decoded device token.
    #[must_use]
    pub fn token_bytes(&self) -> &[u8] {
        &self.token
    }

    /// The serialised payload, never larger than the gateway cap.
    #[must_use]
    pub fn payload_bytes(&self) -> &[u8] {
        &self.encoded
    }
}
