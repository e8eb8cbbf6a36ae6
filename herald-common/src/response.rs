//! Provider-independent delivery outcomes.
//!
//! Every provider reply, whatever its wire shape, is reduced to exactly one
//! [`Outcome`]:
//!
//! - **Success**: the provider accepted the message
//! - **Retry**: transient failure, try again after the advisory delay (if any)
//! - **UpdateToken**: the device identifier was superseded; store the new one
//! - **RemoveToken**: the device identifier is invalid; never send to it again
//! - **TokenExpired**: the sender's own credential needs refreshing
//! - **Error**: provider-specific failure, surfaced verbatim
//!
//! The helpers at the bottom of this module hold the mapping rules every
//! provider client shares, so that a 5xx from GCM and an "Unavailable" result
//! from ADM both end up as `Retry` with the same delay handling.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The push provider a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Apns,
    Gcm,
    Adm,
    C2dm,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Apns => "APNs",
            Self::Gcm => "GCM",
            Self::Adm => "ADM",
            Self::C2dm => "C2DM",
        })
    }
}

/// A provider-supplied retry hint as it appeared on the wire.
///
/// Providers send `Retry-After` either as a number of seconds or as an HTTP
/// date, and sometimes not at all.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryAfter {
    #[default]
    None,
    Seconds(u32),
    Raw(String),
}

impl RetryAfter {
    /// Interprets a `Retry-After` header value.
    #[must_use]
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::None,
            Some(value) => value
                .parse::<u32>()
                .map_or_else(|_| Self::Raw(value.to_string()), Self::Seconds),
        }
    }

    /// Normalises the hint into a delay measured from `now`.
    ///
    /// A date in the past yields a zero delay. Text that is neither a number
    /// nor an HTTP date yields `None`: no advice was given, which is not the
    /// same as "retry immediately".
    #[must_use]
    pub fn delay_from(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Seconds(secs) => Some(Duration::from_secs(u64::from(*secs))),
            Self::Raw(text) => DateTime::parse_from_rfc2822(text).ok().map(|at| {
                (at.with_timezone(&Utc) - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
            }),
        }
    }

    /// Normalises the hint into a delay measured from the current time.
    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        self.delay_from(Utc::now())
    }
}

/// The classified result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Retry { after: Option<Duration> },
    UpdateToken { token: String },
    RemoveToken,
    TokenExpired,
    Error(String),
}

impl Outcome {
    /// A Retry outcome carrying the normalised provider hint.
    #[must_use]
    pub fn retry(hint: &RetryAfter) -> Self {
        Self::Retry {
            after: hint.delay(),
        }
    }

    /// A Retry outcome with a fixed advisory delay.
    #[must_use]
    pub const fn retry_in(after: Duration) -> Self {
        Self::Retry { after: Some(after) }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Precedence used when folding several per-recipient outcomes into one.
    const fn severity(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Error(_) => 1,
            Self::TokenExpired => 2,
            Self::Retry { .. } => 3,
            Self::UpdateToken { .. } => 4,
            Self::RemoveToken => 5,
        }
    }

    /// Folds per-recipient outcomes into the one reported for the whole request.
    ///
    /// RemoveToken wins over UpdateToken, which wins over Retry, TokenExpired,
    /// Error and finally Success. An empty set is a Success.
    pub fn aggregate<'a>(outcomes: impl IntoIterator<Item = &'a Self>) -> Self {
        outcomes
            .into_iter()
            .fold(None::<&Self>, |worst, outcome| match worst {
                Some(current) if current.severity() >= outcome.severity() => Some(current),
                _ => Some(outcome),
            })
            .cloned()
            .unwrap_or(Self::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Retry { after: Some(after) } => write!(f, "retry after {}s", after.as_secs()),
            Self::Retry { after: None } => f.write_str("retry"),
            Self::UpdateToken { .. } => f.write_str("update token"),
            Self::RemoveToken => f.write_str("remove token"),
            Self::TokenExpired => f.write_str("token expired"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Per-recipient result for providers that accept several device tokens in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientResult {
    /// Position of the device token in the request.
    pub index: usize,
    pub message_id: Option<String>,
    pub outcome: Outcome,
}

/// A classified provider response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub provider: Provider,
    /// Raw status: the HTTP status code, or the APNs error-frame status byte
    /// (0 when the gateway stayed silent).
    pub status: u16,
    /// Correlation identifier: the APNs notification identifier, or the
    /// provider's message/request id.
    pub identifier: Option<String>,
    pub outcome: Outcome,
    /// Empty for single-recipient providers.
    pub recipients: Vec<RecipientResult>,
}

impl Response {
    #[must_use]
    pub const fn new(provider: Provider, status: u16, outcome: Outcome) -> Self {
        Self {
            provider,
            status,
            identifier: None,
            outcome,
            recipients: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    #[must_use]
    pub fn with_recipients(mut self, recipients: Vec<RecipientResult>) -> Self {
        self.recipients = recipients;
        self
    }

    /// Returns `true` if the provider accepted the message.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Returns `true` if the caller should try again later.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self.outcome, Outcome::Retry { .. })
    }

    /// The advisory delay of a Retry outcome, when the provider gave one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self.outcome {
            Outcome::Retry { after } => after,
            _ => None,
        }
    }

    /// Returns `true` if the stored device token must be replaced or removed.
    #[must_use]
    pub const fn update_token(&self) -> bool {
        matches!(
            self.outcome,
            Outcome::UpdateToken { .. } | Outcome::RemoveToken
        )
    }

    /// The replacement device token of an UpdateToken outcome.
    #[must_use]
    pub fn replacement_token(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::UpdateToken { token } => Some(token),
            _ => None,
        }
    }

    /// Returns `true` if the device token must never be used again.
    #[must_use]
    pub const fn should_remove_token(&self) -> bool {
        matches!(self.outcome, Outcome::RemoveToken)
    }

    /// Request positions of the recipients the provider accepted.
    #[must_use]
    pub fn success_indexes(&self) -> Vec<usize> {
        self.recipient_indexes(|outcome| matches!(outcome, Outcome::Success))
    }

    /// Request positions of the recipients that failed for any reason other
    /// than a changed registration.
    #[must_use]
    pub fn error_indexes(&self) -> Vec<usize> {
        self.recipient_indexes(|outcome| {
            !matches!(outcome, Outcome::Success | Outcome::UpdateToken { .. })
        })
    }

    /// Request positions of the recipients whose token was replaced.
    #[must_use]
    pub fn refresh_indexes(&self) -> Vec<usize> {
        self.recipient_indexes(|outcome| matches!(outcome, Outcome::UpdateToken { .. }))
    }

    fn recipient_indexes(&self, select: impl Fn(&Outcome) -> bool) -> Vec<usize> {
        self.recipients
            .iter()
            .filter(|recipient| select(&recipient.outcome))
            .map(|recipient| recipient.index)
            .collect()
    }
}

/// Provider error names meaning the service is temporarily unable to deliver.
const RETRY_ERRORS: &[&str] = &[
    "Unavailable",
    "InternalServerError",
    "QuotaExceeded",
    "DeviceQuotaExceeded",
    "DeviceMessageRateExceeded",
    "MaxRateExceeded",
];

/// Provider error names meaning the device identifier is no longer valid.
const REMOVE_ERRORS: &[&str] = &[
    "NotRegistered",
    "InvalidRegistration",
    "InvalidRegistrationId",
    "Unregistered",
    "MismatchSenderId",
];

/// Provider error names meaning the sender's access credential has expired.
const EXPIRED_ERRORS: &[&str] = &["AccessTokenExpired"];

/// Classifies the status line of an HTTP provider reply.
///
/// Returns `None` when the status alone does not decide the outcome and the
/// provider-specific body has to be inspected.
#[must_use]
pub fn classify_http_status(status: u16, retry_after: &RetryAfter) -> Option<Outcome> {
    match status {
        429 | 500..=599 => Some(Outcome::retry(retry_after)),
        401 => Some(Outcome::TokenExpired),
        _ => None,
    }
}

/// Classifies a provider error name (`"NotRegistered"`, `"Unavailable"`, ...).
#[must_use]
pub fn classify_provider_error(name: &str, retry_after: &RetryAfter) -> Outcome {
    let name = name.trim();
    if RETRY_ERRORS.contains(&name) {
        Outcome::retry(retry_after)
    } else if REMOVE_ERRORS.contains(&name) {
        Outcome::RemoveToken
    } else if EXPIRED_ERRORS.contains(&name) {
        Outcome::TokenExpired
    } else {
        Outcome::Error(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_retry_after_from_header() {
        assert_eq!(RetryAfter::from_header(None), RetryAfter::None);
        assert_eq!(RetryAfter::from_header(Some("  ")), RetryAfter::None);
        assert_eq!(RetryAfter::from_header(Some("120")), RetryAfter::Seconds(120));
        assert_eq!(
            RetryAfter::from_header(Some("Wed, 21 Oct 2015 07:28:00 GMT")),
            RetryAfter::Raw("Wed, 21 Oct 2015 07:28:00 GMT".to_string())
        );
    }

    #[test]
    fn test_retry_after_delay() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 0).unwrap();

        assert_eq!(RetryAfter::None.delay_from(now), None);
        assert_eq!(
            RetryAfter::Seconds(30).delay_from(now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            RetryAfter::Raw("Wed, 21 Oct 2015 07:28:00 GMT".to_string()).delay_from(now),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            RetryAfter::Raw("Wed, 21 Oct 2015 07:00:00 GMT".to_string()).delay_from(now),
            Some(Duration::ZERO)
        );
        // Garbage is "no advice", never zero
        assert_eq!(RetryAfter::Raw("soon".to_string()).delay_from(now), None);
    }

    #[test]
    fn test_classify_http_status() {
        assert_eq!(
            classify_http_status(503, &RetryAfter::Seconds(10)),
            Some(Outcome::retry_in(Duration::from_secs(10)))
        );
        assert_eq!(
            classify_http_status(500, &RetryAfter::None),
            Some(Outcome::Retry { after: None })
        );
        assert_eq!(
            classify_http_status(429, &RetryAfter::Seconds(1)),
            Some(Outcome::retry_in(Duration::from_secs(1)))
        );
        assert_eq!(
            classify_http_status(401, &RetryAfter::None),
            Some(Outcome::TokenExpired)
        );
        assert_eq!(classify_http_status(200, &RetryAfter::None), None);
        assert_eq!(classify_http_status(400, &RetryAfter::None), None);
    }

    #[test]
    fn test_classify_provider_error() {
        let hint = RetryAfter::Seconds(5);
        assert_eq!(
            classify_provider_error("Unavailable", &hint),
            Outcome::retry_in(Duration::from_secs(5))
        );
        assert_eq!(
            classify_provider_error("NotRegistered", &hint),
            Outcome::RemoveToken
        );
        assert_eq!(
            classify_provider_error("InvalidRegistrationId", &hint),
            Outcome::RemoveToken
        );
        assert_eq!(
            classify_provider_error("AccessTokenExpired", &hint),
            Outcome::TokenExpired
        );
        assert_eq!(
            classify_provider_error("MessageTooBig", &hint),
            Outcome::Error("MessageTooBig".to_string())
        );
    }

    #[test]
    fn test_aggregate_precedence() {
        let update = Outcome::UpdateToken {
            token: "new".to_string(),
        };
        assert_eq!(
            Outcome::aggregate(&[Outcome::Success, update.clone(), Outcome::RemoveToken]),
            Outcome::RemoveToken
        );
        assert_eq!(
            Outcome::aggregate(&[Outcome::Success, update.clone(), Outcome::Retry { after: None }]),
            update
        );
        assert_eq!(
            Outcome::aggregate(&[Outcome::Error("x".to_string()), Outcome::Success]),
            Outcome::Error("x".to_string())
        );
        assert_eq!(Outcome::aggregate(&[]), Outcome::Success);
    }

    #[test]
    fn test_aggregate_keeps_first_of_equal_severity() {
        let first = Outcome::UpdateToken {
            token: "first".to_string(),
        };
        let second = Outcome::UpdateToken {
            token: "second".to_string(),
        };
        assert_eq!(Outcome::aggregate(&[first.clone(), second]), first);
    }

    #[test]
    fn test_response_accessors() {
        let response = Response::new(
            Provider::Gcm,
            200,
            Outcome::UpdateToken {
                token: "canonical".to_string(),
            },
        );
        assert!(response.update_token());
        assert!(!response.should_remove_token());
        assert_eq!(response.replacement_token(), Some("canonical"));
        assert_eq!(response.retry_after(), None);

        let response = Response::new(Provider::Apns, 8, Outcome::RemoveToken).with_identifier("42");
        assert!(response.update_token());
        assert!(response.should_remove_token());
        assert_eq!(response.identifier.as_deref(), Some("42"));

        let response = Response::new(
            Provider::Adm,
            503,
            Outcome::retry_in(Duration::from_secs(3)),
        );
        assert!(response.should_retry());
        assert!(!response.is_success());
        assert_eq!(response.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_recipient_indexes() {
        let recipient = |index, outcome| RecipientResult {
            index,
            message_id: None,
            outcome,
        };
        let response = Response::new(Provider::Gcm, 200, Outcome::RemoveToken).with_recipients(vec![
            recipient(0, Outcome::Success),
            recipient(1, Outcome::RemoveToken),
            recipient(2, Outcome::UpdateToken {
                token: "new".to_string(),
            }),
            recipient(3, Outcome::Success),
            recipient(4, Outcome::retry_in(Duration::from_secs(1))),
        ]);

        assert_eq!(response.success_indexes(), vec![0, 3]);
        assert_eq!(response.error_indexes(), vec![1, 4]);
        assert_eq!(response.refresh_indexes(), vec![2]);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Success.to_string(), "success");
        assert_eq!(
            Outcome::retry_in(Duration::from_secs(5)).to_string(),
            "retry after 5s"
        );
        assert_eq!(
            Outcome::Error("Invalid token size".to_string()).to_string(),
            "error: Invalid token size"
        );
        assert_eq!(Provider::C2dm.to_string(), "C2DM");
    }
}
