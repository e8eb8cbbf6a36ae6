//! Binary frame layouts of the APNs gateway and feedback protocols.
//!
//! All integers are big-endian with no padding:
//!
//! | Frame        | Layout                                                             |
//! |--------------|--------------------------------------------------------------------|
//! | Notification | `u8 cmd=1, u32 id, u32 expiry, u16 len, token, u16 len, payload`   |
//! | Error reply  | `u8 cmd, u8 status, u32 id` (6 bytes)                              |
//! | Feedback     | `u32 timestamp, u16 len=32, [u8; 32] token` (38 bytes)             |
//!
//! Replies are decoded from fixed-size arrays only, so no length read off the
//! wire ever drives an allocation.

use std::fmt;

use herald_common::Outcome;
use thiserror::Error;

use crate::error::{ApnsError, Result};

/// Command byte of a notification frame.
pub const NOTIFICATION_COMMAND: u8 = 1;

/// Largest payload the gateway accepts.
pub const MAX_PAYLOAD_SIZE: usize = 256;

/// Size of an error-response frame.
pub const ERROR_RESPONSE_SIZE: usize = 6;

/// Size of a feedback frame.
pub const FEEDBACK_FRAME_SIZE: usize = 38;

/// Token length every feedback frame must carry.
pub const FEEDBACK_TOKEN_SIZE: usize = 32;

/// Builds a notification frame.
///
/// Fails with [`ApnsError::PayloadTooLarge`] when the payload exceeds
/// [`MAX_PAYLOAD_SIZE`]; nothing is produced in that case.
pub fn encode_notification(
    identifier: u32,
    expiry: u32,
    token: &[u8],
    payload: &[u8],
) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ApnsError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let token_len = u16::try_from(token.len())
        .map_err(|_| ApnsError::InvalidToken(format!("{} bytes is too long", token.len())))?;

    let mut frame = Vec::with_capacity(1 + 4 + 4 + 2 + token.len() + 2 + payload.len());
    frame.push(NOTIFICATION_COMMAND);
    frame.extend_from_slice(&identifier.to_be_bytes());
    frame.extend_from_slice(&expiry.to_be_bytes());
    frame.extend_from_slice(&token_len.to_be_bytes());
    frame.extend_from_slice(token);
    // Bounded by MAX_PAYLOAD_SIZE above
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);

    Ok(frame)
}

/// A notification frame as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFrame {
    pub identifier: u32,
    pub expiry: u32,
    pub token: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Errors decoding a notification frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Unexpected command byte {0}")]
    Command(u8),

    #[error("Frame truncated: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },
}

/// Splits a big-endian field of `N` bytes off the front of `input`.
fn take<const N: usize>(
    input: &mut &[u8],
    consumed: &mut usize,
) -> std::result::Result<[u8; N], FrameError> {
    let (head, rest) = input.split_first_chunk::<N>().ok_or(FrameError::Truncated {
        needed: *consumed + N,
        available: *consumed + input.len(),
    })?;
    *input = rest;
    *consumed += N;
    Ok(*head)
}

fn take_slice<'a>(
    input: &mut &'a [u8],
    len: usize,
    consumed: &mut usize,
) -> std::result::Result<&'a [u8], FrameError> {
    if input.len() < len {
        return Err(FrameError::Truncated {
            needed: *consumed + len,
            available: *consumed + input.len(),
        });
    }
    let (head, rest) = input.split_at(len);
    *input = rest;
    *consumed += len;
    Ok(head)
}

/// Decodes one notification frame from the front of `input`.
///
/// Returns the frame and the number of bytes it occupied, so a reader can
/// walk a buffer holding several frames.
pub fn decode_notification(
    mut input: &[u8],
) -> std::result::Result<(NotificationFrame, usize), FrameError> {
    let mut consumed = 0;

    let [command] = take::<1>(&mut input, &mut consumed)?;
    if command != NOTIFICATION_COMMAND {
        return Err(FrameError::Command(command));
    }

    let identifier = u32::from_be_bytes(take(&mut input, &mut consumed)?);
    let expiry = u32::from_be_bytes(take(&mut input, &mut consumed)?);
    let token_len = u16::from_be_bytes(take(&mut input, &mut consumed)?);
    let token = take_slice(&mut input, usize::from(token_len), &mut consumed)?.to_vec();
    let payload_len = u16::from_be_bytes(take(&mut input, &mut consumed)?);
    let payload = take_slice(&mut input, usize::from(payload_len), &mut consumed)?.to_vec();

    Ok((
        NotificationFrame {
            identifier,
            expiry,
            token,
            payload,
        },
        consumed,
    ))
}

/// Status byte of an error-response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NoError,
    ProcessingError,
    MissingToken,
    MissingTopic,
    MissingPayload,
    InvalidTokenSize,
    InvalidTopicSize,
    InvalidPayloadSize,
    InvalidToken,
    Shutdown,
    Unknown,
    Unrecognised(u8),
}

impl From<u8> for Status {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::NoError,
            1 => Self::ProcessingError,
            2 => Self::MissingToken,
            3 => Self::MissingTopic,
            4 => Self::MissingPayload,
            5 => Self::InvalidTokenSize,
            6 => Self::InvalidTopicSize,
            7 => Self::InvalidPayloadSize,
            8 => Self::InvalidToken,
            10 => Self::Shutdown,
            255 => Self::Unknown,
            other => Self::Unrecognised(other),
        }
    }
}

impl Status {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::NoError => 0,
            Self::ProcessingError => 1,
            Self::MissingToken => 2,
            Self::MissingTopic => 3,
            Self::MissingPayload => 4,
            Self::InvalidTokenSize => 5,
            Self::InvalidTopicSize => 6,
            Self::InvalidPayloadSize => 7,
            Self::InvalidToken => 8,
            Self::Shutdown => 10,
            Self::Unknown => 255,
            Self::Unrecognised(code) => code,
        }
    }

    /// Maps the status onto the shared outcome set.
    ///
    /// `retry` is the advisory delay attached to a processing error.
    /// Framing problems (missing or oversized fields) point at a bug in the
    /// request, so they are surfaced as opaque errors rather than retried or
    /// blamed on the token.
    #[must_use]
    pub fn classify(self, retry: std::time::Duration) -> Outcome {
        match self {
            Self::NoError => Outcome::Success,
            Self::ProcessingError => Outcome::retry_in(retry),
            Self::MissingToken
            | Self::MissingTopic
            | Self::MissingPayload
            | Self::InvalidTopicSize
            | Self::InvalidPayloadSize => {
                Outcome::Error(format!("error code {}: {self}", self.code()))
            }
            Self::InvalidTokenSize | Self::InvalidToken => Outcome::RemoveToken,
            Self::Shutdown | Self::Unknown | Self::Unrecognised(_) => {
                Outcome::Error(format!("unknown error code {}", self.code()))
            }
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoError => "No errors encountered",
            Self::ProcessingError => "Processing error",
            Self::MissingToken => "Missing device token",
            Self::MissingTopic => "Missing topic",
            Self::MissingPayload => "Missing payload",
            Self::InvalidTokenSize => "Invalid token size",
            Self::InvalidTopicSize => "Invalid topic size",
            Self::InvalidPayloadSize => "Invalid payload size",
            Self::InvalidToken => "Invalid token",
            Self::Shutdown => "Shutdown",
            Self::Unknown => "None (unknown)",
            Self::Unrecognised(_) => "Unrecognised status",
        })
    }
}

/// The 6-byte frame the gateway writes before closing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    pub command: u8,
    pub status: Status,
    /// Identifier of the notification that failed.
    pub identifier: u32,
}

impl ErrorResponse {
    #[must_use]
    pub fn decode(frame: &[u8; ERROR_RESPONSE_SIZE]) -> Self {
        let [command, status, id @ ..] = *frame;
        Self {
            command,
            status: Status::from(status),
            identifier: u32::from_be_bytes(id),
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; ERROR_RESPONSE_SIZE] {
        let [a, b, c, d] = self.identifier.to_be_bytes();
        [self.command, self.status.code(), a, b, c, d]
    }
}

/// A feedback frame whose token length field is not 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Token length should be {FEEDBACK_TOKEN_SIZE}, got {token_length}")]
pub struct MalformedFrame {
    pub timestamp: u32,
    pub token_length: u16,
}

/// One decoded feedback frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackFrame {
    /// Epoch seconds at which the provider determined the token was invalid.
    pub timestamp: u32,
    pub token: [u8; FEEDBACK_TOKEN_SIZE],
}

impl FeedbackFrame {
    pub fn decode(frame: &[u8; FEEDBACK_FRAME_SIZE]) -> std::result::Result<Self, MalformedFrame> {
        let (timestamp, rest) = frame.split_at(4);
        let (length, token) = rest.split_at(2);

        let timestamp =
            u32::from_be_bytes([timestamp[0], timestamp[1], timestamp[2], timestamp[3]]);
        let token_length = u16::from_be_bytes([length[0], length[1]]);

        if usize::from(token_length) != FEEDBACK_TOKEN_SIZE {
            return Err(MalformedFrame {
                timestamp,
                token_length,
            });
        }

        let mut decoded = [0; FEEDBACK_TOKEN_SIZE];
        decoded.copy_from_slice(token);

        Ok(Self {
            timestamp,
            token: decoded,
        })
    }

    #[must_use]
    pub fn encode(&self) -> [u8; FEEDBACK_FRAME_SIZE] {
        let mut frame = [0; FEEDBACK_FRAME_SIZE];
        frame[..4].copy_from_slice(&self.timestamp.to_be_bytes());
        frame[4..6].copy_from_slice(&(FEEDBACK_TOKEN_SIZE as u16).to_be_bytes());
        frame[6..].copy_from_slice(&self.token);
        frame
    }
}
