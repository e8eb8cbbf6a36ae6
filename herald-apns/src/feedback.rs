//! The APNs feedback service listener.
//!
//! The feedback service reports device tokens that must never be messaged
//! again. A [`FeedbackListener`] opens one connection, reads 38-byte frames
//! until the service goes quiet or closes the socket, and publishes each
//! token to a [`FeedbackSink`]. It never reconnects; run it again to poll
//! again.

use std::{fmt, io, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_common::{
    config::{ApnsTimeouts, Credentials},
    incoming, internal, token_prefix, tracing,
};
use herald_tracing::traced;
use tokio::{
    io::AsyncReadExt,
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};

use crate::{
    codec::{FEEDBACK_FRAME_SIZE, FeedbackFrame},
    error::{ApnsError, Result},
    tls::{Dialer, TlsDialer},
};

/// A device token the provider asks never to be messaged again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRecord {
    /// Epoch seconds at which the provider found the token invalid.
    pub timestamp: u32,
    /// Hex-encoded device token.
    pub device_token: String,
}

impl FeedbackRecord {
    #[must_use]
    pub fn time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(i64::from(self.timestamp), 0).unwrap_or_default()
    }
}

impl From<FeedbackFrame> for FeedbackRecord {
    fn from(frame: FeedbackFrame) -> Self {
        Self {
            timestamp: frame.timestamp,
            device_token: hex::encode(frame.token),
        }
    }
}

/// Result of handing a record to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The sink had no room and discarded the record.
    Dropped,
    /// Nobody is consuming any more; the listener stops.
    Closed,
}

/// Receives decoded feedback records.
#[async_trait]
pub trait FeedbackSink: Send {
    async fn publish(&mut self, record: FeedbackRecord) -> Delivery;
}

/// What a [`ChannelSink`] does when its channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Discard the new record, log it and count it as dropped.
    #[default]
    DropNewest,
    /// Wait for the consumer to make room. A consumer that stops reading
    /// without dropping the receiver stalls the listener.
    Block,
}

/// Publishes records into a bounded channel.
#[derive(Debug)]
pub struct ChannelSink {
    sender: mpsc::Sender<FeedbackRecord>,
    overflow: Overflow,
}

impl ChannelSink {
    #[must_use]
    pub const fn new(sender: mpsc::Sender<FeedbackRecord>, overflow: Overflow) -> Self {
        Self { sender, overflow }
    }
}

#[async_trait]
impl FeedbackSink for ChannelSink {
    async fn publish(&mut self, record: FeedbackRecord) -> Delivery {
        match self.overflow {
            Overflow::DropNewest => match self.sender.try_send(record) {
                Ok(()) => Delivery::Delivered,
                Err(mpsc::error::TrySendError::Full(record)) => {
                    internal!(
                        level = WARN,
                        token = token_prefix(&record.device_token),
                        "Feedback consumer is behind, dropping record"
                    );
                    Delivery::Dropped
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
            },
            Overflow::Block => match self.sender.send(record).await {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Closed,
            },
        }
    }
}

/// Publishes records by calling a closure.
pub struct CallbackSink<F>(pub F);

impl<F> fmt::Debug for CallbackSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallbackSink")
    }
}

#[async_trait]
impl<F> FeedbackSink for CallbackSink<F>
where
    F: FnMut(FeedbackRecord) + Send,
{
    async fn publish(&mut self, record: FeedbackRecord) -> Delivery {
        (self.0)(record);
        Delivery::Delivered
    }
}

/// Why a feedback run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackEnd {
    /// No frame arrived within the idle timeout.
    Idle,
    /// The service closed the connection.
    Closed,
    /// A read failed.
    Failed(String),
    /// The sink stopped accepting records.
    ConsumerGone,
}

/// Totals for one feedback run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackSummary {
    /// Records handed to the sink.
    pub received: usize,
    /// Frames discarded for a token length other than 32.
    pub skipped: usize,
    /// Records the sink discarded for lack of room.
    pub dropped: usize,
    pub end: FeedbackEnd,
}

/// Reads invalidated device tokens from the feedback service.
#[derive(Debug, Clone)]
pub struct FeedbackListener {
    dialer: Arc<dyn Dialer>,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

impl FeedbackListener {
    /// A TLS listener for the feedback service at `address`.
    pub fn new(
        address: impl Into<String>,
        credentials: &Credentials,
        timeouts: &ApnsTimeouts,
    ) -> Result<Self> {
        let dialer = TlsDialer::new(address, credentials)?;
        Ok(Self::with_dialer(Arc::new(dialer), timeouts))
    }

    #[must_use]
    pub fn with_dialer(dialer: Arc<dyn Dialer>, timeouts: &ApnsTimeouts) -> Self {
        Self {
            dialer,
            connect_timeout: timeouts.feedback_connect(),
            idle_timeout: timeouts.feedback_idle(),
        }
    }

    /// Connects, reads until the service stops sending, and publishes every
    /// well-formed record to `sink`.
    ///
    /// Returns `Err` only when the connection could not be established within
    /// the connect timeout.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, fields(address = %self.dialer.address())), timing(precision = "ms"))]
    pub async fn run<S: FeedbackSink + ?Sized>(&self, sink: &mut S) -> Result<FeedbackSummary> {
        let connect_error = |source| ApnsError::Connect {
            address: self.dialer.address().to_string(),
            source,
        };

        let mut stream = timeout(self.connect_timeout, self.dialer.dial())
            .await
            .map_err(|_| {
                connect_error(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "feedback connect timed out",
                ))
            })?
            .map_err(connect_error)?;

        internal!(level = DEBUG, address = self.dialer.address(), "Connected to feedback service");

        let mut summary = FeedbackSummary {
            received: 0,
            skipped: 0,
            dropped: 0,
            end: FeedbackEnd::Idle,
        };

        summary.end = loop {
            let mut frame = [0u8; FEEDBACK_FRAME_SIZE];
            match timeout(self.idle_timeout, stream.read_exact(&mut frame)).await {
                Err(_elapsed) => break FeedbackEnd::Idle,
                Ok(Err(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    break FeedbackEnd::Closed;
                }
                Ok(Err(err)) => break FeedbackEnd::Failed(err.to_string()),
                Ok(Ok(_)) => {}
            }

            let record = match FeedbackFrame::decode(&frame) {
                Ok(decoded) => FeedbackRecord::from(decoded),
                Err(malformed) => {
                    internal!(
                        level = WARN,
                        timestamp = malformed.timestamp,
                        "Skipping feedback frame: {malformed}"
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            incoming!(
                level = DEBUG,
                token = token_prefix(&record.device_token),
                timestamp = record.timestamp,
                "Feedback record"
            );

            match sink.publish(record).await {
                Delivery::Delivered => summary.received += 1,
                Delivery::Dropped => summary.dropped += 1,
                Delivery::Closed => break FeedbackEnd::ConsumerGone,
            }
        };

        internal!(
            level = INFO,
            received = summary.received,
            skipped = summary.skipped,
            dropped = summary.dropped,
            end = ?summary.end,
            "Feedback run finished"
        );

        Ok(summary)
    }

    /// Runs the listener on a new task, publishing into a channel of
    /// `capacity` records with the given overflow policy.
    ///
    /// The stream yields `None` once the run is over; that is the only
    /// end-of-feedback signal.
    #[must_use]
    pub fn spawn(self, capacity: usize, overflow: Overflow) -> FeedbackStream {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(async move {
            let mut sink = ChannelSink::new(sender, overflow);
            self.run(&mut sink).await
        });

        FeedbackStream { receiver, handle }
    }
}

/// Records produced by a spawned [`FeedbackListener`].
#[derive(Debug)]
pub struct FeedbackStream {
    receiver: mpsc::Receiver<FeedbackRecord>,
    handle: JoinHandle<Result<FeedbackSummary>>,
}

impl FeedbackStream {
    /// The next record, or `None` once the listener has finished.
    pub async fn recv(&mut self) -> Option<FeedbackRecord> {
        self.receiver.recv().await
    }

    /// Stops consuming and waits for the listener's summary.
    pub async fn finish(self) -> Result<FeedbackSummary> {
        let Self { receiver, handle } = self;
        drop(receiver);

        handle.await.map_err(|err| ApnsError::Io(io::Error::other(err)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: u32) -> FeedbackRecord {
        FeedbackRecord {
            timestamp,
            device_token: "ab".repeat(32),
        }
    }

    #[test]
    fn test_record_time() {
        assert_eq!(
            record(1_700_000_000).time().to_rfc3339(),
            "2023-11-14T22:13:20+00:00"
        );
    }

    #[test]
    fn test_record_from_frame() {
        let frame = FeedbackFrame {
            timestamp: 5,
            token: [0x0f; 32],
        };
        let record = FeedbackRecord::from(frame);
        assert_eq!(record.device_token, "0f".repeat(32));
        assert_eq!(record.timestamp, 5);
    }

    #[tokio::test]
    async fn test_channel_sink_drops_newest_when_full() {
        let (sender, mut receiver) = mpsc::channel(1);
        let mut sink = ChannelSink::new(sender, Overflow::DropNewest);

        assert_eq!(sink.publish(record(1)).await, Delivery::Delivered);
        assert_eq!(sink.publish(record(2)).await, Delivery::Dropped);
        assert_eq!(receiver.recv().await, Some(record(1)));
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);

        let mut sink = ChannelSink::new(sender, Overflow::Block);
        assert_eq!(sink.publish(record(1)).await, Delivery::Closed);
    }

    #[tokio::test]
    async fn test_callback_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = CallbackSink(|record: FeedbackRecord| seen.push(record.timestamp));
            assert_eq!(sink.publish(record(3)).await, Delivery::Delivered);
        }
        assert_eq!(seen, vec![3]);
    }
}
