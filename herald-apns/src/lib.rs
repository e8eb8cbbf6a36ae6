//! Client for the APNs binary gateway protocol.
//!
//! [`ApnsClient`] sends [`Notification`]s over a fixed pool of TLS
//! connections and reduces each gateway reaction to a
//! [`herald_common::Response`]. [`FeedbackListener`] polls the separate
//! feedback service for device tokens that must be dropped.

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod feedback;
pub mod notification;
pub mod pool;
pub mod tls;

pub use client::ApnsClient;
pub use config::ApnsConfig;
pub use error::{ApnsError, Result, TlsError};
pub use feedback::{
    CallbackSink, ChannelSink, Delivery, FeedbackEnd, FeedbackListener, FeedbackRecord,
    FeedbackSink, FeedbackStream, FeedbackSummary, Overflow,
};
pub use notification::{Alert, AlertDictionary, Aps, Notification};
pub use tls::{Dialer, TcpDialer, TlsDialer};
