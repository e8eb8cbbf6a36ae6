//! The APNs socket client.
//!
//! The binary protocol never acknowledges an accepted notification. A send
//! writes the frame and then listens for at most `read_timeout`: silence is
//! success, and a 6-byte error frame describes what went wrong. The window is
//! a tunable trade-off. An error frame arriving after it is read by the next
//! send on that connection; its identifier does not match, so that send
//! discards it, drops the connection and reports Retry.

use std::{sync::Arc, time::Duration};

use herald_common::{
    Outcome, Provider, Response, config::ApnsTimeouts, internal, token_prefix, tracing,
};
use herald_tracing::traced;
use tokio_rustls::rustls::ClientConfig;

use crate::{
    codec::{self, ErrorResponse, Status},
    config::ApnsConfig,
    connection::Exchange,
    error::{ApnsError, Result},
    feedback::FeedbackListener,
    notification::Notification,
    pool::Pool,
    tls::{Dialer, TlsDialer, load_client_config},
};

/// Sends notifications over a pool of gateway connections.
///
/// `send` takes `&self`; share the client behind an `Arc` to send from
/// several tasks at once. At most `pool_size` sends are in flight, the rest
/// wait for a connection.
#[derive(Debug)]
pub struct ApnsClient {
    dialer: Arc<dyn Dialer>,
    pool: Pool,
    timeouts: ApnsTimeouts,
    tls: Option<(Arc<ClientConfig>, String)>,
}

impl ApnsClient {
    /// Creates a TLS client for the configured gateway.
    ///
    /// Fails only when the credentials cannot be loaded. No connection is
    /// dialed until the first send.
    pub fn new(config: &ApnsConfig) -> Result<Self> {
        let tls = load_client_config(&config.credentials)?;
        let dialer: Arc<dyn Dialer> = Arc::new(TlsDialer::with_config(
            config.gateway.clone(),
            Arc::clone(&tls),
        )?);

        let mut client = Self::with_dialer(dialer, config.pool_size, config.timeouts);
        client.tls = Some((tls, config.feedback.clone()));
        Ok(client)
    }

    /// Creates a client that opens its connections through `dialer`.
    #[must_use]
    pub fn with_dialer(dialer: Arc<dyn Dialer>, pool_size: usize, timeouts: ApnsTimeouts) -> Self {
        internal!(
            level = DEBUG,
            gateway = dialer.address(),
            pool_size,
            "APNs client created"
        );

        Self {
            pool: Pool::new(pool_size, &dialer),
            dialer,
            timeouts,
            tls: None,
        }
    }

    /// A feedback listener sharing this client's credentials.
    ///
    /// Only available on clients built with [`ApnsClient::new`].
    pub fn feedback_listener(&self) -> Result<Option<FeedbackListener>> {
        let Some((tls, address)) = &self.tls else {
            return Ok(None);
        };

        let dialer = TlsDialer::with_config(address.clone(), Arc::clone(tls))?;
        Ok(Some(FeedbackListener::with_dialer(
            Arc::new(dialer),
            &self.timeouts,
        )))
    }

    #[must_use]
    pub const fn pool(&self) -> &Pool {
        &self.pool
    }

    #[must_use]
    pub fn gateway(&self) -> &str {
        self.dialer.address()
    }

    /// Sends one notification and classifies the gateway's reaction.
    ///
    /// Returns `Err` only when the gateway could not be reached at all.
    /// Everything the gateway says, including its silence and a dropped
    /// socket, is a [`Response`]:
    ///
    /// - silence within the read timeout: Success
    /// - write failure, end of stream, or a read error: Retry after the
    ///   transport retry delay, with the connection marked broken
    /// - an error frame: the status classification, with the connection
    ///   marked broken since the gateway closes it after reporting
    /// - an error frame for another identifier: Retry, with the connection
    ///   marked broken
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, fields(id = notification.identifier())), timing(precision = "ms"))]
    pub async fn send(&self, notification: &Notification) -> Result<Response> {
        let identifier = notification.identifier();
        let frame = codec::encode_notification(
            identifier,
            notification.expiry(),
            notification.token_bytes(),
            notification.payload_bytes(),
        )?;

        let mut connection = self.pool.acquire().await;

        connection
            .connect()
            .await
            .map_err(|source| ApnsError::Connect {
                address: self.dialer.address().to_string(),
                source,
            })?;

        let retry = self.timeouts.transport_retry();
        let token = token_prefix(notification.device_token());

        let response = match connection
            .exchange(&frame, self.timeouts.read_timeout())
            .await
        {
            Exchange::Silent => Response::new(Provider::Apns, 0, Outcome::Success)
                .with_identifier(identifier.to_string()),
            Exchange::Reply(bytes) => {
                let reply = ErrorResponse::decode(&bytes);
                if reply.identifier != identifier {
                    connection.mark_broken();
                    internal!(
                        level = WARN,
                        token,
                        id = identifier,
                        reported = reply.identifier,
                        status = reply.status.code(),
                        "Discarding error response for an earlier notification"
                    );
                    return Ok(transport_retry(identifier, retry));
                }
                if reply.status != Status::NoError {
                    connection.mark_broken();
                }

                let outcome = reply.status.classify(retry);
                internal!(
                    level = WARN,
                    token,
                    id = reply.identifier,
                    status = reply.status.code(),
                    %outcome,
                    "Gateway reported: {}",
                    reply.status
                );

                Response::new(Provider::Apns, u16::from(reply.status.code()), outcome)
                    .with_identifier(reply.identifier.to_string())
            }
            Exchange::WriteFailed(err) | Exchange::ReadFailed(err) => {
                internal!(
                    level = WARN,
                    token,
                    error = %err,
                    "Gateway I/O failed, connection marked broken"
                );
                transport_retry(identifier, retry)
            }
            Exchange::Closed => {
                internal!(level = WARN, token, "Gateway closed the connection");
                transport_retry(identifier, retry)
            }
        };

        Ok(response)
    }
}

fn transport_retry(identifier: u32, retry: Duration) -> Response {
    Response::new(Provider::Apns, 0, Outcome::retry_in(retry))
        .with_identifier(identifier.to_string())
}
