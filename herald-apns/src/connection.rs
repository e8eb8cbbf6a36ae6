//! One socket to the APNs gateway.

use std::{fmt, io, sync::Arc, time::Duration};

use herald_common::{incoming, internal, outgoing, tracing};
use herald_tracing::traced;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    time::{Instant, timeout_at},
};

use crate::{
    codec::ERROR_RESPONSE_SIZE,
    tls::{Dialer, Stream},
};

/// Lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never dialed, or closed on purpose.
    Unconnected,
    Connected,
    /// An I/O failure, a gateway error reply or an interrupted exchange left
    /// the socket unusable. The next [`Connection::connect`] re-dials.
    Broken,
}

/// What happened after writing a frame.
#[derive(Debug)]
pub enum Exchange {
    /// Nothing arrived before the read deadline: the gateway accepted the frame.
    Silent,
    /// The gateway replied with an error-response frame.
    Reply([u8; ERROR_RESPONSE_SIZE]),
    /// The write failed. The connection is now broken.
    WriteFailed(io::Error),
    /// The gateway closed the socket. The connection is now broken.
    Closed,
    /// The read failed for a reason other than the deadline. The connection
    /// is now broken.
    ReadFailed(io::Error),
}

/// A single gateway socket, owned by a pool slot.
pub struct Connection {
    dialer: Arc<dyn Dialer>,
    stream: Option<Stream>,
    state: ConnectionState,
    dials: u64,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.dialer.address())
            .field("state", &self.state)
            .field("dials", &self.dials)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates an unconnected connection. Nothing is dialed until [`Connection::connect`].
    #[must_use]
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            dialer,
            stream: None,
            state: ConnectionState::Unconnected,
            dials: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// How many times this connection has dialed the gateway.
    #[must_use]
    pub const fn dial_count(&self) -> u64 {
        self.dials
    }

    #[must_use]
    pub fn address(&self) -> &str {
        self.dialer.address()
    }

    /// Dials and handshakes unless already connected.
    ///
    /// On failure the connection is left broken; nothing from the failed
    /// attempt is kept.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, fields(address = %self.dialer.address())), timing(precision = "ms"))]
    pub async fn connect(&mut self) -> io::Result<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        self.close();
        self.dials += 1;

        match self.dialer.dial().await {
            Ok(stream) => {
                internal!(
                    level = DEBUG,
                    address = self.dialer.address(),
                    dials = self.dials,
                    "Connected to gateway"
                );
                self.stream = Some(stream);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(err) => {
                internal!(
                    level = WARN,
                    address = self.dialer.address(),
                    error = %err,
                    "Failed to connect to gateway"
                );
                self.state = ConnectionState::Broken;
                Err(err)
            }
        }
    }

    /// Drops the socket, if any, and marks the connection unconnected.
    pub fn close(&mut self) {
        self.stream = None;
        self.state = ConnectionState::Unconnected;
    }

    /// Drops the socket and marks the connection for re-dialing.
    pub fn mark_broken(&mut self) {
        self.stream = None;
        self.state = ConnectionState::Broken;
    }

    /// Writes `frame` and waits up to `read_timeout` for an error reply.
    ///
    /// Any I/O failure leaves the connection broken. A reply frame does not;
    /// deciding what it means is up to the caller. The connection counts as
    /// broken from the first byte written until the exchange completes, so a
    /// dropped exchange future never hands a half-used socket to the next
    /// caller.
    pub async fn exchange(&mut self, frame: &[u8], read_timeout: Duration) -> Exchange {
        let Some(stream) = self.stream.as_mut() else {
            self.mark_broken();
            return Exchange::WriteFailed(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection has no open socket",
            ));
        };
        self.state = ConnectionState::Broken;

        let written = async {
            stream.write_all(frame).await?;
            stream.flush().await
        }
        .await;
        if let Err(err) = written {
            self.mark_broken();
            return Exchange::WriteFailed(err);
        }
        outgoing!(bytes = frame.len(), "Notification frame written");

        let deadline = Instant::now() + read_timeout;
        let mut reply = [0u8; ERROR_RESPONSE_SIZE];

        let read = match timeout_at(deadline, stream.read(&mut reply)).await {
            Err(_elapsed) => {
                self.state = ConnectionState::Connected;
                return Exchange::Silent;
            }
            Ok(read) => read,
        };

        let outcome = match read {
            Ok(0) => Exchange::Closed,
            Ok(n) if n < ERROR_RESPONSE_SIZE => {
                // The rest of a started frame is allowed one more read window
                match timeout_at(
                    Instant::now() + read_timeout,
                    stream.read_exact(&mut reply[n..]),
                )
                .await
                {
                    Ok(Ok(_)) => Exchange::Reply(reply),
                    Ok(Err(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                        Exchange::Closed
                    }
                    Ok(Err(err)) => Exchange::ReadFailed(err),
                    Err(_elapsed) => Exchange::ReadFailed(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "truncated error response",
                    )),
                }
            }
            Ok(_) => Exchange::Reply(reply),
            Err(err) => Exchange::ReadFailed(err),
        };

        match &outcome {
            Exchange::Reply(bytes) => {
                incoming!(level = DEBUG, reply = ?bytes, "Error response received");
                self.state = ConnectionState::Connected;
            }
            _ => self.mark_broken(),
        }

        outcome
    }
}
