//! Mock APNs gateway and feedback service for integration tests
//!
//! The gateway can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Stay silent (the gateway's way of accepting a notification)
//! - Answer with a scripted error-response frame and close the socket
//! - Close the socket without answering
//! - Reset the socket some time after a frame arrives
//! - Serve plain TCP or TLS
//! - Record every notification frame and connection it sees
//!
//! The feedback service writes scripted 38-byte frames and then either
//! closes the connection or goes quiet.
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_gateway::MockGateway;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = MockGateway::builder()
//!     .with_reply(8) // Invalid token
//!     .build()
//!     .await?;
//!
//! // Gateway is now listening on gateway.addr()
//! # Ok(())
//! # }
//! ```

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use herald_apns::codec::{self, ErrorResponse, FEEDBACK_FRAME_SIZE, NotificationFrame, Status};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
    sync::RwLock,
};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        crypto::ring,
        pki_types::{CertificateDer, PrivateKeyDer},
    },
};

pub const CERT: &str = include_str!("../fixtures/gateway.crt");
pub const KEY: &str = include_str!("../fixtures/gateway.key");

/// Command byte APNs uses for error-response frames.
const ERROR_COMMAND: u8 = 8;

fn tls_acceptor() -> TlsAcceptor {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut CERT.as_bytes())
        .collect::<Result<_, _>>()
        .unwrap();
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut KEY.as_bytes())
        .unwrap()
        .unwrap();

    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();

    TlsAcceptor::from(Arc::new(config))
}

#[derive(Clone, Default)]
struct GatewayConfig {
    reply: Option<u8>,
    close_after_frames: Option<usize>,
    reply_delay: Option<Duration>,
    reset_after: Option<Duration>,
    tls: bool,
}

/// Mock APNs notification gateway
pub struct MockGateway {
    addr: SocketAddr,
    frames: Arc<RwLock<Vec<NotificationFrame>>>,
    connections: Arc<AtomicUsize>,
}

impl MockGateway {
    #[must_use]
    pub fn builder() -> MockGatewayBuilder {
        MockGatewayBuilder {
            config: GatewayConfig::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `localhost:<port>`, usable as a TLS server name
    #[must_use]
    pub fn localhost(&self) -> String {
        format!("localhost:{}", self.addr.port())
    }

    /// Every notification frame received, across all connections
    pub async fn frames(&self) -> Vec<NotificationFrame> {
        self.frames.read().await.clone()
    }

    /// Number of connections accepted so far
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    async fn read_frame<S: AsyncRead + Unpin>(
        stream: &mut S,
    ) -> std::io::Result<NotificationFrame> {
        let mut header = [0u8; 11];
        stream.read_exact(&mut header).await?;
        let token_len = usize::from(u16::from_be_bytes([header[9], header[10]]));

        let mut buffer = header.to_vec();
        buffer.resize(11 + token_len + 2, 0);
        stream.read_exact(&mut buffer[11..]).await?;

        let payload_len = usize::from(u16::from_be_bytes([
            buffer[11 + token_len],
            buffer[12 + token_len],
        ]));
        let start = buffer.len();
        buffer.resize(start + payload_len, 0);
        stream.read_exact(&mut buffer[start..]).await?;

        codec::decode_notification(&buffer)
            .map(|(frame, _)| frame)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    async fn handle_client<S: AsyncRead + AsyncWrite + Unpin>(
        mut stream: S,
        config: GatewayConfig,
        frames: Arc<RwLock<Vec<NotificationFrame>>>,
    ) -> std::io::Result<()> {
        let mut received = 0;

        loop {
            let frame = Self::read_frame(&mut stream).await?;
            let identifier = frame.identifier;
            frames.write().await.push(frame);
            received += 1;

            if let Some(status) = config.reply {
                if let Some(delay) = config.reply_delay {
                    tokio::time::sleep(delay).await;
                }

                let reply = ErrorResponse {
                    command: ERROR_COMMAND,
                    status: Status::from(status),
                    identifier,
                };
                stream.write_all(&reply.encode()).await?;
                stream.flush().await?;
                let _ = stream.shutdown().await;
                return Ok(());
            }

            if let Some(delay) = config.reset_after {
                // Dropped without shutdown; the zero linger set on accept turns this into a reset
                tokio::time::sleep(delay).await;
                return Ok(());
            }

            if config
                .close_after_frames
                .is_some_and(|count| received >= count)
            {
                let _ = stream.shutdown().await;
                return Ok(());
            }
        }
    }
}

pub struct MockGatewayBuilder {
    config: GatewayConfig,
}

impl MockGatewayBuilder {
    /// Answer every notification with an error frame carrying `status`
    #[must_use]
    pub const fn with_reply(mut self, status: u8) -> Self {
        self.config.reply = Some(status);
        self
    }

    /// Wait before sending the error frame
    #[must_use]
    pub const fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.config.reply_delay = Some(delay);
        self
    }

    /// Close each connection after reading `count` frames
    #[must_use]
    pub const fn with_close_after_frames(mut self, count: usize) -> Self {
        self.config.close_after_frames = Some(count);
        self
    }

    /// Reset each connection `delay` after its first frame arrives
    ///
    /// Plain TCP only.
    #[must_use]
    pub const fn with_reset_after(mut self, delay: Duration) -> Self {
        self.config.reset_after = Some(delay);
        self
    }

    /// Serve TLS with the fixture certificate
    #[must_use]
    pub const fn with_tls(mut self) -> Self {
        self.config.tls = true;
        self
    }

    pub async fn build(self) -> Result<MockGateway, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let frames = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let config = self.config;
        let acceptor = config.tls.then(tls_acceptor);
        let frames_clone = Arc::clone(&frames);
        let connections_clone = Arc::clone(&connections);

        tokio::spawn(async move {
            while let Ok((stream, _peer)) = listener.accept().await {
                connections_clone.fetch_add(1, Ordering::SeqCst);
                if config.reset_after.is_some() {
                    #[allow(deprecated)]
                    let _ = stream.set_linger(Some(Duration::ZERO));
                }

                let config = config.clone();
                let frames = Arc::clone(&frames_clone);
                let acceptor = acceptor.clone();

                tokio::spawn(async move {
                    let _ = match acceptor {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => MockGateway::handle_client(stream, config, frames).await,
                            Err(e) => Err(e),
                        },
                        None => MockGateway::handle_client(stream, config, frames).await,
                    };
                });
            }
        });

        Ok(MockGateway {
            addr,
            frames,
            connections,
        })
    }
}

/// Mock APNs feedback service
///
/// Each connection receives the scripted bytes, then the connection is
/// closed or left open and silent.
pub struct MockFeedback {
    addr: SocketAddr,
}

impl MockFeedback {
    /// Serves `frames` to every connection, closing afterwards when `close` is set
    pub async fn start(
        frames: Vec<[u8; FEEDBACK_FRAME_SIZE]>,
        close: bool,
    ) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            while let Ok((mut stream, _peer)) = listener.accept().await {
                let frames = frames.clone();
                tokio::spawn(async move {
                    for frame in &frames {
                        if stream.write_all(frame).await.is_err() {
                            return;
                        }
                    }
                    let _ = stream.flush().await;

                    if close {
                        let _ = stream.shutdown().await;
                    } else {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                    }
                });
            }
        });

        Ok(Self { addr })
    }

    #[must_use]
    pub fn address(&self) -> String {
        self.addr.to_string()
    }
}

/// A 38-byte feedback frame with an arbitrary token length field
#[must_use]
pub fn feedback_frame(
    timestamp: u32,
    token_length: u16,
    token_byte: u8,
) -> [u8; FEEDBACK_FRAME_SIZE] {
    let mut frame = [token_byte; FEEDBACK_FRAME_SIZE];
    frame[..4].copy_from_slice(&timestamp.to_be_bytes());
    frame[4..6].copy_from_slice(&token_length.to_be_bytes());
    frame
}
