//! Dialing the APNs gateway and feedback endpoints.
//!
//! A [`Dialer`] produces a fresh byte stream to one fixed address each time it
//! is called. Connections hold a dialer rather than a socket factory of their
//! own, so the same pool and send logic run over TLS in production and over
//! plain TCP against local simulators.

use std::{fmt, io, sync::Arc};

use async_trait::async_trait;
use herald_common::{config::Credentials, environment::split_address, tracing};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{
        ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        crypto::{CryptoProvider, ring},
        pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime},
    },
};

use crate::error::{TlsError, TlsResult};

/// A bidirectional byte stream to a gateway.
pub trait GatewayStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> GatewayStream for T {}

pub type Stream = Box<dyn GatewayStream>;

/// Opens new streams to a fixed address.
#[async_trait]
pub trait Dialer: Send + Sync + fmt::Debug {
    /// Dials the address and completes any handshake.
    async fn dial(&self) -> io::Result<Stream>;

    /// The `host:port` being dialed, for logs and errors.
    fn address(&self) -> &str;
}

/// Plain TCP, for gateway simulators that do not speak TLS.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    address: String,
}

impl TcpDialer {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self) -> io::Result<Stream> {
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn address(&self) -> &str {
        &self.address
    }
}

/// TCP followed by a TLS client handshake presenting the application certificate.
#[derive(Clone)]
pub struct TlsDialer {
    address: String,
    server_name: ServerName<'static>,
    connector: TlsConnector,
}

impl fmt::Debug for TlsDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsDialer")
            .field("address", &self.address)
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl TlsDialer {
    /// Loads `credentials` and prepares a dialer for `address`.
    pub fn new(address: impl Into<String>, credentials: &Credentials) -> TlsResult<Self> {
        Self::with_config(address, load_client_config(credentials)?)
    }

    /// Prepares a dialer sharing an already loaded client configuration.
    pub fn with_config(address: impl Into<String>, config: Arc<ClientConfig>) -> TlsResult<Self> {
        let address = address.into();
        let (host, _) =
            split_address(&address).map_err(|err| TlsError::InvalidServerName(err.to_string()))?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|err| TlsError::InvalidServerName(format!("{host}: {err}")))?;

        Ok(Self {
            address,
            server_name,
            connector: TlsConnector::from(config),
        })
    }
}

#[async_trait]
impl Dialer for TlsDialer {
    async fn dial(&self) -> io::Result<Stream> {
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;

        let stream = self
            .connector
            .connect(self.server_name.clone(), stream)
            .await?;

        Ok(Box::new(stream))
    }

    fn address(&self) -> &str {
        &self.address
    }
}

fn load_certs(credentials: &Credentials) -> TlsResult<Vec<CertificateDer<'static>>> {
    let pem = credentials
        .certificate
        .read("certificate")
        .map_err(|err| TlsError::CertificateLoad(err.to_string()))?;

    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<io::Result<Vec<_>>>()
        .map_err(|err| TlsError::CertificateLoad(err.to_string()))?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates);
    }

    Ok(certs)
}

fn load_key(credentials: &Credentials) -> TlsResult<PrivateKeyDer<'static>> {
    let pem = credentials
        .key
        .read("key")
        .map_err(|err| TlsError::KeyLoad(err.to_string()))?;

    for item in rustls_pemfile::read_all(&mut pem.as_slice()) {
        match item.map_err(|err| TlsError::KeyLoad(err.to_string()))? {
            rustls_pemfile::Item::Pkcs1Key(key) => return Ok(PrivateKeyDer::Pkcs1(key)),
            rustls_pemfile::Item::Pkcs8Key(key) => return Ok(PrivateKeyDer::Pkcs8(key)),
            rustls_pemfile::Item::Sec1Key(key) => return Ok(PrivateKeyDer::Sec1(key)),
            _ => {}
        }
    }

    Err(TlsError::KeyLoad(
        "Unable to determine key file format (expected PKCS1, PKCS8, or SEC1)".to_string(),
    ))
}

fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();

    let certs = rustls_native_certs::load_native_certs();
    let (added, ignored) = roots.add_parsable_certificates(certs.certs);
    if !certs.errors.is_empty() {
        tracing::warn!(?certs.errors, "Some certificates could not be loaded");
    }
    tracing::debug!(added, ignored, "Loaded native root certificates");

    roots
}

/// Builds the client configuration shared by every gateway connection.
///
/// This is where bad credentials surface: a certificate or key that cannot be
/// read or parsed, or a key that does not match the certificate.
pub fn load_client_config(credentials: &Credentials) -> TlsResult<Arc<ClientConfig>> {
    let certs = load_certs(credentials)?;
    let key = load_key(credentials)?;

    let provider = Arc::new(ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(native_roots())
        .with_client_auth_cert(certs, key)?;

    if credentials.accepts_invalid_certs() {
        tracing::warn!("Gateway certificate validation is disabled");
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerifier(provider)));
    }

    Ok(Arc::new(config))
}

/// A certificate verifier that accepts all certificates (for simulators only).
#[derive(Debug)]
struct NoVerifier(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
