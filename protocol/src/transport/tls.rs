//! TCP+TLS transport: client-auth handshake, frame send/receive over the
//! wire reassembler, and the captured peer leaf certificate.

use std::net::SocketAddr;
use std::pin::Pin;

use openssl::ssl::Ssl;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_openssl::SslStream;
use tracing::{debug, info};

use super::tls_config::{self, PeerCertCapture};
use crate::error::{ProtocolError, Result};
use crate::identity::ClientIdentity;
use crate::wire::{frame, Reassembler};

/// Idle timeout: this client never initiates pings (some TV firmwares
/// drop the connection if it does), so the normal idle period between TV
/// keepalives can be long.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// TCP connect + TLS handshake timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read size per `receive` call, per the spec's `receive(min=1, max=8192)`.
const RECEIVE_CHUNK: usize = 8192;

/// An established TLS session to the TV, either on the pairing port or
/// the control port.
pub struct TlsTransport {
    stream: SslStream<TcpStream>,
    remote_addr: SocketAddr,
    reassembler: Reassembler,
    peer_certificate: Option<Vec<u8>>,
}

impl TlsTransport {
    /// Opens TCP to `addr` and completes a TLS handshake presenting
    /// `identity` as the client certificate. The peer's leaf certificate
    /// is captured regardless of whether it validates against anything —
    /// see `tls_config::create_client_config`.
    pub async fn connect(addr: SocketAddr, identity: &ClientIdentity) -> Result<Self> {
        let capture = PeerCertCapture::new();
        let connector = tls_config::create_client_config(identity, capture.clone())?;

        let tcp_stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::TlsHandshake(format!("TCP connect to {addr} timed out")))??;

        debug!(%addr, "TCP connected, starting TLS handshake");

        let ssl = Ssl::new(connector.context())
            .map_err(|e| ProtocolError::TlsHandshake(format!("SSL context setup failed: {e}")))?;
        let mut tls_stream = SslStream::new(ssl, tcp_stream)
            .map_err(|e| ProtocolError::TlsHandshake(format!("SSL stream setup failed: {e}")))?;

        timeout(CONNECT_TIMEOUT, Pin::new(&mut tls_stream).connect())
            .await
            .map_err(|_| ProtocolError::TlsHandshake(format!("TLS handshake to {addr} timed out")))?
            .map_err(|e| ProtocolError::TlsHandshake(format!("TLS handshake failed: {e}")))?;

        info!(%addr, "TLS session established");

        Ok(Self {
            stream: tls_stream,
            remote_addr: addr,
            reassembler: Reassembler::new(),
            peer_certificate: capture.take(),
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// The TV's leaf certificate DER, captured during the handshake.
    pub fn peer_certificate(&self) -> Option<&[u8]> {
        self.peer_certificate.as_deref()
    }

    /// Frames `payload` with its length prefix and writes it.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let framed = frame(payload);
        self.stream.write_all(&framed).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Returns the next complete frame, reading more bytes off the socket
    /// as needed. An idle connection with no data for `IDLE_TIMEOUT`
    /// surfaces as a timeout error; a cooperative EOF surfaces as
    /// `Cancelled` so the supervisor doesn't treat a clean close as a
    /// failure.
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(payload) = self.reassembler.next_frame()? {
                return Ok(payload);
            }

            let mut buf = [0u8; RECEIVE_CHUNK];
            let n = timeout(IDLE_TIMEOUT, self.stream.read(&mut buf))
                .await
                .map_err(|_| ProtocolError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "no data received before idle timeout",
                )))??;

            if n == 0 {
                return Err(ProtocolError::Cancelled(
                    "peer closed the connection".to_string(),
                ));
            }
            self.reassembler.feed(&buf[..n]);
        }
    }

    /// Shuts down the TLS session. A shutdown error is folded into
    /// `Cancelled` since the caller is explicitly tearing the connection
    /// down anyway.
    pub async fn close(mut self) -> Result<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| ProtocolError::from_io_error(e, "disconnect"))
    }
}
