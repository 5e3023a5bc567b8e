//! The four-step Polo v2 pairing handshake on the pairing port (6467):
//! request → options → configuration → user code → secret digest.
//!
//! State machine shape grounded on the teacher's `PairingHandler`/
//! `PairingService` pair (a handler owning the current `PairingStatus`,
//! a service driving it to completion with a timeout watchdog); the
//! secret-derivation algorithm itself is specific to this protocol and
//! has no teacher counterpart.

use std::net::SocketAddr;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{ProtocolError, Result};
use crate::identity::ClientIdentity;
use crate::keymaterial::{extract_rsa_params, RsaPublicParams};
use crate::message::{Configuration, DeviceInfo, OuterBody, OuterMessage, Options, PairingRequest, PairingSecret};
use crate::transport::TlsTransport;

/// A pending pairing-secret submission is assumed successful after this
/// long if the TV never sends an explicit ack — some firmwares close the
/// pairing TLS session without one.
pub const SECRET_ACK_WATCHDOG: Duration = Duration::from_secs(3);

/// Outcome of submitting a user-entered code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    /// The TV accepted the secret (or the watchdog elapsed without an
    /// explicit rejection, which is treated as success per the spec).
    Success,
    /// Status 402: the code didn't match. The TLS session is preserved
    /// so the UI can re-prompt on the same connection.
    BadSecret,
}

/// An in-progress pairing session: TLS is up, request/options/
/// configuration have been exchanged, and the TV is ready to receive a
/// `PairingSecret` once the user enters the on-screen code.
pub struct PairingSession {
    transport: TlsTransport,
    client_params: RsaPublicParams,
    server_params: RsaPublicParams,
}

impl PairingSession {
    /// Runs request → options → configuration, then returns a session
    /// ready for `submit_secret` once the UI has collected a code.
    pub async fn connect(
        addr: SocketAddr,
        identity: &ClientIdentity,
        client_name: &str,
        device_info: DeviceInfo,
    ) -> Result<Self> {
        let mut transport = TlsTransport::connect(addr, identity).await?;

        let server_cert = transport.peer_certificate().ok_or_else(|| {
            ProtocolError::TlsHandshake("no peer certificate captured during handshake".into())
        })?;
        let server_params = extract_rsa_params(server_cert)?;
        let client_params = extract_rsa_params(&identity.certificate_der)?;

        Self::send(&mut transport, OuterMessage::pairing_request(PairingRequest {
            client_name: client_name.to_string(),
            service_name: client_name.to_string(),
            device_info,
        }))
        .await?;
        Self::expect_ack(&mut transport, |body| !matches!(body, OuterBody::None)).await?;

        Self::send(&mut transport, OuterMessage::options(Options::client_default())).await?;
        Self::expect_ack(&mut transport, |body| matches!(body, OuterBody::Options(_))).await?;

        Self::send(
            &mut transport,
            OuterMessage::configuration(Configuration::client_default()),
        )
        .await?;
        Self::expect_ack(&mut transport, |body| matches!(body, OuterBody::Configuration(_))).await?;

        info!("pairing request/options/configuration exchanged, awaiting user code");

        Ok(Self {
            transport,
            client_params,
            server_params,
        })
    }

    /// Computes the secret digest for `code` and sends it, then awaits
    /// either an explicit ack, a 402 rejection, or the 3-second watchdog.
    pub async fn submit_secret(&mut self, code: &str) -> Result<PairingOutcome> {
        let (_header, code_bytes) = parse_user_code(code)?;
        let digest = secret_digest(&self.client_params, &self.server_params, code_bytes);

        Self::send(
            &mut self.transport,
            OuterMessage::secret(PairingSecret {
                secret: digest.to_vec(),
            }),
        )
        .await?;

        match timeout(SECRET_ACK_WATCHDOG, self.transport.recv()).await {
            Ok(Ok(payload)) => {
                let msg = OuterMessage::decode(&payload)?;
                if msg.status == 402 {
                    warn!("TV rejected pairing secret (status 402)");
                    Ok(PairingOutcome::BadSecret)
                } else {
                    Ok(PairingOutcome::Success)
                }
            }
            Ok(Err(ProtocolError::Cancelled(_))) => {
                // Some firmwares close the pairing session without an
                // explicit ack once the secret is accepted.
                debug!("pairing TLS session closed without explicit ack, assuming success");
                Ok(PairingOutcome::Success)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                debug!("secret ack watchdog elapsed, assuming success");
                Ok(PairingOutcome::Success)
            }
        }
    }

    /// Opt-in fallback for TVs that persistently reject the 32-byte
    /// digest: resends with a 31-byte truncated variant. Never selected
    /// automatically — the spec requires any use of this be a deliberate,
    /// logged choice after repeated 402s.
    pub async fn submit_secret_31_byte_variant(&mut self, code: &str) -> Result<PairingOutcome> {
        warn!("using 31-byte pairing secret fallback variant");
        let (_header, code_bytes) = parse_user_code(code)?;
        let digest = secret_digest(&self.client_params, &self.server_params, code_bytes);

        Self::send(
            &mut self.transport,
            OuterMessage::secret(PairingSecret {
                secret: digest[..31].to_vec(),
            }),
        )
        .await?;

        match timeout(SECRET_ACK_WATCHDOG, self.transport.recv()).await {
            Ok(Ok(payload)) => {
                let msg = OuterMessage::decode(&payload)?;
                Ok(if msg.status == 402 {
                    PairingOutcome::BadSecret
                } else {
                    PairingOutcome::Success
                })
            }
            Ok(Err(ProtocolError::Cancelled(_))) | Err(_) => Ok(PairingOutcome::Success),
            Ok(Err(e)) => Err(e),
        }
    }

    /// The address this session is talking to, so the caller can open a
    /// fresh control-port connection to the same host on success.
    pub fn remote_address(&self) -> SocketAddr {
        self.transport.remote_addr()
    }

    /// The expected header (first byte of the digest) for diagnostics
    /// only — never fed back into the hash.
    pub fn diagnostic_header(&self, code: &str) -> Result<String> {
        let (_header, code_bytes) = parse_user_code(code)?;
        let digest = secret_digest(&self.client_params, &self.server_params, code_bytes);
        Ok(format!("{:02X}", digest[0]))
    }

    async fn send(transport: &mut TlsTransport, message: OuterMessage) -> Result<()> {
        transport.send(&message.encode()).await
    }

    async fn expect_ack(
        transport: &mut TlsTransport,
        matches_expected: impl Fn(&OuterBody) -> bool,
    ) -> Result<()> {
        let payload = transport.recv().await?;
        let msg = OuterMessage::decode(&payload)?;
        if msg.status == 402 {
            return Err(ProtocolError::ProtocolStatus402);
        }
        if msg.status != 200 {
            return Err(ProtocolError::Decode(format!(
                "unexpected pairing status {}",
                msg.status
            )));
        }
        if !matches_expected(&msg.body) {
            return Err(ProtocolError::Decode(
                "pairing ack did not echo the expected step".to_string(),
            ));
        }
        Ok(())
    }
}

/// Splits a six-hex-character user code into the (display-only)
/// verification header and the two code bytes fed into the digest.
fn parse_user_code(code: &str) -> Result<(u8, [u8; 2])> {
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ProtocolError::Decode(
            "pairing code must be exactly 6 hex characters".to_string(),
        ));
    }
    let header_bytes = hex::decode(&code[0..2])
        .map_err(|e| ProtocolError::Decode(format!("invalid verification header: {e}")))?;
    let code_bytes = hex::decode(&code[2..6])
        .map_err(|e| ProtocolError::Decode(format!("invalid code bytes: {e}")))?;
    Ok((header_bytes[0], [code_bytes[0], code_bytes[1]]))
}

/// `SHA-256(client_modulus || client_exponent || server_modulus ||
/// server_exponent || code_bytes)`.
fn secret_digest(client: &RsaPublicParams, server: &RsaPublicParams, code_bytes: [u8; 2]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(&client.modulus);
    hasher.update(&client.exponent);
    hasher.update(&server.modulus);
    hasher.update(&server.exponent);
    hasher.update(code_bytes);
    hasher.finalize().into()
}
