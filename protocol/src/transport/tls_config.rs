//! TLS connector configuration: client certificate for mutual auth, plus
//! a peer-verification callback that accepts any server certificate but
//! captures its leaf DER bytes.
//!
//! The TV's certificate is self-signed and unknown until pairing
//! completes, so blind trust is unavoidable on first contact — but unlike
//! a bare `SslVerifyMode::NONE`, the callback form lets the handshake
//! capture the leaf certificate the pairing secret digest needs.

use std::sync::{Arc, Mutex};

use openssl::pkey::PKey;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use openssl::x509::X509;

use crate::error::Result;
use crate::identity::ClientIdentity;

/// Captures the TV's leaf certificate DER bytes as the TLS handshake
/// verifies it. Shared with the transport so the session can read it out
/// once the handshake completes.
#[derive(Clone, Default)]
pub struct PeerCertCapture(Arc<Mutex<Option<Vec<u8>>>>);

impl PeerCertCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Option<Vec<u8>> {
        self.0.lock().unwrap().take()
    }

    fn store(&self, der: Vec<u8>) {
        *self.0.lock().unwrap() = Some(der);
    }
}

/// Builds an `SslConnector` presenting `identity` as the client
/// certificate, with a permissive-but-capturing peer verification
/// callback installed.
pub fn create_client_config(identity: &ClientIdentity, capture: PeerCertCapture) -> Result<SslConnector> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())?;

    let cert = X509::from_der(&identity.certificate_der)?;
    let pkey = PKey::private_key_from_der(&identity.private_key_der)?;
    builder.set_certificate(&cert)?;
    builder.set_private_key(&pkey)?;

    // SslVerifyMode::PEER (not NONE) so the callback below actually runs
    // and the handshake exposes the peer chain to it; always returning
    // true keeps the connection permissive.
    builder.set_verify_callback(SslVerifyMode::PEER, move |_preverify_ok, store_ctx| {
        if let Some(cert) = store_ctx.current_cert() {
            if let Ok(der) = cert.to_der() {
                capture.store(der);
            }
        }
        true
    });

    Ok(builder.build())
}
