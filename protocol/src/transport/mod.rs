//! TCP+TLS transport: client certificate auth, permissive-but-capturing
//! peer verification, length-prefixed framing.

mod tls;
mod tls_config;

pub use tls::TlsTransport;
pub use tls_config::PeerCertCapture;
