//! Error handling for the Android TV remote protocol.
//!
//! All fallible operations in this crate return `Result<T>`, an alias for
//! `std::result::Result<T, ProtocolError>`. Most variants convert
//! automatically from underlying library errors via `From`.
//!
//! ```rust,no_run
//! use atvremote_protocol::Result;
//!
//! fn example() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur while discovering, pairing with, or controlling a TV.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// I/O error (file system, socket read/write, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS/SSL error during the handshake or a subsequent read/write.
    #[error("TLS error: {0}")]
    Tls(#[from] openssl::ssl::Error),

    /// Certificate or key generation/parsing error.
    #[error("certificate error: {0}")]
    Certificate(#[from] openssl::error::ErrorStack),

    /// mDNS discovery is unavailable, or resolving a selected entry timed out.
    ///
    /// Non-fatal: the supervisor surfaces `Error` but keeps browsing.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// TLS failed on either port after the TCP connection succeeded.
    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    /// An in-flight operation was cancelled by an explicit `disconnect()`.
    ///
    /// Expected; the supervisor MUST treat this as routine, not an error.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The TV rejected a `PairingSecret` (status 402, bad code).
    #[error("pairing rejected: incorrect code")]
    ProtocolStatus402,

    /// A malformed varint, truncated field, or unexpected wire type.
    #[error("decode error: {0}")]
    Decode(String),

    /// The client's or the TV's RSA public parameters could not be parsed
    /// out of an X.509 certificate.
    #[error("key material extraction failed: {0}")]
    CryptoExtract(String),

    /// The configuration file on disk is missing required fields or fails
    /// to parse.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(error: serde_json::Error) -> Self {
        ProtocolError::Configuration(format!("JSON error: {error}"))
    }
}

impl ProtocolError {
    /// Classify a raw I/O error the way the session supervisor expects to
    /// see it: a cancelled-via-disconnect shutdown reads as `Cancelled`,
    /// anything else passes through as `Io`.
    pub fn from_io_error(error: std::io::Error, context: &str) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::NotConnected | ErrorKind::BrokenPipe if context == "disconnect" => {
                ProtocolError::Cancelled(format!("{context}: {error}"))
            }
            _ => ProtocolError::Io(error),
        }
    }

    /// Whether the supervisor may retry the operation that produced this
    /// error without surfacing it to the user.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_) | ProtocolError::TlsHandshake(_) | ProtocolError::Discovery(_)
        )
    }

    /// Whether the error requires the user to act (re-enter a code, check
    /// settings) rather than something the supervisor can paper over.
    ///
    /// `Decode` is included because `PairingSession::submit_secret` reports a
    /// malformed user-entered code this way: the pairing TLS session is
    /// still open and the user can simply retry, so the caller should keep
    /// `Mode::Pairing` alive rather than drop back to `Idle`.
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            ProtocolError::ProtocolStatus402
                | ProtocolError::Certificate(_)
                | ProtocolError::Configuration(_)
                | ProtocolError::Decode(_)
        )
    }

    /// A short message suitable for the GUI's status line.
    pub fn user_message(&self) -> String {
        match self {
            ProtocolError::Io(e) => format!("Connection error: {e}."),
            ProtocolError::Tls(e) => format!("Secure connection error: {e}."),
            ProtocolError::Certificate(e) => format!("Certificate error: {e}."),
            ProtocolError::Discovery(msg) => format!("Couldn't find the TV: {msg}."),
            ProtocolError::TlsHandshake(msg) => format!("Secure connection failed: {msg}."),
            ProtocolError::Cancelled(_) => "Disconnected.".to_string(),
            ProtocolError::ProtocolStatus402 => {
                "That code didn't match. Try again.".to_string()
            }
            ProtocolError::Decode(msg) => format!("Received malformed data: {msg}."),
            ProtocolError::CryptoExtract(msg) => format!("Certificate is not usable: {msg}."),
            ProtocolError::Configuration(msg) => format!("Configuration error: {msg}."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_secret_message_is_actionable() {
        let err = ProtocolError::ProtocolStatus402;
        assert!(err.requires_user_action());
        assert_eq!(err.user_message(), "That code didn't match. Try again.");
    }

    #[test]
    fn malformed_user_code_is_actionable_but_io_error_is_not() {
        let err = ProtocolError::Decode("code must be 6 digits".to_string());
        assert!(err.requires_user_action());

        let io_error = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err: ProtocolError = io_error.into();
        assert!(!err.requires_user_action());
    }

    #[test]
    fn io_error_converts_and_is_recoverable() {
        let io_error = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err: ProtocolError = io_error.into();
        assert!(matches!(err, ProtocolError::Io(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn cancelled_on_explicit_disconnect() {
        let io_error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        let err = ProtocolError::from_io_error(io_error, "disconnect");
        assert!(matches!(err, ProtocolError::Cancelled(_)));
    }
}
