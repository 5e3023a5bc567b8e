//! Client implementation of the Android TV / Google TV remote control
//! protocol ("Polo v2"): mDNS discovery, TLS pairing, and the control-port
//! key-injection session.
//!
//! [`session::Session`] is the entry point most callers want: it composes
//! discovery, pairing, and control into the single supervised connection
//! an application's UI observes through a [`tokio::sync::watch`] channel.
//! The lower-level pieces — [`wire`], [`message`], [`transport`] — are
//! public for callers that need to speak the protocol directly, such as
//! a diagnostic tool that just wants to send one key and exit.

pub mod control;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod keymaterial;
pub mod message;
pub mod pairing;
pub mod session;
pub mod transport;
pub mod wire;

pub use error::{ProtocolError, Result};
pub use identity::ClientIdentity;
pub use session::{ConnectionState, Session, SessionStatus};
