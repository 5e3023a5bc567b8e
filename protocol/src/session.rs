//! The session supervisor: owns at most one active transport, composes
//! the pairing and control state machines, and publishes everything the
//! UI needs to observe over a `watch` channel.
//!
//! Task/channel shape grounded on the teacher's `ConnectionManager`
//! (one command channel per active connection, a background task
//! driving the transport, events fed back to a shared channel); the
//! retry/fallback policy itself is this protocol's own, not the
//! teacher's always-keep-alive loop.
//!
//! Every entry point below takes `Arc<Session>` by value rather than
//! `&self`, since each one may need to hand a clone of the `Arc` to a
//! spawned task; callers hold the session behind an `Arc` and clone it
//! per call.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::control::{self, ControlCommand, ControlEvent};
use crate::discovery::{Discovery, DiscoveredDevice};
use crate::error::{ProtocolError, Result};
use crate::identity::ClientIdentity;
use crate::message::DeviceInfo;
use crate::pairing::{PairingOutcome, PairingSession};

/// Pairing-port TCP port, per the service's advertised contract.
pub const PAIRING_PORT: u16 = 6467;
/// Control-port TCP port.
pub const CONTROL_PORT: u16 = 6466;

/// Delay before retrying the control port after it drops, per the
/// "cancel transport, wait, retry control port; never fall back to the
/// pairing port" policy.
const CONTROL_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Delay on resume before reconnecting, giving the OS network stack time
/// to settle after sleep.
const RESUME_SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Coarse-grained connection state for the UI's status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Discovering,
    Connecting,
    AwaitingCode,
    Connected,
    Paused,
    Error,
}

/// Everything the UI needs to render: state, a human status line, whether
/// a pairing code prompt should be showing, and the current discovery
/// results.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub status_message: String,
    pub is_pairing: bool,
    pub discovered_devices: Vec<DiscoveredDevice>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus {
            state: ConnectionState::Disconnected,
            status_message: "Disconnected".to_string(),
            is_pairing: false,
            discovered_devices: Vec::new(),
        }
    }
}

/// The last device a control-port configuration completed against.
/// Written only after `ControlEvent::Configured`, never from a pairing
/// success alone — pairing can succeed on a TV the control port then
/// refuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LastDevice {
    address: Ipv4Addr,
}

fn last_device_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join("last_device.json")
}

fn load_last_device(storage_dir: &Path) -> Option<LastDevice> {
    let path = last_device_path(storage_dir);
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

fn save_last_device(storage_dir: &Path, address: Ipv4Addr) -> Result<()> {
    std::fs::create_dir_all(storage_dir)?;
    let json = serde_json::to_string_pretty(&LastDevice { address })?;
    std::fs::write(last_device_path(storage_dir), json)?;
    Ok(())
}

/// What's currently occupying the single logical session slot.
enum Mode {
    Idle,
    Pairing(PairingSession),
}

/// The session supervisor. Always held behind an `Arc` by its owner;
/// mutable state is behind async mutexes so commands from the UI and
/// events from background tasks can interleave safely.
pub struct Session {
    identity: ClientIdentity,
    client_name: String,
    device_info: DeviceInfo,
    storage_dir: PathBuf,
    status_tx: watch::Sender<SessionStatus>,
    mode: Mutex<Mode>,
    control_commands: Mutex<Option<mpsc::Sender<ControlCommand>>>,
    control_task: StdMutex<Option<JoinHandle<()>>>,
    discovery_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(
        identity: ClientIdentity,
        client_name: String,
        device_info: DeviceInfo,
        storage_dir: PathBuf,
    ) -> (Arc<Self>, watch::Receiver<SessionStatus>) {
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let session = Arc::new(Session {
            identity,
            client_name,
            device_info,
            storage_dir,
            status_tx,
            mode: Mutex::new(Mode::Idle),
            control_commands: Mutex::new(None),
            control_task: StdMutex::new(None),
            discovery_task: StdMutex::new(None),
        });
        (session, status_rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    fn publish(&self, state: ConnectionState, message: impl Into<String>, is_pairing: bool) {
        self.status_tx.send_modify(|status| {
            status.state = state;
            status.status_message = message.into();
            status.is_pairing = is_pairing;
        });
    }

    fn publish_devices(&self, devices: Vec<DiscoveredDevice>) {
        self.status_tx.send_modify(|status| {
            status.discovered_devices = devices;
        });
    }

    /// Startup policy: if a last-known device is persisted, attempt a
    /// direct control-port reconnect; otherwise start discovery.
    pub async fn bootstrap(session: Arc<Self>) -> Result<()> {
        let last = load_last_device(&session.storage_dir);
        match last {
            Some(last) => {
                info!(address = %last.address, "bootstrapping from last known device");
                Session::connect_to_ip(session, last.address).await
            }
            None => {
                info!("no last known device, starting discovery");
                Session::start_discovery(session).await
            }
        }
    }

    /// Starts mDNS discovery in the background, publishing resolved
    /// devices as `SessionStatus::discovered_devices`.
    pub async fn start_discovery(session: Arc<Self>) -> Result<()> {
        let mut discovery = Discovery::start()?;
        session.publish(ConnectionState::Discovering, "Searching for devices", false);

        let publisher = Arc::clone(&session);
        let task = tokio::spawn(async move {
            while discovery.next().await.is_some() {
                publisher.publish_devices(discovery.known_devices());
            }
        });
        *session.discovery_task.lock().unwrap() = Some(task);
        Ok(())
    }

    /// First-time-connect policy: no prior successful control-port
    /// configuration means this endpoint must be paired first; a prior
    /// success means the control port alone is sufficient.
    pub async fn connect(session: Arc<Self>, device: &DiscoveredDevice) -> Result<()> {
        let address = device.address;
        if load_last_device(&session.storage_dir).is_some() {
            Session::connect_to_ip(session, address).await
        } else {
            Session::start_pairing(session, address).await
        }
    }

    /// Connects directly to the control port of a known-good device,
    /// skipping pairing. Used by `bootstrap` and by `connect` once this
    /// endpoint has configured successfully before.
    pub async fn connect_to_ip(session: Arc<Self>, address: Ipv4Addr) -> Result<()> {
        *session.mode.lock().await = Mode::Idle;
        let addr = SocketAddr::new(address.into(), CONTROL_PORT);
        Session::spawn_control_supervisor(session, addr).await;
        Ok(())
    }

    /// Runs the pairing handshake against `address` and transitions to
    /// `AwaitingCode` once the TV is ready for the user's code.
    pub async fn start_pairing(session: Arc<Self>, address: Ipv4Addr) -> Result<()> {
        // Only one state machine may be active at a time: a live control
        // session or an in-progress discovery browse must be torn down
        // before pairing claims the single connection slot, mirroring
        // `disconnect()`'s cleanup.
        Session::stop_active_tasks(&session).await;

        let addr = SocketAddr::new(address.into(), PAIRING_PORT);
        session.publish(ConnectionState::Connecting, format!("Pairing with {address}"), false);

        match PairingSession::connect(
            addr,
            &session.identity,
            &session.client_name,
            session.device_info.clone(),
        )
        .await
        {
            Ok(pairing) => {
                *session.mode.lock().await = Mode::Pairing(pairing);
                session.publish(ConnectionState::AwaitingCode, "Enter the code shown on your TV", true);
                Ok(())
            }
            Err(e) => {
                session.publish(ConnectionState::Error, e.user_message(), false);
                Err(e)
            }
        }
    }

    /// Submits the user-entered pairing code. On success, drops the
    /// pairing session and opens a fresh control-port connection to the
    /// same address, per "on success the pairing instance is dropped and
    /// a fresh control instance is created on a fresh transport."
    pub async fn submit_secret(session: Arc<Self>, code: &str) -> Result<()> {
        let mut mode = session.mode.lock().await;
        let (address, pairing_result) = match &mut *mode {
            Mode::Pairing(pairing) => (pairing.remote_address(), pairing.submit_secret(code).await),
            Mode::Idle => {
                return Err(ProtocolError::Decode(
                    "no pairing session in progress".to_string(),
                ))
            }
        };

        match pairing_result {
            Ok(PairingOutcome::Success) => {
                *mode = Mode::Idle;
                drop(mode);
                let control_addr = SocketAddr::new(address.ip(), CONTROL_PORT);
                Session::spawn_control_supervisor(session, control_addr).await;
                Ok(())
            }
            Ok(PairingOutcome::BadSecret) => {
                session.publish(
                    ConnectionState::AwaitingCode,
                    "That code didn't match. Try again.",
                    true,
                );
                Ok(())
            }
            Err(e) => {
                // A malformed user-entered code is something the user can
                // simply retry on the same still-open pairing TLS session;
                // any other failure means that session is unusable and
                // pairing must restart from scratch on the next attempt.
                let retry_in_place = e.requires_user_action();
                if !retry_in_place {
                    *mode = Mode::Idle;
                }
                drop(mode);
                session.publish(ConnectionState::Error, e.user_message(), retry_in_place);
                Err(e)
            }
        }
    }

    /// Sends a key press: a down event immediately, an up event ~50ms
    /// later, handled inside the running control task.
    pub async fn send_key(&self, keycode: u32) -> Result<()> {
        let commands = self.control_commands.lock().await;
        match commands.as_ref() {
            Some(tx) => tx
                .send(ControlCommand::SendKey(keycode))
                .await
                .map_err(|_| ProtocolError::Cancelled("control session is not running".into())),
            None => Err(ProtocolError::Cancelled(
                "not connected to a control session".to_string(),
            )),
        }
    }

    /// Explicit disconnect: cancels whatever transport is active and
    /// returns to `Disconnected`. Per the spec, cancellation here is
    /// expected and must not read as an error to the caller.
    pub async fn disconnect(&self) -> Result<()> {
        *self.mode.lock().await = Mode::Idle;

        if let Some(tx) = self.control_commands.lock().await.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(ControlCommand::Disconnect(ack_tx)).await.is_ok() {
                let _ = ack_rx.await;
            }
        }
        Session::stop_active_tasks(self).await;

        self.publish(ConnectionState::Disconnected, "Disconnected", false);
        Ok(())
    }

    /// Aborts whatever control and discovery background tasks are
    /// currently running, without touching `mode` or publishing a status.
    /// Shared by `disconnect` and every entry point that's about to claim
    /// the single connection slot for itself (spec.md §5: "at most one
    /// active state machine at a time").
    async fn stop_active_tasks(session: &Session) {
        *session.control_commands.lock().await = None;
        if let Some(task) = session.control_task.lock().unwrap().take() {
            task.abort();
        }
        if let Some(task) = session.discovery_task.lock().unwrap().take() {
            task.abort();
        }
    }

    /// OS suspend notification: cancel the transport without touching
    /// persisted state, and tell the UI why.
    pub async fn suspend(&self) {
        if let Some(task) = self.control_task.lock().unwrap().take() {
            task.abort();
        }
        *self.control_commands.lock().await = None;
        self.publish(ConnectionState::Paused, "Paused (OS Sleeping)", false);
    }

    /// OS resume notification: wait for the network stack to settle,
    /// then rerun the bootstrap policy.
    pub async fn resume(session: Arc<Self>) -> Result<()> {
        tokio::time::sleep(RESUME_SETTLE_DELAY).await;
        Session::bootstrap(session).await
    }

    /// Starts a control-port supervisor task, first tearing down whatever
    /// control or discovery task is already running so the new one never
    /// races a still-live prior session for `control_commands`/`LastDevice`.
    async fn spawn_control_supervisor(session: Arc<Self>, addr: SocketAddr) {
        Session::stop_active_tasks(&session).await;

        session.publish(ConnectionState::Connecting, format!("Connecting to {}", addr.ip()), false);
        let runner = Arc::clone(&session);
        let task = tokio::spawn(async move {
            Session::run_control_supervisor(runner, addr).await;
        });
        *session.control_task.lock().unwrap() = Some(task);
    }

    /// Drives one control connection, retrying on failure with the
    /// control-port-failure policy (wait, retry the same address, never
    /// fall back to pairing) until explicitly disconnected.
    async fn run_control_supervisor(session: Arc<Self>, addr: SocketAddr) {
        loop {
            let (cmd_tx, cmd_rx) = mpsc::channel(16);
            let (event_tx, mut event_rx) = mpsc::unbounded_channel();
            *session.control_commands.lock().await = Some(cmd_tx);

            let run = control::run(addr, &session.identity, session.device_info.clone(), cmd_rx, event_tx);
            tokio::pin!(run);

            loop {
                tokio::select! {
                    event = event_rx.recv() => {
                        match event {
                            Some(ControlEvent::Configured) => {
                                if let Err(e) = save_last_device(&session.storage_dir, addr_to_ipv4(addr)) {
                                    warn!("failed to persist last device: {e}");
                                }
                                session.publish(ConnectionState::Connected, "Connected", false);
                            }
                            Some(ControlEvent::Disconnected) => break,
                            Some(ControlEvent::Error(msg)) => {
                                warn!("control session error: {msg}");
                                break;
                            }
                            None => break,
                        }
                    }
                    result = &mut run => {
                        if let Err(e) = result {
                            debug!("control session ended: {e}");
                        }
                        break;
                    }
                }
            }

            *session.control_commands.lock().await = None;

            session.publish(
                ConnectionState::Connecting,
                format!("Reconnecting to {}", addr.ip()),
                false,
            );
            tokio::time::sleep(CONTROL_RETRY_DELAY).await;
        }
    }
}

fn addr_to_ipv4(addr: SocketAddr) -> Ipv4Addr {
    match addr.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_device_roundtrips_through_json() {
        let dir = tempfile::TempDir::new().unwrap();
        save_last_device(dir.path(), Ipv4Addr::new(192, 168, 1, 50)).unwrap();
        let loaded = load_last_device(dir.path()).unwrap();
        assert_eq!(loaded.address, Ipv4Addr::new(192, 168, 1, 50));
    }

    #[test]
    fn missing_last_device_file_is_none_not_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load_last_device(dir.path()).is_none());
    }

    #[test]
    fn default_status_is_disconnected() {
        let status = SessionStatus::default();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(!status.is_pairing);
    }
}
