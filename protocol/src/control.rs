//! Control-port (6466) state machine: configure handshake, key injection,
//! ping-echo-only loop.
//!
//! Task/channel shape grounded on the teacher's
//! `ConnectionManager::spawn_connection_handler` (`tokio::select!` over a
//! command channel and the transport's receive future), generalized from
//! "one handler per paired device" to "the single active control
//! session."

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{ProtocolError, Result};
use crate::identity::ClientIdentity;
use crate::message::{DeviceInfo, KeyDirection, PingResponse, RemoteBody, RemoteConfigure, RemoteKeyInject, RemoteMessage};
use crate::transport::TlsTransport;

/// Gap between the down and up key events of a single logical press.
const KEY_PRESS_GAP: Duration = Duration::from_millis(50);

/// Commands the session supervisor sends into a running control session.
pub enum ControlCommand {
    SendKey(u32),
    Disconnect(oneshot::Sender<()>),
}

/// Events a running control session reports back to the supervisor.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// The configure/configure-ack exchange completed; the UI may publish
    /// `Connected` and the supervisor should persist `LastDevice`.
    Configured,
    /// The transport closed, whether by peer or by explicit disconnect.
    Disconnected,
    /// A non-recoverable error ended the session.
    Error(String),
}

/// Connects to the control port and runs the configure/ping/key-inject
/// loop until disconnected or the transport fails.
///
/// This is a long-running task: spawn it and drive it via `commands`
/// while observing `events`.
pub async fn run(
    addr: SocketAddr,
    identity: &ClientIdentity,
    device_info: DeviceInfo,
    mut commands: mpsc::Receiver<ControlCommand>,
    events: mpsc::UnboundedSender<ControlEvent>,
) -> Result<()> {
    let mut transport = TlsTransport::connect(addr, identity).await?;

    let initial = RemoteMessage::configure(RemoteConfigure {
        code1: RemoteConfigure::DEFAULT_CODE1,
        device_info,
    });
    transport.send(&initial.encode()).await?;
    debug!("sent initial RemoteConfigure, awaiting configuration to settle");

    let mut configured = false;

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(ControlCommand::SendKey(keycode)) => {
                        if let Err(e) = inject_key(&mut transport, keycode).await {
                            let _ = events.send(ControlEvent::Error(e.to_string()));
                            return Err(e);
                        }
                    }
                    Some(ControlCommand::Disconnect(ack)) => {
                        let _ = transport.close().await;
                        let _ = events.send(ControlEvent::Disconnected);
                        let _ = ack.send(());
                        return Ok(());
                    }
                    None => {
                        // Supervisor dropped its command handle; tear down.
                        let _ = events.send(ControlEvent::Disconnected);
                        return Ok(());
                    }
                }
            }
            frame = transport.recv() => {
                match frame {
                    Ok(payload) => {
                        let message = RemoteMessage::decode(&payload)?;
                        handle_inbound(&mut transport, message, &events, &mut configured).await?;
                    }
                    Err(ProtocolError::Cancelled(_)) => {
                        info!("control transport closed");
                        let _ = events.send(ControlEvent::Disconnected);
                        return Ok(());
                    }
                    Err(e) => {
                        let _ = events.send(ControlEvent::Error(e.to_string()));
                        return Err(e);
                    }
                }
            }
        }
    }
}

async fn handle_inbound(
    transport: &mut TlsTransport,
    message: RemoteMessage,
    events: &mpsc::UnboundedSender<ControlEvent>,
    configured: &mut bool,
) -> Result<()> {
    match message.body {
        RemoteBody::Configure(remote_configure) => {
            let ack = RemoteMessage::configure_ack(remote_configure);
            transport.send(&ack.encode()).await?;
            mark_configured(configured, events);
        }
        RemoteBody::ConfigureAck(_) => {
            mark_configured(configured, events);
        }
        RemoteBody::PingRequest(ping) => {
            // The client MUST NOT initiate pings; only echo what the TV sends.
            let response = RemoteMessage::ping_response(PingResponse { id: ping.id });
            transport.send(&response.encode()).await?;
        }
        RemoteBody::PingResponse(_) | RemoteBody::KeyInject(_) | RemoteBody::Other => {
            warn!("ignoring unexpected control-port message from TV");
        }
    }
    Ok(())
}

fn mark_configured(configured: &mut bool, events: &mpsc::UnboundedSender<ControlEvent>) {
    if !*configured {
        *configured = true;
        let _ = events.send(ControlEvent::Configured);
    }
}

/// Sends a down event immediately, then an up event after the standard
/// inter-event gap.
async fn inject_key(transport: &mut TlsTransport, keycode: u32) -> Result<()> {
    transport
        .send(
            &RemoteMessage::key_inject(RemoteKeyInject {
                keycode,
                direction: KeyDirection::Down,
            })
            .encode(),
        )
        .await?;
    tokio::time::sleep(KEY_PRESS_GAP).await;
    transport
        .send(
            &RemoteMessage::key_inject(RemoteKeyInject {
                keycode,
                direction: KeyDirection::Up,
            })
            .encode(),
        )
        .await
}
