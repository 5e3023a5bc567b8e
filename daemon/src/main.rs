//! Command-line driver for the Android TV remote protocol client:
//! discover TVs on the network, pair with one, and send key presses.

mod config;

use anyhow::{Context, Result};
use atvremote_protocol::discovery::Discovery;
use atvremote_protocol::identity::ClientIdentity;
use atvremote_protocol::message::{keycode, DeviceInfo};
use atvremote_protocol::session::{ConnectionState, Session};
use clap::{Parser, Subcommand};
use std::net::Ipv4Addr;
use tracing::info;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "atvremote")]
#[command(about = "Android TV / Google TV remote control client")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Browse the network for Android TV devices and print them as found.
    Discover,
    /// Connect to a TV by IP, pairing first if needed, then watch status.
    Connect {
        /// The TV's IPv4 address.
        ip: Ipv4Addr,
    },
    /// Submit a pairing code to a TV that's currently showing one.
    Pair {
        /// The TV's IPv4 address.
        ip: Ipv4Addr,
        /// The 6-character code shown on the TV.
        code: String,
    },
    /// Send a single named key press to the last-connected TV.
    SendKey {
        /// One of the known KEYCODE names (e.g. `dpad-up`, `home`, `power`).
        key: String,
    },
    /// Forget the persisted client identity, forcing a fresh re-pair.
    Reset,
}

fn device_info() -> DeviceInfo {
    DeviceInfo {
        model: "atvremote".to_string(),
        vendor: "atvremote".to_string(),
        unknown: 1,
        version: env!("CARGO_PKG_VERSION").to_string(),
        package_name: "atvremote".to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn resolve_keycode(name: &str) -> Option<u32> {
    Some(match name {
        "dpad-up" => keycode::DPAD_UP,
        "dpad-down" => keycode::DPAD_DOWN,
        "dpad-left" => keycode::DPAD_LEFT,
        "dpad-right" => keycode::DPAD_RIGHT,
        "dpad-center" | "select" => keycode::DPAD_CENTER,
        "back" => keycode::BACK,
        "home" => keycode::HOME,
        "volume-up" => keycode::VOLUME_UP,
        "volume-down" => keycode::VOLUME_DOWN,
        "mute" => keycode::MUTE,
        "play-pause" => keycode::PLAY_PAUSE,
        "power" => keycode::POWER,
        "search" => keycode::SEARCH,
        _ => return None,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load().context("failed to load configuration")?;
    config
        .ensure_directories()
        .context("failed to create directories")?;

    match args.command {
        Command::Discover => run_discover().await,
        Command::Connect { ip } => run_connect(&config, ip).await,
        Command::Pair { ip, code } => run_pair(&config, ip, &code).await,
        Command::SendKey { key } => run_send_key(&config, &key).await,
        Command::Reset => {
            ClientIdentity::reset(&config.paths.identity_dir)
                .context("failed to reset client identity")?;
            info!("client identity reset; next pairing will generate a fresh certificate");
            Ok(())
        }
    }
}

async fn run_discover() -> Result<()> {
    let mut discovery = Discovery::start().context("failed to start mDNS discovery")?;
    info!("searching for Android TV devices, press Ctrl+C to stop");
    loop {
        tokio::select! {
            device = discovery.next() => {
                match device {
                    Some(device) => println!("{}\t{}\t{}", device.service_name, device.host, device.address),
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn load_identity(config: &Config) -> Result<ClientIdentity> {
    ClientIdentity::load_or_create(&config.device.name, &config.paths.identity_dir)
        .context("failed to load or create client identity")
}

async fn run_connect(config: &Config, ip: Ipv4Addr) -> Result<()> {
    let identity = load_identity(config)?;
    let (session, mut status_rx) = Session::new(
        identity,
        config.device.name.clone(),
        device_info(),
        config.paths.identity_dir.clone(),
    );

    Session::connect_to_ip(session.clone(), ip).await?;
    info!("connecting; Ctrl+C to disconnect");

    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                changed?;
                let status = status_rx.borrow().clone();
                info!(state = ?status.state, message = %status.status_message, "status");
            }
            _ = tokio::signal::ctrl_c() => {
                session.disconnect().await?;
                break;
            }
        }
    }
    Ok(())
}

async fn run_pair(config: &Config, ip: Ipv4Addr, code: &str) -> Result<()> {
    let identity = load_identity(config)?;
    let (session, mut status_rx) = Session::new(
        identity,
        config.device.name.clone(),
        device_info(),
        config.paths.identity_dir.clone(),
    );

    Session::start_pairing(session.clone(), ip).await?;
    status_rx.changed().await?;
    info!(message = %status_rx.borrow().status_message, "pairing");

    Session::submit_secret(session, code).await?;

    loop {
        status_rx.changed().await?;
        let status = status_rx.borrow().clone();
        info!(state = ?status.state, message = %status.status_message, "status");
        if status.state == ConnectionState::Connected {
            break;
        }
    }
    Ok(())
}

async fn run_send_key(config: &Config, key: &str) -> Result<()> {
    let keycode = resolve_keycode(key).with_context(|| format!("unknown key name: {key}"))?;
    let identity = load_identity(config)?;
    let (session, mut status_rx) = Session::new(
        identity,
        config.device.name.clone(),
        device_info(),
        config.paths.identity_dir.clone(),
    );

    Session::bootstrap(session.clone()).await?;

    // The control task configures asynchronously; wait for it to report
    // `Connected` (or a terminal error) before handing it a key to send.
    loop {
        status_rx.changed().await?;
        let status = status_rx.borrow().clone();
        match status.state {
            ConnectionState::Connected => break,
            ConnectionState::Error => anyhow::bail!("{}", status.status_message),
            _ => continue,
        }
    }

    session.send_key(keycode).await?;
    Ok(())
}
