//! mDNS browser for the Android TV remote service type.
//!
//! Grounded on the pack's `mdns-sd`-based AirPlay device browser rather
//! than this crate family's own UDP-broadcast discovery:
//! `_androidtvremote2._tcp` is an mDNS/DNS-SD service type, not the older
//! UDP-broadcast wire protocol.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use mdns_sd::{Receiver, ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, warn};

use crate::error::{ProtocolError, Result};

/// The mDNS service type this client browses.
pub const SERVICE_TYPE: &str = "_androidtvremote2._tcp.local.";

/// How long `resolve` waits for a selected entry to produce an address.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// A TV advertised on the network: its mDNS service name, hostname, and
/// resolved IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub service_name: String,
    pub host: String,
    pub address: Ipv4Addr,
}

/// Browses `_androidtvremote2._tcp.local.`, publishing a set of resolved
/// devices as they're found.
///
/// Dropping it stops the underlying mDNS browse and shuts the daemon
/// down. Zero results for an indefinite period is normal, not an error;
/// only `resolve`'s bounded wait can time out.
pub struct Discovery {
    mdns: ServiceDaemon,
    receiver: Receiver<ServiceEvent>,
    known: HashMap<String, DiscoveredDevice>,
}

impl Discovery {
    /// Starts browsing. Returns immediately; devices arrive as the mDNS
    /// daemon resolves them (see `next`).
    pub fn start() -> Result<Self> {
        let mdns = ServiceDaemon::new()
            .map_err(|e| ProtocolError::Discovery(format!("mDNS daemon unavailable: {e}")))?;
        let receiver = mdns
            .browse(SERVICE_TYPE)
            .map_err(|e| ProtocolError::Discovery(format!("browse failed: {e}")))?;
        Ok(Self {
            mdns,
            receiver,
            known: HashMap::new(),
        })
    }

    /// Awaits the next newly-resolved device. Removal events update the
    /// known set but are not surfaced individually — callers observe the
    /// current set via `known_devices`.
    pub async fn next(&mut self) -> Option<DiscoveredDevice> {
        loop {
            let event = self.receiver.recv_async().await.ok()?;
            match event {
                ServiceEvent::ServiceResolved(info) => {
                    if let Some(device) = Self::to_device(&info) {
                        self.known
                            .insert(info.get_fullname().to_string(), device.clone());
                        return Some(device);
                    }
                }
                ServiceEvent::ServiceRemoved(_, fullname) => {
                    self.known.remove(&fullname);
                }
                _ => {}
            }
        }
    }

    /// The set of entries resolved so far, for publishing to the UI.
    pub fn known_devices(&self) -> Vec<DiscoveredDevice> {
        self.known.values().cloned().collect()
    }

    /// Resolves a single, already-known service name to its IPv4 address
    /// within a bounded timeout, for the "user selected this entry" path.
    /// A timeout transitions the supervisor to `Error`, per the spec.
    pub async fn resolve(&mut self, service_name: &str) -> Result<Ipv4Addr> {
        if let Some(device) = self.known.get(service_name) {
            return Ok(device.address);
        }
        tokio::time::timeout(RESOLVE_TIMEOUT, async {
            loop {
                match self.next().await {
                    Some(device) if device.service_name == service_name => {
                        return Ok(device.address)
                    }
                    Some(_) => continue,
                    None => {
                        return Err(ProtocolError::Discovery(
                            "mDNS browse stream ended".to_string(),
                        ))
                    }
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            Err(ProtocolError::Discovery(format!(
                "timed out resolving {service_name}"
            )))
        })
    }

    fn to_device(info: &ServiceInfo) -> Option<DiscoveredDevice> {
        // `get_addresses()` returns both v4 and v6 results; this protocol's
        // `DeviceEndpoint` is IPv4-only, so skip any AAAA-only entry.
        let address = info.get_addresses().iter().find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })?;
        Some(DiscoveredDevice {
            service_name: info.get_fullname().to_string(),
            host: info.get_hostname().trim_end_matches('.').to_string(),
            address,
        })
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        if let Err(e) = self.mdns.stop_browse(SERVICE_TYPE) {
            debug!("stop_browse failed: {e}");
        }
        if let Err(e) = self.mdns.shutdown() {
            warn!("mDNS daemon shutdown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_type_matches_spec() {
        assert_eq!(SERVICE_TYPE, "_androidtvremote2._tcp.local.");
    }
}
