use crate::config::Config;
use crate::device::Device;
use crate::error::Result;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// UDP port devices listen on for discovery queries
pub const DISCOVERY_PORT: u16 = 1982;

/// Multicast group the discovery query is sent to
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Search query understood by the lights
pub const SEARCH_QUERY: &str = "M-SEARCH * HTTP/1.1\r\nMAN: \"ssdp:discover\"\r\nST: wifi_bulb\r\n\r\n";

const RECV_BUFFER_SIZE: usize = 2048;

/// Devices found during one discovery run, keyed by the replying `host:port`
pub type DiscoveredDevices = BTreeMap<String, Device>;

/// Multicast discovery of lights on every local IPv4 interface
///
/// # Example
///
/// ```no_run
/// use yeelight_lan::{Config, Discovery};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let devices = Discovery::new(Config::default()).run().await?;
///     for (address, device) in &devices {
///         println!("Found {} at {}", device.info().label(), address);
///     }
///     Ok(())
/// }
/// ```
pub struct Discovery {
    config: Config,
}

impl Discovery {
    /// Create a discovery runner; devices it creates inherit `config`
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Query the network and collect replies for the configured window
    ///
    /// Interfaces that cannot be bound or queried are skipped. An empty result
    /// is not an error.
    pub async fn run(&self) -> Result<DiscoveredDevices> {
        let found: Arc<Mutex<DiscoveredDevices>> = Arc::new(Mutex::new(BTreeMap::new()));
        let (stop_tx, _) = broadcast::channel::<()>(1);
        let mut listeners: Vec<(String, JoinHandle<()>)> = Vec::new();

        let target = SocketAddr::V4(SocketAddrV4::new(MULTICAST_GROUP, DISCOVERY_PORT));

        for (name, address) in local_ipv4_interfaces()? {
            tracing::info!("Searching on interface: {} ({})", name, address);

            let socket = match bind_discovery_socket(address) {
                Ok(socket) => Arc::new(socket),
                Err(e) => {
                    tracing::error!("Failed to bind port {} on {} ({}): {}", DISCOVERY_PORT, name, address, e);
                    continue;
                }
            };

            let handle = tokio::spawn(listen(
                socket.clone(),
                found.clone(),
                self.config.clone(),
                stop_tx.subscribe(),
            ));
            listeners.push((name.clone(), handle));

            match socket.send_to(SEARCH_QUERY.as_bytes(), target).await {
                Ok(_) => tracing::info!("Sent discovery request on interface {} ({})", name, address),
                Err(e) => tracing::error!("Error sending discovery request on {} ({}): {}", name, address, e),
            }
        }

        tracing::info!("Waiting for responses for {:?}...", self.config.discovery_timeout());
        tokio::time::sleep(self.config.discovery_timeout()).await;

        let _ = stop_tx.send(());
        for (name, handle) in listeners {
            tracing::debug!("Closing socket on interface {}", name);
            if let Err(e) = handle.await {
                tracing::warn!("Listener on {} ended abnormally: {}", name, e);
            }
        }
        tracing::info!("Discovery process completed");

        let devices = std::mem::take(&mut *found.lock().unwrap_or_else(|e| e.into_inner()));
        if devices.is_empty() {
            tracing::warn!("No devices found during search");
            tracing::warn!(
                "Make sure your devices are powered on, connected to the network and have LAN control enabled. \
                 Also ensure that UDP port {} is not blocked by a firewall",
                DISCOVERY_PORT
            );
        } else {
            tracing::info!("Found {} device(s)", devices.len());
        }
        Ok(devices)
    }
}

/// Non-loopback IPv4 interfaces as `(name, address)`
fn local_ipv4_interfaces() -> Result<Vec<(String, Ipv4Addr)>> {
    let interfaces = if_addrs::get_if_addrs()?
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.ip() {
            std::net::IpAddr::V4(ip) => Some((iface.name, ip)),
            std::net::IpAddr::V6(_) => None,
        })
        .collect();
    Ok(interfaces)
}

/// UDP socket on the interface address and discovery port, with address reuse
fn bind_discovery_socket(address: Ipv4Addr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(address, DISCOVERY_PORT).into())?;
    UdpSocket::from_std(socket.into())
}

/// Receive replies until stopped
async fn listen(
    socket: Arc<UdpSocket>,
    found: Arc<Mutex<DiscoveredDevices>>,
    config: Config,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, from)) => {
                    handle_reply(&found, from, &buf[..len], &config);
                }
                Err(e) => {
                    tracing::error!("Discovery receive error: {}", e);
                    break;
                }
            }
        }
    }
}

/// Record one reply unless its sender was already seen
///
/// Returns `true` when a new device was added.
fn handle_reply(found: &Mutex<DiscoveredDevices>, from: SocketAddr, data: &[u8], config: &Config) -> bool {
    let location = from.to_string();
    let mut found = found.lock().unwrap_or_else(|e| e.into_inner());

    if found.contains_key(&location) {
        tracing::debug!("Device already pulled from {}", location);
        return false;
    }

    if config.verbose {
        tracing::debug!("Received response from {}: {}", location, String::from_utf8_lossy(data));
    }

    match Device::from_announcement(data, config.clone()) {
        Ok(device) => {
            tracing::info!("{} added from {}", device.info().label(), location);
            found.insert(location, device);
            true
        }
        Err(e) => {
            tracing::warn!("Error adding device from {}: {}", location, e);
            false
        }
    }
}
