//! UDP host discovery
//!
//! The host periodically sends the 4-byte magic to a broadcast address.
//! A client picks the first such packet and connects back to its source.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use super::MAGIC;

/// A host seen on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredHost {
    /// Where the beacon came from.
    pub beacon_from: SocketAddr,
    /// The host's TCP endpoint to connect to.
    pub address: SocketAddr,
}

/// Host side: sends the magic value to the discovery target.
pub struct Beacon {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Beacon {
    pub async fn bind(target: SocketAddr) -> std::io::Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.set_broadcast(true)?;
        Ok(Self { socket, target })
    }

    pub async fn announce(&self) -> std::io::Result<()> {
        self.socket.send_to(&MAGIC.to_le_bytes(), self.target).await?;
        log::trace!("Beacon sent to {}", self.target);
        Ok(())
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

/// Client side: waits for beacons on the discovery port.
pub struct Scanner {
    socket: UdpSocket,
    tcp_port: u16,
}

impl Scanner {
    pub async fn bind(udp_port: u16, tcp_port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], udp_port))).await?;
        Ok(Self { socket, tcp_port })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Wait for the next valid beacon. Other traffic on the port is skipped.
    /// Cancel-safe.
    pub async fn next_host(&self) -> std::io::Result<DiscoveredHost> {
        let mut buf = [0u8; 64];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            if len == 4 && buf[..4] == MAGIC.to_le_bytes() {
                return Ok(DiscoveredHost {
                    beacon_from: from,
                    address: SocketAddr::new(from.ip(), self.tcp_port),
                });
            }
            log::debug!("Ignoring {}-byte datagram from {}", len, from);
        }
    }
}
