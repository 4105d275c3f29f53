//! Sync transport
//!
//! A host announces itself over UDP and accepts one TCP peer; a client
//! listens for the announcement and connects back. Both sides then verify a
//! 4-byte magic value before any data moves. Datasets are exchanged as
//! count-prefixed frames of fixed-size records, host first.

pub mod connection;
pub mod discovery;
pub mod frame;

pub use connection::{handshake, PeerState, SyncPeer};
pub use discovery::{Beacon, DiscoveredHost, Scanner};
pub use frame::{exchange, recv_frame, send_frame, WireRecord};

use std::fmt;

use thiserror::Error;
use tokio::sync::watch;

/// Discovery and handshake value, sent little-endian.
pub const MAGIC: u32 = 0x504C_4453;

pub const DEFAULT_TCP_PORT: u16 = 12345;
pub const DEFAULT_UDP_PORT: u16 = 12346;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Not connected")]
    NotConnected,
}

/// Which side of the exchange this device plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("host"),
            Role::Client => f.write_str("client"),
        }
    }
}

/// Resolves once the signal is raised or its sender goes away.
pub async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}
