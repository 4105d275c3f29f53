//! Peer state machine and the magic handshake

use std::fmt;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

use crate::config::NetConfig;

use super::discovery::{Beacon, Scanner};
use super::frame::{self, WireRecord};
use super::{cancelled, NetError, Role, MAGIC};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Idle,
    /// Host: listening and broadcasting.
    Waiting,
    /// Client: listening for beacons.
    Scanning,
    Connected,
    /// Terminal until [`SyncPeer::shutdown`].
    Error,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerState::Idle => "idle",
            PeerState::Waiting => "waiting for client",
            PeerState::Scanning => "scanning for host",
            PeerState::Connected => "connected",
            PeerState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Exchange and verify the magic value. The host writes first; the client
/// reads first and only answers a valid magic.
pub async fn handshake<S>(stream: &mut S, role: Role) -> Result<(), NetError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let magic = MAGIC.to_le_bytes();
    let mut received = [0u8; 4];
    match role {
        Role::Host => {
            stream.write_all(&magic).await?;
            stream.flush().await?;
            stream.read_exact(&mut received).await?;
        }
        Role::Client => {
            stream.read_exact(&mut received).await?;
        }
    }
    if received != magic {
        return Err(NetError::Protocol(format!(
            "handshake mismatch: got {:#010x}",
            u32::from_le_bytes(received)
        )));
    }
    if role == Role::Client {
        stream.write_all(&magic).await?;
        stream.flush().await?;
    }
    Ok(())
}

/// One end of a sync session.
///
/// Driven by [`SyncPeer::tick`], one step per tick of the caller's clock,
/// or by [`SyncPeer::connect`] which ticks until connected or cancelled.
pub struct SyncPeer {
    role: Role,
    config: NetConfig,
    state: PeerState,
    ticks: u64,
    listener: Option<TcpListener>,
    beacon: Option<Beacon>,
    scanner: Option<Scanner>,
    stream: Option<TcpStream>,
    peer_addr: Option<SocketAddr>,
}

impl SyncPeer {
    pub fn new(role: Role, config: NetConfig) -> Self {
        Self {
            role,
            config,
            state: PeerState::Idle,
            ticks: 0,
            listener: None,
            beacon: None,
            scanner: None,
            stream: None,
            peer_addr: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Local address of the host's listener, once started.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Open the role's sockets: Idle -> Waiting (host) or Scanning (client).
    pub async fn start(&mut self) -> Result<(), NetError> {
        if self.state != PeerState::Idle {
            return Ok(());
        }
        let opened = match self.role {
            Role::Host => self.open_host().await,
            Role::Client => self.open_client().await,
        };
        match opened {
            Ok(state) => {
                self.ticks = 0;
                self.set_state(state);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn open_host(&mut self) -> Result<PeerState, NetError> {
        let listener =
            TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], self.config.tcp_port))).await?;
        let beacon = Beacon::bind(self.config.discovery_target).await?;
        log::info!(
            "Hosting on {}, announcing to {}",
            listener.local_addr()?,
            beacon.target()
        );
        self.listener = Some(listener);
        self.beacon = Some(beacon);
        Ok(PeerState::Waiting)
    }

    async fn open_client(&mut self) -> Result<PeerState, NetError> {
        let scanner = Scanner::bind(self.config.udp_port, self.config.tcp_port).await?;
        log::info!("Scanning for hosts on {}", scanner.local_addr()?);
        self.scanner = Some(scanner);
        Ok(PeerState::Scanning)
    }

    /// Advance by one tick and return the resulting state. Waits at most one
    /// tick interval for a peer, plus the handshake once one shows up.
    pub async fn tick(&mut self) -> Result<PeerState, NetError> {
        let stepped = match self.state {
            PeerState::Waiting => self.host_tick().await,
            PeerState::Scanning => self.client_tick().await,
            state => return Ok(state),
        };
        match stepped {
            Ok(Some((stream, addr))) => {
                self.listener = None;
                self.beacon = None;
                self.scanner = None;
                self.stream = Some(stream);
                self.peer_addr = Some(addr);
                self.set_state(PeerState::Connected);
                log::info!("Connected to {}", addr);
                Ok(self.state)
            }
            Ok(None) => Ok(self.state),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn host_tick(&mut self) -> Result<Option<(TcpStream, SocketAddr)>, NetError> {
        let every = self.config.broadcast_every_ticks.max(1);
        if self.ticks % every == 0 {
            if let Some(beacon) = &self.beacon {
                if let Err(e) = beacon.announce().await {
                    log::warn!("Discovery broadcast failed: {}", e);
                }
            }
        }
        self.ticks = self.ticks.wrapping_add(1);

        let listener = self.listener.as_ref().ok_or(NetError::NotConnected)?;
        let (mut stream, addr) = match timeout(self.config.tick_interval(), listener.accept()).await
        {
            Ok(accepted) => accepted?,
            Err(_) => return Ok(None),
        };
        log::debug!("Accepted {}, starting handshake", addr);
        handshake(&mut stream, Role::Host).await?;
        Ok(Some((stream, addr)))
    }

    async fn client_tick(&mut self) -> Result<Option<(TcpStream, SocketAddr)>, NetError> {
        self.ticks = self.ticks.wrapping_add(1);
        let scanner = self.scanner.as_ref().ok_or(NetError::NotConnected)?;
        let host = match timeout(self.config.tick_interval(), scanner.next_host()).await {
            Ok(found) => found?,
            Err(_) => return Ok(None),
        };
        log::debug!(
            "Beacon from {}, connecting to {}",
            host.beacon_from,
            host.address
        );
        let mut stream = TcpStream::connect(host.address).await?;
        handshake(&mut stream, Role::Client).await?;
        Ok(Some((stream, host.address)))
    }

    /// Tick until connected. Cancellation closes every socket and returns
    /// [`NetError::Cancelled`].
    pub async fn connect(&mut self, cancel: &mut watch::Receiver<bool>) -> Result<(), NetError> {
        let outcome = tokio::select! {
            biased;
            _ = cancelled(cancel) => Err(NetError::Cancelled),
            result = self.tick_until_connected() => result,
        };
        if let Err(NetError::Cancelled) = outcome {
            log::info!("Connect cancelled");
            self.shutdown();
        }
        outcome
    }

    async fn tick_until_connected(&mut self) -> Result<(), NetError> {
        self.start().await?;
        loop {
            match self.tick().await? {
                PeerState::Connected => return Ok(()),
                PeerState::Waiting | PeerState::Scanning => continue,
                PeerState::Idle | PeerState::Error => return Err(NetError::NotConnected),
            }
        }
    }

    /// Swap one dataset with the connected peer, in role order.
    pub async fn exchange<R: WireRecord>(
        &mut self,
        local: &[R],
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Vec<R>, NetError> {
        if self.state != PeerState::Connected {
            return Err(NetError::NotConnected);
        }
        let role = self.role;
        let stream = self.stream.as_mut().ok_or(NetError::NotConnected)?;
        let outcome = tokio::select! {
            biased;
            _ = cancelled(cancel) => Err(NetError::Cancelled),
            result = frame::exchange(stream, role, local) => result,
        };
        match outcome {
            Ok(remote) => Ok(remote),
            Err(NetError::Cancelled) => {
                log::info!("Exchange cancelled");
                self.shutdown();
                Err(NetError::Cancelled)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Close all sockets and return to Idle.
    pub fn shutdown(&mut self) {
        self.listener = None;
        self.beacon = None;
        self.scanner = None;
        self.stream = None;
        self.peer_addr = None;
        self.ticks = 0;
        self.set_state(PeerState::Idle);
    }

    fn fail(&mut self, err: NetError) -> NetError {
        log::warn!("Sync {} failed: {}", self.role, err);
        self.listener = None;
        self.beacon = None;
        self.scanner = None;
        self.stream = None;
        self.set_state(PeerState::Error);
        err
    }

    fn set_state(&mut self, state: PeerState) {
        if self.state != state {
            log::debug!("{} peer: {} -> {}", self.role, self.state, state);
            self.state = state;
        }
    }
}
