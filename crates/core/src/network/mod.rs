use std::{
    fmt,
    net::{SocketAddr, ToSocketAddrs},
    sync::Arc,
};

use tokio::{net::UdpSocket, task::JoinHandle};

use crate::{PinkyError, Result, TransportError};

/// Largest datagram the receive loop accepts.
pub const MAX_DATAGRAM: usize = 65_507;

/// Transport identity of a remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(SocketAddr);

impl Address {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    /// The peer's host at another port, used to reach a role-specific
    /// listener on the same machine.
    pub fn with_port(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.0.ip(), port)
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outbound half of the network. Sends are fire-and-forget and must not wait
/// on the peer.
pub trait Link: Send + Sync {
    fn send(&self, to: &Address, port: u16, bytes: &[u8]) -> std::result::Result<(), TransportError>;
}

/// Consumer of inbound datagrams.
pub trait Receiver: Send + Sync + 'static {
    fn receive(&self, from: Address, bytes: &[u8]);
}

/// UDP socket shared by the send path and the receive task.
#[derive(Debug, Clone)]
pub struct UdpLink {
    socket: Arc<UdpSocket>,
}

impl UdpLink {
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| PinkyError::Config(format!("cannot resolve bind address `{host}`")))?;
        let socket = UdpSocket::bind(addr).await?;
        // try_send_to only succeeds once the reactor has seen the socket writable
        socket.writable().await?;
        tracing::info!(%addr, "listening for datagrams");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawns the receive loop. Socket errors are logged and the loop keeps
    /// going; it only ends when the task is aborted.
    pub fn listen<R: Receiver>(&self, receiver: Arc<R>) -> JoinHandle<()> {
        let socket = self.socket.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, from)) => receiver.receive(Address::new(from), &buf[..len]),
                    Err(err) => tracing::warn!(%err, "datagram receive failed"),
                }
            }
        })
    }
}

impl Link for UdpLink {
    fn send(&self, to: &Address, port: u16, bytes: &[u8]) -> std::result::Result<(), TransportError> {
        let target = to.with_port(port);
        self.socket
            .try_send_to(bytes, target)
            .map(|_| ())
            .map_err(|source| TransportError::Send { to: target, source })
    }
}
