//! UDP implementations of the transport traits.
//!
//! Sockets are built and configured by the caller (bind address, multicast
//! TTL, buffer sizes) and handed over already registered with tokio.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use super::{PacketSink, PacketSource};

/// Receives datagrams on a bound socket.
pub struct UdpSource {
    socket: UdpSocket,
}

impl UdpSource {
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl PacketSource for UdpSource {
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let (len, from) = self.socket.recv_from(buf).await?;
        Ok(Some((len, from)))
    }
}

/// Sends every packet to one fixed destination, typically a multicast group.
pub struct UdpSink {
    socket: UdpSocket,
    dest: SocketAddr,
}

impl UdpSink {
    pub fn new(socket: UdpSocket, dest: SocketAddr) -> Self {
        Self { socket, dest }
    }
}

impl PacketSink for UdpSink {
    async fn send(&self, packet: &[u8]) -> io::Result<usize> {
        self.socket.send_to(packet, self.dest).await
    }

    fn destination(&self) -> Option<SocketAddr> {
        Some(self.dest)
    }
}
