//! Transport seams for the relay loop.
//!
//! The loop receives from one [`PacketSource`] and forwards to one or two
//! [`PacketSink`]s. The daemon plugs in UDP sockets; tests plug in channels.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

pub mod memory;
pub mod udp;

pub use memory::{channel_sink, channel_source, ChannelSink, ChannelSource};
pub use udp::{UdpSink, UdpSource};

/// Where packets come from.
pub trait PacketSource: Send {
    /// Wait for the next packet and copy it into `buf`.
    ///
    /// Returns the packet length and sender, or `None` once the source is
    /// closed and will never produce another packet.
    fn recv(
        &mut self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<Option<(usize, SocketAddr)>>> + Send;
}

/// Where packets go.
pub trait PacketSink: Send + Sync {
    /// Send one packet unmodified. Returns the number of bytes sent.
    fn send(&self, packet: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Destination address, when there is one, for diagnostics.
    fn destination(&self) -> Option<SocketAddr> {
        None
    }
}
