//! In-process channel transports.
//!
//! Used to drive the relay loop without sockets. A [`ChannelSource`] closes
//! when every sender is dropped, which ends the loop cleanly.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{PacketSink, PacketSource};

/// Source fed through an mpsc channel.
pub struct ChannelSource {
    rx: mpsc::Receiver<Bytes>,
    from: SocketAddr,
}

/// Create a source and the sender that feeds it.
pub fn channel_source(capacity: usize) -> (mpsc::Sender<Bytes>, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    let source = ChannelSource {
        rx,
        from: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
    };
    (tx, source)
}

impl PacketSource for ChannelSource {
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.rx.recv().await {
            Some(packet) => {
                // Oversized packets are cut like a datagram socket would.
                let len = packet.len().min(buf.len());
                buf[..len].copy_from_slice(&packet[..len]);
                Ok(Some((len, self.from)))
            }
            None => Ok(None),
        }
    }
}

/// Sink that forwards copies of every packet into an unbounded channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Bytes>,
}

pub fn channel_sink() -> (ChannelSink, mpsc::UnboundedReceiver<Bytes>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, rx)
}

impl PacketSink for ChannelSink {
    async fn send(&self, packet: &[u8]) -> io::Result<usize> {
        self.tx
            .send(Bytes::copy_from_slice(packet))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "sink receiver dropped"))?;
        Ok(packet.len())
    }
}
