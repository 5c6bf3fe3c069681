//! Socket setup for the relay.
//!
//! Sockets are configured with socket2 (reuse, buffer sizes, multicast hop
//! limit) and then handed to tokio.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Bind the receive socket on `addr`.
///
/// `recv_buffer_bytes` of 0 leaves SO_RCVBUF at the OS default.
pub fn bind_receiver(addr: SocketAddr, recv_buffer_bytes: usize) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    if recv_buffer_bytes > 0 {
        socket
            .set_recv_buffer_size(recv_buffer_bytes)
            .context("SO_RCVBUF")?;
    }
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("bind({addr})"))?;

    let socket = UdpSocket::from_std(socket.into()).context("failed to convert to tokio UdpSocket")?;
    tracing::info!(addr = %addr, "receive socket bound");
    Ok(socket)
}

/// Create a socket for sending to `dest` with the given multicast hop limit.
///
/// The socket binds an ephemeral port of the destination's address family.
pub fn multicast_sender(dest: SocketAddr, ttl: u32) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(dest), Type::DGRAM, Some(Protocol::UDP))
        .context("socket()")?;

    let bind_addr: SocketAddr = match dest {
        SocketAddr::V4(_) => {
            socket.set_multicast_ttl_v4(ttl).context("IP_MULTICAST_TTL")?;
            (Ipv4Addr::UNSPECIFIED, 0).into()
        }
        SocketAddr::V6(_) => {
            socket
                .set_multicast_hops_v6(ttl)
                .context("IPV6_MULTICAST_HOPS")?;
            (Ipv6Addr::UNSPECIFIED, 0).into()
        }
    };
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket.bind(&bind_addr.into()).context("bind()")?;

    let socket = UdpSocket::from_std(socket.into()).context("failed to convert to tokio UdpSocket")?;
    tracing::info!(dest = %dest, ttl, "multicast sender ready");
    Ok(socket)
}
