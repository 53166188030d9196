// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Socket primitives.
//!
//! Thin wrappers over `socket2` for creating, configuring, binding and
//! connecting sockets with the per-protocol options the endpoints need.
//! Option failures are logged and never abort the operation.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use socket2::{Domain, Protocol as SockProtocol, SockAddr, Socket, Type};

use crate::config::Protocol;

/// Pending-connection queue length for stream listeners.
pub const LISTEN_BACKLOG: i32 = 5;

/// Create an unbound socket for `addr`'s family.
pub fn open(addr: &SocketAddr, protocol: Protocol) -> io::Result<Socket> {
    let (ty, proto) = match protocol {
        Protocol::Stream => (Type::STREAM, SockProtocol::TCP),
        Protocol::Datagram => (Type::DGRAM, SockProtocol::UDP),
    };
    Socket::new(Domain::for_address(*addr), ty, Some(proto))
}

/// Check if `addr` is a multicast group.
pub fn is_multicast(addr: &SocketAddr) -> bool {
    addr.ip().is_multicast()
}

/// Apply outbound options: no-delay for streams, broadcast for datagrams.
///
/// Returns whether the target is a multicast group.
pub fn configure_sender(socket: &Socket, target: &SocketAddr, protocol: Protocol) -> bool {
    match protocol {
        Protocol::Stream => {
            if let Err(e) = socket.set_nodelay(true) {
                log::debug!("[socket] setsockopt TCP_NODELAY failed: {}", e);
            }
            false
        }
        Protocol::Datagram => {
            if let Err(e) = socket.set_broadcast(true) {
                log::debug!("[socket] setsockopt SO_BROADCAST failed: {}", e);
            }
            let multicast = is_multicast(target);
            if multicast {
                log::debug!("[socket] {} is a multicast group", target.ip());
            }
            multicast
        }
    }
}

/// Apply passive options: address reuse, dual-stack for IPv6 wildcards,
/// no-delay for streams, broadcast for IPv4 datagrams.
pub fn configure_listener(socket: &Socket, addr: &SocketAddr, protocol: Protocol) {
    if let Err(e) = socket.set_reuse_address(true) {
        log::debug!("[socket] setsockopt SO_REUSEADDR failed: {}", e);
    }
    if addr.is_ipv6() {
        if let Err(e) = socket.set_only_v6(false) {
            log::debug!("[socket] setsockopt IPV6_V6ONLY failed: {}", e);
        }
    }
    match protocol {
        Protocol::Stream => {
            if let Err(e) = socket.set_nodelay(true) {
                log::debug!("[socket] setsockopt TCP_NODELAY failed: {}", e);
            }
        }
        Protocol::Datagram if addr.is_ipv4() => {
            if let Err(e) = socket.set_broadcast(true) {
                log::debug!("[socket] setsockopt SO_BROADCAST failed: {}", e);
            }
        }
        Protocol::Datagram => {}
    }
}

/// Bind to `addr`.
pub fn bind(socket: &Socket, addr: &SocketAddr) -> io::Result<()> {
    socket.bind(&SockAddr::from(*addr))
}

/// Connect a stream socket, bounded by `timeout` (`None` = no bound).
pub fn connect_stream(socket: &Socket, addr: &SocketAddr, timeout: Option<Duration>) -> io::Result<()> {
    let addr = SockAddr::from(*addr);
    match timeout {
        Some(t) => socket.connect_timeout(&addr, t),
        None => socket.connect(&addr),
    }
}

/// Join `group` on the default interface.
pub fn join_multicast(socket: &Socket, group: &IpAddr) -> io::Result<()> {
    match group {
        IpAddr::V4(g) => socket.join_multicast_v4(g, &Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(g) => socket.join_multicast_v6(g, 0),
    }
}

/// Put a listening stream socket into the listening state.
pub fn listen(socket: &Socket) -> io::Result<()> {
    socket.listen(LISTEN_BACKLOG)
}

/// Block until `fd` is writable or `timeout` elapses.
///
/// Sockets are kept non-blocking for the reactor; outbound writes wait here
/// when the kernel buffer is full.
pub fn wait_writable(fd: RawFd, timeout: Option<Duration>) -> io::Result<()> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    let timeout_ms = match timeout {
        Some(t) => i32::try_from(t.as_millis()).unwrap_or(i32::MAX),
        None => -1,
    };
    loop {
        // SAFETY: `pfd` is a valid pollfd that outlives the call, nfds is 1.
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ret > 0 {
            return Ok(());
        }
        if ret == 0 {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "socket not writable"));
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

// ============================================================================
// Owned socket
// ============================================================================

/// A socket owned by an endpoint.
#[derive(Debug)]
pub enum NetSocket {
    /// Connected stream (sender side, or an accepted peer)
    Stream(TcpStream),
    /// Datagram socket (connected-less)
    Datagram(UdpSocket),
    /// Listening stream socket
    Listener(TcpListener),
}

impl NetSocket {
    /// Wrap a configured socket2 socket and switch it to non-blocking mode.
    pub fn from_socket(socket: Socket, protocol: Protocol, listening: bool) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(match (protocol, listening) {
            (Protocol::Stream, false) => NetSocket::Stream(socket.into()),
            (Protocol::Stream, true) => NetSocket::Listener(socket.into()),
            (Protocol::Datagram, _) => NetSocket::Datagram(socket.into()),
        })
    }

    /// Local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            NetSocket::Stream(s) => s.local_addr(),
            NetSocket::Datagram(s) => s.local_addr(),
            NetSocket::Listener(s) => s.local_addr(),
        }
    }
}

impl AsRawFd for NetSocket {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            NetSocket::Stream(s) => s.as_raw_fd(),
            NetSocket::Datagram(s) => s.as_raw_fd(),
            NetSocket::Listener(s) => s.as_raw_fd(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_options_and_bind() {
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("addr");
        let socket = open(&addr, Protocol::Stream).expect("socket");
        configure_listener(&socket, &addr, Protocol::Stream);
        assert!(socket.reuse_address().expect("getsockopt"));
        bind(&socket, &addr).expect("bind");
        listen(&socket).expect("listen");

        let net = NetSocket::from_socket(socket, Protocol::Stream, true).expect("wrap");
        assert!(matches!(net, NetSocket::Listener(_)));
        assert_eq!(net.local_addr().expect("local").ip(), addr.ip());
    }

    #[test]
    fn test_sender_detects_multicast() {
        let group: SocketAddr = "239.1.2.3:5000".parse().expect("addr");
        let socket = open(&group, Protocol::Datagram).expect("socket");
        assert!(configure_sender(&socket, &group, Protocol::Datagram));
        assert!(socket.broadcast().expect("getsockopt"));

        let unicast: SocketAddr = "127.0.0.1:5000".parse().expect("addr");
        assert!(!configure_sender(&socket, &unicast, Protocol::Datagram));
    }

    #[test]
    fn test_wait_writable_on_fresh_udp() {
        let sock = UdpSocket::bind("127.0.0.1:0").expect("bind");
        wait_writable(sock.as_raw_fd(), Some(Duration::from_millis(100))).expect("writable");
    }
}
