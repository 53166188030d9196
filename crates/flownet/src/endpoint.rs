// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! State shared by both endpoint kinds and the output side of a node.

use std::net::{IpAddr, SocketAddr};
use std::os::unix::io::{AsRawFd, RawFd};

use crate::backpressure::{flush_all, BackpressureTracker, DatagramWriter, StreamWriter};
use crate::codec;
use crate::config::{EndpointConfig, Framing, Protocol};
use crate::error::NetError;
use crate::message::{Atom, Message};
use crate::socket::NetSocket;

// ============================================================================
// Outputs
// ============================================================================

/// One emission on an endpoint output port.
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    /// Decoded inbound message (data port)
    Data(Message),
    /// Connection state: 1/0 for a sender, live connection count for a receiver
    Status(f64),
    /// Source of the next data emission (peer-address port)
    Peer { host: String, port: u16 },
}

impl Output {
    /// Peer-address emission for `addr`; IPv4-mapped IPv6 is shown as IPv4.
    pub fn peer(addr: SocketAddr) -> Self {
        let ip = match addr.ip() {
            IpAddr::V6(v6) => v6
                .to_ipv4_mapped()
                .map(IpAddr::V4)
                .unwrap_or(IpAddr::V6(v6)),
            v4 => v4,
        };
        Output::Peer {
            host: ip.to_string(),
            port: addr.port(),
        }
    }

    /// Render as a plain message (peer becomes `host port`).
    pub fn to_message(&self) -> Message {
        match self {
            Output::Data(msg) => msg.clone(),
            Output::Status(v) => Message::Float(*v),
            Output::Peer { host, port } => {
                Message::List(vec![Atom::symbol(host.as_str()), Atom::from(f64::from(*port))])
            }
        }
    }
}

/// Downstream consumer of endpoint outputs.
pub trait Outlet {
    fn emit(&self, output: Output);
}

impl<F: Fn(Output)> Outlet for F {
    fn emit(&self, output: Output) {
        self(output)
    }
}

/// Which output ports a node has.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ports {
    pub data: bool,
    pub status: bool,
    pub peer: bool,
}

impl Ports {
    /// Ports of a sender node.
    pub fn sender() -> Self {
        Self {
            data: true,
            status: true,
            peer: false,
        }
    }

    /// Ports of a receiver node.
    pub fn receiver(config: &EndpointConfig) -> Self {
        Self {
            data: config.framing != Framing::Legacy,
            status: config.protocol == Protocol::Stream,
            peer: config.peer_address_output,
        }
    }

    /// Check if the node has a port for `output`.
    pub fn admits(&self, output: &Output) -> bool {
        match output {
            Output::Data(_) => self.data,
            Output::Status(_) => self.status,
            Output::Peer { .. } => self.peer,
        }
    }
}

// ============================================================================
// Shared endpoint state
// ============================================================================

/// Socket, options and write accounting common to senders and receivers.
#[derive(Debug)]
pub struct Endpoint {
    pub config: EndpointConfig,
    pub ports: Ports,
    /// Primary socket (`None` = idle)
    pub socket: Option<NetSocket>,
    /// Remote address for outbound datagrams / connected peer
    pub target: Option<SocketAddr>,
    pub backpressure: BackpressureTracker,
    /// Log prefix (`netsend` / `netreceive`)
    pub tag: &'static str,
}

impl Endpoint {
    pub fn new(config: EndpointConfig, ports: Ports, tag: &'static str) -> Self {
        Self {
            config,
            ports,
            socket: None,
            target: None,
            backpressure: BackpressureTracker::new(),
            tag,
        }
    }

    /// Descriptor of the primary socket.
    pub fn fd(&self) -> Option<RawFd> {
        self.socket.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Encode `atoms` with this endpoint's encoding.
    pub fn encode(&self, atoms: &[Atom]) -> Result<Vec<u8>, NetError> {
        Ok(codec::encode(self.config.encoding, atoms)?)
    }

    /// Write encoded bytes on the primary socket.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, NetError> {
        let sent = match (&self.socket, self.target) {
            (Some(NetSocket::Stream(stream)), _) => flush_all(
                &mut StreamWriter { stream },
                bytes,
                &mut self.backpressure,
                self.tag,
            ),
            (Some(NetSocket::Datagram(socket)), Some(target)) => flush_all(
                &mut DatagramWriter { socket, target },
                bytes,
                &mut self.backpressure,
                self.tag,
            ),
            (Some(NetSocket::Datagram(_)), None) => return Err(NetError::NoPeer),
            (Some(NetSocket::Listener(_)), _) | (None, _) => return Err(NetError::NotConnected),
        };
        sent.map_err(NetError::Send)
    }
}

/// Uniform command surface of a network node.
pub trait NetNode {
    /// Current configuration.
    fn config(&self) -> EndpointConfig;

    /// Route a command message (`connect`, `listen`, `send`, ...).
    fn dispatch(&self, msg: &Message) -> Result<(), NetError>;

    /// Send `atoms` to the peer(s).
    fn send(&self, atoms: &[Atom]) -> Result<(), NetError>;
}

/// Forward outputs admitted by `ports` to `outlet`.
pub(crate) fn emit_all(outlet: &dyn Outlet, ports: Ports, outputs: Vec<Output>) {
    for output in outputs {
        if ports.admits(&output) {
            outlet.emit(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_peer_unmaps_v4() {
        let addr: SocketAddr = "[::ffff:192.168.1.2]:4000".parse().expect("addr");
        assert_eq!(
            Output::peer(addr),
            Output::Peer {
                host: "192.168.1.2".into(),
                port: 4000
            }
        );
        let addr: SocketAddr = "[::1]:5".parse().expect("addr");
        assert_eq!(
            Output::peer(addr).to_message(),
            Message::List(vec!["::1".into(), 5.into()])
        );
    }

    #[test]
    fn test_receiver_ports() {
        let legacy = EndpointConfig {
            framing: Framing::Legacy,
            protocol: Protocol::Datagram,
            peer_address_output: true,
            ..Default::default()
        };
        let ports = Ports::receiver(&legacy);
        assert!(!ports.data);
        assert!(!ports.status);
        assert!(ports.peer);

        let ports = Ports::receiver(&EndpointConfig::default());
        assert!(ports.data && ports.status && !ports.peer);
    }

    #[test]
    fn test_emit_all_filters() {
        let seen = RefCell::new(Vec::new());
        let outlet = |o: Output| seen.borrow_mut().push(o);
        let ports = Ports {
            data: true,
            status: false,
            peer: false,
        };
        emit_all(
            &outlet,
            ports,
            vec![Output::Status(1.0), Output::Data(Message::Float(2.0))],
        );
        assert_eq!(*seen.borrow(), vec![Output::Data(Message::Float(2.0))]);
    }

    #[test]
    fn test_write_without_socket() {
        let mut ep = Endpoint::new(EndpointConfig::default(), Ports::sender(), "netsend");
        assert!(ep.write(b"x").unwrap_err().is_not_connected());
    }
}
