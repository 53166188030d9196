// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sender endpoint: one outbound connection plus its reply channel.
//!
//! # Lifecycle
//!
//! ```text
//! idle --connect--> connected --disconnect / write error / peer close--> idle
//!                   (status 1)                                  (status 0)
//! ```
//!
//! Replies arriving on the connected socket are decoded and emitted on the
//! data port.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::{Rc, Weak};

use socket2::Socket;

use crate::command::Command;
use crate::config::{EndpointConfig, EndpointKind, Protocol};
use crate::endpoint::{emit_all, Endpoint, NetNode, Outlet, Output, Ports};
use crate::error::NetError;
use crate::message::{Atom, Message};
use crate::reactor::{ReadHandler, ReadOutcome, Reactor};
use crate::receiver::{Batch, ReadResult, Receiver};
use crate::resolve::{port_from_float, resolve};
use crate::socket::{self, NetSocket};

/// Why one connect candidate failed.
enum Attempt {
    /// Try the next candidate
    Next(std::io::Error),
    /// Give up on the whole connect
    Abort(NetError),
}

struct SenderState {
    endpoint: Endpoint,
    receiver: Option<Receiver>,
}

struct SenderCore {
    state: RefCell<SenderState>,
    reactor: Rc<dyn Reactor>,
    outlet: Rc<dyn Outlet>,
}

/// Read callback registered for the connected socket.
struct SenderHandler {
    core: Weak<SenderCore>,
}

impl ReadHandler for SenderHandler {
    fn on_readable(&self, fd: RawFd) -> ReadOutcome {
        match self.core.upgrade() {
            Some(core) => core.on_readable(fd),
            None => ReadOutcome::Closed,
        }
    }
}

impl SenderCore {
    fn connect(self: &Rc<Self>, host: &str, port: f64, src_port: f64) -> Result<(), NetError> {
        let config = {
            let state = self.state.borrow();
            if state.endpoint.socket.is_some() {
                return Err(NetError::AlreadyConnected);
            }
            state.endpoint.config.clone()
        };
        let port = port_from_float(host, port, false)?;
        let src_port = port_from_float(host, src_port, true)?;
        let candidates = resolve(Some(host), port, config.protocol)?;

        let mut last_err = None;
        let mut chosen = None;
        for addr in candidates {
            match open_candidate(&addr, src_port, &config) {
                Ok(sock) => {
                    chosen = Some((addr, sock));
                    break;
                }
                Err(Attempt::Next(e)) => {
                    log::debug!("[netsend] candidate {} failed: {}", addr, e);
                    last_err = Some(e);
                }
                Err(Attempt::Abort(e)) => return Err(e),
            }
        }

        let Some((addr, sock)) = chosen else {
            return Err(NetError::Connect {
                host: host.to_string(),
                port,
                source: last_err.unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no usable address")
                }),
            });
        };

        let socket = NetSocket::from_socket(sock, config.protocol, false)?;
        let fd = socket.as_raw_fd();
        let ports = {
            let mut state = self.state.borrow_mut();
            state.endpoint.socket = Some(socket);
            state.endpoint.target = Some(addr);
            state.receiver = Some(Receiver::new(&config, false));
            state.endpoint.ports
        };

        let handler = Rc::new(SenderHandler {
            core: Rc::downgrade(self),
        });
        if let Err(e) = self.reactor.register(fd, handler) {
            self.teardown();
            return Err(NetError::Io(e));
        }

        log::info!("[netsend] connected to {} ({})", addr, config.protocol);
        emit_all(&*self.outlet, ports, vec![Output::Status(1.0)]);
        Ok(())
    }

    /// Drop the socket and receiver; returns false if nothing was open.
    fn teardown(&self) -> bool {
        let socket = {
            let mut state = self.state.borrow_mut();
            state.receiver = None;
            state.endpoint.target = None;
            state.endpoint.socket.take()
        };
        match socket {
            Some(socket) => {
                self.reactor.unregister(socket.as_raw_fd());
                drop(socket);
                true
            }
            None => false,
        }
    }

    fn disconnect(&self) {
        if self.teardown() {
            log::debug!("[netsend] disconnected");
            let ports = self.state.borrow().endpoint.ports;
            emit_all(&*self.outlet, ports, vec![Output::Status(0.0)]);
        }
    }

    fn send(&self, atoms: &[Atom]) -> Result<(), NetError> {
        let result = {
            let mut state = self.state.borrow_mut();
            if state.endpoint.socket.is_none() {
                return Err(NetError::NotConnected);
            }
            let bytes = state.endpoint.encode(atoms)?;
            state.endpoint.write(&bytes)
        };
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.disconnect();
                Err(e)
            }
        }
    }

    fn on_readable(&self, fd: RawFd) -> ReadOutcome {
        let (result, protocol, ports) = {
            let mut state = self.state.borrow_mut();
            let SenderState { endpoint, receiver } = &mut *state;
            let (Some(rx), Some(socket)) = (receiver.as_mut(), endpoint.socket.as_ref()) else {
                return ReadOutcome::Closed;
            };
            if socket.as_raw_fd() != fd {
                return ReadOutcome::Closed;
            }
            let result = match socket {
                NetSocket::Stream(s) => rx.read(s),
                NetSocket::Datagram(s) => rx.read(s),
                NetSocket::Listener(_) => return ReadOutcome::Closed,
            };
            (result, endpoint.config.protocol, endpoint.ports)
        };

        match result {
            ReadResult::Batch(batch) => {
                emit_all(&*self.outlet, ports, batch_outputs("netsend", batch));
                ReadOutcome::Data
            }
            ReadResult::WouldBlock => ReadOutcome::WouldBlock,
            ReadResult::Closed => {
                log::info!("[netsend] connection closed by peer");
                self.disconnect();
                ReadOutcome::Closed
            }
            ReadResult::Error(e) if protocol == Protocol::Stream => {
                log::error!("[netsend] recv: {}", e);
                self.disconnect();
                ReadOutcome::Closed
            }
            ReadResult::Error(e) => {
                log::error!("[netsend] recv: {}", e);
                ReadOutcome::WouldBlock
            }
        }
    }
}

/// Outputs for one decoded batch: peer address first, then the payload.
pub(crate) fn batch_outputs(tag: &str, batch: Batch) -> Vec<Output> {
    let mut outputs = Vec::with_capacity(batch.items.len() + 1);
    if let Some(from) = batch.from {
        outputs.push(Output::peer(from));
    }
    for item in batch.items {
        match item {
            Ok(msg) => outputs.push(Output::Data(msg)),
            Err(e) => log::error!("[{}] {}", tag, e),
        }
    }
    outputs
}

/// Create, configure and (for streams) connect one candidate.
fn open_candidate(addr: &SocketAddr, src_port: u16, config: &EndpointConfig) -> Result<Socket, Attempt> {
    let sock = socket::open(addr, config.protocol).map_err(Attempt::Next)?;
    socket::configure_sender(&sock, addr, config.protocol);

    if src_port != 0 {
        log::info!(
            "[netsend] connecting to dest port {}, src port {}",
            addr.port(),
            src_port
        );
        bind_source_port(&sock, addr, src_port, config.protocol).map_err(Attempt::Abort)?;
    } else {
        log::debug!("[netsend] connecting to {}", addr);
    }

    if config.protocol == Protocol::Stream {
        socket::connect_stream(&sock, addr, config.connect_timeout()).map_err(Attempt::Next)?;
    }
    Ok(sock)
}

fn bind_source_port(sock: &Socket, target: &SocketAddr, port: u16, protocol: Protocol) -> Result<(), NetError> {
    let locals = resolve(None, port, protocol)?;
    let mut last_err = None;
    for local in locals.iter().filter(|l| l.is_ipv6() == target.is_ipv6()) {
        match socket::bind(sock, local) {
            Ok(()) => return Ok(()),
            Err(e) => last_err = Some(e),
        }
    }
    Err(NetError::Bind {
        port,
        source: last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no local address")
        }),
    })
}

// ============================================================================
// Public endpoint
// ============================================================================

/// Outbound network node.
///
/// # Example
///
/// ```no_run
/// use std::rc::Rc;
/// use flownet::{EndpointConfig, NetNode, Output, PollReactor, SenderEndpoint};
///
/// let reactor = Rc::new(PollReactor::new()?);
/// let outlet = Rc::new(|out: Output| println!("{:?}", out));
/// let sender = SenderEndpoint::new(EndpointConfig::default(), reactor.clone(), outlet);
/// sender.connect("localhost", 3000.0, 0.0)?;
/// sender.send(&["hello".into(), 1.into()])?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct SenderEndpoint {
    core: Rc<SenderCore>,
}

impl SenderEndpoint {
    pub fn new(config: EndpointConfig, reactor: Rc<dyn Reactor>, outlet: Rc<dyn Outlet>) -> Self {
        let endpoint = Endpoint::new(config, Ports::sender(), "netsend");
        Self {
            core: Rc::new(SenderCore {
                state: RefCell::new(SenderState {
                    endpoint,
                    receiver: None,
                }),
                reactor,
                outlet,
            }),
        }
    }

    /// Create from construction-time arguments (`-u`, `-b`, legacy protocol number).
    pub fn from_args(args: &[Atom], reactor: Rc<dyn Reactor>, outlet: Rc<dyn Outlet>) -> Self {
        Self::new(EndpointConfig::from_args(EndpointKind::Sender, args), reactor, outlet)
    }

    /// Connect to `host:port`, optionally from a fixed source port.
    pub fn connect(&self, host: &str, port: f64, src_port: f64) -> Result<(), NetError> {
        self.core.connect(host, port, src_port).map_err(|e| {
            log::error!("[netsend] {}", e);
            e
        })
    }

    /// Close the connection. Does nothing when not connected.
    pub fn disconnect(&self) {
        self.core.disconnect();
    }

    /// Set the connect timeout. Negative values are ignored.
    pub fn timeout(&self, secs: f64) {
        if secs < 0.0 || !secs.is_finite() {
            log::warn!("[netsend] ignoring invalid timeout {}", secs);
            return;
        }
        self.core.state.borrow_mut().endpoint.config.connect_timeout_secs = secs;
    }

    pub fn is_connected(&self) -> bool {
        self.core.state.borrow().endpoint.socket.is_some()
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.core.state.borrow().endpoint.target
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        let state = self.core.state.borrow();
        state.endpoint.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl NetNode for SenderEndpoint {
    fn config(&self) -> EndpointConfig {
        self.core.state.borrow().endpoint.config.clone()
    }

    fn dispatch(&self, msg: &Message) -> Result<(), NetError> {
        let cmd = Command::parse(msg).map_err(|e| {
            log::error!("[netsend] {}", e);
            e
        })?;
        match cmd {
            Command::Connect { host, port, src_port } => self.connect(&host, port, src_port),
            Command::Disconnect => {
                self.disconnect();
                Ok(())
            }
            Command::Send(atoms) => self.send(&atoms),
            Command::Timeout(secs) => {
                self.timeout(secs);
                Ok(())
            }
            Command::Listen(_) => {
                let e = NetError::UnknownCommand("listen".into());
                log::error!("[netsend] {}", e);
                Err(e)
            }
        }
    }

    fn send(&self, atoms: &[Atom]) -> Result<(), NetError> {
        self.core.send(atoms).map_err(|e| {
            log::error!("[netsend] {}", e);
            e
        })
    }
}

impl Drop for SenderEndpoint {
    fn drop(&mut self) {
        self.core.disconnect();
    }
}

impl std::fmt::Debug for SenderEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderEndpoint")
            .field("connected", &self.is_connected())
            .field("peer", &self.peer_addr())
            .finish()
    }
}
