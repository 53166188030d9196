// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receiver endpoint: a listening socket and its accepted connections.
//!
//! # Architecture
//!
//! ```text
//!  stream:    listener --accept--> registry [(fd, Connection), ...]
//!                                      |          |
//!                                   status     data / peer
//!
//!  datagram:  bound socket --> Receiver --> data / peer
//!                 ^ replies go to the last source address
//! ```
//!
//! `listen` always tears down everything first, so at most one listening
//! configuration exists at a time.

use std::cell::RefCell;
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::{Rc, Weak};

use crate::backpressure::{flush_all, StreamWriter};
use crate::command::Command;
use crate::config::{EndpointConfig, EndpointKind, Protocol};
use crate::endpoint::{emit_all, Endpoint, NetNode, Outlet, Output, Ports};
use crate::error::NetError;
use crate::message::{Atom, Message};
use crate::reactor::{ReadHandler, ReadOutcome, Reactor};
use crate::receiver::{ReadResult, Receiver};
use crate::registry::ConnectionRegistry;
use crate::resolve::{port_from_float, resolve};
use crate::sender::batch_outputs;
use crate::socket::{self, NetSocket};

/// One accepted peer.
#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    receiver: Receiver,
}

struct ReceiverState {
    endpoint: Endpoint,
    /// Decoder of the bound datagram socket
    datagram_rx: Option<Receiver>,
    connections: ConnectionRegistry<Connection>,
}

struct ReceiverCore {
    state: RefCell<ReceiverState>,
    reactor: Rc<dyn Reactor>,
    outlet: Rc<dyn Outlet>,
}

#[derive(Clone, Copy, Debug)]
enum Role {
    Accept,
    Datagram,
    Connection,
}

struct ReceiverHandler {
    core: Weak<ReceiverCore>,
    role: Role,
}

impl ReadHandler for ReceiverHandler {
    fn on_readable(&self, fd: RawFd) -> ReadOutcome {
        let Some(core) = self.core.upgrade() else {
            return ReadOutcome::Closed;
        };
        match self.role {
            Role::Accept => core.on_accept(fd),
            Role::Datagram => core.on_datagram(fd),
            Role::Connection => core.on_connection(fd),
        }
    }
}

impl ReceiverCore {
    fn emit(&self, outputs: Vec<Output>) {
        let ports = self.state.borrow().endpoint.ports;
        emit_all(&*self.outlet, ports, outputs);
    }

    fn register(self: &Rc<Self>, fd: RawFd, role: Role) -> std::io::Result<()> {
        let handler = Rc::new(ReceiverHandler {
            core: Rc::downgrade(self),
            role,
        });
        self.reactor.register(fd, handler)
    }

    fn listen(self: &Rc<Self>, port: i64) -> Result<(), NetError> {
        self.close_all();
        if port <= 0 {
            return Ok(());
        }

        let config = self.state.borrow().endpoint.config.clone();
        let host = config.hostname.as_deref();
        let port = port_from_float(host.unwrap_or("*"), port as f64, false)?;
        let candidates = resolve(host, port, config.protocol)?;

        let mut last_err = None;
        let mut bound = None;
        for addr in candidates {
            let sock = match socket::open(&addr, config.protocol) {
                Ok(s) => s,
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };
            socket::configure_listener(&sock, &addr, config.protocol);
            match socket::bind(&sock, &addr) {
                Ok(()) => {
                    bound = Some((addr, sock));
                    break;
                }
                Err(e) => {
                    log::debug!("[netreceive] bind {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        let Some((addr, sock)) = bound else {
            return Err(NetError::Bind {
                port,
                source: last_err.unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no usable address")
                }),
            });
        };

        let role = match config.protocol {
            Protocol::Datagram => {
                if socket::is_multicast(&addr) {
                    match socket::join_multicast(&sock, &addr.ip()) {
                        Ok(()) => log::info!("[netreceive] joined multicast group {}", addr.ip()),
                        Err(source) => log::warn!(
                            "[netreceive] {}",
                            NetError::MulticastJoin {
                                group: addr,
                                source
                            }
                        ),
                    }
                }
                Role::Datagram
            }
            Protocol::Stream => {
                socket::listen(&sock).map_err(NetError::Listen)?;
                Role::Accept
            }
        };

        let socket = NetSocket::from_socket(sock, config.protocol, config.protocol == Protocol::Stream)?;
        let fd = socket.as_raw_fd();
        let local = socket.local_addr().ok();
        {
            let mut state = self.state.borrow_mut();
            state.endpoint.socket = Some(socket);
            if config.protocol == Protocol::Datagram {
                state.datagram_rx = Some(Receiver::new(&config, false));
            }
        }
        if let Err(e) = self.register(fd, role) {
            self.teardown();
            return Err(NetError::Io(e));
        }

        match local {
            Some(local) => log::info!("[netreceive] listening on {} ({})", local, config.protocol),
            None => log::info!("[netreceive] listening on port {} ({})", port, config.protocol),
        }
        Ok(())
    }

    /// Close the listening socket and every connection.
    fn teardown(&self) {
        let (listener, connections) = {
            let mut state = self.state.borrow_mut();
            state.datagram_rx = None;
            state.endpoint.target = None;
            (state.endpoint.socket.take(), state.connections.drain())
        };
        for (fd, conn) in connections {
            self.reactor.unregister(fd);
            drop(conn);
        }
        if let Some(listener) = listener {
            self.reactor.unregister(listener.as_raw_fd());
            log::debug!("[netreceive] closed listening socket");
        }
    }

    fn close_all(&self) {
        self.teardown();
        self.emit(vec![Output::Status(0.0)]);
    }

    fn on_accept(self: &Rc<Self>, fd: RawFd) -> ReadOutcome {
        let accepted = {
            let state = self.state.borrow();
            match &state.endpoint.socket {
                Some(NetSocket::Listener(l)) if l.as_raw_fd() == fd => l.accept(),
                _ => return ReadOutcome::Closed,
            }
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => return accept_failed(e),
        };
        if let Err(e) = stream.set_nonblocking(true) {
            log::error!("[netreceive] {}", NetError::Accept(e));
            return ReadOutcome::Data;
        }
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("[netreceive] setsockopt TCP_NODELAY failed: {}", e);
        }

        let conn_fd = stream.as_raw_fd();
        let count = {
            let mut state = self.state.borrow_mut();
            let receiver = Receiver::new(&state.endpoint.config, state.endpoint.ports.peer);
            state.connections.push(conn_fd, Connection { stream, receiver })
        };
        if let Err(e) = self.register(conn_fd, Role::Connection) {
            log::error!("[netreceive] {}", NetError::Accept(e));
            let conn = self.state.borrow_mut().connections.remove(conn_fd);
            drop(conn);
            return ReadOutcome::Data;
        }

        log::debug!("[netreceive] accepted {} (fd {}), {} connection(s)", peer, conn_fd, count);
        self.emit(vec![Output::Status(count as f64)]);
        ReadOutcome::Data
    }

    fn on_connection(&self, fd: RawFd) -> ReadOutcome {
        let result = {
            let mut state = self.state.borrow_mut();
            let Some(conn) = state.connections.get_mut(fd) else {
                return ReadOutcome::Closed;
            };
            conn.receiver.read(&conn.stream)
        };

        match result {
            ReadResult::Batch(batch) => {
                self.emit(batch_outputs("netreceive", batch));
                ReadOutcome::Data
            }
            ReadResult::WouldBlock => ReadOutcome::WouldBlock,
            ReadResult::Closed => {
                self.on_disconnect(fd);
                ReadOutcome::Closed
            }
            ReadResult::Error(e) => {
                log::error!("[netreceive] recv: {}", e);
                self.on_disconnect(fd);
                ReadOutcome::Closed
            }
        }
    }

    fn on_datagram(&self, fd: RawFd) -> ReadOutcome {
        let result = {
            let mut state = self.state.borrow_mut();
            let ReceiverState {
                endpoint,
                datagram_rx,
                ..
            } = &mut *state;
            let result = match (datagram_rx.as_mut(), endpoint.socket.as_ref()) {
                (Some(rx), Some(NetSocket::Datagram(s))) if s.as_raw_fd() == fd => rx.read(s),
                _ => return ReadOutcome::Closed,
            };
            if let ReadResult::Batch(batch) = &result {
                if batch.from.is_some() {
                    endpoint.target = batch.from;
                }
            }
            result
        };

        match result {
            ReadResult::Batch(batch) => {
                self.emit(batch_outputs("netreceive", batch));
                ReadOutcome::Data
            }
            ReadResult::WouldBlock | ReadResult::Closed => ReadOutcome::WouldBlock,
            ReadResult::Error(e) => {
                log::error!("[netreceive] recv: {}", e);
                ReadOutcome::WouldBlock
            }
        }
    }

    /// Drop one failed connection and report the new count.
    fn on_disconnect(&self, fd: RawFd) {
        let (conn, count) = {
            let mut state = self.state.borrow_mut();
            let conn = state.connections.remove(fd);
            (conn, state.connections.len())
        };
        if let Some(conn) = conn {
            self.reactor.unregister(fd);
            drop(conn);
            log::debug!("[netreceive] fd {} closed, {} connection(s)", fd, count);
            self.emit(vec![Output::Status(count as f64)]);
        }
    }

    fn send(&self, atoms: &[Atom]) -> Result<usize, NetError> {
        let failed = {
            let mut state = self.state.borrow_mut();
            let bytes = state.endpoint.encode(atoms)?;
            if state.endpoint.config.protocol == Protocol::Datagram {
                if state.endpoint.socket.is_none() {
                    return Err(NetError::NotConnected);
                }
                state.endpoint.write(&bytes)?;
                return Ok(1);
            }

            let ReceiverState {
                endpoint,
                connections,
                ..
            } = &mut *state;
            let mut failed = Vec::new();
            for (fd, conn) in connections.iter() {
                let mut writer = StreamWriter {
                    stream: &conn.stream,
                };
                let flushed = flush_all(&mut writer, &bytes, &mut endpoint.backpressure, endpoint.tag);
                if let Err(e) = flushed {
                    log::error!("[netreceive] send to fd {} failed: {}", fd, e);
                    failed.push(fd);
                }
            }
            failed
        };

        let attempted = self.state.borrow().connections.len();
        for fd in &failed {
            self.on_disconnect(*fd);
        }
        Ok(attempted - failed.len())
    }
}

/// Outcome of a failed `accept`.
///
/// Only an empty backlog waits for the next readiness edge. Any other failure
/// (EMFILE, ECONNABORTED, ...) keeps the listener queued so the pending
/// connection is retried on the next turn.
fn accept_failed(e: std::io::Error) -> ReadOutcome {
    match e.kind() {
        std::io::ErrorKind::WouldBlock => ReadOutcome::WouldBlock,
        std::io::ErrorKind::Interrupted => ReadOutcome::Data,
        _ => {
            log::error!("[netreceive] {}", NetError::Accept(e));
            ReadOutcome::Data
        }
    }
}

// ============================================================================
// Public endpoint
// ============================================================================

/// Inbound network node.
///
/// # Example
///
/// ```no_run
/// use std::rc::Rc;
/// use std::time::Duration;
/// use flownet::{EndpointConfig, Output, PollReactor, ReceiverEndpoint};
///
/// let reactor = Rc::new(PollReactor::new()?);
/// let outlet = Rc::new(|out: Output| println!("{:?}", out));
/// let receiver = ReceiverEndpoint::new(EndpointConfig::default(), reactor.clone(), outlet);
/// receiver.listen(3000)?;
/// loop {
///     reactor.poll_once(Some(Duration::from_millis(100)))?;
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ReceiverEndpoint {
    core: Rc<ReceiverCore>,
}

impl ReceiverEndpoint {
    /// Create a receiver; listens right away when `config.port` is set.
    pub fn new(config: EndpointConfig, reactor: Rc<dyn Reactor>, outlet: Rc<dyn Outlet>) -> Self {
        let port = config.port;
        let endpoint = Endpoint::new(config.clone(), Ports::receiver(&config), "netreceive");
        let receiver = Self {
            core: Rc::new(ReceiverCore {
                state: RefCell::new(ReceiverState {
                    endpoint,
                    datagram_rx: None,
                    connections: ConnectionRegistry::new(),
                }),
                reactor,
                outlet,
            }),
        };
        if port > 0 {
            // reported through the log; the node still exists, idle
            let _ = receiver.listen(i64::from(port));
        }
        receiver
    }

    /// Create from construction-time arguments.
    pub fn from_args(args: &[Atom], reactor: Rc<dyn Reactor>, outlet: Rc<dyn Outlet>) -> Self {
        Self::new(EndpointConfig::from_args(EndpointKind::Receiver, args), reactor, outlet)
    }

    /// Tear down and listen on `port` (`<= 0` = stay idle).
    pub fn listen(&self, port: i64) -> Result<(), NetError> {
        self.core.listen(port).map_err(|e| {
            log::error!("[netreceive] listen failed: {}", e);
            e
        })
    }

    /// Close the listening socket and every connection.
    pub fn close_all(&self) {
        self.core.close_all();
    }

    /// Send to every connection (stream) or the last sender (datagram).
    ///
    /// Returns how many peers received the message.
    pub fn broadcast(&self, atoms: &[Atom]) -> Result<usize, NetError> {
        self.core.send(atoms).map_err(|e| {
            log::error!("[netreceive] {}", e);
            e
        })
    }

    pub fn is_listening(&self) -> bool {
        self.core.state.borrow().endpoint.socket.is_some()
    }

    /// Number of live stream connections.
    pub fn connection_count(&self) -> usize {
        self.core.state.borrow().connections.len()
    }

    /// Connection descriptors in acceptance order.
    pub fn connections(&self) -> Vec<RawFd> {
        self.core.state.borrow().connections.fds()
    }

    /// Bound address of the listening socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        let state = self.core.state.borrow();
        state.endpoint.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Source of the most recent datagram.
    pub fn last_peer(&self) -> Option<SocketAddr> {
        self.core.state.borrow().endpoint.target
    }
}

impl NetNode for ReceiverEndpoint {
    fn config(&self) -> EndpointConfig {
        self.core.state.borrow().endpoint.config.clone()
    }

    fn dispatch(&self, msg: &Message) -> Result<(), NetError> {
        let cmd = Command::parse(msg).map_err(|e| {
            log::error!("[netreceive] {}", e);
            e
        })?;
        match cmd {
            Command::Listen(port) => self.listen(port),
            Command::Send(atoms) => self.send(&atoms),
            other => {
                let e = NetError::UnknownCommand(format!("{:?}", other));
                log::error!("[netreceive] {}", e);
                Err(e)
            }
        }
    }

    fn send(&self, atoms: &[Atom]) -> Result<(), NetError> {
        self.broadcast(atoms).map(|_| ())
    }
}

impl Drop for ReceiverEndpoint {
    fn drop(&mut self) {
        self.core.close_all();
    }
}

impl std::fmt::Debug for ReceiverEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverEndpoint")
            .field("listening", &self.is_listening())
            .field("connections", &self.connection_count())
            .finish()
    }
}
