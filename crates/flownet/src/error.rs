// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for flownet endpoints.
//!
//! Nothing here is fatal to the host: every variant describes a failure that
//! is reported (logged and returned) while control goes back to the caller or
//! the event loop.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;

/// Message encoding and decoding errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Binary mode can only carry numbers.
    #[error("binary mode requires numeric elements (element {index} is '{symbol}')")]
    NonNumeric { index: usize, symbol: String },

    /// Inbound text carried an unresolved substitution placeholder.
    #[error("got dollar sign in message: {token}")]
    Placeholder { token: String },

    /// Empty symbols have no textual form.
    #[error("cannot encode an empty symbol")]
    EmptySymbol,

    /// NaN and infinities have no numeric textual form.
    #[error("cannot encode non-finite number {value} (element {index})")]
    NonFinite { index: usize, value: f64 },

    /// Unterminated stream text grew past the configured limit.
    #[error("message too long: {len} bytes without terminator (max {max}), dropping")]
    Overflow { len: usize, max: usize },
}

/// Endpoint errors.
#[derive(Debug, Error)]
pub enum NetError {
    /// Host/port could not be resolved into candidate addresses.
    #[error("bad host or port? {host}:{port}: {source}")]
    Resolution {
        host: String,
        port: i64,
        #[source]
        source: io::Error,
    },

    /// Every candidate address failed.
    #[error("connect to {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// `connect` on a sender that already has a socket.
    #[error("already connected")]
    AlreadyConnected,

    /// Operation needs a connection.
    #[error("not connected")]
    NotConnected,

    /// Datagram receiver has not heard from any peer yet.
    #[error("no peer to reply to")]
    NoPeer,

    /// Every candidate address failed to bind.
    #[error("bind to port {port} failed: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// `listen(2)` on a bound stream socket failed.
    #[error("listen failed: {0}")]
    Listen(#[source] io::Error),

    /// Accepting a pending connection failed.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// Writing to a socket failed.
    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    /// Joining a multicast group failed (socket stays usable).
    #[error("joining multicast group {group} failed: {source}")]
    MulticastJoin {
        group: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Encoding or decoding a message failed.
    #[error(transparent)]
    MalformedMessage(#[from] CodecError),

    /// Command arguments have the wrong shape.
    #[error("bad arguments: {0}")]
    BadArguments(String),

    /// Unknown command selector.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Other I/O error (reactor registration, socket conversion).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl NetError {
    /// Check if this error is the quiet "not connected" condition.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, NetError::NotConnected)
    }
}
