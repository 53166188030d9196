// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking-write accounting and the outbound flush loop.
//!
//! Outbound writes block until the kernel accepts the bytes. Every write is
//! timed; a write slower than [`SLOW_WRITE`] (or any leftover from an earlier
//! slow write) produces a "blocked N msec" warning, at most once per
//! [`WARN_INTERVAL`]. Slow writes inside the quiet window accumulate into the
//! next warning.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use crate::socket::wait_writable;

/// A single write slower than this counts as blocked.
pub const SLOW_WRITE: Duration = Duration::from_millis(5);

/// Minimum spacing between two blocked-write warnings.
pub const WARN_INTERVAL: Duration = Duration::from_secs(2);

/// Per-endpoint blocked-write tracker.
#[derive(Debug, Default, Clone)]
pub struct BackpressureTracker {
    /// Time of the last emitted warning
    last_warning: Option<Instant>,
    /// Blocked time not yet reported
    pending: Duration,
}

impl BackpressureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one write that ran from `before` to `after`.
    ///
    /// Returns the blocked duration to report when a warning is due.
    pub fn record(&mut self, before: Instant, after: Instant) -> Option<Duration> {
        let elapsed = after.saturating_duration_since(before);
        let late = elapsed > SLOW_WRITE;
        if !late && self.pending.is_zero() {
            return None;
        }

        let due = match self.last_warning {
            Some(last) => after.saturating_duration_since(last) > WARN_INTERVAL,
            None => true,
        };
        if due {
            let blocked = elapsed + self.pending;
            self.pending = Duration::ZERO;
            self.last_warning = Some(after);
            Some(blocked)
        } else {
            if late {
                self.pending += elapsed;
            }
            None
        }
    }

    /// Blocked time accumulated since the last warning.
    pub fn pending(&self) -> Duration {
        self.pending
    }
}

// ============================================================================
// Transmit
// ============================================================================

/// One write attempt on an outbound channel.
pub trait Transmit {
    /// Write some prefix of `buf`, returning how many bytes were accepted.
    fn transmit(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Connected stream writer.
pub struct StreamWriter<'a> {
    pub stream: &'a TcpStream,
}

impl Transmit for StreamWriter<'_> {
    fn transmit(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match (&*self.stream).write(buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    wait_writable(self.stream.as_raw_fd(), None)?;
                }
                other => return other,
            }
        }
    }
}

/// Datagram writer to a fixed target.
pub struct DatagramWriter<'a> {
    pub socket: &'a UdpSocket,
    pub target: SocketAddr,
}

impl Transmit for DatagramWriter<'_> {
    fn transmit(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.socket.send_to(buf, self.target) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    wait_writable(self.socket.as_raw_fd(), None)?;
                }
                other => return other,
            }
        }
    }
}

/// Write all of `bytes`, retrying partial writes.
///
/// A write error (or a write accepting zero bytes) abandons the rest of the
/// buffer and is returned to the caller. Blocked-write warnings carry `tag`.
pub fn flush_all<T: Transmit + ?Sized>(
    tx: &mut T,
    bytes: &[u8],
    tracker: &mut BackpressureTracker,
    tag: &str,
) -> io::Result<usize> {
    let mut sent = 0;
    while sent < bytes.len() {
        let before = Instant::now();
        let res = tx.transmit(&bytes[sent..]);
        let after = Instant::now();
        if let Some(blocked) = tracker.record(before, after) {
            log::warn!("[{}] blocked {} msec", tag, blocked.as_millis());
        }
        match res {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "socket accepted no bytes"));
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(sent)
}
