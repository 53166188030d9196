// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Address resolution.
//!
//! Turns `(hostname, port, protocol)` into an ordered list of candidate
//! socket addresses. Callers walk the list and keep the first candidate whose
//! socket/bind/connect sequence succeeds.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

use crate::config::Protocol;
use crate::error::NetError;

/// Resolve candidates for `host:port`.
///
/// `None` yields the wildcard addresses (dual-stack IPv6 first, then IPv4)
/// for a passive socket. Named hosts keep resolver order with IPv4 results
/// moved ahead of IPv6 ones, and duplicates removed.
pub fn resolve(
    host: Option<&str>,
    port: u16,
    protocol: Protocol,
) -> Result<Vec<SocketAddr>, NetError> {
    let Some(host) = host else {
        return Ok(vec![
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        ]);
    };

    let resolved = (host, port).to_socket_addrs().map_err(|e| {
        log::debug!("[resolve] {}:{} ({}) failed: {}", host, port, protocol, e);
        NetError::Resolution {
            host: host.to_string(),
            port: i64::from(port),
            source: e,
        }
    })?;

    let mut candidates: Vec<SocketAddr> = Vec::new();
    for addr in resolved {
        if !candidates.contains(&addr) {
            candidates.push(addr);
        }
    }
    // stable: keeps resolver order within each family
    candidates.sort_by_key(SocketAddr::is_ipv6);

    if candidates.is_empty() {
        return Err(NetError::Resolution {
            host: host.to_string(),
            port: i64::from(port),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
        });
    }

    log::debug!(
        "[resolve] {}:{} ({}) -> {} candidate(s)",
        host,
        port,
        protocol,
        candidates.len()
    );
    Ok(candidates)
}

/// Convert a numeric port argument.
///
/// Fails with a resolution error outside `1..=65535` (or `0..=65535` when
/// `allow_zero`, used for "any source port").
pub fn port_from_float(host: &str, value: f64, allow_zero: bool) -> Result<u16, NetError> {
    let port = value as i64;
    let min = if allow_zero { 0 } else { 1 };
    if value.is_finite() && (min..=i64::from(u16::MAX)).contains(&port) {
        Ok(port as u16)
    } else {
        Err(NetError::Resolution {
            host: host.to_string(),
            port,
            source: io::Error::new(io::ErrorKind::InvalidInput, "port out of range"),
        })
    }
}
