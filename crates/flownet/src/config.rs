// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint configuration.
//!
//! Supports both construction-time arguments (the flag form used when a node
//! is created in a graph) and file-based configuration.
//!
//! # Example
//!
//! ```
//! use flownet::{Atom, EndpointConfig, EndpointKind, Encoding, Protocol};
//!
//! let args = [Atom::symbol("-u"), Atom::symbol("-b"), Atom::Float(3000.0)];
//! let config = EndpointConfig::from_args(EndpointKind::Receiver, &args);
//! assert_eq!(config.protocol, Protocol::Datagram);
//! assert_eq!(config.encoding, Encoding::Binary);
//! assert_eq!(config.port, 3000);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::message::Atom;

/// Default connect timeout (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: f64 = 10.0;

/// Default size of a single socket read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Default limit for unterminated text buffered on a stream socket.
pub const DEFAULT_MAX_PENDING_TEXT: usize = 64 * 1024;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Socket protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Connection-oriented byte stream (TCP)
    #[default]
    #[serde(alias = "tcp")]
    Stream,
    /// Datagrams (UDP), including multicast
    #[serde(alias = "udp")]
    Datagram,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Stream => write!(f, "tcp"),
            Protocol::Datagram => write!(f, "udp"),
        }
    }
}

/// Wire encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Token stream terminated by `;`
    #[default]
    Textual,
    /// Raw bytes, one number per byte
    Binary,
}

/// Inbound framing mode of a receiver.
///
/// Fixed at construction. `Legacy` is the pre-structured receiver form which
/// has no data output at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    #[default]
    Structured,
    Legacy,
}

/// Which kind of endpoint a configuration is parsed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    Sender,
    Receiver,
}

impl EndpointKind {
    fn tag(self) -> &'static str {
        match self {
            EndpointKind::Sender => "netsend",
            EndpointKind::Receiver => "netreceive",
        }
    }
}

/// Endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Socket protocol.
    pub protocol: Protocol,

    /// Wire encoding.
    pub encoding: Encoding,

    /// Receiver framing (legacy suppresses the data output).
    pub framing: Framing,

    /// Stream connect timeout in seconds (0 = wait for the OS).
    pub connect_timeout_secs: f64,

    /// Emit the peer address before each inbound payload.
    pub peer_address_output: bool,

    /// Receiver bind address or multicast group (None = all interfaces).
    pub hostname: Option<String>,

    /// Receiver port to listen on at construction (0 = stay idle).
    pub port: u16,

    /// Size of a single socket read.
    pub read_buffer_size: usize,

    /// Maximum unterminated text kept between stream reads.
    pub max_pending_text: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Stream,
            encoding: Encoding::Textual,
            framing: Framing::Structured,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            peer_address_output: false,
            hostname: None,
            port: 0,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_pending_text: DEFAULT_MAX_PENDING_TEXT,
        }
    }
}

impl EndpointConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse construction-time arguments.
    ///
    /// Flags come first and are order-independent: `-b` binary, `-u`
    /// datagram, `-f` (receiver) peer-address output. A receiver may instead
    /// use the legacy positional form `PORT [PROTOCOL] [old]`. After the
    /// flags a receiver accepts a port and, in datagram mode, a hostname or
    /// multicast group. Unknown flags and extra arguments are logged and
    /// ignored.
    pub fn from_args(kind: EndpointKind, args: &[Atom]) -> Self {
        let tag = kind.tag();
        let mut config = Self::default();
        let mut rest = args;

        if let Some(Atom::Float(first)) = rest.first() {
            // Positional form: the numeric argument selects the protocol for
            // a sender, or is the port for a receiver.
            match kind {
                EndpointKind::Sender => {
                    config.protocol = protocol_from_float(*first);
                }
                EndpointKind::Receiver => {
                    config.port = clamp_port(*first);
                    let proto = rest.get(1).and_then(Atom::as_float).unwrap_or(0.0);
                    config.protocol = protocol_from_float(proto);
                    if rest.get(2).and_then(Atom::as_symbol) == Some("old") {
                        config.framing = Framing::Legacy;
                    }
                }
            }
            return config;
        }

        while let Some(Atom::Symbol(flag)) = rest.first() {
            if !flag.starts_with('-') {
                break;
            }
            match (flag.as_str(), kind) {
                ("-b", _) => config.encoding = Encoding::Binary,
                ("-u", _) => config.protocol = Protocol::Datagram,
                ("-f", EndpointKind::Receiver) => config.peer_address_output = true,
                _ => log::warn!("[{}] unknown flag '{}' ignored", tag, flag),
            }
            rest = &rest[1..];
        }

        if kind == EndpointKind::Receiver {
            if let Some(Atom::Float(port)) = rest.first() {
                config.port = clamp_port(*port);
                rest = &rest[1..];
            }
            if let Some(Atom::Symbol(host)) = rest.first() {
                if config.protocol == Protocol::Datagram {
                    config.hostname = Some(host.clone());
                } else {
                    log::warn!("[{}] hostname argument '{}' ignored", tag, host);
                }
                rest = &rest[1..];
            }
        }

        if !rest.is_empty() {
            let extra: Vec<String> = rest.iter().map(ToString::to_string).collect();
            log::warn!("[{}] extra arguments ignored: {}", tag, extra.join(" "));
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.connect_timeout_secs.is_finite() || self.connect_timeout_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "connect_timeout_secs must be a non-negative number (got {})",
                self.connect_timeout_secs
            )));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::Invalid("read_buffer_size must be > 0".into()));
        }
        if self.max_pending_text == 0 {
            return Err(ConfigError::Invalid("max_pending_text must be > 0".into()));
        }
        if let Some(host) = &self.hostname {
            if host.is_empty() {
                return Err(ConfigError::Invalid("hostname must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Connect timeout as a duration (`None` = blocking connect).
    pub fn connect_timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.connect_timeout_secs)
    }
}

/// Convert a timeout in seconds; zero means no timeout.
fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

fn protocol_from_float(value: f64) -> Protocol {
    if value != 0.0 {
        Protocol::Datagram
    } else {
        Protocol::Stream
    }
}

fn clamp_port(value: f64) -> u16 {
    if value <= 0.0 {
        0
    } else if value >= f64::from(u16::MAX) {
        u16::MAX
    } else {
        value as u16
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EndpointConfig::default();
        assert_eq!(config.protocol, Protocol::Stream);
        assert_eq!(config.encoding, Encoding::Textual);
        assert_eq!(config.framing, Framing::Structured);
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(10)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sender_flags() {
        let args = [Atom::symbol("-u"), Atom::symbol("-b")];
        let config = EndpointConfig::from_args(EndpointKind::Sender, &args);
        assert_eq!(config.protocol, Protocol::Datagram);
        assert_eq!(config.encoding, Encoding::Binary);
        assert!(!config.peer_address_output);
    }

    #[test]
    fn test_sender_positional_protocol() {
        let config = EndpointConfig::from_args(EndpointKind::Sender, &[Atom::Float(1.0)]);
        assert_eq!(config.protocol, Protocol::Datagram);
        let config = EndpointConfig::from_args(EndpointKind::Sender, &[Atom::Float(0.0)]);
        assert_eq!(config.protocol, Protocol::Stream);
    }

    #[test]
    fn test_sender_ignores_unknown_and_extra() {
        let args = [Atom::symbol("-x"), Atom::symbol("-f"), Atom::symbol("host")];
        let config = EndpointConfig::from_args(EndpointKind::Sender, &args);
        assert_eq!(config, EndpointConfig::default());
    }

    #[test]
    fn test_receiver_flags_port_and_group() {
        let args = [
            Atom::symbol("-f"),
            Atom::symbol("-u"),
            Atom::Float(4000.0),
            Atom::symbol("239.200.0.1"),
        ];
        let config = EndpointConfig::from_args(EndpointKind::Receiver, &args);
        assert!(config.peer_address_output);
        assert_eq!(config.protocol, Protocol::Datagram);
        assert_eq!(config.port, 4000);
        assert_eq!(config.hostname.as_deref(), Some("239.200.0.1"));
    }

    #[test]
    fn test_receiver_stream_hostname_ignored() {
        let args = [Atom::Float(4000.0)];
        let config = EndpointConfig::from_args(EndpointKind::Receiver, &args);
        assert_eq!(config.port, 4000);

        let args = [Atom::symbol("-b"), Atom::Float(4000.0), Atom::symbol("localhost")];
        let config = EndpointConfig::from_args(EndpointKind::Receiver, &args);
        assert_eq!(config.encoding, Encoding::Binary);
        assert!(config.hostname.is_none());
    }

    #[test]
    fn test_receiver_legacy_positional() {
        let args = [Atom::Float(3000.0), Atom::Float(1.0), Atom::symbol("old")];
        let config = EndpointConfig::from_args(EndpointKind::Receiver, &args);
        assert_eq!(config.port, 3000);
        assert_eq!(config.protocol, Protocol::Datagram);
        assert_eq!(config.framing, Framing::Legacy);

        let args = [Atom::Float(3000.0)];
        let config = EndpointConfig::from_args(EndpointKind::Receiver, &args);
        assert_eq!(config.protocol, Protocol::Stream);
        assert_eq!(config.framing, Framing::Structured);
    }

    #[test]
    fn test_clamp_port() {
        assert_eq!(clamp_port(-5.0), 0);
        assert_eq!(clamp_port(80.9), 80);
        assert_eq!(clamp_port(1e9), u16::MAX);
    }

    #[test]
    fn test_validate_rejects_negative_timeout() {
        let config = EndpointConfig {
            connect_timeout_secs: -1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_timeout_means_blocking() {
        let config = EndpointConfig {
            connect_timeout_secs: 0.0,
            ..Default::default()
        };
        assert_eq!(config.connect_timeout(), None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            r#"
protocol = "udp"
encoding = "binary"
peer_address_output = true
hostname = "239.1.2.3"
port = 5000
"#
        )
        .expect("write config");

        let config = EndpointConfig::from_file(file.path()).expect("valid config");
        assert_eq!(config.protocol, Protocol::Datagram);
        assert_eq!(config.encoding, Encoding::Binary);
        assert!(config.peer_address_output);
        assert_eq!(config.hostname.as_deref(), Some("239.1.2.3"));
        assert_eq!(config.port, 5000);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_from_file_invalid() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "read_buffer_size = 0").expect("write config");
        assert!(matches!(
            EndpointConfig::from_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
