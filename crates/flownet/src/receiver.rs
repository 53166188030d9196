// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-socket inbound state.
//!
//! A [`Receiver`] performs one bounded read on a readable socket and turns
//! the bytes into messages. It never emits anything itself: the owning
//! endpoint gets a [`ReadResult`] back and forwards it to its outputs once it
//! has released its own state.

use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, UdpSocket};

use crate::codec::Decoder;
use crate::config::{EndpointConfig, Protocol};
use crate::error::CodecError;
use crate::message::Message;

/// A socket that can be read one packet (or stream chunk) at a time.
pub trait PacketSource {
    /// Read once; returns the byte count and the datagram source if known.
    fn recv_packet(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddr>)>;

    /// Address of the connected peer.
    fn peer(&self) -> Option<SocketAddr>;
}

impl PacketSource for TcpStream {
    fn recv_packet(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddr>)> {
        let n = (&*self).read(buf)?;
        Ok((n, None))
    }

    fn peer(&self) -> Option<SocketAddr> {
        self.peer_addr().ok()
    }
}

impl PacketSource for UdpSocket {
    fn recv_packet(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddr>)> {
        let (n, from) = self.recv_from(buf)?;
        Ok((n, Some(from)))
    }

    fn peer(&self) -> Option<SocketAddr> {
        None
    }
}

/// Messages decoded from one read.
#[derive(Debug, Default)]
pub struct Batch {
    /// Sender of the bytes (datagram source, or stream peer when requested)
    pub from: Option<SocketAddr>,
    /// Decoded messages and per-message decode errors, in wire order
    pub items: Vec<Result<Message, CodecError>>,
}

/// Outcome of one read.
#[derive(Debug)]
pub enum ReadResult {
    Batch(Batch),
    WouldBlock,
    /// Peer closed the stream
    Closed,
    Error(io::Error),
}

/// Decode state of one socket.
#[derive(Debug)]
pub struct Receiver {
    protocol: Protocol,
    decoder: Decoder,
    /// Look up the stream peer for every batch
    want_peer: bool,
    buffer: Vec<u8>,
}

impl Receiver {
    pub fn new(config: &EndpointConfig, want_peer: bool) -> Self {
        Self {
            protocol: config.protocol,
            decoder: Decoder::new(config.encoding, config.protocol, config.max_pending_text),
            want_peer,
            buffer: vec![0; config.read_buffer_size.max(1)],
        }
    }

    /// Perform one read on `source`.
    pub fn read<S: PacketSource + ?Sized>(&mut self, source: &S) -> ReadResult {
        let (n, from) = match source.recv_packet(&mut self.buffer) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadResult::WouldBlock,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                return ReadResult::Batch(Batch::default());
            }
            Err(e) => return ReadResult::Error(e),
        };

        if n == 0 && self.protocol == Protocol::Stream {
            return ReadResult::Closed;
        }

        let from = match self.protocol {
            Protocol::Datagram => from,
            Protocol::Stream if self.want_peer => source.peer(),
            Protocol::Stream => None,
        };
        let items = self.decoder.decode(&self.buffer[..n]);
        ReadResult::Batch(Batch { from, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Encoding;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Scripted source returning queued reads.
    struct Script {
        reads: RefCell<VecDeque<io::Result<Vec<u8>>>>,
        from: Option<SocketAddr>,
    }

    impl Script {
        fn new(reads: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: RefCell::new(reads.into()),
                from: None,
            }
        }
    }

    impl PacketSource for Script {
        fn recv_packet(&self, buf: &mut [u8]) -> io::Result<(usize, Option<SocketAddr>)> {
            match self.reads.borrow_mut().pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok((bytes.len(), self.from))
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }

        fn peer(&self) -> Option<SocketAddr> {
            Some("10.0.0.1:9".parse().expect("addr"))
        }
    }

    fn stream_config(encoding: Encoding) -> EndpointConfig {
        EndpointConfig {
            encoding,
            ..Default::default()
        }
    }

    #[test]
    fn test_stream_text_split_across_reads() {
        let mut rx = Receiver::new(&stream_config(Encoding::Textual), false);
        let src = Script::new(vec![Ok(b"foo 1".to_vec()), Ok(b" 2;".to_vec())]);

        match rx.read(&src) {
            ReadResult::Batch(b) => assert!(b.items.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
        match rx.read(&src) {
            ReadResult::Batch(b) => {
                assert!(b.from.is_none());
                assert_eq!(b.items.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(rx.read(&src), ReadResult::WouldBlock));
    }

    #[test]
    fn test_stream_eof_is_closed() {
        let mut rx = Receiver::new(&stream_config(Encoding::Binary), false);
        let src = Script::new(vec![Ok(Vec::new())]);
        assert!(matches!(rx.read(&src), ReadResult::Closed));
    }

    #[test]
    fn test_stream_peer_only_when_requested() {
        let mut rx = Receiver::new(&stream_config(Encoding::Binary), true);
        let src = Script::new(vec![Ok(vec![7, 8])]);
        match rx.read(&src) {
            ReadResult::Batch(b) => {
                assert_eq!(b.from, Some("10.0.0.1:9".parse().expect("addr")));
                assert_eq!(b.items.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_datagram_empty_packet_is_not_closed() {
        let config = EndpointConfig {
            protocol: Protocol::Datagram,
            ..Default::default()
        };
        let mut rx = Receiver::new(&config, false);
        let mut src = Script::new(vec![Ok(Vec::new())]);
        src.from = Some("127.0.0.1:5".parse().expect("addr"));
        match rx.read(&src) {
            ReadResult::Batch(b) => {
                assert_eq!(b.from, src.from);
                assert!(b.items.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_read_error() {
        let mut rx = Receiver::new(&stream_config(Encoding::Textual), false);
        let src = Script::new(vec![Err(io::ErrorKind::ConnectionReset.into())]);
        assert!(matches!(rx.read(&src), ReadResult::Error(_)));
    }
}
