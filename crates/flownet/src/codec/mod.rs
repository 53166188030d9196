// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message codec.
//!
//! # Modules
//!
//! - `text` - token stream terminated by `;` (default)
//! - `binary` - raw bytes, one number per byte

/// Raw byte encoding.
pub mod binary;
/// Textual token encoding.
pub mod text;

pub use text::TextDecoder;

use crate::config::{Encoding, Protocol};
use crate::error::CodecError;
use crate::message::{Atom, Message};

/// Serialize atoms for the wire.
pub fn encode(encoding: Encoding, atoms: &[Atom]) -> Result<Vec<u8>, CodecError> {
    match encoding {
        Encoding::Textual => text::encode(atoms),
        Encoding::Binary => binary::encode(atoms),
    }
}

/// Per-socket inbound decoder.
#[derive(Debug)]
pub enum Decoder {
    Binary,
    Text(TextDecoder),
}

impl Decoder {
    /// Create the decoder matching a socket's encoding and protocol.
    pub fn new(encoding: Encoding, protocol: Protocol, max_pending: usize) -> Self {
        match (encoding, protocol) {
            (Encoding::Binary, _) => Decoder::Binary,
            (Encoding::Textual, Protocol::Stream) => {
                Decoder::Text(TextDecoder::stream(max_pending))
            }
            (Encoding::Textual, Protocol::Datagram) => Decoder::Text(TextDecoder::datagram()),
        }
    }

    /// Decode one read's worth of bytes.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<Result<Message, CodecError>> {
        match self {
            Decoder::Binary => binary::decode(bytes).into_iter().map(Ok).collect(),
            Decoder::Text(text) => text.feed(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_dispatch() {
        let atoms = [Atom::Float(1.0), Atom::Float(2.0)];
        assert_eq!(encode(Encoding::Binary, &atoms).expect("binary"), vec![1, 2]);
        assert_eq!(encode(Encoding::Textual, &atoms).expect("text"), b"1 2;\n");
    }

    #[test]
    fn test_decoder_selection() {
        let mut dec = Decoder::new(Encoding::Textual, Protocol::Stream, 1024);
        assert!(dec.decode(b"1 2").is_empty());
        assert_eq!(dec.decode(b";").len(), 1);

        let mut dec = Decoder::new(Encoding::Binary, Protocol::Datagram, 1024);
        assert_eq!(dec.decode(&[9, 8]).len(), 2);
    }
}
