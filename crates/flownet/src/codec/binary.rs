// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary wire encoding: one byte per numeric element, no framing.

use crate::error::CodecError;
use crate::message::{Atom, Message};

/// Encode numeric atoms, one byte each.
///
/// Values are truncated toward zero and wrapped into `0..=255`, so `256`
/// goes out as `0` and `-1` as `255`.
pub fn encode(atoms: &[Atom]) -> Result<Vec<u8>, CodecError> {
    atoms
        .iter()
        .enumerate()
        .map(|(index, atom)| match atom {
            Atom::Float(f) => Ok(*f as i64 as u8),
            Atom::Symbol(s) => Err(CodecError::NonNumeric {
                index,
                symbol: s.clone(),
            }),
        })
        .collect()
}

/// Decode bytes into one scalar message per byte, in arrival order.
pub fn decode(bytes: &[u8]) -> Vec<Message> {
    bytes.iter().map(|b| Message::Float(f64::from(*b))).collect()
}
