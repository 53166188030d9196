// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Structured messages exchanged between endpoints and the dataflow graph.
//!
//! A [`Message`] is what flows along graph connections: a bare number, a bare
//! symbol, or a list of [`Atom`]s. A list whose first element is a symbol is
//! read as "selector + arguments", which is how endpoint commands such as
//! `connect localhost 3000` are expressed.

use std::fmt;

use crate::codec::text;

// ============================================================================
// Atom
// ============================================================================

/// A single message element.
#[derive(Clone, Debug, PartialEq)]
pub enum Atom {
    /// Numeric element
    Float(f64),
    /// Symbolic element
    Symbol(String),
}

impl Atom {
    /// Create a symbol atom.
    pub fn symbol(s: impl Into<String>) -> Self {
        Atom::Symbol(s.into())
    }

    /// Numeric value, if this is a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Atom::Float(f) => Some(*f),
            Atom::Symbol(_) => None,
        }
    }

    /// Symbol text, if this is a symbol.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Atom::Float(_) => None,
            Atom::Symbol(s) => Some(s),
        }
    }
}

impl From<f64> for Atom {
    fn from(value: f64) -> Self {
        Atom::Float(value)
    }
}

impl From<i32> for Atom {
    fn from(value: i32) -> Self {
        Atom::Float(f64::from(value))
    }
}

impl From<&str> for Atom {
    fn from(value: &str) -> Self {
        Atom::Symbol(value.to_string())
    }
}

impl From<String> for Atom {
    fn from(value: String) -> Self {
        Atom::Symbol(value)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        text::write_atom(&mut out, self);
        f.write_str(&out)
    }
}

// ============================================================================
// Message
// ============================================================================

/// A structured message.
///
/// Construct lists through [`Message::from_atoms`] to get the canonical
/// shape: a one-element numeric list collapses to [`Message::Float`] and a
/// lone symbol to [`Message::Symbol`].
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Bare number
    Float(f64),
    /// Bare symbol (a selector without arguments)
    Symbol(String),
    /// Ordered sequence of atoms
    List(Vec<Atom>),
}

impl Message {
    /// Build the canonical message for a sequence of atoms.
    ///
    /// Returns `None` for an empty sequence.
    pub fn from_atoms(mut atoms: Vec<Atom>) -> Option<Self> {
        match atoms.len() {
            0 => None,
            1 => match atoms.pop() {
                Some(Atom::Float(f)) => Some(Message::Float(f)),
                Some(Atom::Symbol(s)) => Some(Message::Symbol(s)),
                None => None,
            },
            _ => Some(Message::List(atoms)),
        }
    }

    /// Build a "selector + arguments" message.
    pub fn selector_with(selector: impl Into<String>, args: Vec<Atom>) -> Self {
        let mut atoms = Vec::with_capacity(args.len() + 1);
        atoms.push(Atom::Symbol(selector.into()));
        atoms.extend(args);
        // non-empty by construction
        Message::from_atoms(atoms).unwrap_or(Message::List(Vec::new()))
    }

    /// Convert into the flat atom sequence.
    pub fn into_atoms(self) -> Vec<Atom> {
        match self {
            Message::Float(f) => vec![Atom::Float(f)],
            Message::Symbol(s) => vec![Atom::Symbol(s)],
            Message::List(atoms) => atoms,
        }
    }

    /// Number of atoms in the message.
    pub fn len(&self) -> usize {
        match self {
            Message::Float(_) | Message::Symbol(_) => 1,
            Message::List(atoms) => atoms.len(),
        }
    }

    /// Check if the message carries no atoms.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split a symbol-led message into selector and arguments.
    pub fn selector(&self) -> Option<(&str, &[Atom])> {
        match self {
            Message::Float(_) => None,
            Message::Symbol(s) => Some((s.as_str(), &[])),
            Message::List(atoms) => match atoms.split_first() {
                Some((Atom::Symbol(s), rest)) => Some((s.as_str(), rest)),
                _ => None,
            },
        }
    }
}

impl From<f64> for Message {
    fn from(value: f64) -> Self {
        Message::Float(value)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        match self {
            Message::Float(v) => text::write_atom(&mut out, &Atom::Float(*v)),
            Message::Symbol(s) => text::write_atom(&mut out, &Atom::Symbol(s.clone())),
            Message::List(atoms) => {
                for (i, atom) in atoms.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    text::write_atom(&mut out, atom);
                }
            }
        }
        f.write_str(&out)
    }
}

// ============================================================================
// Tests
// ============================================================================
