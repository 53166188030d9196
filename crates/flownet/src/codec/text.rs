// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Textual wire encoding.
//!
//! Messages travel as whitespace-separated tokens. `;` ends a message and `,`
//! ends a sub-message; both are tokens of their own even when glued to text.
//! A backslash escapes the next character so it is taken literally (never a
//! separator, never part of a number, never a placeholder).
//!
//! ```text
//! set 0.5 12;\n
//! 1 2 3, bang;\n
//! hello\ world \12;\n      -> symbol "hello world", symbol "12"
//! ```

use crate::error::CodecError;
use crate::message::{Atom, Message};

/// Message terminator written after every outbound message.
pub const TERMINATOR: &str = ";\n";

/// A lexical token.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Atom(Atom),
    /// Unresolved substitution marker such as `$1` or `foo$2`
    Placeholder(String),
    /// `,`
    Comma,
    /// `;`
    Semi,
}

// ============================================================================
// Encoding
// ============================================================================

/// Append the textual form of one atom.
///
/// Empty symbols produce no output and non-finite floats print as `NaN` or
/// `inf`, which read back as symbols; [`encode`] rejects both.
pub fn write_atom(out: &mut String, atom: &Atom) {
    match atom {
        Atom::Float(f) => out.push_str(&f.to_string()),
        Atom::Symbol(s) => {
            if is_numeric(s) {
                out.push('\\');
            }
            for c in s.chars() {
                if needs_escape(c) {
                    out.push('\\');
                }
                out.push(c);
            }
        }
    }
}

/// Encode atoms as one terminated textual message.
pub fn encode(atoms: &[Atom]) -> Result<Vec<u8>, CodecError> {
    let mut out = String::new();
    for (i, atom) in atoms.iter().enumerate() {
        match atom {
            Atom::Symbol(s) if s.is_empty() => return Err(CodecError::EmptySymbol),
            Atom::Float(value) if !value.is_finite() => {
                return Err(CodecError::NonFinite {
                    index: i,
                    value: *value,
                })
            }
            _ => {}
        }
        if i > 0 {
            out.push(' ');
        }
        write_atom(&mut out, atom);
    }
    out.push_str(TERMINATOR);
    Ok(out.into_bytes())
}

fn needs_escape(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | ';' | ',' | '\\')
}

// ============================================================================
// Decoding
// ============================================================================

/// Check numeric token syntax: `[+-]digits[.digits][(e|E)[+-]digits]`.
///
/// At least one mantissa digit is required; `1.` and `.5` are accepted.
fn is_numeric(s: &str) -> bool {
    let b = s.as_bytes();
    let mut i = 0;
    if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
        i += 1;
    }
    let mut digits = 0;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
        digits += 1;
    }
    if i < b.len() && b[i] == b'.' {
        i += 1;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return false;
    }
    if i < b.len() && (b[i] == b'e' || b[i] == b'E') {
        i += 1;
        if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
            i += 1;
        }
        let start = i;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return false;
        }
    }
    i == b.len()
}

/// Token under construction.
#[derive(Default)]
struct Pending {
    text: String,
    /// Any character was escaped (token can no longer be a number)
    escaped: bool,
    /// Unescaped `$` followed by a digit was seen
    placeholder: bool,
    /// Raw source text, kept for diagnostics
    raw: String,
}

impl Pending {
    fn flush(&mut self, tokens: &mut Vec<Token>) {
        if self.raw.is_empty() {
            return;
        }
        let pending = std::mem::take(self);
        let token = if pending.placeholder {
            Token::Placeholder(pending.raw)
        } else if !pending.escaped && is_numeric(&pending.text) {
            match pending.text.parse::<f64>() {
                Ok(f) => Token::Atom(Atom::Float(f)),
                Err(_) => Token::Atom(Atom::Symbol(pending.text)),
            }
        } else {
            Token::Atom(Atom::Symbol(pending.text))
        };
        tokens.push(token);
    }
}

/// Split text into tokens.
pub(crate) fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut cur = Pending::default();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' | '\r' | '\n' => cur.flush(&mut tokens),
            ';' | ',' => {
                cur.flush(&mut tokens);
                tokens.push(if c == ';' { Token::Semi } else { Token::Comma });
            }
            '\\' => {
                // trailing backslash is dropped
                if let Some(next) = chars.next() {
                    cur.text.push(next);
                    cur.raw.push('\\');
                    cur.raw.push(next);
                    cur.escaped = true;
                }
            }
            '$' => {
                if chars.peek().is_some_and(char::is_ascii_digit) {
                    cur.placeholder = true;
                }
                cur.text.push(c);
                cur.raw.push(c);
            }
            _ => {
                cur.text.push(c);
                cur.raw.push(c);
            }
        }
    }
    cur.flush(&mut tokens);
    tokens
}

/// Decode text into messages.
///
/// Every `;`/`,`-delimited segment becomes one message; a trailing segment
/// without terminator is decoded as well. A segment containing a placeholder
/// yields an error entry while the remaining segments are still decoded.
pub fn decode(input: &str) -> Vec<Result<Message, CodecError>> {
    let mut out = Vec::new();
    let mut segment: Vec<Token> = Vec::new();
    for token in tokenize(input) {
        match token {
            Token::Comma | Token::Semi => finish_segment(&mut segment, &mut out),
            other => segment.push(other),
        }
    }
    finish_segment(&mut segment, &mut out);
    out
}

fn finish_segment(segment: &mut Vec<Token>, out: &mut Vec<Result<Message, CodecError>>) {
    if segment.is_empty() {
        return;
    }
    let mut atoms = Vec::with_capacity(segment.len());
    let mut bad = None;
    for token in segment.drain(..) {
        match token {
            Token::Atom(atom) => atoms.push(atom),
            Token::Placeholder(raw) => {
                if bad.is_none() {
                    bad = Some(raw);
                }
            }
            Token::Comma | Token::Semi => {}
        }
    }
    if let Some(token) = bad {
        out.push(Err(CodecError::Placeholder { token }));
    } else if let Some(msg) = Message::from_atoms(atoms) {
        out.push(Ok(msg));
    }
}

/// Length of the prefix of `bytes` that ends with an unescaped `;`.
pub(crate) fn complete_prefix_len(bytes: &[u8]) -> usize {
    let mut end = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b';' => end = i + 1,
            _ => {}
        }
        i += 1;
    }
    end
}

/// Position just past the first unescaped `;`, if any.
fn first_terminator_end(bytes: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b';' => return Some(i + 1),
            _ => {}
        }
        i += 1;
    }
    None
}

// ============================================================================
// Incremental decoder
// ============================================================================

/// Textual decoder holding the per-socket state.
///
/// Stream sockets deliver arbitrary slices of the byte stream, so the text
/// after the last terminator is kept until the next read completes it.
/// Datagrams are self-contained and decoded whole.
///
/// Once a message outgrows the limit, the rest of it is skipped up to its
/// terminator; decoding resumes with the message after it.
#[derive(Debug)]
pub struct TextDecoder {
    pending: Vec<u8>,
    max_pending: usize,
    retain_tail: bool,
    /// Inside an over-long message
    discarding: bool,
}

impl TextDecoder {
    /// Decoder for a stream socket.
    pub fn stream(max_pending: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_pending,
            retain_tail: true,
            discarding: false,
        }
    }

    /// Decoder for a datagram socket.
    pub fn datagram() -> Self {
        Self {
            pending: Vec::new(),
            max_pending: 0,
            retain_tail: false,
            discarding: false,
        }
    }

    /// Decode one read's worth of bytes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<Message, CodecError>> {
        if !self.retain_tail {
            return decode(&String::from_utf8_lossy(bytes));
        }

        let bytes = if self.discarding {
            match first_terminator_end(bytes) {
                Some(end) => {
                    self.discarding = false;
                    &bytes[end..]
                }
                None => return Vec::new(),
            }
        } else {
            bytes
        };

        self.pending.extend_from_slice(bytes);
        let complete = complete_prefix_len(&self.pending);
        let mut out = if complete > 0 {
            let text = String::from_utf8_lossy(&self.pending[..complete]).into_owned();
            self.pending.drain(..complete);
            decode(&text)
        } else {
            Vec::new()
        };

        if self.pending.len() > self.max_pending {
            let len = self.pending.len();
            self.pending.clear();
            self.discarding = true;
            out.push(Err(CodecError::Overflow {
                len,
                max: self.max_pending,
            }));
        }
        out
    }

    /// Bytes waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(results: Vec<Result<Message, CodecError>>) -> Vec<Message> {
        results
            .into_iter()
            .map(|r| r.expect("message decodes"))
            .collect()
    }

    #[test]
    fn test_encode_basic() {
        let atoms = vec![Atom::symbol("set"), Atom::Float(0.5), Atom::Float(12.0)];
        assert_eq!(encode(&atoms).expect("encode"), b"set 0.5 12;\n");
    }

    #[test]
    fn test_encode_escapes() {
        let atoms = vec![Atom::symbol("a b;c"), Atom::symbol("12")];
        assert_eq!(encode(&atoms).expect("encode"), b"a\\ b\\;c \\12;\n");
    }

    #[test]
    fn test_encode_empty_symbol() {
        assert!(matches!(
            encode(&[Atom::symbol("")]),
            Err(CodecError::EmptySymbol)
        ));
    }

    #[test]
    fn test_numeric_syntax() {
        for s in ["1", "-2", "+3.5", "1.", ".5", "1e3", "2.5E-2"] {
            assert!(is_numeric(s), "{s} should be numeric");
        }
        for s in ["", "-", ".", "e3", "1e", "1.2.3", "inf", "nan", "0x10", "12a"] {
            assert!(!is_numeric(s), "{s} should not be numeric");
        }
    }

    #[test]
    fn test_decode_message_shapes() {
        let msgs = ok(decode("1 2 3; 7; foo 1 bar; bang;"));
        assert_eq!(
            msgs,
            vec![
                Message::List(vec![1.into(), 2.into(), 3.into()]),
                Message::Float(7.0),
                Message::List(vec!["foo".into(), 1.into(), "bar".into()]),
                Message::Symbol("bang".into()),
            ]
        );
    }

    #[test]
    fn test_decode_comma_splits() {
        let msgs = ok(decode("a 1, b 2;"));
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1], Message::List(vec!["b".into(), 2.into()]));
    }

    #[test]
    fn test_decode_glued_terminators() {
        let msgs = ok(decode("x;y,z"));
        assert_eq!(
            msgs,
            vec![
                Message::Symbol("x".into()),
                Message::Symbol("y".into()),
                Message::Symbol("z".into()),
            ]
        );
    }

    #[test]
    fn test_decode_placeholder_drops_only_its_message() {
        let results = decode("ok 1; bad $1; foo$2bar; next 2;");
        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(matches!(
            &results[1],
            Err(CodecError::Placeholder { token }) if token == "$1"
        ));
        assert!(results[2].is_err());
        assert_eq!(
            results[3].as_ref().expect("decodes"),
            &Message::List(vec!["next".into(), 2.into()])
        );
    }

    #[test]
    fn test_decode_escaped_dollar_is_literal() {
        let msgs = ok(decode("price \\$5;"));
        assert_eq!(msgs, vec![Message::List(vec!["price".into(), "$5".into()])]);
    }

    #[test]
    fn test_round_trip() {
        let atoms = vec![
            Atom::symbol("list"),
            Atom::Float(-1.25),
            Atom::symbol("with space"),
            Atom::symbol("3"),
            Atom::Float(1e-7),
            Atom::symbol("semi;colon"),
            Atom::symbol("back\\slash"),
        ];
        let bytes = encode(&atoms).expect("encode");
        let msgs = ok(decode(&String::from_utf8_lossy(&bytes)));
        assert_eq!(msgs, vec![Message::List(atoms)]);
    }

    #[test]
    fn test_round_trip_placeholder_is_dropped() {
        let bytes = encode(&[Atom::symbol("x"), Atom::symbol("$1")]).expect("encode");
        let results = decode(&String::from_utf8_lossy(&bytes));
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_complete_prefix_len() {
        assert_eq!(complete_prefix_len(b"a;b"), 2);
        assert_eq!(complete_prefix_len(b"a\\;b"), 0);
        assert_eq!(complete_prefix_len(b"a;b;\n"), 4);
        assert_eq!(complete_prefix_len(b""), 0);
    }

    #[test]
    fn test_stream_decoder_keeps_tail() {
        let mut dec = TextDecoder::stream(1024);
        assert!(dec.feed(b"hello wor").is_empty());
        assert_eq!(dec.pending_len(), 9);

        let msgs = ok(dec.feed(b"ld; 4"));
        assert_eq!(
            msgs,
            vec![Message::List(vec!["hello".into(), "world".into()])]
        );

        let msgs = ok(dec.feed(b"2;\n"));
        assert_eq!(msgs, vec![Message::Float(42.0)]);
        assert_eq!(dec.pending_len(), 1);
    }

    #[test]
    fn test_stream_decoder_overflow() {
        let mut dec = TextDecoder::stream(8);
        let results = dec.feed(b"0123456789");
        assert!(matches!(
            results.as_slice(),
            [Err(CodecError::Overflow { len: 10, max: 8 })]
        ));
        assert_eq!(dec.pending_len(), 0);
    }

    #[test]
    fn test_stream_decoder_skips_rest_of_overlong_message() {
        let mut dec = TextDecoder::stream(8);
        let results = dec.feed(b"hello 0123456789");
        assert!(matches!(
            results.as_slice(),
            [Err(CodecError::Overflow { len: 16, max: 8 })]
        ));
        let msgs = ok(dec.feed(b"abc; ok;"));
        assert_eq!(msgs, vec![Message::Symbol("ok".into())]);
        assert_eq!(dec.pending_len(), 0);
    }

    #[test]
    fn test_stream_decoder_skips_across_reads() {
        let mut dec = TextDecoder::stream(4);
        assert_eq!(dec.feed(b"toolong").len(), 1);
        assert!(dec.feed(b"still the same message").is_empty());
        assert!(dec.feed(b" escaped \\; too").is_empty());
        assert_eq!(dec.pending_len(), 0);
        let msgs = ok(dec.feed(b" end; next 1;"));
        assert_eq!(msgs, vec![Message::List(vec!["next".into(), 1.into()])]);
    }

    #[test]
    fn test_encode_rejects_non_finite() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                encode(&[Atom::symbol("v"), Atom::Float(value)]),
                Err(CodecError::NonFinite { index: 1, .. })
            ));
        }
    }

    #[test]
    fn test_datagram_decoder_delivers_unterminated() {
        let mut dec = TextDecoder::datagram();
        let msgs = ok(dec.feed(b"a 1; b 2"));
        assert_eq!(msgs.len(), 2);
        assert_eq!(dec.pending_len(), 0);
    }
}
