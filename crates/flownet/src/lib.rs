// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # flownet
//!
//! Message-oriented network endpoints for dataflow graphs.
//!
//! A graph talks to the network through two node kinds:
//!
//! - [`SenderEndpoint`] owns one outbound connection (`connect`, `send`,
//!   `disconnect`, `timeout`) and decodes replies.
//! - [`ReceiverEndpoint`] listens on a port (`listen`), accepts any number
//!   of stream peers or receives datagrams (unicast, broadcast, multicast),
//!   and can `send` back to every peer.
//!
//! Both speak one of two wire encodings: textual (`;`-terminated token
//! streams) or binary (one number per byte), over TCP or UDP.
//!
//! # Architecture
//!
//! ```text
//!   graph --Message--> NetNode::dispatch --> Sender/ReceiverEndpoint
//!                                               |        ^
//!                                         register   on_readable
//!                                               v        |
//!                                            Reactor (host loop or PollReactor)
//!                                                        |
//!   graph <--Output-- Outlet <-- codec::Decoder <-- Receiver::read
//! ```
//!
//! Everything runs on one thread. Endpoints never own the event loop; they
//! register read handlers with a [`Reactor`] and emit [`Output`]s through an
//! [`Outlet`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::rc::Rc;
//! use std::time::Duration;
//! use flownet::{Atom, EndpointConfig, NetNode, Output, PollReactor, ReceiverEndpoint, SenderEndpoint};
//!
//! let reactor = Rc::new(PollReactor::new()?);
//! let rx = ReceiverEndpoint::new(
//!     EndpointConfig::default(),
//!     reactor.clone(),
//!     Rc::new(|out: Output| println!("received {:?}", out)),
//! );
//! rx.listen(3000)?;
//!
//! let tx = SenderEndpoint::new(
//!     EndpointConfig::default(),
//!     reactor.clone(),
//!     Rc::new(|out: Output| println!("sender {:?}", out)),
//! );
//! tx.connect("localhost", 3000.0, 0.0)?;
//! tx.send(&[Atom::symbol("hello"), Atom::Float(42.0)])?;
//! reactor.poll_once(Some(Duration::from_millis(100)))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backpressure;
pub mod codec;
pub mod command;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod listener;
pub mod message;
pub mod reactor;
pub mod receiver;
pub mod registry;
pub mod resolve;
pub mod sender;
pub mod socket;

pub use backpressure::BackpressureTracker;
pub use codec::{Decoder, TextDecoder};
pub use command::Command;
pub use config::{ConfigError, Encoding, EndpointConfig, EndpointKind, Framing, Protocol};
pub use endpoint::{NetNode, Outlet, Output, Ports};
pub use error::{CodecError, NetError};
pub use listener::ReceiverEndpoint;
pub use message::{Atom, Message};
pub use reactor::{PollReactor, ReadHandler, ReadOutcome, Reactor};
pub use registry::ConnectionRegistry;
pub use sender::SenderEndpoint;
