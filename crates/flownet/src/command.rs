// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint commands.
//!
//! | Message                        | Command                         |
//! |--------------------------------|---------------------------------|
//! | `connect HOST PORT [SRCPORT]`  | [`Command::Connect`] (sender)   |
//! | `disconnect`                   | [`Command::Disconnect`] (sender)|
//! | `send ...`                     | [`Command::Send`]               |
//! | `timeout SECONDS`              | [`Command::Timeout`] (sender)   |
//! | `listen PORT`                  | [`Command::Listen`] (receiver)  |

use crate::error::NetError;
use crate::message::{Atom, Message};

/// A parsed endpoint command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Connect {
        host: String,
        port: f64,
        /// 0 = any source port
        src_port: f64,
    },
    Disconnect,
    Send(Vec<Atom>),
    Timeout(f64),
    Listen(i64),
}

impl Command {
    /// Parse a command message.
    pub fn parse(msg: &Message) -> Result<Self, NetError> {
        let Some((selector, args)) = msg.selector() else {
            return Err(NetError::UnknownCommand(msg.to_string()));
        };
        match selector {
            "connect" => parse_connect(args),
            "disconnect" => Ok(Command::Disconnect),
            "send" => Ok(Command::Send(args.to_vec())),
            "timeout" => Ok(Command::Timeout(float_arg(args, 0, "timeout")?)),
            "listen" => Ok(Command::Listen(float_arg(args, 0, "listen")? as i64)),
            other => Err(NetError::UnknownCommand(other.to_string())),
        }
    }
}

fn parse_connect(args: &[Atom]) -> Result<Command, NetError> {
    match args {
        [Atom::Symbol(host), Atom::Float(port)] => Ok(Command::Connect {
            host: host.clone(),
            port: *port,
            src_port: 0.0,
        }),
        [Atom::Symbol(host), Atom::Float(port), Atom::Float(src), ..] => Ok(Command::Connect {
            host: host.clone(),
            port: *port,
            src_port: *src,
        }),
        _ => Err(NetError::BadArguments("connect HOST PORT [SRCPORT]".into())),
    }
}

/// Numeric argument `index`, defaulting to 0 when absent.
fn float_arg(args: &[Atom], index: usize, cmd: &str) -> Result<f64, NetError> {
    match args.get(index) {
        None => Ok(0.0),
        Some(Atom::Float(f)) => Ok(*f),
        Some(Atom::Symbol(s)) => Err(NetError::BadArguments(format!(
            "{}: expected a number, got '{}'",
            cmd, s
        ))),
    }
}
