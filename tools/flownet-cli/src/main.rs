// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! flownet - send and receive flownet messages from a terminal
//!
//! `flownet send` reads messages from stdin (one or more `;`-separated
//! messages per line) and sends them; `flownet receive` prints everything a
//! receiver emits until Ctrl+C.

use clap::{Parser, Subcommand};
use flownet::{
    EndpointConfig, Encoding, Framing, NetNode, Output, PollReactor, Protocol, ReceiverEndpoint,
    SenderEndpoint, TextDecoder,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

/// Reactor wait per loop turn
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Message-oriented TCP/UDP endpoints
#[derive(Parser, Debug)]
#[command(name = "flownet")]
#[command(version)]
#[command(about = "Send and receive flownet messages")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Endpoint configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Connect to a receiver and send messages read from stdin
    Send {
        /// Use UDP instead of TCP
        #[arg(short = 'u')]
        udp: bool,

        /// Binary mode (whitespace separated byte values)
        #[arg(short = 'b')]
        binary: bool,

        /// Connect timeout in seconds (0 = no timeout)
        #[arg(long)]
        timeout: Option<f64>,

        /// Fixed local source port
        #[arg(long, default_value = "0")]
        src_port: u16,

        /// Remote host
        host: String,

        /// Remote port
        port: u16,
    },
    /// Listen on a port and print what arrives
    Receive {
        /// Use UDP instead of TCP
        #[arg(short = 'u')]
        udp: bool,

        /// Binary mode
        #[arg(short = 'b')]
        binary: bool,

        /// Print the sender address before each message
        #[arg(short = 'f')]
        from: bool,

        /// Legacy framing (no data output)
        #[arg(long)]
        old: bool,

        /// Port to listen on
        port: u16,

        /// Bind address or multicast group (UDP)
        group: Option<String>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut config = match &args.config {
        Some(path) => EndpointConfig::from_file(path)?,
        None => EndpointConfig::default(),
    };

    match &args.mode {
        Mode::Send {
            udp,
            binary,
            timeout,
            src_port,
            host,
            port,
        } => {
            apply_flags(&mut config, *udp, *binary);
            if let Some(t) = timeout {
                config.connect_timeout_secs = *t;
            }
            config.validate()?;
            run_send(config, host, *port, *src_port, &running)
        }
        Mode::Receive {
            udp,
            binary,
            from,
            old,
            port,
            group,
        } => {
            apply_flags(&mut config, *udp, *binary);
            config.peer_address_output |= *from;
            if *old {
                config.framing = Framing::Legacy;
            }
            if group.is_some() {
                config.hostname = group.clone();
            }
            config.port = 0;
            config.validate()?;
            run_receive(config, *port, &running)
        }
    }
}

fn apply_flags(config: &mut EndpointConfig, udp: bool, binary: bool) {
    if udp {
        config.protocol = Protocol::Datagram;
    }
    if binary {
        config.encoding = Encoding::Binary;
    }
}

fn print_output(output: Output) {
    match output {
        Output::Data(msg) => println!("{};", msg),
        Output::Status(v) => println!("# status {}", v),
        Output::Peer { host, port } => println!("# from {} {}", host, port),
    }
}

fn run_send(
    config: EndpointConfig,
    host: &str,
    port: u16,
    src_port: u16,
    running: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let reactor = Rc::new(PollReactor::new()?);
    let sender = SenderEndpoint::new(config, reactor.clone(), Rc::new(print_output));
    sender.connect(host, f64::from(port), f64::from(src_port))?;

    // stdin blocks, so lines come in from a reader thread
    let (tx, rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::error!("[flownet] stdin: {}", e);
                    break;
                }
            }
        }
    });

    let mut decoder = TextDecoder::datagram();
    while running.load(Ordering::SeqCst) && sender.is_connected() {
        reactor.poll_once(Some(POLL_INTERVAL))?;
        loop {
            match rx.try_recv() {
                Ok(line) => {
                    for item in decoder.feed(line.as_bytes()) {
                        match item {
                            Ok(msg) => {
                                // reported through the log
                                let _ = sender.send(&msg.into_atoms());
                            }
                            Err(e) => log::error!("[flownet] {}", e),
                        }
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // stdin closed: deliver pending replies, then stop
                    reactor.poll_once(Some(POLL_INTERVAL))?;
                    sender.disconnect();
                    return Ok(());
                }
            }
        }
    }
    sender.disconnect();
    Ok(())
}

fn run_receive(
    config: EndpointConfig,
    port: u16,
    running: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let reactor = Rc::new(PollReactor::new()?);
    let receiver = ReceiverEndpoint::new(config, reactor.clone(), Rc::new(print_output));
    receiver.listen(i64::from(port))?;
    log::info!(
        "[flownet] {:?} receiver ready (Ctrl+C to stop)",
        receiver.config().protocol
    );

    while running.load(Ordering::SeqCst) {
        reactor.poll_once(Some(POLL_INTERVAL))?;
    }
    receiver.close_all();
    Ok(())
}
