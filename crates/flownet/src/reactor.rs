// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reactor glue.
//!
//! Endpoints never own the event loop. They register one read handler per
//! descriptor with a [`Reactor`] and remove it again on close. The host
//! drives the loop; [`PollReactor`] is a single-threaded implementation over
//! `mio` for hosts (and tests) without a loop of their own.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------+
//! |                     PollReactor                       |
//! |  mio::Poll --> ready fds --> ReadHandler::on_readable |
//! |                  ^                    |               |
//! |                  +---- Data (again) --+               |
//! |                       Closed --> drop handler         |
//! +-------------------------------------------------------+
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

/// Maximum events fetched per poll.
const MAX_EVENTS: usize = 128;

/// Default number of handler invocations per descriptor per turn.
pub const DEFAULT_READ_BUDGET: usize = 16;

/// Result of one read attempt by a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A read returned data (more may be pending)
    Data,
    /// Nothing to read right now
    WouldBlock,
    /// Descriptor is gone; drop the registration
    Closed,
}

/// Callback invoked when a registered descriptor is readable.
///
/// Implementations perform at most one bounded read per call.
pub trait ReadHandler {
    fn on_readable(&self, fd: RawFd) -> ReadOutcome;
}

/// Descriptor readiness service.
pub trait Reactor {
    /// Watch `fd` for readability, replacing any previous handler.
    fn register(&self, fd: RawFd, handler: Rc<dyn ReadHandler>) -> io::Result<()>;

    /// Stop watching `fd`. Unknown descriptors are ignored.
    fn unregister(&self, fd: RawFd);
}

/// Single-threaded `mio` reactor.
///
/// `mio` reports readiness edge-triggered, so a handler is invoked again while
/// it keeps returning [`ReadOutcome::Data`], up to the read budget. Leftover
/// work is carried into the next [`PollReactor::poll_once`] call, which then
/// does not wait.
pub struct PollReactor {
    poll: RefCell<Poll>,
    events: RefCell<Events>,
    handlers: RefCell<HashMap<RawFd, Rc<dyn ReadHandler>>>,
    /// Descriptors with unread data from a previous turn
    ready: RefCell<VecDeque<RawFd>>,
    budget: usize,
}

impl PollReactor {
    pub fn new() -> io::Result<Self> {
        Self::with_budget(DEFAULT_READ_BUDGET)
    }

    /// Create a reactor with a custom per-turn read budget.
    pub fn with_budget(budget: usize) -> io::Result<Self> {
        Ok(Self {
            poll: RefCell::new(Poll::new()?),
            events: RefCell::new(Events::with_capacity(MAX_EVENTS)),
            handlers: RefCell::new(HashMap::new()),
            ready: RefCell::new(VecDeque::new()),
            budget: budget.max(1),
        })
    }

    /// Wait up to `timeout` for readiness and dispatch handlers.
    ///
    /// Returns the number of handler invocations.
    pub fn poll_once(&self, timeout: Option<Duration>) -> io::Result<usize> {
        let timeout = if self.ready.borrow().is_empty() {
            timeout
        } else {
            Some(Duration::ZERO)
        };

        let mut batch: Vec<RawFd> = self.ready.borrow_mut().drain(..).collect();
        {
            let mut events = self.events.borrow_mut();
            match self.poll.borrow_mut().poll(&mut events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
            for event in events.iter() {
                let fd = event.token().0 as RawFd;
                if !batch.contains(&fd) {
                    batch.push(fd);
                }
            }
        }

        let mut calls = 0;
        for fd in batch {
            calls += self.dispatch(fd);
        }
        Ok(calls)
    }

    fn dispatch(&self, fd: RawFd) -> usize {
        let mut calls = 0;
        while calls < self.budget {
            // handler may unregister itself or others while running
            let Some(handler) = self.handlers.borrow().get(&fd).cloned() else {
                return calls;
            };
            calls += 1;
            match handler.on_readable(fd) {
                ReadOutcome::Data => {}
                ReadOutcome::WouldBlock => return calls,
                ReadOutcome::Closed => {
                    let same = self
                        .handlers
                        .borrow()
                        .get(&fd)
                        .is_some_and(|h| Rc::ptr_eq(h, &handler));
                    if same {
                        self.unregister(fd);
                    }
                    return calls;
                }
            }
        }
        log::debug!("[reactor] fd {} exhausted read budget, deferring", fd);
        self.ready.borrow_mut().push_back(fd);
        calls
    }

    /// Check if `fd` has a handler.
    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.handlers.borrow().contains_key(&fd)
    }

    /// Number of watched descriptors.
    pub fn registered(&self) -> usize {
        self.handlers.borrow().len()
    }
}

impl Reactor for PollReactor {
    fn register(&self, fd: RawFd, handler: Rc<dyn ReadHandler>) -> io::Result<()> {
        let token = Token(fd as usize);
        let previous = self.handlers.borrow_mut().insert(fd, handler);
        let registry_result = {
            let poll = self.poll.borrow();
            if previous.is_some() {
                poll.registry()
                    .reregister(&mut SourceFd(&fd), token, Interest::READABLE)
            } else {
                poll.registry()
                    .register(&mut SourceFd(&fd), token, Interest::READABLE)
            }
        };
        if let Err(e) = registry_result {
            self.handlers.borrow_mut().remove(&fd);
            log::error!("[reactor] register fd {} failed: {}", fd, e);
            return Err(e);
        }
        // data may already be queued (edge-triggered registration)
        self.ready.borrow_mut().push_back(fd);
        log::debug!("[reactor] fd {} registered", fd);
        Ok(())
    }

    fn unregister(&self, fd: RawFd) {
        if self.handlers.borrow_mut().remove(&fd).is_none() {
            return;
        }
        self.ready.borrow_mut().retain(|&r| r != fd);
        if let Err(e) = self.poll.borrow().registry().deregister(&mut SourceFd(&fd)) {
            log::debug!("[reactor] deregister fd {} failed: {}", fd, e);
        }
        log::debug!("[reactor] fd {} unregistered", fd);
    }
}

impl std::fmt::Debug for PollReactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollReactor")
            .field("registered", &self.registered())
            .field("budget", &self.budget)
            .finish()
    }
}
