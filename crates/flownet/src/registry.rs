// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ordered registry of accepted connections.
//!
//! Entries keep acceptance order. Appending is O(1); removal shifts the tail
//! down (O(n)), which is fine for the handful of peers a listener serves.

use std::os::unix::io::RawFd;

/// Connections keyed by descriptor, in acceptance order.
#[derive(Debug)]
pub struct ConnectionRegistry<C> {
    entries: Vec<(RawFd, C)>,
}

impl<C> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<C> ConnectionRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connection; returns the new count.
    pub fn push(&mut self, fd: RawFd, conn: C) -> usize {
        self.entries.push((fd, conn));
        self.entries.len()
    }

    /// Remove the entry for `fd`, keeping the others in order.
    pub fn remove(&mut self, fd: RawFd) -> Option<C> {
        let index = self.entries.iter().position(|(f, _)| *f == fd)?;
        Some(self.entries.remove(index).1)
    }

    pub fn get_mut(&mut self, fd: RawFd) -> Option<&mut C> {
        self.entries
            .iter_mut()
            .find(|(f, _)| *f == fd)
            .map(|(_, c)| c)
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.entries.iter().any(|(f, _)| *f == fd)
    }

    /// Iterate in acceptance order.
    pub fn iter(&self) -> impl Iterator<Item = (RawFd, &C)> {
        self.entries.iter().map(|(f, c)| (*f, c))
    }

    /// Descriptors in acceptance order.
    pub fn fds(&self) -> Vec<RawFd> {
        self.entries.iter().map(|(f, _)| *f).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every entry, leaving the registry empty.
    pub fn drain(&mut self) -> Vec<(RawFd, C)> {
        std::mem::take(&mut self.entries)
    }
}
