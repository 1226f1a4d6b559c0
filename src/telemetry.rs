// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Process-wide memory budget guard.
//!
//! The target hardware has ~24 MiB for everything; this guard accounts the
//! daemon's elastic allocations (connections, RTSP sessions, SOAP scratch)
//! against a fixed budget and turns breaches into load-shedding rather than
//! OOM kills. Static allocations (buffer pool, code) are outside the budget.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::warn;

/// Default elastic-allocation budget.
pub const DEFAULT_BUDGET: usize = 16 * 1024 * 1024;

/// Approximate cost of one HTTP connection (kernel buffers + state).
pub const CONN_COST: usize = 40 * 1024;
/// Approximate cost of one RTSP session (threads' stacks are separate).
pub const SESSION_COST: usize = 96 * 1024;

pub struct MemoryBudget {
    budget: usize,
    used: AtomicUsize,
    /// Latches once a reservation has been refused; `/healthz` reports
    /// degraded until restart.
    tripped: AtomicBool,
}

impl MemoryBudget {
    pub fn new(budget: usize) -> Self {
        MemoryBudget {
            budget,
            used: AtomicUsize::new(0),
            tripped: AtomicBool::new(false),
        }
    }

    /// Attempts to reserve `n` bytes; `false` means shed this work.
    pub fn try_reserve(&self, n: usize) -> bool {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let next = match current.checked_add(n) {
                Some(v) if v <= self.budget => v,
                _ => {
                    if !self.tripped.swap(true, Ordering::Relaxed) {
                        warn!("memory budget exhausted ({} in use)", current);
                    }
                    return false;
                }
            };
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn release(&self, n: usize) {
        self.used.fetch_sub(n, Ordering::Relaxed);
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    pub fn tripped(&self) -> bool {
        self.tripped.load(Ordering::Relaxed)
    }
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_release_and_trip() {
        let b = MemoryBudget::new(100);
        assert!(b.try_reserve(60));
        assert!(b.try_reserve(40));
        assert!(!b.tripped());
        assert!(!b.try_reserve(1));
        assert!(b.tripped());
        b.release(60);
        assert!(b.try_reserve(30));
        assert_eq!(b.used(), 70);
    }
}
