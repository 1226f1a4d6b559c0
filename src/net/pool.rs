// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Fixed-count pre-allocated request buffers.
//!
//! Every HTTP connection leases exactly one buffer for the lifetime of a
//! request/response cycle. Exhaustion is the load-shedding signal: the
//! reactor accepts and immediately closes when no buffer is available.
//!
//! Invariant: `in_use + available == pool size`, always.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Number of request buffers.
pub const POOL_BUFFERS: usize = 8;
/// Size of each request buffer; also the hard cap on a request head+body.
pub const BUFFER_SIZE: usize = 32 * 1024;

/// A leased buffer. Must go back to the pool that issued it via
/// [`BufferPool::release`]; dropping one instead is a leak the pool's
/// invariant check will catch in tests.
pub struct Lease {
    slot: usize,
    buf: Box<[u8]>,
}

impl Lease {
    pub fn buf(&self) -> &[u8] {
        &self.buf
    }

    pub fn buf_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PoolError {
    /// The buffer does not belong to this pool.
    Foreign,
    /// The slot already holds its buffer (double release).
    DoubleRelease,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub in_use: usize,
    pub utilization_pct: u32,
}

pub struct BufferPool {
    /// `Some` = available, `None` = leased out.
    slots: Mutex<Vec<Option<Box<[u8]>>>>,
    /// Base address of each slot's allocation, for identity checks on release.
    addrs: Vec<usize>,
    size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_config(POOL_BUFFERS, BUFFER_SIZE)
    }

    /// Non-default geometry for tests.
    pub fn with_config(count: usize, size: usize) -> Self {
        let mut slots = Vec::with_capacity(count);
        let mut addrs = Vec::with_capacity(count);
        for _ in 0..count {
            let buf = vec![0u8; size].into_boxed_slice();
            addrs.push(buf.as_ptr() as usize);
            slots.push(Some(buf));
        }
        BufferPool {
            slots: Mutex::new(slots),
            addrs,
            size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.size
    }

    pub fn acquire(&self) -> Option<Lease> {
        let mut slots = self.slots.lock();
        for (slot, entry) in slots.iter_mut().enumerate() {
            if let Some(buf) = entry.take() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(Lease { slot, buf });
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn release(&self, lease: Lease) -> Result<(), PoolError> {
        if lease.slot >= self.addrs.len() || self.addrs[lease.slot] != lease.buf.as_ptr() as usize
        {
            return Err(PoolError::Foreign);
        }
        let mut slots = self.slots.lock();
        if slots[lease.slot].is_some() {
            return Err(PoolError::DoubleRelease);
        }
        slots[lease.slot] = Some(lease.buf);
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        let slots = self.slots.lock();
        let available = slots.iter().filter(|s| s.is_some()).count();
        let in_use = slots.len() - available;
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            in_use,
            utilization_pct: (in_use * 100 / slots.len().max(1)) as u32,
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
