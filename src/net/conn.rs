// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-connection state and the connection table.
//!
//! The table is a guarded map keyed by the socket fd. Sweeps snapshot the
//! expired set under the lock and tear down outside it, so slow closes never
//! stall the reactor. A connection that is queued for (or held by) a worker
//! is never destroyed out from under it; the sweep skips it and catches it
//! on a later pass.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::pool::Lease;

/// Timeout for a connection mid-request.
pub const ACTIVE_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for an idle keep-alive connection.
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(5);
/// How often the reactor sweeps for expired connections.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Fsm {
    ReadingHeaders,
    ReadingBody,
    Processing,
    Writing,
    KeepAlive,
    Closing,
}

impl Fsm {
    pub fn timeout(self) -> Duration {
        match self {
            Fsm::KeepAlive => KEEPALIVE_TIMEOUT,
            _ => ACTIVE_TIMEOUT,
        }
    }
}

pub struct ConnState {
    pub fsm: Fsm,
    /// The leased request buffer; present from accept until teardown.
    pub lease: Option<Lease>,
    /// Bytes of the current request read into the lease so far.
    pub cursor: usize,
    /// Pending response bytes and how many have been written.
    pub write_buf: Vec<u8>,
    pub write_pos: usize,
    /// Close after the current response finishes.
    pub close_after_write: bool,
    /// Requests served on this connection so far.
    pub keepalive_count: i32,
}

pub struct Conn {
    pub fd: RawFd,
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub state: Mutex<ConnState>,
    /// Monotonic milliseconds of the last I/O progress.
    last_activity_ms: AtomicU64,
    /// True while enqueued for or held by a worker.
    pub queued: AtomicBool,
    /// Set by the reactor when readiness fired while a worker held the
    /// connection; the worker re-drives before letting go.
    pub rearm: AtomicBool,
}

impl Conn {
    pub fn new(stream: TcpStream, peer: SocketAddr, lease: Lease, now: Duration) -> Arc<Self> {
        use std::os::fd::AsRawFd;
        let fd = stream.as_raw_fd();
        Arc::new(Conn {
            fd,
            stream,
            peer,
            state: Mutex::new(ConnState {
                fsm: Fsm::ReadingHeaders,
                lease: Some(lease),
                cursor: 0,
                write_buf: Vec::new(),
                write_pos: 0,
                close_after_write: false,
                keepalive_count: 0,
            }),
            last_activity_ms: AtomicU64::new(now.as_millis() as u64),
            queued: AtomicBool::new(false),
            rearm: AtomicBool::new(false),
        })
    }

    pub fn touch(&self, now: Duration) {
        self.last_activity_ms
            .store(now.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    /// Whether this connection has outlived the timeout for its state.
    pub fn expired(&self, now: Duration) -> bool {
        let timeout = self.state.lock().fsm.timeout();
        let idle_ms = (now.as_millis() as u64).saturating_sub(self.last_activity_ms());
        idle_ms > timeout.as_millis() as u64
    }

    /// Removes the lease for return to the pool. Idempotent: the second
    /// caller gets `None`, which is what makes double-release impossible.
    pub fn take_lease(&self) -> Option<Lease> {
        let mut state = self.state.lock();
        state.fsm = Fsm::Closing;
        state.lease.take()
    }
}

#[derive(Default)]
pub struct ConnTable {
    map: Mutex<HashMap<RawFd, Arc<Conn>>>,
}

impl ConnTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conn: Arc<Conn>) {
        self.map.lock().insert(conn.fd, conn);
    }

    pub fn remove(&self, fd: RawFd) -> Option<Arc<Conn>> {
        self.map.lock().remove(&fd)
    }

    pub fn get(&self, fd: RawFd) -> Option<Arc<Conn>> {
        self.map.lock().get(&fd).cloned()
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    /// Returns the expired connections. Snapshot under the lock; the caller
    /// closes them outside it. Connections currently held by a worker are
    /// skipped.
    pub fn sweep(&self, now: Duration) -> Vec<Arc<Conn>> {
        let map = self.map.lock();
        map.values()
            .filter(|c| !c.queued.load(Ordering::Acquire) && c.expired(now))
            .cloned()
            .collect()
    }

    /// All connections, for shutdown teardown.
    pub fn drain_all(&self) -> Vec<Arc<Conn>> {
        self.map.lock().drain().map(|(_, c)| c).collect()
    }
}
