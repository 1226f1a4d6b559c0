// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! The HTTP connection engine: buffer pool, connection table, epoll
//! reactor, worker pool, and the per-connection FSM driver that workers run.
//!
//! Ordering contract: the reactor enqueues a connection only when it is not
//! already held by a worker (`queued` flag); readiness observed meanwhile is
//! latched in `rearm` and re-driven by the same worker before it lets go.
//! Together with workers consuming all readable bytes before returning, this
//! serialises requests per connection while distinct connections run in
//! parallel.

pub mod conn;
pub mod pool;
pub mod reactor;
pub mod workers;

use std::io::{Read as _, Write as _};
use std::net::Shutdown;
use std::os::fd::BorrowedFd;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use base::clock::Clocks;
use nix::sys::epoll::{Epoll, EpollEvent, EpollFlags};
use tracing::{debug, warn};

use crate::httpx::metrics::HttpMetrics;
use crate::httpx::request::{self, Outcome};
use crate::httpx::response::{http_date, Response};
use crate::httpx::Service;
use crate::telemetry::{MemoryBudget, CONN_COST};
use self::conn::{Conn, ConnTable, Fsm};
use self::pool::BufferPool;

/// Everything a worker needs to drive one connection.
#[derive(Clone)]
pub struct NetEnv {
    pub pool: Arc<BufferPool>,
    pub table: Arc<ConnTable>,
    pub epoll: Arc<Epoll>,
    pub clocks: Arc<dyn Clocks>,
    pub metrics: Arc<HttpMetrics>,
    pub budget: Arc<MemoryBudget>,
    pub service: Arc<Service>,
}

/// Updates epoll interest for a connection (always edge-triggered reads).
fn interest(env: &NetEnv, conn: &Conn, writable: bool) {
    let mut flags = EpollFlags::EPOLLIN | EpollFlags::EPOLLRDHUP | EpollFlags::EPOLLET;
    if writable {
        flags |= EpollFlags::EPOLLOUT;
    }
    let mut ev = EpollEvent::new(flags, conn.fd as u64);
    let fd = unsafe { BorrowedFd::borrow_raw(conn.fd) };
    if let Err(e) = env.epoll.modify(fd, &mut ev) {
        debug!(fd = conn.fd, err = %e, "epoll modify failed");
    }
}

/// Closes a connection and returns every resource exactly once; the lease
/// take is the idempotency gate.
pub fn teardown(env: &NetEnv, conn: &Arc<Conn>) {
    let Some(lease) = conn.take_lease() else {
        return;
    };
    if let Err(e) = env.pool.release(lease) {
        warn!(fd = conn.fd, "buffer release failed: {e:?}");
    }
    let fd = unsafe { BorrowedFd::borrow_raw(conn.fd) };
    let _ = env.epoll.delete(fd);
    let _ = conn.stream.shutdown(Shutdown::Both);
    env.table.remove(conn.fd);
    env.metrics.conn_closed();
    env.budget.release(CONN_COST);
    debug!(fd = conn.fd, "connection closed");
}

#[derive(PartialEq, Eq)]
enum Io {
    Progress,
    WouldBlock,
    Closed,
}

fn read_into(conn: &Conn, state: &mut conn::ConnState) -> Io {
    let st = &mut *state;
    let Some(lease) = st.lease.as_mut() else {
        return Io::Closed;
    };
    let mut stream = &conn.stream;
    loop {
        if st.cursor == lease.len() {
            return Io::Progress; // buffer full; the parser decides what now
        }
        match stream.read(&mut lease.buf_mut()[st.cursor..]) {
            Ok(0) => return Io::Closed,
            Ok(n) => st.cursor += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Io::WouldBlock,
            Err(_) => return Io::Closed,
        }
    }
}

fn write_out(conn: &Conn, state: &mut conn::ConnState) -> Io {
    let mut stream = &conn.stream;
    while state.write_pos < state.write_buf.len() {
        match stream.write(&state.write_buf[state.write_pos..]) {
            Ok(0) => return Io::Closed,
            Ok(n) => state.write_pos += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Io::WouldBlock,
            Err(_) => return Io::Closed,
        }
    }
    Io::Progress
}

enum Step {
    /// Wait for more bytes.
    Wait,
    /// A response is ready to send.
    Respond {
        bytes: Vec<u8>,
        consumed: usize,
        close: bool,
        status: u16,
    },
}

/// Entry point the worker pool runs for each readiness event.
pub fn process_connection(env: &NetEnv, conn: Arc<Conn>) {
    loop {
        let torn_down = drive(env, &conn);
        if torn_down {
            conn.queued.store(false, Ordering::Release);
            return;
        }
        conn.queued.store(false, Ordering::Release);
        // Readiness observed while we held the connection: re-drive unless
        // the reactor already re-enqueued it.
        if conn.rearm.swap(false, Ordering::AcqRel) {
            if conn.queued.swap(true, Ordering::AcqRel) {
                return;
            }
            continue;
        }
        return;
    }
}

/// Runs the connection FSM until it blocks. Returns true if the connection
/// was torn down.
fn drive(env: &NetEnv, conn: &Arc<Conn>) -> bool {
    let mut guard = conn.state.lock();
    loop {
        match guard.fsm {
            Fsm::Closing => {
                drop(guard);
                teardown(env, conn);
                return true;
            }
            Fsm::Writing => {
                match write_out(conn, &mut guard) {
                    Io::WouldBlock => {
                        interest(env, conn, true);
                        return false;
                    }
                    Io::Closed => {
                        drop(guard);
                        teardown(env, conn);
                        return true;
                    }
                    Io::Progress => {
                        interest(env, conn, false);
                        conn.touch(env.clocks.monotonic());
                        if guard.close_after_write {
                            drop(guard);
                            teardown(env, conn);
                            return true;
                        }
                        guard.write_buf = Vec::new();
                        guard.write_pos = 0;
                        guard.fsm = if guard.cursor > 0 {
                            Fsm::ReadingHeaders // pipelined bytes already queued
                        } else {
                            Fsm::KeepAlive
                        };
                        if guard.cursor == 0 {
                            return false;
                        }
                    }
                }
            }
            Fsm::KeepAlive | Fsm::ReadingHeaders | Fsm::ReadingBody | Fsm::Processing => {
                if guard.fsm == Fsm::KeepAlive {
                    guard.fsm = Fsm::ReadingHeaders;
                }
                let io = read_into(conn, &mut guard);
                if io == Io::Closed {
                    drop(guard);
                    teardown(env, conn);
                    return true;
                }
                conn.touch(env.clocks.monotonic());

                // Parse outside the lease slot so the borrows stay simple.
                let lease = guard.lease.take().expect("lease present while open");
                let cursor = guard.cursor;
                let started = env.clocks.monotonic();
                let step = {
                    let buf = &lease.buf()[..cursor];
                    match request::parse(buf, lease.len()) {
                        Outcome::Incomplete => {
                            guard.fsm = if request_head_done(buf) {
                                Fsm::ReadingBody
                            } else {
                                Fsm::ReadingHeaders
                            };
                            Step::Wait
                        }
                        Outcome::Reject(r) => {
                            debug!(peer = %conn.peer, status = r.status, "request rejected");
                            let mut resp = Response::plain(r.status, r.reason).with_close();
                            if r.allow {
                                resp = resp.with_header("Allow", "GET, POST");
                            }
                            Step::Respond {
                                status: r.status,
                                bytes: resp.serialize(&http_date(env.clocks.realtime())),
                                consumed: cursor,
                                close: true,
                            }
                        }
                        Outcome::Ready(req) => {
                            guard.fsm = Fsm::Processing;
                            let resp = env.service.handle(&req, conn.peer.ip());
                            let limit = env.service.rt.snapshot().keepalive_max;
                            let close = !req.keep_alive
                                || resp.close
                                || guard.keepalive_count + 1 >= limit;
                            let status = resp.status;
                            let resp = if close { resp.with_close() } else { resp };
                            Step::Respond {
                                status,
                                bytes: resp.serialize(&http_date(env.clocks.realtime())),
                                consumed: req.consumed,
                                close,
                            }
                        }
                    }
                };
                guard.lease = Some(lease);

                match step {
                    Step::Wait => {
                        if io == Io::WouldBlock {
                            return false;
                        }
                        // Buffer full but unparseable should have produced a
                        // 413 reject; anything else waits for the sweep.
                        return false;
                    }
                    Step::Respond {
                        bytes,
                        consumed,
                        close,
                        status,
                    } => {
                        let elapsed = env
                            .clocks
                            .monotonic()
                            .saturating_sub(started)
                            .as_millis() as u64;
                        env.metrics.record(status, elapsed, bytes.len() as u64);
                        let st = &mut *guard;
                        if let Some(lease) = st.lease.as_mut() {
                            lease.buf_mut().copy_within(consumed..cursor, 0);
                        }
                        st.cursor = cursor - consumed;
                        st.keepalive_count += 1;
                        st.write_buf = bytes;
                        st.write_pos = 0;
                        st.close_after_write = close;
                        st.fsm = Fsm::Writing;
                    }
                }
            }
        }
    }
}

/// True once the header block is complete (so the FSM can report
/// `ReadingBody` while a body trickles in).
fn request_head_done(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.windows(2).any(|w| w == b"\n\n")
}

/// Builds a fully wired environment over the loopback test fixtures.
#[cfg(test)]
pub(crate) fn test_env() -> NetEnv {
    use nix::sys::epoll::EpollCreateFlags;

    let ctx = crate::testutil::ctx();
    let (rt, clocks, rng, snap) = (
        ctx.rt.clone(),
        ctx.clocks.clone(),
        ctx.rng.clone(),
        ctx.hal.snapshot.clone(),
    );
    let mut dispatcher = crate::soap::Dispatcher::new(ctx);
    crate::services::register_all(&mut dispatcher).unwrap();
    let auth = Arc::new(crate::auth::Authenticator::new(
        rt.clone(),
        clocks.clone(),
        rng.clone(),
    ));
    let service = Arc::new(Service::new(
        rt,
        auth,
        Arc::new(dispatcher),
        Arc::new(HttpMetrics::new()),
        Arc::new(MemoryBudget::default()),
        snap,
        rng,
    ));
    NetEnv {
        pool: Arc::new(BufferPool::with_config(2, 8 * 1024)),
        table: Arc::new(ConnTable::new()),
        epoll: Arc::new(Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).unwrap()),
        clocks,
        metrics: service.metrics.clone(),
        budget: service.budget.clone(),
        service,
    }
}
