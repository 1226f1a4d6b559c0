// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Single-threaded epoll reactor: level-triggered accepts, edge-triggered
//! client readiness, timeout sweeps, and worker hand-off.

use std::net::TcpListener;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use base::shutdown;
use nix::sys::epoll::{EpollEvent, EpollFlags, EpollTimeout};
use tracing::{debug, info, warn};

use super::conn::{Conn, SWEEP_INTERVAL};
use super::workers::{WorkerPool, HIGH_WATER};
use super::{teardown, NetEnv};
use crate::telemetry::CONN_COST;

/// `data` value marking the listening socket.
const LISTENER: u64 = u64::MAX;

pub struct Reactor {
    env: NetEnv,
    listener: TcpListener,
    workers: Arc<WorkerPool<Arc<Conn>>>,
    shutdown_rx: shutdown::Receiver,
}

impl Reactor {
    pub fn new(
        env: NetEnv,
        listener: TcpListener,
        workers: Arc<WorkerPool<Arc<Conn>>>,
        shutdown_rx: shutdown::Receiver,
    ) -> std::io::Result<Self> {
        listener.set_nonblocking(true)?;
        env.epoll
            .add(&listener, EpollEvent::new(EpollFlags::EPOLLIN, LISTENER))
            .map_err(std::io::Error::from)?;
        Ok(Reactor {
            env,
            listener,
            workers,
            shutdown_rx,
        })
    }

    /// The event loop; run on a dedicated thread. Returns on shutdown.
    pub fn run(&self) {
        let mut events = [EpollEvent::empty(); 64];
        let mut last_sweep = self.env.clocks.monotonic();
        info!("http engine listening");
        while self.shutdown_rx.check().is_ok() {
            // Backpressure: when the queue is saturated, stop pulling
            // readiness events until the workers catch up.
            if self.workers.backlog() > HIGH_WATER {
                if self.shutdown_rx.wait_for(Duration::from_millis(5)).is_err() {
                    break;
                }
                continue;
            }
            let n = match self.env.epoll.wait(&mut events, EpollTimeout::from(1000u16)) {
                Ok(n) => n,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    warn!(err = %e, "epoll_wait failed");
                    break;
                }
            };
            for ev in &events[..n] {
                if ev.data() == LISTENER {
                    self.accept_ready();
                } else {
                    self.client_ready(ev);
                }
            }
            let now = self.env.clocks.monotonic();
            if now.saturating_sub(last_sweep) >= SWEEP_INTERVAL {
                for conn in self.env.table.sweep(now) {
                    debug!(fd = conn.fd, "connection timed out");
                    teardown(&self.env, &conn);
                }
                last_sweep = now;
            }
        }
        for conn in self.env.table.drain_all() {
            teardown(&self.env, &conn);
        }
        info!("http engine stopped");
    }

    fn accept_ready(&self) {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(pair) => pair,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!(err = %e, "accept failed");
                    return;
                }
            };
            if let Err(e) = stream.set_nonblocking(true) {
                warn!(err = %e, "set_nonblocking failed");
                continue;
            }
            if !self.env.budget.try_reserve(CONN_COST) {
                // Load shed: accept so the client sees a clean close rather
                // than a SYN backlog timeout.
                debug!(%peer, "shedding connection: memory budget");
                continue;
            }
            let Some(lease) = self.env.pool.acquire() else {
                debug!(%peer, "shedding connection: buffer pool exhausted");
                self.env.budget.release(CONN_COST);
                continue;
            };
            let conn = Conn::new(stream, peer, lease, self.env.clocks.monotonic());
            let ev = EpollEvent::new(
                EpollFlags::EPOLLIN | EpollFlags::EPOLLRDHUP | EpollFlags::EPOLLET,
                conn.fd as u64,
            );
            if let Err(e) = self.env.epoll.add(&conn.stream, ev) {
                warn!(err = %e, "epoll add failed");
                if let Some(lease) = conn.take_lease() {
                    let _ = self.env.pool.release(lease);
                }
                self.env.budget.release(CONN_COST);
                continue;
            }
            self.env.table.insert(conn);
            self.env.metrics.conn_opened();
            debug!(%peer, "connection accepted");
        }
    }

    fn client_ready(&self, ev: &EpollEvent) {
        let fd = ev.data() as i32;
        let Some(conn) = self.env.table.get(fd) else {
            return; // already torn down
        };
        let flags = ev.events();
        if flags.intersects(EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR) {
            teardown(&self.env, &conn);
            return;
        }
        if flags.intersects(
            EpollFlags::EPOLLIN | EpollFlags::EPOLLOUT | EpollFlags::EPOLLRDHUP,
        ) {
            // Hand off unless a worker already holds the connection; then
            // just latch the readiness for it to re-check.
            if !conn.queued.swap(true, Ordering::AcqRel) {
                self.workers.add_work(conn);
            } else {
                conn.rearm.store(true, Ordering::Release);
            }
        }
    }
}
