// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Bounded FIFO work queue drained by a fixed pool of worker threads.
//!
//! The reactor enqueues a connection only after observing readiness and
//! never re-enqueues while a worker still holds it, so work items for one
//! connection are implicitly serialised.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::info;

/// Default worker thread count.
pub const DEFAULT_WORKERS: usize = 8;

/// Queue depth past which the reactor should apply backpressure.
pub const HIGH_WATER: usize = 256;

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    cv: Condvar,
    running: AtomicBool,
}

pub struct WorkerPool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawns `n` workers, each invoking `f` per item.
    pub fn new<F>(n: usize, f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            running: AtomicBool::new(true),
        });
        let f = Arc::new(f);
        let mut handles = Vec::with_capacity(n);
        for i in 0..n {
            let shared = shared.clone();
            let f = f.clone();
            handles.push(
                thread::Builder::new()
                    .name(format!("worker-{i}"))
                    .spawn(move || worker_loop(shared, f))
                    .expect("spawn worker thread"),
            );
        }
        WorkerPool { shared, handles }
    }

    /// Queues one item and wakes a single waiter.
    pub fn add_work(&self, item: T) {
        let mut q = self.shared.queue.lock();
        q.push_back(item);
        drop(q);
        self.shared.cv.notify_one();
    }

    /// Current queue depth, for reactor backpressure decisions.
    pub fn backlog(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Stops accepting work, drains the queue, and joins every worker.
    pub fn shutdown(mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.cv.notify_all();
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
        info!("worker pool stopped");
    }
}

fn worker_loop<T, F: Fn(T)>(shared: Arc<Shared<T>>, f: Arc<F>) {
    loop {
        let item = {
            let mut q = shared.queue.lock();
            loop {
                if let Some(item) = q.pop_front() {
                    break item;
                }
                if !shared.running.load(Ordering::SeqCst) {
                    return;
                }
                shared.cv.wait(&mut q);
            }
        };
        f(item);
    }
}
