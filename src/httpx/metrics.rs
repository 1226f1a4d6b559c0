// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Lock-free HTTP request counters.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Default)]
pub struct HttpMetrics {
    total: AtomicU64,
    success: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    lat_min_ms: AtomicU64,
    lat_max_ms: AtomicU64,
    lat_sum_ms: AtomicU64,
    bytes: AtomicU64,
    current_connections: AtomicI64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub success: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    /// `u64::MAX` until the first request completes.
    pub lat_min_ms: u64,
    pub lat_max_ms: u64,
    pub lat_sum_ms: u64,
    pub bytes: u64,
    pub current_connections: i64,
}

impl HttpMetrics {
    pub fn new() -> Self {
        let m = HttpMetrics::default();
        m.lat_min_ms.store(u64::MAX, Ordering::Relaxed);
        m
    }

    pub fn record(&self, status: u16, latency_ms: u64, response_bytes: u64) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match status {
            200..=399 => self.success.fetch_add(1, Ordering::Relaxed),
            400..=499 => self.client_errors.fetch_add(1, Ordering::Relaxed),
            _ => self.server_errors.fetch_add(1, Ordering::Relaxed),
        };
        self.lat_min_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.lat_max_ms.fetch_max(latency_ms, Ordering::Relaxed);
        self.lat_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.bytes.fetch_add(response_bytes, Ordering::Relaxed);
    }

    pub fn conn_opened(&self) {
        self.current_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn conn_closed(&self) {
        self.current_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            lat_min_ms: self.lat_min_ms.load(Ordering::Relaxed),
            lat_max_ms: self.lat_max_ms.load(Ordering::Relaxed),
            lat_sum_ms: self.lat_sum_ms.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            current_connections: self.current_connections.load(Ordering::Relaxed),
        }
    }
}
