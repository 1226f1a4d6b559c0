// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! RTSP session state.
//!
//! A session is created by SETUP and destroyed by TEARDOWN, connection
//! drop, or expiry. It owns the stream-router claim for its profile and the
//! RTP sender threads' `running` flag; whoever removes the session releases
//! both, exactly once.

use std::collections::HashMap;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use base::rng::Rng;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::transport::TransportRequest;
use crate::router::{StreamHandle, StreamRouter};
use crate::telemetry::{MemoryBudget, SESSION_COST};

/// Idle lifetime; refreshed by any valid request naming the session.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Init,
    Ready,
    Playing,
    /// RECORD is not implemented; the state exists for FSM completeness.
    #[allow(dead_code)]
    Recording,
}

/// Negotiated transport for one track.
pub struct TrackTransport {
    pub request: TransportRequest,
    /// Bound server socket (UDP transport only).
    pub socket: Option<Arc<UdpSocket>>,
    pub server_rtp: u16,
    pub server_rtcp: u16,
}

pub struct Session {
    /// Random 64-bit token rendered as decimal, per the `Session` header.
    pub id: String,
    pub profile_token: String,
    pub state: Mutex<State>,
    pub video: Mutex<Option<TrackTransport>>,
    pub audio: Mutex<Option<TrackTransport>>,
    stream: Mutex<Option<StreamHandle>>,
    /// Cleared to stop the RTP sender threads.
    pub running: Arc<AtomicBool>,
    senders: Mutex<Vec<JoinHandle<()>>>,
    last_activity: Mutex<Duration>,
}

impl Session {
    pub fn touch(&self, now: Duration) {
        *self.last_activity.lock() = now;
    }

    pub fn expired(&self, now: Duration) -> bool {
        now.saturating_sub(*self.last_activity.lock()) > SESSION_TIMEOUT
    }

    pub fn set_stream(&self, handle: StreamHandle) {
        *self.stream.lock() = Some(handle);
    }

    pub fn encoder(&self) -> Option<crate::hal::EncoderHandle> {
        self.stream.lock().as_ref().map(|s| s.encoder())
    }

    pub fn add_sender(&self, handle: JoinHandle<()>) {
        self.senders.lock().push(handle);
    }

    pub fn senders_started(&self) -> bool {
        !self.senders.lock().is_empty()
    }

    pub fn header_value(&self) -> String {
        format!("{};timeout={}", self.id, SESSION_TIMEOUT.as_secs())
    }

    /// Stops senders and returns the stream claim to the router.
    fn shut_down(&self, router: &StreamRouter) {
        self.running.store(false, Ordering::SeqCst);
        for h in self.senders.lock().drain(..) {
            let _ = h.join();
        }
        if let Some(handle) = self.stream.lock().take() {
            router.release(handle);
        }
    }
}

pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    rng: Arc<dyn Rng>,
    budget: Arc<MemoryBudget>,
}

impl SessionManager {
    pub fn new(rng: Arc<dyn Rng>, budget: Arc<MemoryBudget>) -> Self {
        SessionManager {
            sessions: RwLock::new(HashMap::new()),
            rng,
            budget,
        }
    }

    /// `None` when the memory budget refuses another session.
    pub fn create(&self, profile_token: &str, now: Duration) -> Option<Arc<Session>> {
        if !self.budget.try_reserve(SESSION_COST) {
            return None;
        }
        let id = self.rng.u64().to_string();
        let session = Arc::new(Session {
            id: id.clone(),
            profile_token: profile_token.to_owned(),
            state: Mutex::new(State::Init),
            video: Mutex::new(None),
            audio: Mutex::new(None),
            stream: Mutex::new(None),
            running: Arc::new(AtomicBool::new(true)),
            senders: Mutex::new(Vec::new()),
            last_activity: Mutex::new(now),
        });
        self.sessions.write().insert(id.clone(), session.clone());
        info!(session = %id, profile = profile_token, "rtsp session created");
        Some(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Removes and fully shuts down one session.
    pub fn remove(&self, id: &str, router: &StreamRouter) -> bool {
        let Some(session) = self.sessions.write().remove(id) else {
            return false;
        };
        session.shut_down(router);
        self.budget.release(SESSION_COST);
        info!(session = %id, "rtsp session removed");
        true
    }

    /// Tears down every session whose timeout has lapsed.
    pub fn sweep(&self, now: Duration, router: &StreamRouter) {
        let expired: Vec<String> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.expired(now))
            .map(|s| s.id.clone())
            .collect();
        for id in expired {
            debug!(session = %id, "rtsp session expired");
            self.remove(&id, router);
        }
    }

    /// Shutdown path: drop everything.
    pub fn clear(&self, router: &StreamRouter) {
        let ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        for id in ids {
            self.remove(&id, router);
        }
    }
}
