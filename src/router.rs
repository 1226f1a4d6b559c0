// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Ref-counted stream router: one encoder instance per profile, shared by
//! every RTSP session that plays it.
//!
//! Invariant: the number of live encoder instances equals the number of
//! distinct profile tokens with a positive refcount.

use std::collections::HashMap;
use std::sync::Arc;

use base::{err, Error};
use conf::ConfigRuntime;
use parking_lot::Mutex;
use tracing::debug;

use crate::hal::{EncoderCtl, EncoderHandle};
use crate::services::caps;

struct Binding {
    encoder: EncoderHandle,
    refcount: usize,
}

/// A live claim on a profile's encoder. Must be returned via
/// [`StreamRouter::release`].
#[derive(Debug)]
pub struct StreamHandle {
    token: String,
    encoder: EncoderHandle,
}

impl StreamHandle {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn encoder(&self) -> EncoderHandle {
        self.encoder
    }
}

pub struct StreamRouter {
    bindings: Mutex<HashMap<String, Binding>>,
    enc: Arc<dyn EncoderCtl>,
    rt: Arc<ConfigRuntime>,
}

impl StreamRouter {
    pub fn new(enc: Arc<dyn EncoderCtl>, rt: Arc<ConfigRuntime>) -> Self {
        StreamRouter {
            bindings: Mutex::new(HashMap::new()),
            enc,
            rt,
        }
    }

    /// First acquire starts the encoder; later ones share it.
    pub fn acquire(&self, profile_token: &str) -> Result<StreamHandle, Error> {
        let snapshot = self.rt.snapshot();
        let caps = caps::profile(&snapshot, profile_token)
            .ok_or_else(|| err!(NotFound, "no such profile {profile_token:?}"))?;

        let mut bindings = self.bindings.lock();
        if let Some(b) = bindings.get_mut(profile_token) {
            b.refcount += 1;
            debug!(profile = profile_token, refcount = b.refcount, "stream acquired");
            return Ok(StreamHandle {
                token: profile_token.to_owned(),
                encoder: b.encoder,
            });
        }
        // Start under the lock: a concurrent acquire for the same token must
        // not race a second encoder into existence.
        let encoder = self.enc.start(profile_token, &caps.encoder_params())?;
        bindings.insert(
            profile_token.to_owned(),
            Binding {
                encoder,
                refcount: 1,
            },
        );
        debug!(profile = profile_token, refcount = 1, "stream acquired");
        Ok(StreamHandle {
            token: profile_token.to_owned(),
            encoder,
        })
    }

    /// Drops one claim; the last release stops the encoder.
    pub fn release(&self, handle: StreamHandle) {
        let mut bindings = self.bindings.lock();
        let Some(b) = bindings.get_mut(&handle.token) else {
            debug!(profile = %handle.token, "release for unknown binding ignored");
            return;
        };
        b.refcount -= 1;
        debug!(profile = %handle.token, refcount = b.refcount, "stream released");
        if b.refcount == 0 {
            let encoder = b.encoder;
            bindings.remove(&handle.token);
            drop(bindings);
            self.enc.stop(encoder);
        }
    }

    /// `(refcount, live encoder instances)` for one profile.
    pub fn stats(&self, profile_token: &str) -> (usize, usize) {
        let bindings = self.bindings.lock();
        let refcount = bindings.get(profile_token).map(|b| b.refcount).unwrap_or(0);
        (refcount, bindings.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::LoopbackEncoder;
    use base::clock::SimulatedClocks;
    use base::ErrorKind;

    fn router() -> (Arc<LoopbackEncoder>, StreamRouter) {
        let clocks = Arc::new(SimulatedClocks::new(jiff::Timestamp::UNIX_EPOCH));
        let enc = Arc::new(LoopbackEncoder::new(clocks, 2));
        let rt = Arc::new(ConfigRuntime::new());
        (enc.clone(), StreamRouter::new(enc, rt))
    }

    #[test]
    fn one_encoder_per_profile_across_sessions() {
        let (enc, router) = router();
        let a = router.acquire("MainProfile").unwrap();
        let b = router.acquire("MainProfile").unwrap();
        assert_eq!(a.encoder(), b.encoder());
        assert_eq!(router.stats("MainProfile"), (2, 1));
        assert_eq!(enc.running_count(), 1);

        router.release(a);
        assert_eq!(router.stats("MainProfile"), (1, 1));
        assert_eq!(enc.running_count(), 1);
        router.release(b);
        assert_eq!(router.stats("MainProfile"), (0, 0));
        assert_eq!(enc.running_count(), 0);
    }

    #[test]
    fn distinct_profiles_get_distinct_encoders() {
        let (enc, router) = router();
        let a = router.acquire("MainProfile").unwrap();
        let b = router.acquire("SubProfile").unwrap();
        assert_ne!(a.encoder(), b.encoder());
        assert_eq!(enc.running_count(), 2);
        router.release(a);
        router.release(b);
    }

    #[test]
    fn unknown_profile_is_not_found() {
        let (_, router) = router();
        assert_eq!(
            router.acquire("Ghost").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn busy_hal_propagates_unavailable() {
        let clocks = Arc::new(SimulatedClocks::new(jiff::Timestamp::UNIX_EPOCH));
        let enc = Arc::new(LoopbackEncoder::new(clocks, 1));
        let rt = Arc::new(ConfigRuntime::new());
        let router = StreamRouter::new(enc, rt);
        let _main = router.acquire("MainProfile").unwrap();
        assert_eq!(
            router.acquire("SubProfile").unwrap_err().kind(),
            ErrorKind::Unavailable
        );
    }

    #[test]
    fn acquire_release_balance_law() {
        let (enc, router) = router();
        let before = router.stats("SubProfile").0;
        let handles: Vec<_> = (0..5).map(|_| router.acquire("SubProfile").unwrap()).collect();
        for h in handles {
            router.release(h);
        }
        assert_eq!(router.stats("SubProfile").0, before);
        assert_eq!(enc.running_count(), 0);
    }
}
