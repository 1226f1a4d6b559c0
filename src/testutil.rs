// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Shared fixtures for the daemon's unit tests: a fully wired handler
//! context on simulated clocks with the loopback HAL and the bootstrap
//! `admin:admin` account.

use std::sync::Arc;

use base::clock::SimulatedClocks;
use base::rng::SeqRng;

use crate::hal::Hal;
use crate::router::StreamRouter;
use crate::soap::{Ctx, ReqCtx};

pub fn init() {
    conf::testutil::init();
}

pub fn clocks() -> Arc<SimulatedClocks> {
    Arc::new(SimulatedClocks::new(
        // 2026-08-01T00:00:00Z.
        "2026-08-01T00:00:00Z".parse().expect("valid timestamp"),
    ))
}

pub fn ctx() -> Ctx {
    ctx_with_clocks(clocks())
}

pub fn ctx_with_clocks(clocks: Arc<SimulatedClocks>) -> Ctx {
    init();
    let rt = Arc::new(conf::testutil::runtime_with_admin());
    let hal = Hal::loopback(clocks.clone());
    let router = Arc::new(StreamRouter::new(hal.video.clone(), rt.clone()));
    Ctx {
        rt,
        hal,
        router,
        clocks,
        rng: Arc::new(SeqRng::new(0x1000)),
    }
}

pub fn req_ctx() -> ReqCtx {
    ReqCtx {
        host: "cam.local:8080".to_owned(),
        peer: "192.0.2.7".parse().expect("valid peer ip"),
    }
}
