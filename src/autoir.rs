// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Auto day/night: polls scene luminance and toggles the IR cut filter with
//! hysteresis between the configured thresholds.

use std::sync::Arc;
use std::time::Duration;

use base::shutdown;
use conf::ConfigRuntime;
use tracing::{info, warn};

use crate::hal::Hal;

/// Poll loop; run on its own thread. Exits on shutdown.
pub fn run(rt: Arc<ConfigRuntime>, hal: Hal, shutdown_rx: shutdown::Receiver) {
    let mut night = false;
    loop {
        let s = rt.snapshot();
        if s.autoir_enabled {
            let lum = hal.imaging.luminance() as i32;
            let next = if night {
                // Leave night mode only once the scene is clearly bright.
                lum < s.autoir_day_threshold
            } else {
                lum < s.autoir_night_threshold
            };
            if next != night {
                info!(luminance = lum, night = next, "day/night transition");
                if let Err(e) = hal.imaging.set_ir_cut(next) {
                    warn!(err = %e, "ir cut switch failed");
                } else {
                    night = next;
                }
            }
        }
        let interval = Duration::from_secs(s.autoir_check_interval_sec.max(1) as u64);
        if shutdown_rx.wait_for(interval).is_err() {
            break;
        }
    }
}
