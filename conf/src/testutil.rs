// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Utilities for automated testing involving the configuration runtime.
//! Used for tests of both the `onvifd_conf` crate itself and the `onvifd`
//! crate.

static INIT: std::sync::Once = std::sync::Once::new();

/// Performs global initialization for tests: sets up logging with the test
/// writer. (Note the output can be confusing unless `RUST_TEST_THREADS=1` is
/// set in the program's environment prior to running.)
pub fn init() {
    INIT.call_once(|| {
        base::tracing_setup::install_for_tests();
    });
}

/// A runtime with defaults applied and the bootstrap `admin:admin` account,
/// matching first-boot state.
pub fn runtime_with_admin() -> crate::ConfigRuntime {
    let rt = crate::ConfigRuntime::new();
    rt.ensure_bootstrap_user(&base::rng::SeqRng::new(1))
        .expect("bootstrap admin");
    rt
}
