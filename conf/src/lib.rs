// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration runtime and persistence for the camera daemon: the typed
//! schema, the canonical in-memory snapshot, atomic INI storage, and the
//! user/credential store.

pub mod runtime;
pub mod schema;
pub mod snapshot;
pub mod storage;
pub mod testutil;
pub mod users;

pub use crate::runtime::ConfigRuntime;
pub use crate::schema::{Entry, Type, Value};
pub use crate::snapshot::Snapshot;
pub use crate::storage::LoadOutcome;
pub use crate::users::{AccessLevel, UserDb, DIGEST_REALM};
