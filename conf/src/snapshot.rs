// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! The canonical configuration snapshot: one plain struct holding every
//! typed field. Handlers receive it behind an `Arc` and read it without
//! taking locks or allocating.
//!
//! Invariant: every field is either the schema default or a value that has
//! passed schema validation (bounds, lengths, enum membership).

/// Number of persisted PTZ preset slots.
pub const PTZ_PRESET_SLOTS: usize = 8;

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    // [network]
    pub bind_addr: String,
    pub http_port: u16,
    pub rtsp_port: u16,
    pub http_workers: i32,
    pub keepalive_max: i32,

    // [onvif]
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub device_name: String,
    pub discoverable: bool,

    // [profiles]
    pub main_width: i32,
    pub main_height: i32,
    pub main_fps: i32,
    pub main_bitrate: i32,
    pub main_codec: String,
    pub sub_width: i32,
    pub sub_height: i32,
    pub sub_fps: i32,
    pub sub_bitrate: i32,
    pub sub_codec: String,
    pub audio_enabled: bool,
    pub audio_codec: String,
    pub audio_sample_rate: i32,

    // [ptz]
    pub ptz_enabled: bool,
    pub ptz_speed_pan: f32,
    pub ptz_speed_tilt: f32,
    /// Preset slots, each `""` or `name,pan,tilt,zoom`.
    pub ptz_presets: [String; PTZ_PRESET_SLOTS],

    // [imaging]
    pub brightness: i32,
    pub contrast: i32,
    pub saturation: i32,
    pub sharpness: i32,
    pub flip: bool,
    pub mirror: bool,

    // [autoir]
    pub autoir_enabled: bool,
    pub autoir_day_threshold: i32,
    pub autoir_night_threshold: i32,
    pub autoir_check_interval_sec: i32,

    // [logging]
    pub log_level: String,
}

impl Snapshot {
    /// Returns a snapshot with every field zeroed/empty. [`crate::schema`]
    /// defaults are applied on top by the runtime; this is never handed out
    /// as-is.
    pub(crate) fn empty() -> Self {
        Snapshot {
            bind_addr: String::new(),
            http_port: 0,
            rtsp_port: 0,
            http_workers: 0,
            keepalive_max: 0,
            manufacturer: String::new(),
            model: String::new(),
            serial_number: String::new(),
            device_name: String::new(),
            discoverable: false,
            main_width: 0,
            main_height: 0,
            main_fps: 0,
            main_bitrate: 0,
            main_codec: String::new(),
            sub_width: 0,
            sub_height: 0,
            sub_fps: 0,
            sub_bitrate: 0,
            sub_codec: String::new(),
            audio_enabled: false,
            audio_codec: String::new(),
            audio_sample_rate: 0,
            ptz_enabled: false,
            ptz_speed_pan: 0.0,
            ptz_speed_tilt: 0.0,
            ptz_presets: Default::default(),
            brightness: 0,
            contrast: 0,
            saturation: 0,
            sharpness: 0,
            flip: false,
            mirror: false,
            autoir_enabled: false,
            autoir_day_threshold: 0,
            autoir_night_threshold: 0,
            autoir_check_interval_sec: 0,
            log_level: String::new(),
        }
    }
}
