// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! The process-wide configuration schema: one static descriptor per
//! `(section, key)`, with the typed parser, bounds, default literal, and the
//! accessor pair tying it to a [`Snapshot`] field.

use crate::snapshot::Snapshot;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Bool,
    Int,
    Float,
    Str,
    Enum(&'static [&'static str]),
}

/// A dynamically-typed configuration value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(String),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Static schema descriptor for a single configuration key.
pub struct Entry {
    pub section: &'static str,
    pub key: &'static str,
    pub ty: Type,
    /// Required entries are always written on save, even at their default.
    pub required: bool,
    /// Inclusive numeric bounds; unused for other types.
    pub min: f64,
    pub max: f64,
    /// Maximum byte length; unused for non-string types.
    pub max_len: usize,
    /// Default, in the same literal form the INI file uses.
    pub default: &'static str,
    pub get: fn(&Snapshot) -> Value,
    pub set: fn(&mut Snapshot, Value),
}

impl Entry {
    /// Parses and validates a raw INI value against this entry.
    pub fn parse(&self, raw: &str) -> Result<Value, String> {
        match self.ty {
            Type::Bool => match raw {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err("expected true or false".to_owned()),
            },
            Type::Int => {
                let i: i32 = raw.parse().map_err(|_| "expected an integer".to_owned())?;
                self.check_range(i as f64)?;
                Ok(Value::Int(i))
            }
            Type::Float => {
                let x: f32 = raw.parse().map_err(|_| "expected a number".to_owned())?;
                if !x.is_finite() {
                    return Err("expected a finite number".to_owned());
                }
                self.check_range(x as f64)?;
                Ok(Value::Float(x))
            }
            Type::Str => {
                self.check_str(raw)?;
                Ok(Value::Str(raw.to_owned()))
            }
            Type::Enum(allowed) => {
                if allowed.contains(&raw) {
                    Ok(Value::Str(raw.to_owned()))
                } else {
                    Err(format!("expected one of {allowed:?}"))
                }
            }
        }
    }

    /// Validates an already-typed value, for the programmatic `set_*` path.
    pub fn validate(&self, v: &Value) -> Result<(), String> {
        match (self.ty, v) {
            (Type::Bool, Value::Bool(_)) => Ok(()),
            (Type::Int, Value::Int(i)) => self.check_range(*i as f64),
            (Type::Float, Value::Float(x)) => {
                if !x.is_finite() {
                    return Err("expected a finite number".to_owned());
                }
                self.check_range(*x as f64)
            }
            (Type::Str, Value::Str(s)) => self.check_str(s),
            (Type::Enum(allowed), Value::Str(s)) => {
                if allowed.contains(&s.as_str()) {
                    Ok(())
                } else {
                    Err(format!("expected one of {allowed:?}"))
                }
            }
            _ => Err("type mismatch".to_owned()),
        }
    }

    /// Parses this entry's default literal. The table is exercised by tests,
    /// so a bad literal cannot survive to runtime.
    pub fn default_value(&self) -> Value {
        self.parse(self.default)
            .expect("schema default literal must be valid")
    }

    fn check_range(&self, v: f64) -> Result<(), String> {
        if v < self.min || v > self.max {
            return Err(format!("out of range [{}, {}]", self.min, self.max));
        }
        Ok(())
    }

    fn check_str(&self, s: &str) -> Result<(), String> {
        if s.len() > self.max_len {
            return Err(format!("longer than {} bytes", self.max_len));
        }
        if s.bytes().any(|b| b == 0 || b == b'\n' || b == b'\r') {
            return Err("contains a forbidden character".to_owned());
        }
        Ok(())
    }
}

macro_rules! e_bool {
    ($section:literal, $key:literal, $field:ident, $default:literal) => {
        Entry {
            section: $section,
            key: $key,
            ty: Type::Bool,
            required: false,
            min: 0.0,
            max: 0.0,
            max_len: 0,
            default: $default,
            get: |s| Value::Bool(s.$field),
            set: |s, v| {
                if let Value::Bool(b) = v {
                    s.$field = b;
                }
            },
        }
    };
}

macro_rules! e_int {
    ($section:literal, $key:literal, $field:ident, $default:literal, $min:literal ..= $max:literal) => {
        Entry {
            section: $section,
            key: $key,
            ty: Type::Int,
            required: false,
            min: $min as f64,
            max: $max as f64,
            max_len: 0,
            default: $default,
            get: |s| Value::Int(s.$field),
            set: |s, v| {
                if let Value::Int(i) = v {
                    s.$field = i;
                }
            },
        }
    };
}

macro_rules! e_port {
    ($section:literal, $key:literal, $field:ident, $default:literal) => {
        Entry {
            section: $section,
            key: $key,
            ty: Type::Int,
            required: true,
            min: 1.0,
            max: 65535.0,
            max_len: 0,
            default: $default,
            get: |s| Value::Int(s.$field as i32),
            set: |s, v| {
                if let Value::Int(i) = v {
                    s.$field = i as u16;
                }
            },
        }
    };
}

macro_rules! e_float {
    ($section:literal, $key:literal, $field:ident, $default:literal, $min:literal ..= $max:literal) => {
        Entry {
            section: $section,
            key: $key,
            ty: Type::Float,
            required: false,
            min: $min,
            max: $max,
            max_len: 0,
            default: $default,
            get: |s| Value::Float(s.$field),
            set: |s, v| {
                if let Value::Float(x) = v {
                    s.$field = x;
                }
            },
        }
    };
}

macro_rules! e_str {
    ($section:literal, $key:literal, $field:ident, $default:literal, $max_len:literal) => {
        Entry {
            section: $section,
            key: $key,
            ty: Type::Str,
            required: false,
            min: 0.0,
            max: 0.0,
            max_len: $max_len,
            default: $default,
            get: |s| Value::Str(s.$field.clone()),
            set: |s, v| {
                if let Value::Str(x) = v {
                    s.$field = x;
                }
            },
        }
    };
}

macro_rules! e_enum {
    ($section:literal, $key:literal, $field:ident, $default:literal, $allowed:expr) => {
        Entry {
            section: $section,
            key: $key,
            ty: Type::Enum($allowed),
            required: false,
            min: 0.0,
            max: 0.0,
            max_len: 0,
            default: $default,
            get: |s| Value::Str(s.$field.clone()),
            set: |s, v| {
                if let Value::Str(x) = v {
                    s.$field = x;
                }
            },
        }
    };
}

macro_rules! e_preset {
    ($key:literal, $idx:literal) => {
        Entry {
            section: "ptz",
            key: $key,
            ty: Type::Str,
            required: false,
            min: 0.0,
            max: 0.0,
            max_len: 96,
            default: "",
            get: |s| Value::Str(s.ptz_presets[$idx].clone()),
            set: |s, v| {
                if let Value::Str(x) = v {
                    s.ptz_presets[$idx] = x;
                }
            },
        }
    };
}

pub const CODECS: &[&str] = &["h264", "h265"];
pub const AUDIO_CODECS: &[&str] = &["pcmu", "aac"];
pub const LOG_LEVELS: &[&str] = &[
    "trace", "debug", "info", "notice", "warning", "error", "fatal",
];

/// The process-wide schema table, built once at compile time.
pub static SCHEMA: &[Entry] = &[
    // [network]
    e_str!("network", "bind_addr", bind_addr, "0.0.0.0", 64),
    e_port!("network", "http_port", http_port, "8080"),
    e_port!("network", "rtsp_port", rtsp_port, "554"),
    e_int!("network", "http_workers", http_workers, "8", 1 ..= 32),
    e_int!("network", "keepalive_max", keepalive_max, "100", 1 ..= 10000),
    // [onvif]
    e_str!("onvif", "manufacturer", manufacturer, "ONVIF-Camera", 64),
    e_str!("onvif", "model", model, "AK3918", 64),
    e_str!("onvif", "serial_number", serial_number, "00000000", 64),
    e_str!("onvif", "device_name", device_name, "ONVIF-Camera", 64),
    e_bool!("onvif", "discoverable", discoverable, "true"),
    // [profiles]
    e_int!("profiles", "main_width", main_width, "1920", 160 ..= 4096),
    e_int!("profiles", "main_height", main_height, "1080", 120 ..= 2160),
    e_int!("profiles", "main_fps", main_fps, "25", 1 ..= 60),
    e_int!("profiles", "main_bitrate", main_bitrate, "2000", 64 ..= 20000),
    e_enum!("profiles", "main_codec", main_codec, "h264", CODECS),
    e_int!("profiles", "sub_width", sub_width, "640", 160 ..= 4096),
    e_int!("profiles", "sub_height", sub_height, "360", 120 ..= 2160),
    e_int!("profiles", "sub_fps", sub_fps, "15", 1 ..= 60),
    e_int!("profiles", "sub_bitrate", sub_bitrate, "512", 64 ..= 20000),
    e_enum!("profiles", "sub_codec", sub_codec, "h264", CODECS),
    e_bool!("profiles", "audio_enabled", audio_enabled, "true"),
    e_enum!("profiles", "audio_codec", audio_codec, "pcmu", AUDIO_CODECS),
    e_int!("profiles", "audio_sample_rate", audio_sample_rate, "8000", 8000 ..= 48000),
    // [ptz]
    e_bool!("ptz", "enabled", ptz_enabled, "true"),
    e_float!("ptz", "speed_pan", ptz_speed_pan, "0.5", 0.0 ..= 1.0),
    e_float!("ptz", "speed_tilt", ptz_speed_tilt, "0.5", 0.0 ..= 1.0),
    e_preset!("preset_0", 0),
    e_preset!("preset_1", 1),
    e_preset!("preset_2", 2),
    e_preset!("preset_3", 3),
    e_preset!("preset_4", 4),
    e_preset!("preset_5", 5),
    e_preset!("preset_6", 6),
    e_preset!("preset_7", 7),
    // [imaging]
    e_int!("imaging", "brightness", brightness, "50", 0 ..= 100),
    e_int!("imaging", "contrast", contrast, "50", 0 ..= 100),
    e_int!("imaging", "saturation", saturation, "50", 0 ..= 100),
    e_int!("imaging", "sharpness", sharpness, "50", 0 ..= 100),
    e_bool!("imaging", "flip", flip, "false"),
    e_bool!("imaging", "mirror", mirror, "false"),
    // [autoir]
    e_bool!("autoir", "enabled", autoir_enabled, "true"),
    e_int!("autoir", "day_threshold", autoir_day_threshold, "60", 0 ..= 255),
    e_int!("autoir", "night_threshold", autoir_night_threshold, "30", 0 ..= 255),
    e_int!("autoir", "check_interval_sec", autoir_check_interval_sec, "10", 1 ..= 3600),
    // [logging]
    e_enum!("logging", "level", log_level, "info", LOG_LEVELS),
];

/// Canonical section emission order for saves.
pub static SECTIONS: &[&str] = &[
    "network", "onvif", "profiles", "ptz", "imaging", "autoir", "users", "logging",
];
