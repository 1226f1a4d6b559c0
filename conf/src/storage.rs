// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Atomic INI persistence.
//!
//! On-disk format: UTF-8, LF-terminated, `[section]` headers, `key=value`
//! pairs, `#`/`;` comments, case-insensitive keys, last-wins duplicates,
//! optional final `checksum=<crc32-hex>` line covering all preceding bytes.
//! Saves go through `<path>.tmp` + `fsync` + `rename`, so a crash at any
//! point leaves the previous file intact. Unknown keys found on disk are
//! preserved across saves.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use base::{err, Error};
use tracing::{debug, info, warn};

use crate::runtime::ConfigRuntime;
use crate::schema::{SCHEMA, SECTIONS};

/// Upper bound on the config file; anything larger is corrupt by definition
/// on a device with an 8 KiB nominal config.
const MAX_FILE_BYTES: usize = 64 * 1024;

const CHECKSUM_PREFIX: &str = "checksum=";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Every entry parsed and validated.
    Clean,
    /// At least one entry was rejected and skipped; the rest loaded.
    Degraded,
    /// No file existed; schema defaults are in effect.
    DefaultsApplied,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("config file too large ({0} bytes)")]
    TooLarge(usize),
    #[error("config file is not valid UTF-8")]
    Utf8,
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        err!(Io, "{e}")
    }
}

/// Splits `text` into (body, stored checksum) if a trailing checksum line is
/// present.
fn split_checksum(text: &str) -> (&str, Option<Result<u32, ()>>) {
    let trimmed = text.trim_end_matches('\n');
    let line_start = trimmed.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let last = &trimmed[line_start..];
    if let Some(hex) = last.strip_prefix(CHECKSUM_PREFIX) {
        let parsed = u32::from_str_radix(hex.trim(), 16).map_err(|_| ());
        (&text[..line_start], Some(parsed))
    } else {
        (text, None)
    }
}

/// Walks INI entries in `body`, invoking `f(section, key, value)` for each.
/// Malformed non-empty lines are reported as `("", line, "")`.
fn for_each_entry(body: &str, mut f: impl FnMut(&str, &str, &str)) {
    let mut section = String::new();
    for raw_line in body.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_ascii_lowercase();
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => f(&section, key.trim(), value.trim()),
            None => f("", line, ""),
        }
    }
}

/// Loads `path` into the runtime.
///
/// Unknown keys are ignored in memory (and preserved by the next save);
/// invalid values are skipped with a warning and the result is `Degraded`.
/// A missing file applies defaults silently; corruption (bad UTF-8, bad
/// checksum, oversize) applies defaults and returns an `Io` error so the
/// caller can surface degraded state while continuing to run.
pub fn load(path: &Path, rt: &ConfigRuntime) -> Result<LoadOutcome, Error> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("no config at {}; using defaults", path.display());
            rt.mark_loaded();
            return Ok(LoadOutcome::DefaultsApplied);
        }
        Err(e) => {
            rt.apply_defaults();
            return Err(StorageError::Io(e).into());
        }
    };
    match load_bytes(&bytes, rt) {
        Ok(outcome) => {
            rt.mark_loaded();
            Ok(outcome)
        }
        Err(e) => {
            warn!("config load failed ({e}); applying defaults");
            rt.apply_defaults();
            Err(e.into())
        }
    }
}

fn load_bytes(bytes: &[u8], rt: &ConfigRuntime) -> Result<LoadOutcome, StorageError> {
    if bytes.len() > MAX_FILE_BYTES {
        return Err(StorageError::TooLarge(bytes.len()));
    }
    let text = std::str::from_utf8(bytes).map_err(|_| StorageError::Utf8)?;
    let (body, checksum) = split_checksum(text);
    match checksum {
        Some(Ok(stored)) => {
            let actual = crc32fast::hash(body.as_bytes());
            if stored != actual {
                warn!("checksum mismatch: stored {stored:08x}, computed {actual:08x}");
                return Err(StorageError::ChecksumMismatch);
            }
        }
        Some(Err(())) => {
            warn!("unparseable checksum line");
            return Err(StorageError::ChecksumMismatch);
        }
        None => {} // legacy file without a checksum; accepted
    }

    let mut degraded = false;
    for_each_entry(body, |section, key, value| {
        if section.is_empty() {
            warn!("skipping malformed line {key:?}");
            degraded = true;
            return;
        }
        if section == "users" {
            if let Err(e) = rt.users().insert_from_ini(key, value) {
                warn!("users:{key}: {e}");
                degraded = true;
            }
            return;
        }
        match rt.set_raw_unqueued(section, key, value) {
            Ok(()) => {}
            Err(e) if e.kind() == base::ErrorKind::NotFound => {
                debug!("preserving unknown key {section}:{key}");
            }
            Err(e) => {
                warn!("{section}:{key}={value}: {e}");
                degraded = true;
            }
        }
    });
    Ok(if degraded {
        LoadOutcome::Degraded
    } else {
        LoadOutcome::Clean
    })
}

/// Serializes all non-default fields (plus preserved unknown keys from the
/// file currently on disk) and writes them atomically over `path`.
pub fn save(path: &Path, rt: &ConfigRuntime) -> Result<(), Error> {
    // Collect unknown keys to merge, from whatever is on disk right now.
    let mut preserved: Vec<(String, String, String)> = Vec::new();
    if let Ok(bytes) = fs::read(path) {
        if let Ok(text) = std::str::from_utf8(&bytes) {
            let (old_body, _) = split_checksum(text);
            for_each_entry(old_body, |section, key, value| {
                if section.is_empty() || section == "users" {
                    return;
                }
                let known = SCHEMA
                    .iter()
                    .any(|e| e.section == section && e.key.eq_ignore_ascii_case(key));
                if !known {
                    preserved.push((section.to_owned(), key.to_owned(), value.to_owned()));
                }
            });
        }
    }

    let snapshot = rt.snapshot();
    let mut body = String::with_capacity(1024);
    let mut extra_sections: Vec<&str> = preserved
        .iter()
        .map(|(s, _, _)| s.as_str())
        .filter(|s| !SECTIONS.contains(s))
        .collect();
    extra_sections.sort_unstable();
    extra_sections.dedup();

    for &section in SECTIONS.iter().chain(extra_sections.iter()) {
        let mut lines: Vec<String> = Vec::new();
        if section == "users" {
            for (name, value) in rt.users().to_ini() {
                lines.push(format!("{name} = {value}"));
            }
        } else {
            for e in SCHEMA.iter().filter(|e| e.section == section) {
                let current = (e.get)(&snapshot);
                if e.required || current != e.default_value() {
                    lines.push(format!("{} = {}", e.key, current));
                }
            }
        }
        for (_, k, v) in preserved.iter().filter(|(s, _, _)| s == section) {
            lines.push(format!("{k} = {v}"));
        }
        if !lines.is_empty() {
            body.push('[');
            body.push_str(section);
            body.push_str("]\n");
            for l in lines {
                body.push_str(&l);
                body.push('\n');
            }
            body.push('\n');
        }
    }

    let crc = crc32fast::hash(body.as_bytes());
    write_atomic(path, &body, crc).map_err(|e| {
        warn!("save of {} failed: {e}", path.display());
        Error::from(e)
    })
}

fn write_atomic(path: &Path, body: &str, crc: u32) -> Result<(), StorageError> {
    let tmp = path.with_extension("ini.tmp");
    let result = (|| {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(body.as_bytes())?;
        f.write_all(format!("{CHECKSUM_PREFIX}{crc:08x}\n").as_bytes())?;
        f.sync_all()?;
        fs::rename(&tmp, path)?;
        if let Some(dir) = path.parent() {
            // Persist the rename itself; ignore filesystems that refuse to
            // fsync a directory handle.
            if let Ok(d) = fs::File::open(dir) {
                let _ = d.sync_all();
            }
        }
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Drains the runtime's persistence queue into a save. Returns `Ok(true)` if
/// a write happened. On failure the queue is re-armed and in-memory values
/// keep their new contents.
pub fn flush(path: &Path, rt: &ConfigRuntime) -> Result<bool, Error> {
    let pending = rt.take_pending();
    if pending.is_empty() {
        return Ok(false);
    }
    match save(path, rt) {
        Ok(()) => Ok(true),
        Err(e) => {
            rt.requeue(pending);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn tmp_config() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::Builder::new()
            .prefix("onvifd-conf-test")
            .tempdir()
            .unwrap();
        let path = dir.path().join("onvif.ini");
        (dir, path)
    }

    #[test]
    fn save_load_round_trip() {
        testutil::init();
        let (_dir, path) = tmp_config();
        let rt = ConfigRuntime::new();
        rt.set_int("imaging", "brightness", 75).unwrap();
        rt.set_str("onvif", "device_name", "porch-cam").unwrap();
        rt.set_bool("imaging", "flip", true).unwrap();
        rt.set_float("ptz", "speed_pan", 0.25).unwrap();
        assert!(flush(&path, &rt).unwrap());
        assert_eq!(rt.pending_len(), 0);

        let rt2 = ConfigRuntime::new();
        assert_eq!(load(&path, &rt2).unwrap(), LoadOutcome::Clean);
        assert_eq!(*rt2.snapshot(), *rt.snapshot());
        assert!(rt2.generation() > 0);
    }

    #[test]
    fn checksum_on_disk_is_valid_crc32() {
        testutil::init();
        let (_dir, path) = tmp_config();
        let rt = ConfigRuntime::new();
        rt.set_int("imaging", "contrast", 42).unwrap();
        flush(&path, &rt).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let (body, checksum) = split_checksum(&text);
        assert_eq!(checksum.unwrap().unwrap(), crc32fast::hash(body.as_bytes()));
    }

    #[test]
    fn corrupt_last_byte_recovers_with_defaults() {
        testutil::init();
        let (_dir, path) = tmp_config();
        let rt = ConfigRuntime::new();
        rt.set_int("imaging", "brightness", 75).unwrap();
        flush(&path, &rt).unwrap();

        // Overwrite the last byte of the checksum line.
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 2; // before trailing \n
        bytes[last] = if bytes[last] == b'0' { b'1' } else { b'0' };
        fs::write(&path, &bytes).unwrap();

        let rt2 = ConfigRuntime::new();
        let e = load(&path, &rt2).unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::Io);
        // Defaults in effect; daemon keeps working.
        assert_eq!(rt2.get_int("imaging", "brightness").unwrap(), 50);
    }

    #[test]
    fn body_corruption_fails_checksum() {
        testutil::init();
        let (_dir, path) = tmp_config();
        let rt = ConfigRuntime::new();
        rt.set_int("imaging", "brightness", 75).unwrap();
        flush(&path, &rt).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let pos = bytes.iter().position(|&b| b == b'7').unwrap();
        bytes[pos] = b'9';
        fs::write(&path, &bytes).unwrap();

        let rt2 = ConfigRuntime::new();
        load(&path, &rt2).unwrap_err();
    }

    #[test]
    fn invalid_entry_degrades_but_loads_rest() {
        testutil::init();
        let (_dir, path) = tmp_config();
        fs::write(
            &path,
            "[imaging]\nbrightness = 400\ncontrast = 61\n\n[network]\nhttp_port = 8081\n",
        )
        .unwrap();
        let rt = ConfigRuntime::new();
        assert_eq!(load(&path, &rt).unwrap(), LoadOutcome::Degraded);
        assert_eq!(rt.get_int("imaging", "brightness").unwrap(), 50); // skipped
        assert_eq!(rt.get_int("imaging", "contrast").unwrap(), 61);
        assert_eq!(rt.get_int("network", "http_port").unwrap(), 8081);
    }

    #[test]
    fn parser_accepts_comments_case_and_last_wins() {
        testutil::init();
        let (_dir, path) = tmp_config();
        fs::write(
            &path,
            "# comment\n; also comment\n[Imaging]\n  BRIGHTNESS =  10  \nbrightness = 20\n",
        )
        .unwrap();
        let rt = ConfigRuntime::new();
        assert_eq!(load(&path, &rt).unwrap(), LoadOutcome::Clean);
        assert_eq!(rt.get_int("imaging", "brightness").unwrap(), 20);
    }

    #[test]
    fn unknown_keys_survive_save() {
        testutil::init();
        let (_dir, path) = tmp_config();
        fs::write(
            &path,
            "[imaging]\nbrightness = 75\nvendor_tweak = 3\n\n[vendor]\nmagic = on\n",
        )
        .unwrap();
        let rt = ConfigRuntime::new();
        assert_eq!(load(&path, &rt).unwrap(), LoadOutcome::Clean);
        rt.set_int("imaging", "contrast", 70).unwrap();
        flush(&path, &rt).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("vendor_tweak = 3"));
        assert!(text.contains("[vendor]"));
        assert!(text.contains("magic = on"));
        assert!(text.contains("brightness = 75"));
        assert!(text.contains("contrast = 70"));
    }

    #[test]
    fn missing_file_applies_defaults() {
        testutil::init();
        let (_dir, path) = tmp_config();
        let rt = ConfigRuntime::new();
        assert_eq!(load(&path, &rt).unwrap(), LoadOutcome::DefaultsApplied);
        assert_eq!(rt.get_int("network", "http_port").unwrap(), 8080);
    }

    #[test]
    fn failed_save_leaves_previous_file_and_rearms_queue() {
        testutil::init();
        let (_dir, path) = tmp_config();
        let rt = ConfigRuntime::new();
        rt.set_int("imaging", "brightness", 75).unwrap();
        flush(&path, &rt).unwrap();

        // Block the tmp file with a directory so the next save fails.
        let tmp = path.with_extension("ini.tmp");
        fs::create_dir(&tmp).unwrap();
        rt.set_int("imaging", "brightness", 80).unwrap();
        flush(&path, &rt).unwrap_err();
        assert_eq!(rt.pending_len(), 1); // re-armed
        assert_eq!(rt.get_int("imaging", "brightness").unwrap(), 80); // retained

        // Previous on-disk snapshot intact.
        let rt2 = ConfigRuntime::new();
        assert_eq!(load(&path, &rt2).unwrap(), LoadOutcome::Clean);
        assert_eq!(rt2.get_int("imaging", "brightness").unwrap(), 75);

        // Unblock and the queue drains.
        fs::remove_dir(&tmp).unwrap();
        assert!(flush(&path, &rt).unwrap());
        let rt3 = ConfigRuntime::new();
        load(&path, &rt3).unwrap();
        assert_eq!(rt3.get_int("imaging", "brightness").unwrap(), 80);
    }

    #[test]
    fn users_round_trip_through_file() {
        testutil::init();
        let (_dir, path) = tmp_config();
        let rt = ConfigRuntime::new();
        let rng = base::rng::SeqRng::new(11);
        rt.ensure_bootstrap_user(&rng).unwrap();
        rt.register_user("viewer", "pw123", crate::AccessLevel::User, &rng)
            .unwrap();
        save(&path, &rt).unwrap();

        let rt2 = ConfigRuntime::new();
        assert_eq!(load(&path, &rt2).unwrap(), LoadOutcome::Clean);
        rt2.verify_user("admin", "admin").unwrap();
        rt2.verify_user("viewer", "pw123").unwrap();
        rt2.verify_user("viewer", "nope").unwrap_err();
    }

    #[test]
    fn oversize_file_rejected() {
        testutil::init();
        let (_dir, path) = tmp_config();
        fs::write(&path, "#".repeat(MAX_FILE_BYTES + 1)).unwrap();
        let rt = ConfigRuntime::new();
        load(&path, &rt).unwrap_err();
    }

    #[test]
    fn file_without_checksum_is_accepted() {
        testutil::init();
        let (_dir, path) = tmp_config();
        fs::write(&path, "[imaging]\nbrightness = 75\n").unwrap();
        let rt = ConfigRuntime::new();
        assert_eq!(load(&path, &rt).unwrap(), LoadOutcome::Clean);
        assert_eq!(rt.get_int("imaging", "brightness").unwrap(), 75);
    }
}
