// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Logic for setting up a `tracing` subscriber according to our preferences.
//!
//! Lines follow the fixed operator format
//! `YYYY-MM-DD HH:MM:SS,mmm LEVEL [HOSTNAME] target message`, capped at
//! 1024 bytes with control characters scrubbed. Helpers here are also the
//! single place where sensitive header/SOAP values get redacted before they
//! can reach a formatter.

use std::sync::OnceLock;

use tracing::error;
use tracing_core::{Event, Level, Subscriber};
use tracing_log::NormalizeEvent;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    Layer,
};

/// Longest line emitted, in bytes, including the trailing newline's absence.
const MAX_LINE: usize = 1024;

struct FormatOnvif;

fn level_str(level: Level) -> &'static str {
    match level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        Level::ERROR => "ERROR",
    }
}

fn hostname() -> &'static str {
    static HOSTNAME: OnceLock<String> = OnceLock::new();
    HOSTNAME.get_or_init(|| {
        let mut buf = [0u8; 256];
        let rv = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
        if rv != 0 {
            return "localhost".to_owned();
        }
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        String::from_utf8_lossy(&buf[..len]).into_owned()
    })
}

/// Replaces control characters (other than `\t`) and DEL with spaces.
fn scrub(line: &mut String) {
    // Safety: replacing single-byte ASCII values in place keeps valid UTF-8.
    unsafe {
        for b in line.as_mut_vec() {
            if (*b < 0x20 && *b != b'\t') || *b == 0x7f {
                *b = b' ';
            }
        }
    }
    if line.len() > MAX_LINE {
        let mut cut = MAX_LINE;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line.truncate(cut);
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for FormatOnvif
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let normalized_meta = event.normalized_metadata();
        let meta = normalized_meta.as_ref().unwrap_or_else(|| event.metadata());

        let now = jiff::Timestamp::now();
        let mut line = format!(
            "{},{:03} {} [{}] {} ",
            now.strftime("%Y-%m-%d %H:%M:%S"),
            now.subsec_millisecond(),
            level_str(*meta.level()),
            hostname(),
            meta.target(),
        );
        ctx.format_fields(Writer::new(&mut line), event)?;
        scrub(&mut line);
        writeln!(writer, "{line}")
    }
}

/// Field names whose values never appear in a log line.
fn is_sensitive_field(name: &str) -> bool {
    let mut normalized = String::with_capacity(name.len());
    for c in name.chars() {
        if c != '-' && c != '_' {
            normalized.extend(c.to_lowercase());
        }
    }
    normalized == "authorization"
        || normalized.contains("password")
        || normalized.contains("secret")
        || normalized.contains("token")
        || normalized.contains("apikey")
}

/// Returns the loggable form of an HTTP header value.
pub fn redact_header_value<'a>(name: &str, value: &'a str) -> &'a str {
    if is_sensitive_field(name) {
        "<REDACTED>"
    } else {
        value
    }
}

/// Returns `body` with the inner text of any `Password` element (any
/// namespace prefix) replaced, suitable for SOAP body logging.
pub fn redact_soap(body: &str) -> String {
    const LOCAL: &str = "Password";
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(lt) = rest.find('<') {
        let tag = &rest[lt + 1..];
        let name_end = tag
            .find(|c: char| c == '>' || c == '/' || c.is_ascii_whitespace())
            .unwrap_or(tag.len());
        let name = &tag[..name_end];
        let local = name.rsplit(':').next().unwrap_or(name);
        if local != LOCAL {
            out.push_str(&rest[..lt + 1]);
            rest = &rest[lt + 1..];
            continue;
        }
        // Copy through the end of the opening tag, then drop everything up to
        // the matching close tag.
        let Some(open_end) = tag.find('>') else {
            break;
        };
        let open_end = lt + 1 + open_end + 1;
        out.push_str(&rest[..open_end]);
        rest = &rest[open_end..];
        if out.ends_with("/>") {
            continue; // self-closing, no inner text
        }
        match rest.find("</") {
            Some(close) => {
                out.push_str("***REDACTED***");
                rest = &rest[close..];
            }
            None => {
                out.push_str("***REDACTED***");
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Custom panic hook that logs instead of directly writing to stderr, so the
/// line carries a timestamp and survives log collection.
fn panic_hook(p: &std::panic::PanicHookInfo) {
    let payload: Option<&str> = if let Some(s) = p.payload().downcast_ref::<&str>() {
        Some(*s)
    } else if let Some(s) = p.payload().downcast_ref::<String>() {
        Some(s)
    } else {
        None
    };
    error!(
        target: std::env!("CARGO_CRATE_NAME"),
        location = p.location().map(tracing::field::display),
        payload = payload.map(tracing::field::display),
        "panic",
    );
}

/// Builds the level filter from `ONVIF_LOG_LEVEL`.
///
/// `notice` folds into `info` and `fatal` into `error`; those levels exist
/// in the operator-facing scale but not in `tracing`.
fn env_filter() -> tracing_subscriber::EnvFilter {
    let directive = match std::env::var("ONVIF_LOG_LEVEL").ok().as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("notice") => "info",
        Some("warning") => "warn",
        Some("error") | Some("fatal") => "error",
        _ => "info",
    };
    tracing_subscriber::EnvFilter::builder().parse_lossy(directive)
}

pub fn install() {
    tracing_log::LogTracer::init().unwrap();
    let sub = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::Layer::new()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .event_format(FormatOnvif)
            .with_filter(env_filter()),
    );
    tracing::subscriber::set_global_default(sub).unwrap();
    std::panic::set_hook(Box::new(&panic_hook));
}

pub fn install_for_tests() {
    let sub = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::Layer::new()
            .with_test_writer()
            .with_ansi(false)
            .event_format(FormatOnvif)
            .with_filter(env_filter()),
    );
    let _ = tracing::subscriber::set_global_default(sub);
}
