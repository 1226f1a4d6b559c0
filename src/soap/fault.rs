// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! SOAP 1.2 fault construction and the error-kind → fault mapping.

use base::{Error, ErrorKind};

use super::xml::escape;

pub const ENV_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const TER_NS: &str = "http://www.onvif.org/ver10/error";
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// Wraps handler output in a response envelope with the namespaces the
/// service payloads use.
pub fn envelope(inner: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<env:Envelope xmlns:env="{env}""#,
            r#" xmlns:tt="http://www.onvif.org/ver10/schema""#,
            r#" xmlns:tds="http://www.onvif.org/ver10/device/wsdl""#,
            r#" xmlns:trt="http://www.onvif.org/ver10/media/wsdl""#,
            r#" xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl""#,
            r#" xmlns:timg="http://www.onvif.org/ver20/imaging/wsdl">"#,
            "<env:Body>{inner}</env:Body></env:Envelope>"
        ),
        env = ENV_NS,
        inner = inner,
    )
}

pub fn fault_xml(code: &str, subcode: &str, reason: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<env:Envelope xmlns:env="{env}" xmlns:ter="{ter}" xmlns:wsse="{wsse}">"#,
            "<env:Body><env:Fault>",
            "<env:Code><env:Value>env:{code}</env:Value>",
            "<env:Subcode><env:Value>{subcode}</env:Value></env:Subcode></env:Code>",
            r#"<env:Reason><env:Text xml:lang="en">{reason}</env:Text></env:Reason>"#,
            "</env:Fault></env:Body></env:Envelope>"
        ),
        env = ENV_NS,
        ter = TER_NS,
        wsse = WSSE_NS,
        code = code,
        subcode = subcode,
        reason = escape(reason),
    )
}

/// Subcode for a `NotFound`, picked from what the message names.
fn not_found_subcode(msg: &str) -> &'static str {
    if msg.contains("profile") {
        "ter:NoSuchProfile"
    } else if msg.contains("preset") {
        "ter:NoSuchPreset"
    } else if msg.contains("user") {
        "ter:UsernameMissing"
    } else {
        "ter:NoSuchService"
    }
}

/// Maps a handler error to `(http_status, fault_body)`.
///
/// Reasons are the error's own short message; kinds that might carry
/// internals (Io, Internal) get a fixed reason instead.
pub fn fault_for(e: &Error) -> (u16, String) {
    let msg = e.msg().unwrap_or("");
    match e.kind() {
        ErrorKind::Invalid | ErrorKind::Parse => {
            (400, fault_xml("Sender", "ter:InvalidArgVal", msg))
        }
        ErrorKind::NotFound => (400, fault_xml("Sender", not_found_subcode(msg), msg)),
        ErrorKind::NotSupported => (400, fault_xml("Sender", "ter:ActionNotSupported", msg)),
        ErrorKind::Auth => (
            401,
            fault_xml("Sender", "wsse:FailedAuthentication", "authentication failed"),
        ),
        ErrorKind::Resource | ErrorKind::Unavailable => (
            503,
            fault_xml("Receiver", "ter:NotAvailable", "temporarily unavailable"),
        ),
        _ => (
            500,
            fault_xml("Receiver", "ter:InternalError", "internal error"),
        ),
    }
}

/// The dispatch-miss fault from the action routing step.
pub fn action_not_supported(operation: &str) -> (u16, String) {
    (
        400,
        fault_xml(
            "Receiver",
            "ter:ActionNotSupported",
            &format!("no handler for {operation}"),
        ),
    )
}
