// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! HTTP response construction and serialization.
//!
//! Error bodies stay minimal: a short reason or a SOAP fault, never file
//! paths or internals. The only identifying detail is the opaque
//! `X-Request-Id` correlation header the service layer attaches.

use std::fmt::Write as _;

pub const SERVER: &str = concat!("onvifd/", env!("CARGO_PKG_VERSION"));

pub const CT_SOAP: &str = "application/soap+xml; charset=utf-8";
pub const CT_TEXT: &str = "text/plain";
pub const CT_JPEG: &str = "image/jpeg";

pub fn reason_for(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

/// Formats an RFC 1123 `Date` header value.
pub fn http_date(ts: jiff::Timestamp) -> String {
    ts.strftime("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[derive(Debug)]
pub struct Response {
    pub status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    content_type: &'static str,
    chunked: bool,
    /// Ask the connection layer to close after writing.
    pub close: bool,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Response {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            content_type: CT_TEXT,
            chunked: false,
            close: false,
        }
    }

    pub fn plain(status: u16, body: &str) -> Self {
        let mut r = Response::new(status);
        r.body = body.as_bytes().to_vec();
        r
    }

    pub fn soap(status: u16, xml: String) -> Self {
        let mut r = Response::new(status);
        r.content_type = CT_SOAP;
        r.body = xml.into_bytes();
        r
    }

    pub fn jpeg(bytes: Vec<u8>) -> Self {
        let mut r = Response::new(200);
        r.content_type = CT_JPEG;
        r.body = bytes;
        // Collaborator-sized payload; stream it chunked like any other
        // unbounded body.
        r.chunked = true;
        r
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_close(mut self) -> Self {
        self.close = true;
        self
    }

    /// Serializes status line, headers, and body. `date` is the RFC 1123
    /// wall-clock string (passed in so the clock stays injectable).
    pub fn serialize(&self, date: &str) -> Vec<u8> {
        let mut head = String::with_capacity(256);
        let _ = write!(
            head,
            "HTTP/1.1 {} {}\r\nServer: {}\r\nDate: {}\r\n",
            self.status,
            reason_for(self.status),
            SERVER,
            date,
        );
        for (n, v) in &self.headers {
            let _ = write!(head, "{n}: {v}\r\n");
        }
        let _ = write!(head, "Content-Type: {}\r\n", self.content_type);
        if self.close {
            head.push_str("Connection: close\r\n");
        }
        if self.chunked {
            head.push_str("Transfer-Encoding: chunked\r\n\r\n");
            let mut out = head.into_bytes();
            if !self.body.is_empty() {
                out.extend_from_slice(format!("{:x}\r\n", self.body.len()).as_bytes());
                out.extend_from_slice(&self.body);
                out.extend_from_slice(b"\r\n");
            }
            out.extend_from_slice(b"0\r\n\r\n");
            out
        } else {
            let _ = write!(head, "Content-Length: {}\r\n\r\n", self.body.len());
            let mut out = head.into_bytes();
            out.extend_from_slice(&self.body);
            out
        }
    }
}
