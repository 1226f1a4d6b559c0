// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! RTSP request/response text protocol (RFC 2326 framing).

use std::fmt::Write as _;

/// A parsed RTSP request. Header lookup is case-insensitive.
#[derive(Debug)]
pub struct RtspRequest {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum RtspParseError {
    #[error("empty request")]
    Empty,
    #[error("invalid request line")]
    RequestLine,
    #[error("invalid header line")]
    Header,
}

impl RtspRequest {
    pub fn parse(raw: &str) -> Result<Self, RtspParseError> {
        let mut lines = raw.lines();
        let request_line = lines.next().ok_or(RtspParseError::Empty)?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(RtspParseError::RequestLine);
        }
        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let colon = line.find(':').ok_or(RtspParseError::Header)?;
            headers.push((
                line[..colon].trim().to_owned(),
                line[colon + 1..].trim().to_owned(),
            ));
        }
        Ok(RtspRequest {
            method: parts[0].to_owned(),
            uri: parts[1].to_owned(),
            version: parts[2].to_owned(),
            headers,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn cseq(&self) -> &str {
        self.header("CSeq").unwrap_or("0")
    }

    /// `Session` header value with any `;timeout=` suffix stripped.
    pub fn session_id(&self) -> Option<&str> {
        self.header("Session")
            .map(|s| s.split(';').next().unwrap_or(s).trim())
    }

    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

#[must_use]
pub struct RtspResponse {
    pub status: u16,
    pub reason: &'static str,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl RtspResponse {
    pub fn new(status: u16, reason: &'static str) -> Self {
        RtspResponse {
            status,
            reason,
            headers: vec![(
                "Server".to_owned(),
                crate::httpx::response::SERVER.to_owned(),
            )],
            body: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    pub fn bad_request() -> Self {
        Self::new(400, "Bad Request")
    }

    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
    }

    pub fn session_not_found() -> Self {
        Self::new(454, "Session Not Found")
    }

    pub fn bad_state() -> Self {
        Self::new(455, "Method Not Valid in This State")
    }

    pub fn unsupported_transport() -> Self {
        Self::new(461, "Unsupported Transport")
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn body(mut self, content_type: &str, body: String) -> Self {
        self.headers
            .push(("Content-Type".to_owned(), content_type.to_owned()));
        self.body = Some(body);
        self
    }

    pub fn serialize(&self) -> String {
        let mut out = format!("RTSP/1.0 {} {}\r\n", self.status, self.reason);
        for (n, v) in &self.headers {
            let _ = write!(out, "{n}: {v}\r\n");
        }
        match &self.body {
            Some(body) => {
                let _ = write!(out, "Content-Length: {}\r\n\r\n{}", body.len(), body);
            }
            None => out.push_str("\r\n"),
        }
        out
    }
}
