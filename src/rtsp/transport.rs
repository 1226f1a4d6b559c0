// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! RTSP `Transport` header negotiation and the server RTP port pool.

use std::sync::atomic::{AtomicU32, Ordering};

const PORT_MIN: u32 = 5000;
const PORT_MAX: u32 = 65534;

/// The client's transport request, as far as this server supports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportRequest {
    /// `RTP/AVP` (UDP unicast) with the client's port pair.
    Udp { client_rtp: u16, client_rtcp: u16 },
    /// `RTP/AVP/TCP` interleaved on the RTSP connection.
    Tcp { rtp_ch: u8, rtcp_ch: u8 },
}

/// Parses a Transport header. `None` means 461 Unsupported Transport.
pub fn parse(header: &str) -> Option<TransportRequest> {
    let mut parts = header.split(';');
    let proto = parts.next()?.trim();
    match proto {
        "RTP/AVP" | "RTP/AVP/UDP" => {
            if header.contains("multicast") {
                return None;
            }
            for p in parts {
                let p = p.trim();
                if let Some(ports) = p.strip_prefix("client_port=") {
                    let (rtp, rtcp) = ports.split_once('-')?;
                    return Some(TransportRequest::Udp {
                        client_rtp: rtp.parse().ok()?,
                        client_rtcp: rtcp.parse().ok()?,
                    });
                }
            }
            None
        }
        "RTP/AVP/TCP" => {
            for p in parts {
                let p = p.trim();
                if let Some(chans) = p.strip_prefix("interleaved=") {
                    let (a, b) = chans.split_once('-')?;
                    return Some(TransportRequest::Tcp {
                        rtp_ch: a.parse().ok()?,
                        rtcp_ch: b.parse().ok()?,
                    });
                }
            }
            // Interleaved with no channel hint: assign the usual pair.
            Some(TransportRequest::Tcp {
                rtp_ch: 0,
                rtcp_ch: 1,
            })
        }
        _ => None,
    }
}

/// Monotonic allocator for even/odd server port pairs, wrapping at the top
/// of the range.
pub struct PortPool {
    next: AtomicU32,
}

impl PortPool {
    pub fn new() -> Self {
        PortPool {
            next: AtomicU32::new(PORT_MIN),
        }
    }

    pub fn allocate(&self) -> (u16, u16) {
        let rtp = self.next.fetch_add(2, Ordering::SeqCst);
        if rtp > PORT_MAX {
            self.next.store(PORT_MIN, Ordering::SeqCst);
            let rtp = self.next.fetch_add(2, Ordering::SeqCst);
            return (rtp as u16, rtp as u16 + 1);
        }
        (rtp as u16, rtp as u16 + 1)
    }
}

impl Default for PortPool {
    fn default() -> Self {
        Self::new()
    }
}
