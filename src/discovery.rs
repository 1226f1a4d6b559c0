// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! WS-Discovery responder: answers Probe messages on UDP 3702 so clients
//! can find the device without knowing its address. Config-gated via
//! `[onvif] discoverable`.

use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use base::rng::Rng;
use base::shutdown;
use base::strutil;
use conf::ConfigRuntime;
use md5::{Digest as _, Md5};
use tracing::{debug, info, warn};

use crate::soap::xml::{self, escape};

pub const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const PORT: u16 = 3702;

/// Stable device identity derived from the serial number, formatted as a
/// UUID so clients can correlate re-probes.
pub fn device_uuid(serial: &str) -> String {
    let digest: [u8; 16] = Md5::digest(serial.as_bytes()).into();
    let h = strutil::hex(&digest);
    format!(
        "{}-{}-{}-{}-{}",
        &h[0..8],
        &h[8..12],
        &h[12..16],
        &h[16..20],
        &h[20..32]
    )
}

/// A parsed Probe worth answering.
pub struct Probe {
    pub message_id: String,
}

/// Extracts the Probe, filtering on the Types we implement.
pub fn parse_probe(body: &str) -> Option<Probe> {
    let doc = roxmltree::Document::parse(body).ok()?;
    let root = doc.root_element();
    xml::find(root, "Probe")?;
    let types = xml::find_text(root, "Types").unwrap_or("");
    if !types.is_empty()
        && !types.contains("NetworkVideoTransmitter")
        && !types.contains("Device")
    {
        return None;
    }
    Some(Probe {
        message_id: xml::find_text(root, "MessageID").unwrap_or("").to_owned(),
    })
}

pub fn probe_match(
    probe: &Probe,
    uuid: &str,
    msg_uuid: &str,
    device_name: &str,
    xaddr: &str,
) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope""#,
            r#" xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing""#,
            r#" xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery""#,
            r#" xmlns:dn="http://www.onvif.org/ver10/network/wsdl">"#,
            "<s:Header>",
            "<wsa:MessageID>urn:uuid:{msg_uuid}</wsa:MessageID>",
            "<wsa:RelatesTo>{relates}</wsa:RelatesTo>",
            "<wsa:To>http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</wsa:To>",
            "<wsa:Action>http://schemas.xmlsoap.org/ws/2005/04/discovery/ProbeMatches</wsa:Action>",
            "</s:Header><s:Body>",
            "<d:ProbeMatches><d:ProbeMatch>",
            "<wsa:EndpointReference><wsa:Address>urn:uuid:{uuid}</wsa:Address></wsa:EndpointReference>",
            "<d:Types>dn:NetworkVideoTransmitter</d:Types>",
            "<d:Scopes>onvif://www.onvif.org/name/{name}</d:Scopes>",
            "<d:XAddrs>{xaddr}</d:XAddrs>",
            "<d:MetadataVersion>1</d:MetadataVersion>",
            "</d:ProbeMatch></d:ProbeMatches>",
            "</s:Body></s:Envelope>"
        ),
        msg_uuid = msg_uuid,
        relates = escape(&probe.message_id),
        uuid = uuid,
        name = escape(device_name),
        xaddr = xaddr,
    )
}

/// Responder loop; run on its own thread. Exits on shutdown.
pub fn run(rt: Arc<ConfigRuntime>, rng: Arc<dyn Rng>, shutdown_rx: shutdown::Receiver) {
    let socket = match bind() {
        Ok(s) => s,
        Err(e) => {
            warn!(err = %e, "ws-discovery unavailable");
            return;
        }
    };
    info!("ws-discovery listening on {}:{}", MULTICAST_ADDR, PORT);
    let mut buf = [0u8; 8192];
    loop {
        if shutdown_rx.check().is_err() {
            break;
        }
        let (n, peer) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                warn!(err = %e, "ws-discovery recv failed");
                break;
            }
        };
        let snapshot = rt.snapshot();
        if !snapshot.discoverable {
            continue;
        }
        let Ok(body) = std::str::from_utf8(&buf[..n]) else {
            continue;
        };
        let Some(probe) = parse_probe(body) else {
            continue;
        };
        // Learn which local address faces this client.
        let local_ip = UdpSocket::bind("0.0.0.0:0")
            .and_then(|s| {
                s.connect(peer)?;
                s.local_addr()
            })
            .map(|a| a.ip().to_string())
            .unwrap_or_else(|_| snapshot.bind_addr.clone());
        let xaddr = format!("http://{}:{}/onvif/device_service", local_ip, snapshot.http_port);
        let msg_uuid = device_uuid(&format!("{:016x}", rng.u64()));
        let reply = probe_match(
            &probe,
            &device_uuid(&snapshot.serial_number),
            &msg_uuid,
            &snapshot.device_name,
            &xaddr,
        );
        debug!(%peer, "answering ws-discovery probe");
        if let Err(e) = socket.send_to(reply.as_bytes(), peer) {
            debug!(err = %e, "probe match send failed");
        }
    }
    info!("ws-discovery stopped");
}

fn bind() -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, PORT))?;
    socket.join_multicast_v4(&MULTICAST_ADDR, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_read_timeout(Some(Duration::from_secs(1)))?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Envelope xmlns="http://www.w3.org/2003/05/soap-envelope" xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
  <Header>
    <wsa:MessageID xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing">urn:uuid:abc-123</wsa:MessageID>
  </Header>
  <Body>
    <Probe xmlns="http://schemas.xmlsoap.org/ws/2005/04/discovery">
      <Types>dn:NetworkVideoTransmitter</Types>
      <Scopes/>
    </Probe>
  </Body>
</Envelope>"#;

    #[test]
    fn parses_probe_and_relates_reply() {
        let probe = parse_probe(PROBE).expect("probe parsed");
        assert_eq!(probe.message_id, "urn:uuid:abc-123");

        let reply = probe_match(
            &probe,
            "00000000-0000-0000-0000-000000000000",
            "11111111-1111-1111-1111-111111111111",
            "ONVIF-Camera",
            "http://192.0.2.1:8080/onvif/device_service",
        );
        assert!(reply.contains("<wsa:RelatesTo>urn:uuid:abc-123</wsa:RelatesTo>"));
        assert!(reply.contains("<d:XAddrs>http://192.0.2.1:8080/onvif/device_service</d:XAddrs>"));
        assert!(reply.contains("dn:NetworkVideoTransmitter"));
    }

    #[test]
    fn ignores_probes_for_other_device_types() {
        let other = PROBE.replace("dn:NetworkVideoTransmitter", "x:Printer");
        assert!(parse_probe(&other).is_none());
        assert!(parse_probe("not xml").is_none());
    }

    #[test]
    fn device_uuid_is_stable_and_shaped() {
        let a = device_uuid("00000000");
        let b = device_uuid("00000000");
        assert_eq!(a, b);
        assert_eq!(a.len(), 36);
        assert_eq!(a.matches('-').count(), 4);
        assert_ne!(device_uuid("00000001"), a);
    }
}
