// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! SDP synthesis for DESCRIBE responses.
//!
//! Every parameter comes from the profile's capabilities (which in turn come
//! from the configuration snapshot): codec, clock rates, payload types,
//! frame rate, dimensions. Nothing here is a constant of the daemon.

use std::fmt::Write as _;

use crate::services::caps::ProfileCaps;

/// Track control suffixes referenced by SETUP URIs.
pub const VIDEO_CONTROL: &str = "video";
pub const AUDIO_CONTROL: &str = "audio";

pub fn synthesize(caps: &ProfileCaps, host_ip: &str, session_id: u64, device_name: &str) -> String {
    let mut sdp = String::with_capacity(512);
    let _ = write!(
        sdp,
        "v=0\r\n\
         o=- {session_id} 1 IN IP4 {host_ip}\r\n\
         s={device_name}\r\n\
         c=IN IP4 {host_ip}\r\n\
         t=0 0\r\n\
         a=control:*\r\n\
         a=sendonly\r\n"
    );
    let v = &caps.video;
    let _ = write!(
        sdp,
        "m=video 0 RTP/AVP {pt}\r\n\
         a=rtpmap:{pt} {rtpmap}\r\n\
         a=fmtp:{pt} packetization-mode=1\r\n\
         a=framerate:{fps}\r\n\
         a=x-dimensions:{w},{h}\r\n\
         a=control:{VIDEO_CONTROL}\r\n",
        pt = v.payload_type,
        rtpmap = v.rtpmap(),
        fps = v.fps,
        w = v.width,
        h = v.height,
    );
    if let Some(a) = &caps.audio {
        let _ = write!(
            sdp,
            "m=audio 0 RTP/AVP {pt}\r\n\
             a=rtpmap:{pt} {rtpmap}\r\n\
             a=control:{AUDIO_CONTROL}\r\n",
            pt = a.payload_type,
            rtpmap = a.rtpmap(),
        );
    }
    sdp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::caps;

    #[test]
    fn main_profile_sdp_shape() {
        let rt = conf::ConfigRuntime::new();
        let s = rt.snapshot();
        let main = caps::profile(&s, caps::MAIN_TOKEN).unwrap();
        let sdp = synthesize(&main, "192.0.2.1", 42, "ONVIF-Camera");

        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=- 42 1 IN IP4 192.0.2.1\r\n"));
        assert!(sdp.contains("s=ONVIF-Camera\r\n"));
        assert!(sdp.contains("c=IN IP4 192.0.2.1\r\n"));
        // The literal pair clients match on.
        assert!(sdp.contains("m=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\n"));
        assert!(sdp.contains("a=framerate:25\r\n"));
        assert!(sdp.contains("a=x-dimensions:1920,1080\r\n"));
        assert!(sdp.contains("m=audio 0 RTP/AVP 0\r\n"));
        assert!(sdp.contains("a=rtpmap:0 PCMU/8000\r\n"));
        assert!(sdp.ends_with("\r\n"));

        // Ordering: session attributes before media sections, rtpmap before fmtp.
        assert!(sdp.find("a=sendonly").unwrap() < sdp.find("m=video").unwrap());
        assert!(sdp.find("a=rtpmap:96").unwrap() < sdp.find("a=fmtp:96").unwrap());
    }

    #[test]
    fn sdp_tracks_config_not_constants() {
        let rt = conf::ConfigRuntime::new();
        rt.set_int("profiles", "sub_fps", 12).unwrap();
        rt.set_bool("profiles", "audio_enabled", false).unwrap();
        let s = rt.snapshot();
        let sub = caps::profile(&s, caps::SUB_TOKEN).unwrap();
        let sdp = synthesize(&sub, "10.0.0.2", 7, "cam");
        assert!(sdp.contains("a=framerate:12\r\n"));
        assert!(sdp.contains("a=x-dimensions:640,360\r\n"));
        assert!(!sdp.contains("m=audio"));
    }
}
