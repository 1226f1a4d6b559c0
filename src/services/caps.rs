// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Media capabilities derived from the configuration snapshot.
//!
//! This is the single translation point from config fields to what the SOAP
//! media service, the SDP synthesizer, and the stream router advertise;
//! nothing downstream hard-codes codecs, resolutions, or payload types.

use conf::Snapshot;

use crate::hal::EncoderParams;

pub const MAIN_TOKEN: &str = "MainProfile";
pub const SUB_TOKEN: &str = "SubProfile";

#[derive(Clone, Debug, PartialEq)]
pub struct VideoCaps {
    pub codec: String,
    pub width: i32,
    pub height: i32,
    pub fps: i32,
    pub bitrate_kbps: i32,
    pub payload_type: u8,
}

impl VideoCaps {
    /// `a=rtpmap` encoding name, e.g. `H264/90000`.
    pub fn rtpmap(&self) -> String {
        format!("{}/90000", self.codec.to_ascii_uppercase())
    }

    /// ONVIF `VideoEncoding` value.
    pub fn onvif_encoding(&self) -> &'static str {
        match self.codec.as_str() {
            "h265" => "H265",
            _ => "H264",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioCaps {
    pub codec: String,
    pub sample_rate: i32,
    pub payload_type: u8,
}

impl AudioCaps {
    pub fn rtpmap(&self) -> String {
        match self.codec.as_str() {
            "aac" => format!("MPEG4-GENERIC/{}", self.sample_rate),
            _ => format!("PCMU/{}", self.sample_rate),
        }
    }

    pub fn onvif_encoding(&self) -> &'static str {
        match self.codec.as_str() {
            "aac" => "AAC",
            _ => "G711",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProfileCaps {
    pub token: &'static str,
    pub name: &'static str,
    pub video: VideoCaps,
    pub audio: Option<AudioCaps>,
}

impl ProfileCaps {
    pub fn encoder_params(&self) -> EncoderParams {
        EncoderParams {
            codec: self.video.codec.clone(),
            width: self.video.width,
            height: self.video.height,
            fps: self.video.fps,
            bitrate_kbps: self.video.bitrate_kbps,
        }
    }
}

fn audio(s: &Snapshot) -> Option<AudioCaps> {
    if !s.audio_enabled {
        return None;
    }
    Some(AudioCaps {
        codec: s.audio_codec.clone(),
        sample_rate: s.audio_sample_rate,
        // Static PT 0 for PCMU at 8 kHz per RFC 3551; dynamic otherwise.
        payload_type: if s.audio_codec == "pcmu" && s.audio_sample_rate == 8000 {
            0
        } else {
            97
        },
    })
}

pub fn profiles(s: &Snapshot) -> [ProfileCaps; 2] {
    [
        ProfileCaps {
            token: MAIN_TOKEN,
            name: "Main",
            video: VideoCaps {
                codec: s.main_codec.clone(),
                width: s.main_width,
                height: s.main_height,
                fps: s.main_fps,
                bitrate_kbps: s.main_bitrate,
                payload_type: 96,
            },
            audio: audio(s),
        },
        ProfileCaps {
            token: SUB_TOKEN,
            name: "Sub",
            video: VideoCaps {
                codec: s.sub_codec.clone(),
                width: s.sub_width,
                height: s.sub_height,
                fps: s.sub_fps,
                bitrate_kbps: s.sub_bitrate,
                payload_type: 96,
            },
            audio: audio(s),
        },
    ]
}

pub fn profile(s: &Snapshot, token: &str) -> Option<ProfileCaps> {
    profiles(s).into_iter().find(|p| p.token == token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conf::ConfigRuntime;

    #[test]
    fn defaults_match_shipping_profiles() {
        let rt = ConfigRuntime::new();
        let s = rt.snapshot();
        let [main, sub] = profiles(&s);
        assert_eq!(main.token, "MainProfile");
        assert_eq!((main.video.width, main.video.height), (1920, 1080));
        assert_eq!(main.video.fps, 25);
        assert_eq!(main.video.bitrate_kbps, 2000);
        assert_eq!(main.video.rtpmap(), "H264/90000");
        assert_eq!(sub.token, "SubProfile");
        assert_eq!((sub.video.width, sub.video.height), (640, 360));
        assert_eq!(sub.video.fps, 15);
        assert_eq!(sub.video.bitrate_kbps, 512);
        let audio = main.audio.unwrap();
        assert_eq!(audio.payload_type, 0);
        assert_eq!(audio.rtpmap(), "PCMU/8000");
    }

    #[test]
    fn caps_track_config_changes() {
        let rt = ConfigRuntime::new();
        rt.set_int("profiles", "sub_fps", 10).unwrap();
        rt.set_bool("profiles", "audio_enabled", false).unwrap();
        let s = rt.snapshot();
        let sub = profile(&s, SUB_TOKEN).unwrap();
        assert_eq!(sub.video.fps, 10);
        assert!(sub.audio.is_none());
        assert!(profile(&s, "Ghost").is_none());
    }
}
