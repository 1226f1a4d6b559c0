// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Media service operations. Everything advertised here is derived from the
//! configuration snapshot via [`caps`]; there are no baked-in stream
//! parameters.

use std::fmt::Write as _;

use base::{err, Error};
use roxmltree::Node;

use super::caps::{self, ProfileCaps};
use crate::soap::xml::{escape, find_text};
use crate::soap::{Ctx, ReqCtx};

fn venc_token(profile: &str) -> String {
    format!("{profile}VideoEncoder")
}

fn profile_xml(p: &ProfileCaps) -> String {
    let mut out = format!(
        "<trt:Profiles token=\"{}\" fixed=\"true\"><tt:Name>{}</tt:Name>\
         <tt:VideoSourceConfiguration token=\"VideoSourceConfig\">\
         <tt:Name>VideoSourceConfig</tt:Name><tt:UseCount>2</tt:UseCount>\
         <tt:SourceToken>VideoSource0</tt:SourceToken>\
         <tt:Bounds x=\"0\" y=\"0\" width=\"{}\" height=\"{}\"/>\
         </tt:VideoSourceConfiguration>\
         <tt:VideoEncoderConfiguration token=\"{}\">\
         <tt:Name>{}</tt:Name><tt:UseCount>1</tt:UseCount>\
         <tt:Encoding>{}</tt:Encoding>\
         <tt:Resolution><tt:Width>{}</tt:Width><tt:Height>{}</tt:Height></tt:Resolution>\
         <tt:RateControl><tt:FrameRateLimit>{}</tt:FrameRateLimit>\
         <tt:EncodingInterval>1</tt:EncodingInterval>\
         <tt:BitrateLimit>{}</tt:BitrateLimit></tt:RateControl>\
         </tt:VideoEncoderConfiguration>",
        p.token,
        escape(p.name),
        p.video.width,
        p.video.height,
        venc_token(p.token),
        venc_token(p.token),
        p.video.onvif_encoding(),
        p.video.width,
        p.video.height,
        p.video.fps,
        p.video.bitrate_kbps,
    );
    if let Some(audio) = &p.audio {
        let _ = write!(
            out,
            "<tt:AudioEncoderConfiguration token=\"AudioEncoder\">\
             <tt:Name>AudioEncoder</tt:Name><tt:UseCount>2</tt:UseCount>\
             <tt:Encoding>{}</tt:Encoding>\
             <tt:Bitrate>64</tt:Bitrate>\
             <tt:SampleRate>{}</tt:SampleRate>\
             </tt:AudioEncoderConfiguration>",
            audio.onvif_encoding(),
            audio.sample_rate,
        );
    }
    out.push_str("</trt:Profiles>");
    out
}

pub fn get_profiles(ctx: &Ctx, _r: &ReqCtx, _op: Node) -> Result<String, Error> {
    let s = ctx.rt.snapshot();
    let mut out = String::from("<trt:GetProfilesResponse>");
    for p in caps::profiles(&s) {
        out.push_str(&profile_xml(&p));
    }
    out.push_str("</trt:GetProfilesResponse>");
    Ok(out)
}

fn required_profile(ctx: &Ctx, op: Node) -> Result<ProfileCaps, Error> {
    let token = find_text(op, "ProfileToken").ok_or_else(|| err!(Invalid, "missing ProfileToken"))?;
    caps::profile(&ctx.rt.snapshot(), token)
        .ok_or_else(|| err!(NotFound, "no such profile {token:?}"))
}

pub fn get_profile(ctx: &Ctx, _r: &ReqCtx, op: Node) -> Result<String, Error> {
    let p = required_profile(ctx, op)?;
    // Same payload, singular wrapper.
    let inner = profile_xml(&p)
        .replace("<trt:Profiles ", "<trt:Profile ")
        .replace("</trt:Profiles>", "</trt:Profile>");
    Ok(format!("<trt:GetProfileResponse>{inner}</trt:GetProfileResponse>"))
}

fn venc_xml(p: &ProfileCaps) -> String {
    format!(
        "<trt:Configurations token=\"{}\">\
         <tt:Name>{}</tt:Name><tt:UseCount>1</tt:UseCount>\
         <tt:Encoding>{}</tt:Encoding>\
         <tt:Resolution><tt:Width>{}</tt:Width><tt:Height>{}</tt:Height></tt:Resolution>\
         <tt:RateControl><tt:FrameRateLimit>{}</tt:FrameRateLimit>\
         <tt:EncodingInterval>1</tt:EncodingInterval>\
         <tt:BitrateLimit>{}</tt:BitrateLimit></tt:RateControl>\
         </trt:Configurations>",
        venc_token(p.token),
        venc_token(p.token),
        p.video.onvif_encoding(),
        p.video.width,
        p.video.height,
        p.video.fps,
        p.video.bitrate_kbps,
    )
}

pub fn get_video_encoder_configurations(ctx: &Ctx, _r: &ReqCtx, _op: Node) -> Result<String, Error> {
    let s = ctx.rt.snapshot();
    let mut out = String::from("<trt:GetVideoEncoderConfigurationsResponse>");
    for p in caps::profiles(&s) {
        out.push_str(&venc_xml(&p));
    }
    out.push_str("</trt:GetVideoEncoderConfigurationsResponse>");
    Ok(out)
}

pub fn get_video_encoder_configuration(ctx: &Ctx, _r: &ReqCtx, op: Node) -> Result<String, Error> {
    let token = find_text(op, "ConfigurationToken")
        .ok_or_else(|| err!(Invalid, "missing ConfigurationToken"))?;
    let s = ctx.rt.snapshot();
    let p = caps::profiles(&s)
        .into_iter()
        .find(|p| venc_token(p.token) == token)
        .ok_or_else(|| err!(NotFound, "no such profile configuration {token:?}"))?;
    let inner = venc_xml(&p)
        .replace("<trt:Configurations ", "<trt:Configuration ")
        .replace("</trt:Configurations>", "</trt:Configuration>");
    Ok(format!(
        "<trt:GetVideoEncoderConfigurationResponse>{inner}</trt:GetVideoEncoderConfigurationResponse>"
    ))
}

/// Applies resolution/frame-rate/bitrate changes through the config runtime,
/// which validates against the schema and persists.
pub fn set_video_encoder_configuration(ctx: &Ctx, _r: &ReqCtx, op: Node) -> Result<String, Error> {
    let config = op
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "Configuration")
        .ok_or_else(|| err!(Invalid, "missing Configuration"))?;
    let token = config
        .attribute("token")
        .ok_or_else(|| err!(Invalid, "Configuration without token"))?;
    let prefix = match token.strip_suffix("VideoEncoder") {
        Some(caps::MAIN_TOKEN) => "main",
        Some(caps::SUB_TOKEN) => "sub",
        _ => return Err(err!(NotFound, "no such profile configuration {token:?}")),
    };

    let set_int = |key: &str, value: Option<&str>| -> Result<(), Error> {
        let Some(v) = value else { return Ok(()) };
        let v: i32 = v
            .trim()
            .parse()
            .map_err(|_| err!(Invalid, "{key}: expected an integer"))?;
        ctx.rt.set_int("profiles", &format!("{prefix}_{key}"), v)
    };
    set_int("width", find_text(config, "Width"))?;
    set_int("height", find_text(config, "Height"))?;
    set_int("fps", find_text(config, "FrameRateLimit"))?;
    set_int("bitrate", find_text(config, "BitrateLimit"))?;
    if let Some(encoding) = find_text(config, "Encoding") {
        ctx.rt
            .set_str("profiles", &format!("{prefix}_codec"), &encoding.to_ascii_lowercase())?;
    }
    Ok("<trt:SetVideoEncoderConfigurationResponse/>".to_owned())
}

fn host_only(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(host);
    }
    host.split(':').next().unwrap_or(host)
}

pub fn get_stream_uri(ctx: &Ctx, r: &ReqCtx, op: Node) -> Result<String, Error> {
    let p = required_profile(ctx, op)?;
    let s = ctx.rt.snapshot();
    let uri = format!("rtsp://{}:{}/{}", host_only(&r.host), s.rtsp_port, p.token);
    Ok(format!(
        "<trt:GetStreamUriResponse><trt:MediaUri>\
         <tt:Uri>{uri}</tt:Uri>\
         <tt:InvalidAfterConnect>false</tt:InvalidAfterConnect>\
         <tt:InvalidAfterReboot>false</tt:InvalidAfterReboot>\
         <tt:Timeout>PT60S</tt:Timeout>\
         </trt:MediaUri></trt:GetStreamUriResponse>"
    ))
}

pub fn get_snapshot_uri(_ctx: &Ctx, r: &ReqCtx, _op: Node) -> Result<String, Error> {
    Ok(format!(
        "<trt:GetSnapshotUriResponse><trt:MediaUri>\
         <tt:Uri>http://{}/snapshot</tt:Uri>\
         <tt:InvalidAfterConnect>false</tt:InvalidAfterConnect>\
         <tt:InvalidAfterReboot>false</tt:InvalidAfterReboot>\
         <tt:Timeout>PT0S</tt:Timeout>\
         </trt:MediaUri></trt:GetSnapshotUriResponse>",
        r.host,
    ))
}

pub fn get_video_sources(ctx: &Ctx, _r: &ReqCtx, _op: Node) -> Result<String, Error> {
    let s = ctx.rt.snapshot();
    Ok(format!(
        "<trt:GetVideoSourcesResponse>\
         <trt:VideoSources token=\"VideoSource0\">\
         <tt:Framerate>{}</tt:Framerate>\
         <tt:Resolution><tt:Width>{}</tt:Width><tt:Height>{}</tt:Height></tt:Resolution>\
         </trt:VideoSources></trt:GetVideoSourcesResponse>",
        s.main_fps, s.main_width, s.main_height,
    ))
}

pub fn get_audio_encoder_configurations(ctx: &Ctx, _r: &ReqCtx, _op: Node) -> Result<String, Error> {
    let s = ctx.rt.snapshot();
    let mut out = String::from("<trt:GetAudioEncoderConfigurationsResponse>");
    if let Some(audio) = caps::profiles(&s)[0].audio.as_ref() {
        let _ = write!(
            out,
            "<trt:Configurations token=\"AudioEncoder\">\
             <tt:Name>AudioEncoder</tt:Name><tt:UseCount>2</tt:UseCount>\
             <tt:Encoding>{}</tt:Encoding><tt:Bitrate>64</tt:Bitrate>\
             <tt:SampleRate>{}</tt:SampleRate></trt:Configurations>",
            audio.onvif_encoding(),
            audio.sample_rate,
        );
    }
    out.push_str("</trt:GetAudioEncoderConfigurationsResponse>");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn doc(s: &str) -> roxmltree::Document<'_> {
        roxmltree::Document::parse(s).unwrap()
    }

    #[test]
    fn get_profiles_lists_main_and_sub() {
        let ctx = testutil::ctx();
        let d = doc("<GetProfiles/>");
        let out = get_profiles(&ctx, &testutil::req_ctx(), d.root_element()).unwrap();
        assert!(out.contains("token=\"MainProfile\""));
        assert!(out.contains("token=\"SubProfile\""));
        assert!(out.contains("<tt:Encoding>H264</tt:Encoding>"));
        assert!(out.contains("<tt:Width>1920</tt:Width>"));
        assert!(out.contains("<tt:Height>1080</tt:Height>"));
        assert!(out.contains("<tt:FrameRateLimit>25</tt:FrameRateLimit>"));
        assert!(out.contains("<tt:BitrateLimit>2000</tt:BitrateLimit>"));
        assert!(out.contains("<tt:Width>640</tt:Width>"));
        assert!(out.contains("<tt:FrameRateLimit>15</tt:FrameRateLimit>"));
        assert!(out.contains("<tt:BitrateLimit>512</tt:BitrateLimit>"));
    }

    #[test]
    fn stream_uri_built_from_config_and_host() {
        let ctx = testutil::ctx();
        let d = doc("<GetStreamUri><ProfileToken>MainProfile</ProfileToken></GetStreamUri>");
        let out = get_stream_uri(&ctx, &testutil::req_ctx(), d.root_element()).unwrap();
        assert!(out.contains("<tt:Uri>rtsp://cam.local:554/MainProfile</tt:Uri>"));
    }

    #[test]
    fn stream_uri_unknown_profile_is_not_found() {
        let ctx = testutil::ctx();
        let d = doc("<GetStreamUri><ProfileToken>Ghost</ProfileToken></GetStreamUri>");
        let e = get_stream_uri(&ctx, &testutil::req_ctx(), d.root_element()).unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::NotFound);
        assert!(e.msg().unwrap().contains("profile"));
    }

    #[test]
    fn set_video_encoder_configuration_round_trips() {
        let ctx = testutil::ctx();
        let d = doc(
            "<SetVideoEncoderConfiguration>\
             <Configuration token=\"SubProfileVideoEncoder\">\
             <Encoding>H264</Encoding>\
             <Resolution><Width>320</Width><Height>240</Height></Resolution>\
             <RateControl><FrameRateLimit>10</FrameRateLimit><BitrateLimit>256</BitrateLimit></RateControl>\
             </Configuration></SetVideoEncoderConfiguration>",
        );
        set_video_encoder_configuration(&ctx, &testutil::req_ctx(), d.root_element()).unwrap();
        let s = ctx.rt.snapshot();
        assert_eq!((s.sub_width, s.sub_height), (320, 240));
        assert_eq!(s.sub_fps, 10);
        assert_eq!(s.sub_bitrate, 256);
    }

    #[test]
    fn set_video_encoder_rejects_out_of_schema_values() {
        let ctx = testutil::ctx();
        let d = doc(
            "<SetVideoEncoderConfiguration>\
             <Configuration token=\"MainProfileVideoEncoder\">\
             <RateControl><FrameRateLimit>500</FrameRateLimit></RateControl>\
             </Configuration></SetVideoEncoderConfiguration>",
        );
        let e = set_video_encoder_configuration(&ctx, &testutil::req_ctx(), d.root_element())
            .unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::Invalid);
        assert_eq!(ctx.rt.snapshot().main_fps, 25);
    }

    #[test]
    fn snapshot_uri_uses_full_host() {
        let ctx = testutil::ctx();
        let d = doc("<GetSnapshotUri><ProfileToken>MainProfile</ProfileToken></GetSnapshotUri>");
        let out = get_snapshot_uri(&ctx, &testutil::req_ctx(), d.root_element()).unwrap();
        assert!(out.contains("<tt:Uri>http://cam.local:8080/snapshot</tt:Uri>"));
    }
}
