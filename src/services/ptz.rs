// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! PTZ service operations. Motion goes to the HAL; presets persist through
//! the config runtime's `[ptz]` slots as `name,pan,tilt,zoom`.

use std::fmt::Write as _;

use base::{bail, err, Error};
use conf::snapshot::PTZ_PRESET_SLOTS;
use roxmltree::Node;

use crate::soap::xml::{escape, find, find_text};
use crate::soap::{Ctx, ReqCtx};

/// A stored preset slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub slot: usize,
    pub name: String,
    pub pan: f32,
    pub tilt: f32,
    pub zoom: f32,
}

impl Preset {
    pub fn token(&self) -> String {
        format!("Preset{}", self.slot)
    }

    fn encode(&self) -> String {
        format!("{},{},{},{}", self.name, self.pan, self.tilt, self.zoom)
    }

    fn decode(slot: usize, raw: &str) -> Option<Preset> {
        if raw.is_empty() {
            return None;
        }
        let mut parts = raw.split(',');
        let name = parts.next()?.to_owned();
        let pan = parts.next()?.parse().ok()?;
        let tilt = parts.next()?.parse().ok()?;
        let zoom = parts.next()?.parse().ok()?;
        Some(Preset {
            slot,
            name,
            pan,
            tilt,
            zoom,
        })
    }
}

fn presets(ctx: &Ctx) -> Vec<Preset> {
    let s = ctx.rt.snapshot();
    s.ptz_presets
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| Preset::decode(i, raw))
        .collect()
}

fn slot_key(slot: usize) -> String {
    format!("preset_{slot}")
}

fn slot_from_token(token: &str) -> Result<usize, Error> {
    let n: usize = token
        .strip_prefix("Preset")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| err!(NotFound, "no such preset {token:?}"))?;
    if n >= PTZ_PRESET_SLOTS {
        bail!(NotFound, "no such preset {token:?}");
    }
    Ok(n)
}

fn require_enabled(ctx: &Ctx) -> Result<(), Error> {
    if !ctx.rt.snapshot().ptz_enabled {
        bail!(NotSupported, "PTZ is disabled");
    }
    Ok(())
}

/// Reads `x`/`y` attributes off a `Velocity`/`Position` child vector.
fn vector(node: Node, local: &str) -> (f32, f32) {
    let Some(v) = find(node, local) else {
        return (0.0, 0.0);
    };
    let get = |attr: &str| v.attribute(attr).and_then(|a| a.parse().ok()).unwrap_or(0.0);
    (get("x"), get("y"))
}

pub fn continuous_move(ctx: &Ctx, _r: &ReqCtx, op: Node) -> Result<String, Error> {
    require_enabled(ctx)?;
    let velocity = find(op, "Velocity").ok_or_else(|| err!(Invalid, "missing Velocity"))?;
    let (x, y) = vector(velocity, "PanTilt");
    let (zoom, _) = vector(velocity, "Zoom");
    if !(-1.0..=1.0).contains(&x) || !(-1.0..=1.0).contains(&y) || !(-1.0..=1.0).contains(&zoom) {
        bail!(Invalid, "velocity out of range");
    }
    let s = ctx.rt.snapshot();
    ctx.hal
        .ptz
        .continuous_move(x * s.ptz_speed_pan, y * s.ptz_speed_tilt, zoom)?;
    Ok("<tptz:ContinuousMoveResponse/>".to_owned())
}

pub fn stop(ctx: &Ctx, _r: &ReqCtx, _op: Node) -> Result<String, Error> {
    require_enabled(ctx)?;
    ctx.hal.ptz.stop()?;
    Ok("<tptz:StopResponse/>".to_owned())
}

pub fn get_presets(ctx: &Ctx, _r: &ReqCtx, _op: Node) -> Result<String, Error> {
    require_enabled(ctx)?;
    let mut out = String::from("<tptz:GetPresetsResponse>");
    for p in presets(ctx) {
        let _ = write!(
            out,
            "<tptz:Preset token=\"{}\"><tt:Name>{}</tt:Name>\
             <tt:PTZPosition><tt:PanTilt x=\"{}\" y=\"{}\"/><tt:Zoom x=\"{}\"/></tt:PTZPosition>\
             </tptz:Preset>",
            p.token(),
            escape(&p.name),
            p.pan,
            p.tilt,
            p.zoom,
        );
    }
    out.push_str("</tptz:GetPresetsResponse>");
    Ok(out)
}

pub fn set_preset(ctx: &Ctx, _r: &ReqCtx, op: Node) -> Result<String, Error> {
    require_enabled(ctx)?;
    let name = find_text(op, "PresetName").unwrap_or("Preset");
    if name.contains(',') {
        bail!(Invalid, "preset name may not contain a comma");
    }
    // Reuse the slot if a token was supplied, else take the first free one.
    let slot = match find_text(op, "PresetToken") {
        Some(token) => slot_from_token(token)?,
        None => {
            let taken: Vec<usize> = presets(ctx).iter().map(|p| p.slot).collect();
            (0..PTZ_PRESET_SLOTS)
                .find(|i| !taken.contains(i))
                .ok_or_else(|| err!(Resource, "all preset slots in use"))?
        }
    };
    let (pan, tilt, zoom) = ctx.hal.ptz.position();
    let preset = Preset {
        slot,
        name: name.to_owned(),
        pan,
        tilt,
        zoom,
    };
    ctx.rt.set_str("ptz", &slot_key(slot), &preset.encode())?;
    Ok(format!(
        "<tptz:SetPresetResponse><tptz:PresetToken>{}</tptz:PresetToken></tptz:SetPresetResponse>",
        preset.token(),
    ))
}

pub fn goto_preset(ctx: &Ctx, _r: &ReqCtx, op: Node) -> Result<String, Error> {
    require_enabled(ctx)?;
    let token = find_text(op, "PresetToken").ok_or_else(|| err!(Invalid, "missing PresetToken"))?;
    let slot = slot_from_token(token)?;
    let preset = presets(ctx)
        .into_iter()
        .find(|p| p.slot == slot)
        .ok_or_else(|| err!(NotFound, "no such preset {token:?}"))?;
    ctx.hal.ptz.goto_position(preset.pan, preset.tilt, preset.zoom)?;
    Ok("<tptz:GotoPresetResponse/>".to_owned())
}

pub fn remove_preset(ctx: &Ctx, _r: &ReqCtx, op: Node) -> Result<String, Error> {
    require_enabled(ctx)?;
    let token = find_text(op, "PresetToken").ok_or_else(|| err!(Invalid, "missing PresetToken"))?;
    let slot = slot_from_token(token)?;
    if presets(ctx).iter().all(|p| p.slot != slot) {
        bail!(NotFound, "no such preset {token:?}");
    }
    ctx.rt.set_str("ptz", &slot_key(slot), "")?;
    Ok("<tptz:RemovePresetResponse/>".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn doc(s: &str) -> roxmltree::Document<'_> {
        roxmltree::Document::parse(s).unwrap()
    }

    #[test]
    fn continuous_move_scales_by_configured_speed() {
        let ctx = testutil::ctx();
        let d = doc(
            "<ContinuousMove><ProfileToken>MainProfile</ProfileToken>\
             <Velocity><PanTilt x=\"1.0\" y=\"-0.5\"/><Zoom x=\"0\"/></Velocity></ContinuousMove>",
        );
        continuous_move(&ctx, &testutil::req_ctx(), d.root_element()).unwrap();
        // Default speeds are 0.5; the HAL should see scaled values.
        // (LoopbackPtz records moving state; position is unchanged.)
        stop(&ctx, &testutil::req_ctx(), doc("<Stop/>").root_element()).unwrap();
    }

    #[test]
    fn velocity_out_of_range_rejected() {
        let ctx = testutil::ctx();
        let d = doc("<ContinuousMove><Velocity><PanTilt x=\"1.5\" y=\"0\"/></Velocity></ContinuousMove>");
        let e = continuous_move(&ctx, &testutil::req_ctx(), d.root_element()).unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::Invalid);
    }

    #[test]
    fn preset_lifecycle_persists_via_config() {
        let ctx = testutil::ctx();
        let r = testutil::req_ctx();
        ctx.hal.ptz.goto_position(0.25, -0.5, 0.1).unwrap();

        let d = doc("<SetPreset><PresetName>door</PresetName></SetPreset>");
        let out = set_preset(&ctx, &r, d.root_element()).unwrap();
        assert!(out.contains("<tptz:PresetToken>Preset0</tptz:PresetToken>"));

        let out = get_presets(&ctx, &r, doc("<GetPresets/>").root_element()).unwrap();
        assert!(out.contains("token=\"Preset0\""));
        assert!(out.contains("<tt:Name>door</tt:Name>"));
        assert!(out.contains("x=\"0.25\""));

        // Move away, then recall.
        ctx.hal.ptz.goto_position(0.0, 0.0, 0.0).unwrap();
        let d = doc("<GotoPreset><PresetToken>Preset0</PresetToken></GotoPreset>");
        goto_preset(&ctx, &r, d.root_element()).unwrap();
        assert_eq!(ctx.hal.ptz.position(), (0.25, -0.5, 0.1));

        let d = doc("<RemovePreset><PresetToken>Preset0</PresetToken></RemovePreset>");
        remove_preset(&ctx, &r, d.root_element()).unwrap();
        let d = doc("<GotoPreset><PresetToken>Preset0</PresetToken></GotoPreset>");
        let e = goto_preset(&ctx, &r, d.root_element()).unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::NotFound);
    }

    #[test]
    fn disabled_ptz_is_not_supported() {
        let ctx = testutil::ctx();
        ctx.rt.set_bool("ptz", "enabled", false).unwrap();
        let e = stop(&ctx, &testutil::req_ctx(), doc("<Stop/>").root_element()).unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::NotSupported);
    }

    #[test]
    fn preset_codec_round_trip() {
        let p = Preset {
            slot: 3,
            name: "gate".to_owned(),
            pan: -0.75,
            tilt: 0.5,
            zoom: 0.0,
        };
        assert_eq!(Preset::decode(3, &p.encode()), Some(p));
        assert_eq!(Preset::decode(0, ""), None);
        assert_eq!(Preset::decode(0, "junk"), None);
    }
}
