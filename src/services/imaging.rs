// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Imaging service operations. Settings are validated and persisted by the
//! config runtime, then pushed to the sensor through the HAL.

use base::{err, Error};
use conf::schema::SCHEMA;
use roxmltree::Node;

use crate::hal::ImagingParams;
use crate::soap::xml::find_text;
use crate::soap::{Ctx, ReqCtx};

pub fn get_imaging_settings(ctx: &Ctx, _r: &ReqCtx, _op: Node) -> Result<String, Error> {
    let s = ctx.rt.snapshot();
    Ok(format!(
        "<timg:GetImagingSettingsResponse><timg:ImagingSettings>\
         <tt:Brightness>{}</tt:Brightness>\
         <tt:ColorSaturation>{}</tt:ColorSaturation>\
         <tt:Contrast>{}</tt:Contrast>\
         <tt:Sharpness>{}</tt:Sharpness>\
         <tt:IrCutFilter>{}</tt:IrCutFilter>\
         </timg:ImagingSettings></timg:GetImagingSettingsResponse>",
        s.brightness,
        s.saturation,
        s.contrast,
        s.sharpness,
        if s.autoir_enabled { "AUTO" } else { "ON" },
    ))
}

pub fn set_imaging_settings(ctx: &Ctx, _r: &ReqCtx, op: Node) -> Result<String, Error> {
    let settings = op
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "ImagingSettings")
        .ok_or_else(|| err!(Invalid, "missing ImagingSettings"))?;

    // ONVIF models these as floats; the sensor wants integers 0..=100.
    let set = |key: &str, local: &str| -> Result<(), Error> {
        let Some(raw) = find_text(settings, local) else {
            return Ok(());
        };
        let v: f32 = raw
            .trim()
            .parse()
            .map_err(|_| err!(Invalid, "{local}: expected a number"))?;
        ctx.rt.set_int("imaging", key, v.round() as i32)
    };
    set("brightness", "Brightness")?;
    set("saturation", "ColorSaturation")?;
    set("contrast", "Contrast")?;
    set("sharpness", "Sharpness")?;
    if let Some(ircut) = find_text(settings, "IrCutFilter") {
        ctx.rt
            .set_bool("autoir", "enabled", ircut.eq_ignore_ascii_case("auto"))?;
    }

    ctx.hal
        .imaging
        .apply(&ImagingParams::from_snapshot(&ctx.rt.snapshot()))?;
    Ok("<timg:SetImagingSettingsResponse/>".to_owned())
}

fn bounds(key: &str) -> (f64, f64) {
    SCHEMA
        .iter()
        .find(|e| e.section == "imaging" && e.key == key)
        .map(|e| (e.min, e.max))
        .unwrap_or((0.0, 100.0))
}

pub fn get_options(_ctx: &Ctx, _r: &ReqCtx, _op: Node) -> Result<String, Error> {
    let mut out = String::from("<timg:GetOptionsResponse><timg:ImagingOptions>");
    for (local, key) in [
        ("Brightness", "brightness"),
        ("ColorSaturation", "saturation"),
        ("Contrast", "contrast"),
        ("Sharpness", "sharpness"),
    ] {
        let (min, max) = bounds(key);
        out.push_str(&format!(
            "<tt:{local}><tt:Min>{min}</tt:Min><tt:Max>{max}</tt:Max></tt:{local}>",
        ));
    }
    out.push_str(
        "<tt:IrCutFilterModes>ON</tt:IrCutFilterModes>\
         <tt:IrCutFilterModes>OFF</tt:IrCutFilterModes>\
         <tt:IrCutFilterModes>AUTO</tt:IrCutFilterModes>",
    );
    out.push_str("</timg:ImagingOptions></timg:GetOptionsResponse>");
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
    fn set_then_get_round_trips_and_hits_hal() {
        let ctx = testutil::ctx();
        let r = testutil::req_ctx();
        let d = doc(
            "<SetImagingSettings><VideoSourceToken>VideoSource0</VideoSourceToken>\
             <ImagingSettings><Brightness>75.0</Brightness><Contrast>40</Contrast>\
             <IrCutFilter>AUTO</IrCutFilter></ImagingSettings></SetImagingSettings>",
        );
        set_imaging_settings(&ctx, &r, d.root_element()).unwrap();
        assert_eq!(ctx.rt.get_int("imaging", "brightness").unwrap(), 75);
        assert_eq!(ctx.rt.get_int("imaging", "contrast").unwrap(), 40);
        assert!(ctx.rt.get_bool("autoir", "enabled").unwrap());

        let out =
            get_imaging_settings(&ctx, &r, doc("<GetImagingSettings/>").root_element()).unwrap();
        assert!(out.contains("<tt:Brightness>75</tt:Brightness>"));
        assert!(out.contains("<tt:Contrast>40</tt:Contrast>"));
        assert!(out.contains("<tt:IrCutFilter>AUTO</tt:IrCutFilter>"));
    }

    #[test]
    fn out_of_range_is_invalid_and_atomic() {
        let ctx = testutil::ctx();
        let d = doc(
            "<SetImagingSettings><ImagingSettings><Brightness>400</Brightness>\
             </ImagingSettings></SetImagingSettings>",
        );
        let e = set_imaging_settings(&ctx, &testutil::req_ctx(), d.root_element()).unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::Invalid);
        assert_eq!(ctx.rt.get_int("imaging", "brightness").unwrap(), 50);
    }

    #[test]
    fn options_reflect_schema_bounds() {
        let ctx = testutil::ctx();
        let out = get_options(&ctx, &testutil::req_ctx(), doc("<GetOptions/>").root_element())
            .unwrap();
        assert!(out.contains("<tt:Brightness><tt:Min>0</tt:Min><tt:Max>100</tt:Max></tt:Brightness>"));
    }
}
