// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device service operations.

use std::fmt::Write as _;

use base::{err, Error};
use conf::AccessLevel;
use roxmltree::Node;

use crate::soap::xml::{escape, find_text};
use crate::soap::{Ctx, ReqCtx};

pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn get_device_information(ctx: &Ctx, _r: &ReqCtx, _op: Node) -> Result<String, Error> {
    let s = ctx.rt.snapshot();
    Ok(format!(
        "<tds:GetDeviceInformationResponse>\
         <tds:Manufacturer>{}</tds:Manufacturer>\
         <tds:Model>{}</tds:Model>\
         <tds:FirmwareVersion>{FIRMWARE_VERSION}</tds:FirmwareVersion>\
         <tds:SerialNumber>{}</tds:SerialNumber>\
         <tds:HardwareId>{}</tds:HardwareId>\
         </tds:GetDeviceInformationResponse>",
        escape(&s.manufacturer),
        escape(&s.model),
        escape(&s.serial_number),
        escape(&s.model),
    ))
}

pub fn get_system_date_and_time(ctx: &Ctx, _r: &ReqCtx, _op: Node) -> Result<String, Error> {
    let now = ctx.clocks.realtime().to_zoned(jiff::tz::TimeZone::UTC);
    Ok(format!(
        "<tds:GetSystemDateAndTimeResponse><tds:SystemDateAndTime>\
         <tt:DateTimeType>NTP</tt:DateTimeType>\
         <tt:DaylightSavings>false</tt:DaylightSavings>\
         <tt:UTCDateTime>\
         <tt:Time><tt:Hour>{}</tt:Hour><tt:Minute>{}</tt:Minute><tt:Second>{}</tt:Second></tt:Time>\
         <tt:Date><tt:Year>{}</tt:Year><tt:Month>{}</tt:Month><tt:Day>{}</tt:Day></tt:Date>\
         </tt:UTCDateTime>\
         </tds:SystemDateAndTime></tds:GetSystemDateAndTimeResponse>",
        now.hour(),
        now.minute(),
        now.second(),
        now.year(),
        now.month(),
        now.day(),
    ))
}

fn service_base(r: &ReqCtx) -> String {
    format!("http://{}/onvif", r.host)
}

pub fn get_capabilities(_ctx: &Ctx, r: &ReqCtx, _op: Node) -> Result<String, Error> {
    let base = service_base(r);
    Ok(format!(
        "<tds:GetCapabilitiesResponse><tds:Capabilities>\
         <tt:Device><tt:XAddr>{base}/device_service</tt:XAddr></tt:Device>\
         <tt:Media><tt:XAddr>{base}/media_service</tt:XAddr>\
         <tt:StreamingCapabilities><tt:RTPMulticast>false</tt:RTPMulticast>\
         <tt:RTP_TCP>true</tt:RTP_TCP><tt:RTP_RTSP_TCP>true</tt:RTP_RTSP_TCP>\
         </tt:StreamingCapabilities></tt:Media>\
         <tt:PTZ><tt:XAddr>{base}/ptz_service</tt:XAddr></tt:PTZ>\
         <tt:Imaging><tt:XAddr>{base}/imaging_service</tt:XAddr></tt:Imaging>\
         </tds:Capabilities></tds:GetCapabilitiesResponse>",
    ))
}

pub fn get_services(_ctx: &Ctx, r: &ReqCtx, _op: Node) -> Result<String, Error> {
    let base = service_base(r);
    let mut out = String::from("<tds:GetServicesResponse>");
    for (ns, path) in [
        ("http://www.onvif.org/ver10/device/wsdl", "device_service"),
        ("http://www.onvif.org/ver10/media/wsdl", "media_service"),
        ("http://www.onvif.org/ver20/ptz/wsdl", "ptz_service"),
        ("http://www.onvif.org/ver20/imaging/wsdl", "imaging_service"),
    ] {
        let _ = write!(
            out,
            "<tds:Service><tds:Namespace>{ns}</tds:Namespace>\
             <tds:XAddr>{base}/{path}</tds:XAddr>\
             <tds:Version><tt:Major>2</tt:Major><tt:Minor>40</tt:Minor></tds:Version>\
             </tds:Service>",
        );
    }
    out.push_str("</tds:GetServicesResponse>");
    Ok(out)
}

pub fn get_scopes(ctx: &Ctx, _r: &ReqCtx, _op: Node) -> Result<String, Error> {
    let s = ctx.rt.snapshot();
    let mut out = String::from("<tds:GetScopesResponse>");
    for scope in [
        format!("onvif://www.onvif.org/type/NetworkVideoTransmitter"),
        format!("onvif://www.onvif.org/name/{}", escape(&s.device_name)),
        format!("onvif://www.onvif.org/hardware/{}", escape(&s.model)),
        format!("onvif://www.onvif.org/location/"),
    ] {
        let _ = write!(
            out,
            "<tds:Scopes><tt:ScopeDef>Fixed</tt:ScopeDef><tt:ScopeItem>{scope}</tt:ScopeItem></tds:Scopes>",
        );
    }
    out.push_str("</tds:GetScopesResponse>");
    Ok(out)
}

fn level_to_onvif(level: AccessLevel) -> &'static str {
    match level {
        AccessLevel::Administrator => "Administrator",
        AccessLevel::Operator => "Operator",
        AccessLevel::User => "User",
    }
}

fn level_from_onvif(s: &str) -> Result<AccessLevel, Error> {
    match s {
        "Administrator" => Ok(AccessLevel::Administrator),
        "Operator" => Ok(AccessLevel::Operator),
        "User" => Ok(AccessLevel::User),
        other => Err(err!(Invalid, "unknown user level {other:?}")),
    }
}

pub fn get_users(ctx: &Ctx, _r: &ReqCtx, _op: Node) -> Result<String, Error> {
    let mut out = String::from("<tds:GetUsersResponse>");
    for (name, level) in ctx.rt.users().names() {
        let _ = write!(
            out,
            "<tds:User><tt:Username>{}</tt:Username><tt:UserLevel>{}</tt:UserLevel></tds:User>",
            escape(&name),
            level_to_onvif(level),
        );
    }
    out.push_str("</tds:GetUsersResponse>");
    Ok(out)
}

pub fn create_users(ctx: &Ctx, _r: &ReqCtx, op: Node) -> Result<String, Error> {
    let mut created = 0;
    for user in op
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "User")
    {
        let name =
            find_text(user, "Username").ok_or_else(|| err!(Invalid, "User without Username"))?;
        let password = find_text(user, "Password").unwrap_or("");
        let level = level_from_onvif(find_text(user, "UserLevel").unwrap_or("User"))?;
        ctx.rt
            .register_user(name, password, level, ctx.rng.as_ref())?;
        created += 1;
    }
    if created == 0 {
        return Err(err!(Invalid, "no User elements"));
    }
    Ok("<tds:CreateUsersResponse/>".to_owned())
}

pub fn delete_users(ctx: &Ctx, _r: &ReqCtx, op: Node) -> Result<String, Error> {
    let mut deleted = 0;
    for name in op
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Username")
    {
        let name = name.text().unwrap_or("").trim();
        ctx.rt
            .remove_user(name)
            .map_err(|e| e.map_kind(base::ErrorKind::NotFound))?;
        deleted += 1;
    }
    if deleted == 0 {
        return Err(err!(Invalid, "no Username elements"));
    }
    Ok("<tds:DeleteUsersResponse/>".to_owned())
}
