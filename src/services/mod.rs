// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! ONVIF service handlers and the wiring that registers them.

pub mod caps;
pub mod device;
pub mod imaging;
pub mod media;
pub mod ptz;

use base::Error;

use crate::soap::Dispatcher;

/// Registers every operation. A duplicate here is a programming error
/// surfaced at startup.
pub fn register_all(d: &mut Dispatcher) -> Result<(), Error> {
    d.register("device", "GetDeviceInformation", device::get_device_information)?;
    d.register("device", "GetSystemDateAndTime", device::get_system_date_and_time)?;
    d.register("device", "GetCapabilities", device::get_capabilities)?;
    d.register("device", "GetServices", device::get_services)?;
    d.register("device", "GetScopes", device::get_scopes)?;
    d.register("device", "GetUsers", device::get_users)?;
    d.register("device", "CreateUsers", device::create_users)?;
    d.register("device", "DeleteUsers", device::delete_users)?;

    d.register("media", "GetProfiles", media::get_profiles)?;
    d.register("media", "GetProfile", media::get_profile)?;
    d.register("media", "GetVideoEncoderConfigurations", media::get_video_encoder_configurations)?;
    d.register("media", "GetVideoEncoderConfiguration", media::get_video_encoder_configuration)?;
    d.register("media", "SetVideoEncoderConfiguration", media::set_video_encoder_configuration)?;
    d.register("media", "GetAudioEncoderConfigurations", media::get_audio_encoder_configurations)?;
    d.register("media", "GetStreamUri", media::get_stream_uri)?;
    d.register("media", "GetSnapshotUri", media::get_snapshot_uri)?;
    d.register("media", "GetVideoSources", media::get_video_sources)?;

    d.register("ptz", "ContinuousMove", ptz::continuous_move)?;
    d.register("ptz", "Stop", ptz::stop)?;
    d.register("ptz", "GetPresets", ptz::get_presets)?;
    d.register("ptz", "SetPreset", ptz::set_preset)?;
    d.register("ptz", "GotoPreset", ptz::goto_preset)?;
    d.register("ptz", "RemovePreset", ptz::remove_preset)?;

    d.register("imaging", "GetImagingSettings", imaging::get_imaging_settings)?;
    d.register("imaging", "SetImagingSettings", imaging::set_imaging_settings)?;
    d.register("imaging", "GetOptions", imaging::get_options)?;

    // The snapshot endpoint is also exposed as a service path.
    d.register("snapshot", "GetSnapshotUri", media::get_snapshot_uri)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::{Dispatcher, SoapRequest};
    use crate::testutil;

    #[test]
    fn register_all_is_conflict_free() {
        let mut d = Dispatcher::new(testutil::ctx());
        register_all(&mut d).unwrap();
    }

    #[test]
    fn end_to_end_device_information() {
        let mut d = Dispatcher::new(testutil::ctx());
        register_all(&mut d).unwrap();
        let body = r#"<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"><e:Body><GetDeviceInformation/></e:Body></e:Envelope>"#;
        let req = SoapRequest::parse(body).unwrap();
        let (status, xml) = d.dispatch("device", &req, &testutil::req_ctx());
        assert_eq!(status, 200);
        assert!(xml.contains("<tds:Manufacturer>ONVIF-Camera</tds:Manufacturer>"));
        assert!(xml.contains("<tds:Model>AK3918</tds:Model>"));
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    }

    #[test]
    fn unknown_operation_faults() {
        let mut d = Dispatcher::new(testutil::ctx());
        register_all(&mut d).unwrap();
        let body = r#"<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"><e:Body><SelfDestruct/></e:Body></e:Envelope>"#;
        let req = SoapRequest::parse(body).unwrap();
        let (status, xml) = d.dispatch("device", &req, &testutil::req_ctx());
        assert_eq!(status, 400);
        assert!(xml.contains("ter:ActionNotSupported"));
    }
}
