// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Hardware abstraction seams.
//!
//! Real capture/encoder/PTZ/sensor drivers live out of tree; the daemon
//! only talks to these traits. The loopback implementations below keep the
//! whole pipeline runnable on a workstation (synthetic frames, recorded
//! positions) and double as deterministic test doubles.

use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use base::clock::Clocks;
use base::{bail, err, Error};
use parking_lot::Mutex;

#[derive(Clone, Debug, PartialEq)]
pub struct EncoderParams {
    pub codec: String,
    pub width: i32,
    pub height: i32,
    pub fps: i32,
    pub bitrate_kbps: i32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EncoderHandle(pub u32);

#[derive(Copy, Clone, Debug)]
pub struct FrameInfo {
    pub keyframe: bool,
    /// Presentation duration in 90 kHz units.
    pub duration_90k: u32,
}

pub trait EncoderCtl: Send + Sync + 'static {
    /// Configures and starts an encoder instance. `Unavailable` when the
    /// hardware has no free encoder slot.
    fn start(&self, profile_token: &str, params: &EncoderParams) -> Result<EncoderHandle, Error>;

    fn stop(&self, handle: EncoderHandle);

    /// Blocks until the next encoded access unit, writing it into `out`.
    fn next_frame(&self, handle: EncoderHandle, out: &mut Vec<u8>) -> Result<FrameInfo, Error>;
}

pub trait SnapshotSource: Send + Sync + 'static {
    /// A JPEG of the current frame.
    fn jpeg(&self) -> Result<Vec<u8>, Error>;
}

pub trait PtzDrive: Send + Sync + 'static {
    fn continuous_move(&self, pan: f32, tilt: f32, zoom: f32) -> Result<(), Error>;
    fn stop(&self) -> Result<(), Error>;
    fn goto_position(&self, pan: f32, tilt: f32, zoom: f32) -> Result<(), Error>;
    fn position(&self) -> (f32, f32, f32);
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImagingParams {
    pub brightness: i32,
    pub contrast: i32,
    pub saturation: i32,
    pub sharpness: i32,
    pub flip: bool,
    pub mirror: bool,
}

impl ImagingParams {
    pub fn from_snapshot(s: &conf::Snapshot) -> Self {
        ImagingParams {
            brightness: s.brightness,
            contrast: s.contrast,
            saturation: s.saturation,
            sharpness: s.sharpness,
            flip: s.flip,
            mirror: s.mirror,
        }
    }
}

pub trait ImagingSensor: Send + Sync + 'static {
    fn apply(&self, params: &ImagingParams) -> Result<(), Error>;
    /// Scene luminance estimate, 0..=255, for auto day/night.
    fn luminance(&self) -> u8;
    fn set_ir_cut(&self, night: bool) -> Result<(), Error>;
}

pub trait AudioSource: Send + Sync + 'static {
    /// Blocks until the next encoded audio packet, writing it into `out`.
    /// Returns its duration in RTP timestamp units.
    fn next_packet(&self, out: &mut Vec<u8>) -> Result<u32, Error>;
}

/// The bundle of collaborator handles the engines get wired with.
#[derive(Clone)]
pub struct Hal {
    pub video: Arc<dyn EncoderCtl>,
    pub audio: Arc<dyn AudioSource>,
    pub snapshot: Arc<dyn SnapshotSource>,
    pub ptz: Arc<dyn PtzDrive>,
    pub imaging: Arc<dyn ImagingSensor>,
}

impl Hal {
    /// Loopback HAL: synthetic frames, recorded PTZ/imaging state.
    pub fn loopback(clocks: Arc<dyn Clocks>) -> Hal {
        Hal {
            video: Arc::new(LoopbackEncoder::new(clocks.clone(), 4)),
            audio: Arc::new(LoopbackAudio { clocks }),
            snapshot: Arc::new(LoopbackSnapshot),
            ptz: Arc::new(LoopbackPtz::default()),
            imaging: Arc::new(LoopbackImaging::default()),
        }
    }
}

struct RunningEncoder {
    params: EncoderParams,
    frame_no: u64,
}

pub struct LoopbackEncoder {
    clocks: Arc<dyn Clocks>,
    running: Mutex<HashMap<EncoderHandle, RunningEncoder>>,
    next_id: AtomicU32,
    capacity: usize,
}

impl LoopbackEncoder {
    pub fn new(clocks: Arc<dyn Clocks>, capacity: usize) -> Self {
        LoopbackEncoder {
            clocks,
            running: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            capacity,
        }
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().len()
    }
}

impl EncoderCtl for LoopbackEncoder {
    fn start(&self, profile_token: &str, params: &EncoderParams) -> Result<EncoderHandle, Error> {
        let mut running = self.running.lock();
        if running.len() >= self.capacity {
            bail!(Unavailable, "no free encoder slot for {profile_token}");
        }
        let handle = EncoderHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        running.insert(
            handle,
            RunningEncoder {
                params: params.clone(),
                frame_no: 0,
            },
        );
        tracing::info!(profile = profile_token, id = handle.0, "encoder started");
        Ok(handle)
    }

    fn stop(&self, handle: EncoderHandle) {
        if self.running.lock().remove(&handle).is_some() {
            tracing::info!(id = handle.0, "encoder stopped");
        }
    }

    fn next_frame(&self, handle: EncoderHandle, out: &mut Vec<u8>) -> Result<FrameInfo, Error> {
        let (fps, frame_no) = {
            let mut running = self.running.lock();
            let enc = running
                .get_mut(&handle)
                .ok_or_else(|| err!(NotFound, "encoder {} not running", handle.0))?;
            enc.frame_no += 1;
            (enc.params.fps.max(1) as u32, enc.frame_no)
        };
        self.clocks.sleep(Duration::from_millis(1000 / u64::from(fps)));
        let keyframe = frame_no % u64::from(fps) == 1;
        out.clear();
        // A plausible single-NAL payload: IDR or non-IDR slice header byte
        // followed by a counter pattern.
        out.push(if keyframe { 0x65 } else { 0x41 });
        out.extend(std::iter::repeat(0xA5).take(399));
        out.extend_from_slice(&frame_no.to_be_bytes());
        Ok(FrameInfo {
            keyframe,
            duration_90k: 90_000 / fps,
        })
    }
}

/// 20 ms of G.711 µ-law silence per packet.
pub struct LoopbackAudio {
    clocks: Arc<dyn Clocks>,
}

impl AudioSource for LoopbackAudio {
    fn next_packet(&self, out: &mut Vec<u8>) -> Result<u32, Error> {
        self.clocks.sleep(Duration::from_millis(20));
        out.clear();
        out.resize(160, 0xFF);
        Ok(160)
    }
}

pub struct LoopbackSnapshot;

/// Smallest well-formed JPEG: SOI, APP0/JFIF, EOI.
const STUB_JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xD9,
];

impl SnapshotSource for LoopbackSnapshot {
    fn jpeg(&self) -> Result<Vec<u8>, Error> {
        Ok(STUB_JPEG.to_vec())
    }
}

#[derive(Default)]
pub struct LoopbackPtz {
    position: Mutex<(f32, f32, f32)>,
    moving: Mutex<Option<(f32, f32, f32)>>,
}

impl PtzDrive for LoopbackPtz {
    fn continuous_move(&self, pan: f32, tilt: f32, zoom: f32) -> Result<(), Error> {
        *self.moving.lock() = Some((pan, tilt, zoom));
        Ok(())
    }

    fn stop(&self) -> Result<(), Error> {
        *self.moving.lock() = None;
        Ok(())
    }

    fn goto_position(&self, pan: f32, tilt: f32, zoom: f32) -> Result<(), Error> {
        *self.position.lock() = (pan, tilt, zoom);
        Ok(())
    }

    fn position(&self) -> (f32, f32, f32) {
        *self.position.lock()
    }
}

#[derive(Default)]
pub struct LoopbackImaging {
    applied: Mutex<Option<ImagingParams>>,
    night: Mutex<bool>,
}

impl LoopbackImaging {
    pub fn last_applied(&self) -> Option<ImagingParams> {
        self.applied.lock().clone()
    }

    pub fn night_mode(&self) -> bool {
        *self.night.lock()
    }
}

impl ImagingSensor for LoopbackImaging {
    fn apply(&self, params: &ImagingParams) -> Result<(), Error> {
        *self.applied.lock() = Some(params.clone());
        Ok(())
    }

    fn luminance(&self) -> u8 {
        128
    }

    fn set_ir_cut(&self, night: bool) -> Result<(), Error> {
        *self.night.lock() = night;
        Ok(())
    }
}
