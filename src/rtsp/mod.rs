// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! RTSP engine: accept loop, per-connection request handling, the session
//! state machine, and the RTP sender threads.
//!
//! Threading: one accept thread, one thread per TCP connection, and one
//! sender thread per active track. Senders stop via the session's atomic
//! `running` flag; the session registry joins them on teardown.

pub mod protocol;
pub mod rtp;
pub mod sdp;
pub mod session;
pub mod transport;

use std::io::{Read, Write as _};
use std::net::{IpAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use base::clock::Clocks;
use base::rng::Rng;
use base::shutdown;
use conf::ConfigRuntime;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::hal::Hal;
use crate::router::StreamRouter;
use crate::services::caps;
use self::protocol::{RtspRequest, RtspResponse};
use self::session::{Session, SessionManager, State, TrackTransport};
use self::transport::{PortPool, TransportRequest};

pub struct Deps {
    pub rt: Arc<ConfigRuntime>,
    pub router: Arc<StreamRouter>,
    pub hal: Hal,
    pub clocks: Arc<dyn Clocks>,
    pub rng: Arc<dyn Rng>,
    pub budget: Arc<crate::telemetry::MemoryBudget>,
    pub shutdown_rx: shutdown::Receiver,
}

pub struct Shared {
    rt: Arc<ConfigRuntime>,
    router: Arc<StreamRouter>,
    hal: Hal,
    clocks: Arc<dyn Clocks>,
    rng: Arc<dyn Rng>,
    shutdown_rx: shutdown::Receiver,
    pub sessions: SessionManager,
    ports: PortPool,
}

pub struct RtspServer(pub Arc<Shared>);

impl RtspServer {
    pub fn new(deps: Deps) -> Self {
        let sessions = SessionManager::new(deps.rng.clone(), deps.budget);
        RtspServer(Arc::new(Shared {
            rt: deps.rt,
            router: deps.router,
            hal: deps.hal,
            clocks: deps.clocks,
            rng: deps.rng,
            shutdown_rx: deps.shutdown_rx,
            sessions,
            ports: PortPool::new(),
        }))
    }

    /// Accept loop; run on a dedicated thread. Returns on shutdown.
    pub fn run(&self, listener: TcpListener) {
        listener
            .set_nonblocking(true)
            .expect("listener nonblocking");
        let shared = &self.0;
        let mut last_sweep = shared.clocks.monotonic();
        info!("rtsp engine listening");
        loop {
            if shared.shutdown_rx.check().is_err() {
                break;
            }
            match listener.accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, "rtsp connection accepted");
                    let shared = shared.clone();
                    let _ = std::thread::Builder::new()
                        .name("rtsp-conn".to_owned())
                        .spawn(move || conn_loop(shared, stream, peer.ip()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if shared.shutdown_rx.wait_for(Duration::from_millis(100)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(err = %e, "rtsp accept failed");
                    shared.clocks.sleep(Duration::from_millis(100));
                }
            }
            let now = shared.clocks.monotonic();
            if now.saturating_sub(last_sweep) >= Duration::from_secs(1) {
                shared.sessions.sweep(now, &shared.router);
                last_sweep = now;
            }
        }
        shared.sessions.clear(&shared.router);
        info!("rtsp engine stopped");
    }
}

/// Per-connection state used while handling requests.
pub struct ConnCtx {
    shared: Arc<Shared>,
    local_ip: IpAddr,
    peer_ip: IpAddr,
    writer: Arc<Mutex<TcpStream>>,
    /// Sessions created on this connection, for cleanup at disconnect.
    owned: Vec<String>,
}

fn conn_loop(shared: Arc<Shared>, stream: TcpStream, peer_ip: IpAddr) {
    let local_ip = stream
        .local_addr()
        .map(|a| a.ip())
        .unwrap_or(IpAddr::from([0u8, 0, 0, 0]));
    stream
        .set_read_timeout(Some(Duration::from_secs(1)))
        .expect("set rtsp read timeout");
    // Bound interleaved writes so a stalled client cannot pin a sender
    // thread past teardown.
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let writer = match stream.try_clone() {
        Ok(w) => Arc::new(Mutex::new(w)),
        Err(e) => {
            warn!(err = %e, "rtsp clone failed");
            return;
        }
    };
    let mut ctx = ConnCtx {
        shared: shared.clone(),
        local_ip,
        peer_ip,
        writer: writer.clone(),
        owned: Vec::new(),
    };

    let mut stream = stream;
    let mut buf: Vec<u8> = Vec::with_capacity(2048);
    let mut chunk = [0u8; 2048];
    'conn: loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                if shared.shutdown_rx.check().is_err() {
                    break;
                }
                continue;
            }
            Err(_) => break,
        }
        // Consume everything complete in the buffer.
        loop {
            // Client→server interleaved data (e.g. RTCP) is skipped.
            if buf.first() == Some(&b'$') {
                if buf.len() < 4 {
                    break;
                }
                let len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
                if buf.len() < 4 + len {
                    break;
                }
                buf.drain(..4 + len);
                continue;
            }
            let Some(head_end) = find_head_end(&buf) else {
                if buf.len() > 16 * 1024 {
                    break 'conn; // oversized request head
                }
                break;
            };
            let Ok(head) = std::str::from_utf8(&buf[..head_end]) else {
                break 'conn;
            };
            let req = match RtspRequest::parse(head) {
                Ok(r) => r,
                Err(e) => {
                    debug!(err = %e, "malformed rtsp request");
                    let resp = RtspResponse::bad_request().serialize();
                    let _ = writer.lock().write_all(resp.as_bytes());
                    break 'conn;
                }
            };
            let total = head_end + req.content_length();
            if buf.len() < total {
                break; // wait for the body (it is ignored but must be consumed)
            }
            let teardown = req.method.eq_ignore_ascii_case("TEARDOWN");
            let resp = ctx.handle(&req);
            let _ = writer.lock().write_all(resp.serialize().as_bytes());
            if teardown {
                if let Some(id) = req.session_id() {
                    ctx.owned.retain(|s| s != id);
                }
            }
            buf.drain(..total);
        }
    }

    for id in ctx.owned.drain(..) {
        debug!(session = %id, "cleaning up session on disconnect");
        shared.sessions.remove(&id, &shared.router);
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// `rtsp://host[:port]/<profile>[/<track>]` → (profile, track).
fn parse_path(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("rtsp://")?;
    let path = rest.split_once('/').map(|(_, p)| p).unwrap_or("");
    let mut segs = path.split('/').filter(|s| !s.is_empty());
    let profile = segs.next()?;
    let track = segs.next().unwrap_or(sdp::VIDEO_CONTROL);
    Some((profile, track))
}

impl ConnCtx {
    pub fn handle(&mut self, req: &RtspRequest) -> RtspResponse {
        let cseq = req.cseq().to_owned();
        let now = self.shared.clocks.monotonic();
        if let Some(session) = req.session_id().and_then(|id| self.shared.sessions.get(id)) {
            session.touch(now);
        }
        let resp = match req.method.to_ascii_uppercase().as_str() {
            "OPTIONS" => RtspResponse::ok().header(
                "Public",
                "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN, GET_PARAMETER",
            ),
            "DESCRIBE" => self.describe(req),
            "SETUP" => self.setup(req),
            "PLAY" => self.play(req),
            "PAUSE" => self.pause(req),
            "TEARDOWN" => self.teardown(req),
            "GET_PARAMETER" => self.get_parameter(req),
            other => {
                debug!(method = other, "unsupported rtsp method");
                RtspResponse::new(501, "Not Implemented")
            }
        };
        resp.header("CSeq", &cseq)
    }

    fn describe(&self, req: &RtspRequest) -> RtspResponse {
        let Some((profile, _)) = parse_path(&req.uri) else {
            return RtspResponse::bad_request();
        };
        let snapshot = self.shared.rt.snapshot();
        let Some(caps) = caps::profile(&snapshot, profile) else {
            return RtspResponse::not_found();
        };
        let sdp = sdp::synthesize(
            &caps,
            &self.local_ip.to_string(),
            self.shared.rng.u64(),
            &snapshot.device_name,
        );
        RtspResponse::ok()
            .header("Content-Base", &req.uri)
            .body("application/sdp", sdp)
    }

    fn setup(&mut self, req: &RtspRequest) -> RtspResponse {
        let Some((profile, track)) = parse_path(&req.uri) else {
            return RtspResponse::bad_request();
        };
        let snapshot = self.shared.rt.snapshot();
        if caps::profile(&snapshot, profile).is_none() {
            return RtspResponse::not_found();
        }
        let Some(header) = req.header("Transport") else {
            return RtspResponse::bad_request();
        };
        let Some(request) = transport::parse(header) else {
            return RtspResponse::unsupported_transport();
        };

        let now = self.shared.clocks.monotonic();
        let session = match req.session_id() {
            Some(id) => match self.shared.sessions.get(id) {
                Some(s) => s,
                None => return RtspResponse::session_not_found(),
            },
            None => match self.shared.sessions.create(profile, now) {
                Some(s) => {
                    self.owned.push(s.id.clone());
                    s
                }
                None => return RtspResponse::new(503, "Service Unavailable"),
            },
        };
        if *session.state.lock() == State::Playing {
            return RtspResponse::bad_state();
        }

        // The video track carries the encoder claim for the whole session.
        if track == sdp::VIDEO_CONTROL && session.encoder().is_none() {
            match self.shared.router.acquire(profile) {
                Ok(handle) => session.set_stream(handle),
                Err(e) => {
                    warn!(profile, err = %e, "stream acquire failed");
                    return match e.kind() {
                        base::ErrorKind::NotFound => RtspResponse::not_found(),
                        _ => RtspResponse::new(503, "Service Unavailable"),
                    };
                }
            }
        }

        let track_transport = match self.bind_transport(&request) {
            Ok(t) => t,
            Err(resp) => return resp,
        };
        let transport_reply = match &track_transport.request {
            TransportRequest::Udp {
                client_rtp,
                client_rtcp,
            } => format!(
                "RTP/AVP;unicast;client_port={}-{};server_port={}-{}",
                client_rtp, client_rtcp, track_transport.server_rtp, track_transport.server_rtcp,
            ),
            TransportRequest::Tcp { rtp_ch, rtcp_ch } => {
                format!("RTP/AVP/TCP;unicast;interleaved={rtp_ch}-{rtcp_ch}")
            }
        };
        if track == sdp::AUDIO_CONTROL {
            *session.audio.lock() = Some(track_transport);
        } else {
            *session.video.lock() = Some(track_transport);
        }
        *session.state.lock() = State::Ready;
        session.touch(now);

        RtspResponse::ok()
            .header("Transport", &transport_reply)
            .header("Session", &session.header_value())
    }

    fn bind_transport(&self, request: &TransportRequest) -> Result<TrackTransport, RtspResponse> {
        match request {
            TransportRequest::Udp { .. } => {
                for _ in 0..8 {
                    let (rtp, rtcp) = self.shared.ports.allocate();
                    if let Ok(socket) = UdpSocket::bind((self.local_ip, rtp)) {
                        return Ok(TrackTransport {
                            request: request.clone(),
                            socket: Some(Arc::new(socket)),
                            server_rtp: rtp,
                            server_rtcp: rtcp,
                        });
                    }
                }
                warn!("no bindable rtp port pair");
                Err(RtspResponse::new(503, "Service Unavailable"))
            }
            TransportRequest::Tcp { .. } => Ok(TrackTransport {
                request: request.clone(),
                socket: None,
                server_rtp: 0,
                server_rtcp: 0,
            }),
        }
    }

    fn play(&mut self, req: &RtspRequest) -> RtspResponse {
        let Some(session) = req.session_id().and_then(|id| self.shared.sessions.get(id)) else {
            return RtspResponse::session_not_found();
        };
        {
            let mut state = session.state.lock();
            match *state {
                State::Ready | State::Playing => *state = State::Playing,
                _ => return RtspResponse::bad_state(),
            }
        }
        let mut rtp_info = Vec::new();
        if session.senders_started() {
            // Resume after PAUSE; threads are already parked on the state.
        } else {
            self.spawn_senders(&session, &mut rtp_info);
        }
        let mut resp = RtspResponse::ok()
            .header("Session", &session.header_value())
            .header("Range", "npt=0.000-");
        if !rtp_info.is_empty() {
            let value: Vec<String> = rtp_info
                .iter()
                .map(|(track, seq)| format!("url={}/{track};seq={seq};rtptime=0", req.uri))
                .collect();
            resp = resp.header("RTP-Info", &value.join(","));
        }
        resp
    }

    fn spawn_senders(&self, session: &Arc<Session>, rtp_info: &mut Vec<(&'static str, u16)>) {
        let snapshot = self.shared.rt.snapshot();
        let Some(caps) = caps::profile(&snapshot, &session.profile_token) else {
            return;
        };
        if session.video.lock().is_some() {
            let seq = self.shared.rng.u32() as u16;
            let ssrc = self.shared.rng.u32();
            rtp_info.push((sdp::VIDEO_CONTROL, seq));
            let shared = self.shared.clone();
            let worker = session.clone();
            let writer = self.writer.clone();
            let peer_ip = self.peer_ip;
            let pt = caps.video.payload_type;
            let handle = std::thread::Builder::new()
                .name("rtp-video".to_owned())
                .spawn(move || video_sender(shared, worker, writer, peer_ip, pt, ssrc, seq))
                .expect("spawn rtp sender");
            session.add_sender(handle);
        }
        if session.audio.lock().is_some() {
            if let Some(audio) = caps.audio.clone() {
                let seq = self.shared.rng.u32() as u16;
                let ssrc = self.shared.rng.u32();
                rtp_info.push((sdp::AUDIO_CONTROL, seq));
                let shared = self.shared.clone();
                let worker = session.clone();
                let writer = self.writer.clone();
                let peer_ip = self.peer_ip;
                let handle = std::thread::Builder::new()
                    .name("rtp-audio".to_owned())
                    .spawn(move || {
                        audio_sender(shared, worker, writer, peer_ip, audio.payload_type, ssrc, seq)
                    })
                    .expect("spawn rtp sender");
                session.add_sender(handle);
            }
        }
    }

    fn pause(&self, req: &RtspRequest) -> RtspResponse {
        let Some(session) = req.session_id().and_then(|id| self.shared.sessions.get(id)) else {
            return RtspResponse::session_not_found();
        };
        let mut state = session.state.lock();
        match *state {
            State::Playing | State::Ready => {
                *state = State::Ready;
                drop(state);
                RtspResponse::ok().header("Session", &session.header_value())
            }
            _ => RtspResponse::bad_state(),
        }
    }

    fn teardown(&mut self, req: &RtspRequest) -> RtspResponse {
        let Some(id) = req.session_id() else {
            return RtspResponse::session_not_found();
        };
        if self.shared.sessions.remove(id, &self.shared.router) {
            RtspResponse::ok()
        } else {
            RtspResponse::session_not_found()
        }
    }

    fn get_parameter(&self, req: &RtspRequest) -> RtspResponse {
        match req.session_id().and_then(|id| self.shared.sessions.get(id)) {
            Some(session) => RtspResponse::ok().header("Session", &session.header_value()),
            None => RtspResponse::ok(),
        }
    }
}

/// Sends a packet over whichever transport the track negotiated.
fn send_packets(
    track: &TrackTransport,
    writer: &Mutex<TcpStream>,
    peer_ip: IpAddr,
    packets: &[Vec<u8>],
) -> std::io::Result<()> {
    match &track.request {
        TransportRequest::Udp { client_rtp, .. } => {
            if let Some(socket) = &track.socket {
                for pkt in packets {
                    let _ = socket.send_to(pkt, (peer_ip, *client_rtp));
                }
            }
            Ok(())
        }
        TransportRequest::Tcp { rtp_ch, .. } => {
            let mut w = writer.lock();
            for pkt in packets {
                w.write_all(&rtp::interleave(*rtp_ch, pkt))?;
            }
            Ok(())
        }
    }
}

fn video_sender(
    shared: Arc<Shared>,
    session: Arc<Session>,
    writer: Arc<Mutex<TcpStream>>,
    peer_ip: IpAddr,
    pt: u8,
    ssrc: u32,
    seq: u16,
) {
    let Some(encoder) = session.encoder() else {
        return;
    };
    let mut packetizer = rtp::Packetizer::new(pt, ssrc, seq);
    let mut frame = Vec::new();
    while session.running.load(Ordering::SeqCst) {
        if *session.state.lock() != State::Playing {
            shared.clocks.sleep(Duration::from_millis(50));
            continue;
        }
        let info = match shared.hal.video.next_frame(encoder, &mut frame) {
            Ok(i) => i,
            Err(e) => {
                debug!(err = %e, "video source ended");
                break;
            }
        };
        let packets = packetizer.packetize(&frame);
        let guard = session.video.lock();
        if let Some(track) = guard.as_ref() {
            if send_packets(track, &writer, peer_ip, &packets).is_err() {
                break;
            }
        }
        drop(guard);
        packetizer.advance_timestamp(info.duration_90k);
    }
}

#[allow(clippy::too_many_arguments)]
fn audio_sender(
    shared: Arc<Shared>,
    session: Arc<Session>,
    writer: Arc<Mutex<TcpStream>>,
    peer_ip: IpAddr,
    pt: u8,
    ssrc: u32,
    seq: u16,
) {
    let mut packetizer = rtp::Packetizer::new(pt, ssrc, seq);
    let mut packet = Vec::new();
    while session.running.load(Ordering::SeqCst) {
        if *session.state.lock() != State::Playing {
            shared.clocks.sleep(Duration::from_millis(50));
            continue;
        }
        let duration = match shared.hal.audio.next_packet(&mut packet) {
            Ok(d) => d,
            Err(e) => {
                debug!(err = %e, "audio source ended");
                break;
            }
        };
        let pkt = packetizer.packetize_raw(&packet);
        let guard = session.audio.lock();
        if let Some(track) = guard.as_ref() {
            if send_packets(track, &writer, peer_ip, std::slice::from_ref(&pkt)).is_err() {
                break;
            }
        }
        drop(guard);
        packetizer.advance_timestamp(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    struct Fixture {
        ctx: ConnCtx,
        _shutdown_tx: shutdown::Sender,
        router: Arc<StreamRouter>,
        // Keep the client half open so interleaved writes don't fail.
        _client: TcpStream,
    }

    fn fixture() -> Fixture {
        testutil::init();
        let soap_ctx = testutil::ctx();
        let (tx, rx) = shutdown::channel();
        let router = soap_ctx.router.clone();
        let server = RtspServer::new(Deps {
            rt: soap_ctx.rt.clone(),
            router: router.clone(),
            hal: soap_ctx.hal.clone(),
            clocks: soap_ctx.clocks.clone(),
            rng: soap_ctx.rng.clone(),
            budget: Arc::new(crate::telemetry::MemoryBudget::default()),
            shutdown_rx: rx,
        });

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();

        let ctx = ConnCtx {
            shared: server.0.clone(),
            local_ip: "127.0.0.1".parse().unwrap(),
            peer_ip: "127.0.0.1".parse().unwrap(),
            writer: Arc::new(Mutex::new(server_side)),
            owned: Vec::new(),
        };
        Fixture {
            ctx,
            _shutdown_tx: tx,
            router,
            _client: client,
        }
    }

    fn req(raw: &str) -> RtspRequest {
        RtspRequest::parse(raw).unwrap()
    }

    fn session_from(resp: &RtspResponse) -> String {
        let s = resp.serialize();
        let line = s
            .lines()
            .find(|l| l.starts_with("Session: "))
            .expect("Session header");
        line["Session: ".len()..]
            .split(';')
            .next()
            .unwrap()
            .to_owned()
    }

    #[test]
    fn describe_returns_sdp_for_profile() {
        let fx = fixture();
        let resp = fx.ctx.describe(&req(
            "DESCRIBE rtsp://127.0.0.1:554/MainProfile RTSP/1.0\r\nCSeq: 1\r\n\r\n",
        ));
        let s = resp.serialize();
        assert!(s.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(s.contains("Content-Type: application/sdp\r\n"));
        assert!(s.contains("m=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000"));
    }

    #[test]
    fn describe_unknown_profile_is_404() {
        let fx = fixture();
        let resp = fx.ctx.describe(&req(
            "DESCRIBE rtsp://127.0.0.1:554/Ghost RTSP/1.0\r\nCSeq: 1\r\n\r\n",
        ));
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn setup_rejects_unsupported_transport_with_461() {
        let mut fx = fixture();
        let resp = fx.ctx.setup(&req(
            "SETUP rtsp://c/MainProfile/video RTSP/1.0\r\nCSeq: 2\r\n\
             Transport: RTPS/AVP;unicast;client_port=8000-8001\r\n\r\n",
        ));
        assert_eq!(resp.status, 461);
    }

    #[test]
    fn two_sessions_share_one_encoder() {
        let mut fx = fixture();
        let setup = "SETUP rtsp://c/MainProfile/video RTSP/1.0\r\nCSeq: 2\r\n\
                     Transport: RTP/AVP;unicast;client_port=8000-8001\r\n\r\n";
        let r1 = fx.ctx.setup(&req(setup));
        assert_eq!(r1.status, 200);
        let sid1 = session_from(&r1);
        let r2 = fx.ctx.setup(&req(setup));
        assert_eq!(r2.status, 200);
        let sid2 = session_from(&r2);
        assert_ne!(sid1, sid2);

        assert_eq!(fx.router.stats("MainProfile"), (2, 1));

        // PLAY both; the router still reports a single encoder instance.
        for sid in [&sid1, &sid2] {
            let resp = fx.ctx.play(&req(&format!(
                "PLAY rtsp://c/MainProfile RTSP/1.0\r\nCSeq: 3\r\nSession: {sid}\r\n\r\n"
            )));
            assert_eq!(resp.status, 200);
        }
        assert_eq!(fx.router.stats("MainProfile"), (2, 1));

        for sid in [&sid1, &sid2] {
            let resp = fx.ctx.teardown(&req(&format!(
                "TEARDOWN rtsp://c/MainProfile RTSP/1.0\r\nCSeq: 4\r\nSession: {sid}\r\n\r\n"
            )));
            assert_eq!(resp.status, 200);
        }
        assert_eq!(fx.router.stats("MainProfile"), (0, 0));
    }

    #[test]
    fn play_without_setup_is_rejected() {
        let mut fx = fixture();
        let resp = fx.ctx.play(&req(
            "PLAY rtsp://c/MainProfile RTSP/1.0\r\nCSeq: 1\r\nSession: 404404\r\n\r\n",
        ));
        assert_eq!(resp.status, 454);
    }

    #[test]
    fn state_machine_pause_returns_to_ready() {
        let mut fx = fixture();
        let r = fx.ctx.setup(&req(
            "SETUP rtsp://c/SubProfile/video RTSP/1.0\r\nCSeq: 2\r\n\
             Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
        ));
        assert_eq!(r.status, 200);
        assert!(r.serialize().contains("RTP/AVP/TCP;unicast;interleaved=0-1"));
        let sid = session_from(&r);

        let play = format!("PLAY rtsp://c/SubProfile RTSP/1.0\r\nCSeq: 3\r\nSession: {sid}\r\n\r\n");
        assert_eq!(fx.ctx.play(&req(&play)).status, 200);
        let session = fx.ctx.shared.sessions.get(&sid).unwrap();
        assert_eq!(*session.state.lock(), State::Playing);

        let pause =
            format!("PAUSE rtsp://c/SubProfile RTSP/1.0\r\nCSeq: 4\r\nSession: {sid}\r\n\r\n");
        assert_eq!(fx.ctx.pause(&req(&pause)).status, 200);
        assert_eq!(*session.state.lock(), State::Ready);

        let teardown =
            format!("TEARDOWN rtsp://c/SubProfile RTSP/1.0\r\nCSeq: 5\r\nSession: {sid}\r\n\r\n");
        assert_eq!(fx.ctx.teardown(&req(&teardown)).status, 200);
        assert!(fx.ctx.shared.sessions.get(&sid).is_none());
    }

    #[test]
    fn handle_echoes_cseq_and_options() {
        let mut fx = fixture();
        let resp = fx
            .ctx
            .handle(&req("OPTIONS rtsp://c RTSP/1.0\r\nCSeq: 7\r\n\r\n"));
        let s = resp.serialize();
        assert!(s.contains("CSeq: 7\r\n"));
        assert!(s.contains("Public: OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN, GET_PARAMETER"));
    }

    #[test]
    fn path_parsing() {
        assert_eq!(
            parse_path("rtsp://h:554/MainProfile/video"),
            Some(("MainProfile", "video"))
        );
        assert_eq!(
            parse_path("rtsp://h/MainProfile"),
            Some(("MainProfile", "video"))
        );
        assert_eq!(parse_path("http://h/x"), None);
        assert_eq!(parse_path("rtsp://hostonly"), None);
    }
}
