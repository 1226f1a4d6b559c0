// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! HTTP surface: request routing, authentication gating, and the SOAP
//! hand-off. The connection/event machinery lives in [`crate::net`]; this
//! layer is a pure `Request → Response` function, which keeps it testable
//! without sockets.

pub mod metrics;
pub mod request;
pub mod response;

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base::rng::Rng;
use base::strutil;
use conf::ConfigRuntime;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::hal::SnapshotSource;
use crate::soap::{fault, Dispatcher, ReqCtx, SoapRequest};
use crate::telemetry::MemoryBudget;
use self::metrics::HttpMetrics;
use self::request::{Method, Request};
use self::response::Response;

/// Scratch reserved against the memory budget while a SOAP request is
/// in flight.
const SOAP_SCRATCH: usize = 64 * 1024;

pub struct Service {
    pub rt: Arc<ConfigRuntime>,
    pub auth: Arc<Authenticator>,
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<HttpMetrics>,
    pub budget: Arc<MemoryBudget>,
    pub snapshot_source: Arc<dyn SnapshotSource>,
    pub rng: Arc<dyn Rng>,
    degraded: AtomicBool,
}

impl Service {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rt: Arc<ConfigRuntime>,
        auth: Arc<Authenticator>,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<HttpMetrics>,
        budget: Arc<MemoryBudget>,
        snapshot_source: Arc<dyn SnapshotSource>,
        rng: Arc<dyn Rng>,
    ) -> Self {
        Service {
            rt,
            auth,
            dispatcher,
            metrics,
            budget,
            snapshot_source,
            rng,
            degraded: AtomicBool::new(false),
        }
    }

    /// Marks the daemon degraded (e.g. config loaded with errors).
    pub fn set_degraded(&self) {
        self.degraded.store(true, Ordering::Relaxed);
    }

    fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed) || self.budget.tripped()
    }

    /// Routes one parsed request. The caller records metrics and handles
    /// connection lifecycle.
    pub fn handle(&self, req: &Request, peer: IpAddr) -> Response {
        let correlation = strutil::hex(&self.rng.u32().to_be_bytes());
        let resp = self.route(req, peer, &correlation);
        if resp.status >= 400 {
            info!(
                %peer,
                path = req.target,
                status = resp.status,
                id = %correlation,
                "request failed"
            );
        }
        resp.with_header("X-Request-Id", &correlation)
    }

    fn route(&self, req: &Request, peer: IpAddr, correlation: &str) -> Response {
        if let Some(service) = req
            .target
            .strip_prefix("/onvif/")
            .and_then(|rest| rest.strip_suffix("_service"))
        {
            return self.handle_soap(service, req, peer, correlation);
        }
        match (req.method, req.target) {
            (Method::Get, "/healthz") => Response::plain(
                200,
                if self.is_degraded() {
                    "status=degraded\n"
                } else {
                    "status=ok\n"
                },
            ),
            (Method::Get, "/snapshot") => self.handle_snapshot(req),
            (Method::Post, "/healthz") | (Method::Post, "/snapshot") => {
                Response::plain(405, "method not allowed\n").with_header("Allow", "GET")
            }
            _ => Response::plain(404, "not found\n"),
        }
    }

    fn handle_snapshot(&self, req: &Request) -> Response {
        // Camera imagery is as sensitive as the SOAP surface; same gate.
        if let Err(e) = self
            .auth
            .authenticate(req.header("authorization"), req.method.as_str(), None)
        {
            debug!(err = %e, "snapshot auth failed");
            return self.unauthorized_plain();
        }
        match self.snapshot_source.jpeg() {
            Ok(bytes) => Response::jpeg(bytes),
            Err(e) => {
                warn!(err = %e, "snapshot source failed");
                Response::plain(500, "internal error\n")
            }
        }
    }

    fn handle_soap(
        &self,
        service: &str,
        req: &Request,
        peer: IpAddr,
        correlation: &str,
    ) -> Response {
        if req.method != Method::Post {
            return Response::plain(405, "method not allowed\n").with_header("Allow", "POST");
        }
        let known = matches!(service, "device" | "media" | "ptz" | "imaging" | "snapshot");
        if !known {
            return Response::plain(404, "not found\n");
        }
        if !self.budget.try_reserve(SOAP_SCRATCH) {
            let (status, body) = fault::fault_for(&base::err!(Unavailable, "memory budget"));
            return Response::soap(status, body);
        }
        let resp = self.dispatch_soap(service, req, peer, correlation);
        self.budget.release(SOAP_SCRATCH);
        resp
    }

    fn dispatch_soap(
        &self,
        service: &str,
        req: &Request,
        peer: IpAddr,
        correlation: &str,
    ) -> Response {
        let Ok(body) = std::str::from_utf8(&req.body) else {
            let (status, xml) = fault::fault_for(&base::err!(Parse, "body is not UTF-8"));
            return Response::soap(status, xml);
        };
        let envelope = match SoapRequest::parse(body) {
            Ok(e) => e,
            Err(e) => {
                debug!(id = %correlation, err = %e, "bad SOAP envelope");
                let (status, xml) = fault::fault_for(&e);
                return Response::soap(status, xml);
            }
        };

        let ws = envelope.ws_token();
        if let Err(e) = self.auth.authenticate(
            req.header("authorization"),
            req.method.as_str(),
            ws.as_ref(),
        ) {
            debug!(id = %correlation, err = %e, "authentication failed");
            return self.unauthorized_soap();
        }

        let rctx = ReqCtx {
            host: req.header("host").unwrap_or("localhost").to_owned(),
            peer,
        };
        let (status, xml) = self.dispatcher.dispatch(service, &envelope, &rctx);
        Response::soap(status, xml)
    }

    /// 401 with a fresh Digest challenge and a SOAP fault body.
    fn unauthorized_soap(&self) -> Response {
        let challenge = self.auth.challenge();
        let (status, xml) = fault::fault_for(&base::err!(Auth));
        Response::soap(status, xml).with_header("WWW-Authenticate", &challenge)
    }

    fn unauthorized_plain(&self) -> Response {
        let challenge = self.auth.challenge();
        Response::plain(401, "unauthorized\n").with_header("WWW-Authenticate", &challenge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::Dispatcher;
    use crate::testutil;
    use super::request::{parse, Outcome};

    fn service_with_budget(budget: MemoryBudget) -> Service {
        let ctx = testutil::ctx();
        let (rt, clocks, rng, snap) = (
            ctx.rt.clone(),
            ctx.clocks.clone(),
            ctx.rng.clone(),
            ctx.hal.snapshot.clone(),
        );
        let mut dispatcher = Dispatcher::new(ctx);
        crate::services::register_all(&mut dispatcher).unwrap();
        let auth = Arc::new(Authenticator::new(rt.clone(), clocks, rng.clone()));
        Service::new(
            rt,
            auth,
            Arc::new(dispatcher),
            Arc::new(HttpMetrics::new()),
            Arc::new(budget),
            snap,
            rng,
        )
    }

    fn service() -> Service {
        service_with_budget(MemoryBudget::default())
    }

    fn peer() -> IpAddr {
        "192.0.2.9".parse().unwrap()
    }

    fn parse_req(buf: &[u8]) -> Request<'_> {
        match parse(buf, 32 * 1024) {
            Outcome::Ready(r) => r,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn healthz_is_open_and_ok() {
        let svc = service();
        let req = parse_req(b"GET /healthz HTTP/1.1\r\nHost: cam\r\n\r\n");
        let resp = svc.handle(&req, peer());
        assert_eq!(resp.status, 200);
        let text = String::from_utf8(resp.serialize("D")).unwrap();
        assert!(text.ends_with("status=ok\n"));

        svc.set_degraded();
        let resp = svc.handle(&req, peer());
        let text = String::from_utf8(resp.serialize("D")).unwrap();
        assert!(text.ends_with("status=degraded\n"));
    }

    #[test]
    fn soap_without_auth_gets_challenge_and_fault() {
        let svc = service();
        let body = r#"<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"><e:Body><GetDeviceInformation/></e:Body></e:Envelope>"#;
        let raw = format!(
            "POST /onvif/device_service HTTP/1.1\r\nHost: cam\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let req = parse_req(raw.as_bytes());
        let resp = svc.handle(&req, peer());
        assert_eq!(resp.status, 401);
        let text = String::from_utf8(resp.serialize("D")).unwrap();
        assert!(text.contains("WWW-Authenticate: Digest realm=\"onvifd\""));
        assert!(text.contains("qop=\"auth\""));
        assert!(text.contains("wsse:FailedAuthentication"));
    }

    #[test]
    fn soap_with_ws_token_succeeds() {
        let svc = service();
        let body = r#"<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"><e:Header><wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"><wsse:UsernameToken><wsse:Username>admin</wsse:Username><wsse:Password>admin</wsse:Password></wsse:UsernameToken></wsse:Security></e:Header><e:Body><GetDeviceInformation/></e:Body></e:Envelope>"#;
        let raw = format!(
            "POST /onvif/device_service HTTP/1.1\r\nHost: cam.local:8080\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let req = parse_req(raw.as_bytes());
        let resp = svc.handle(&req, peer());
        assert_eq!(resp.status, 200);
        let text = String::from_utf8(resp.serialize("D")).unwrap();
        assert!(text.contains("<tds:Manufacturer>ONVIF-Camera</tds:Manufacturer>"));
        assert!(text.contains("<tds:Model>AK3918</tds:Model>"));
        assert!(text.contains("Content-Type: application/soap+xml; charset=utf-8"));
    }

    /// The discovery+info scenario: challenge, then Digest-authenticated
    /// GetDeviceInformation as `admin:admin`.
    #[test]
    fn digest_authenticated_device_information() {
        use md5::{Digest as _, Md5};

        let svc = service();
        // First round: collect the challenge.
        let body = r#"<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"><e:Body><GetDeviceInformation/></e:Body></e:Envelope>"#;
        let raw = format!(
            "POST /onvif/device_service HTTP/1.1\r\nHost: cam\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let req = parse_req(raw.as_bytes());
        let challenge = String::from_utf8(svc.handle(&req, peer()).serialize("D")).unwrap();
        let start = challenge.find("nonce=\"").unwrap() + 7;
        let end = challenge[start..].find('"').unwrap() + start;
        let nonce = &challenge[start..end];

        // Second round: respond to it.
        let hex = |d: [u8; 16]| base::strutil::hex(&d);
        let ha1 = hex(Md5::digest(b"admin:onvifd:admin").into());
        let ha2 = hex(Md5::digest(b"POST:/onvif/device_service").into());
        let response = hex(Md5::digest(
            format!("{ha1}:{nonce}:00000001:abcd:auth:{ha2}").as_bytes(),
        )
        .into());
        let authz = format!(
            "Digest username=\"admin\", realm=\"onvifd\", nonce=\"{nonce}\", \
             uri=\"/onvif/device_service\", qop=auth, nc=00000001, cnonce=\"abcd\", \
             response=\"{response}\", algorithm=MD5"
        );
        let raw = format!(
            "POST /onvif/device_service HTTP/1.1\r\nHost: cam\r\nAuthorization: {}\r\nContent-Length: {}\r\n\r\n{}",
            authz,
            body.len(),
            body
        );
        let req = parse_req(raw.as_bytes());
        let resp = svc.handle(&req, peer());
        assert_eq!(resp.status, 200);
        let text = String::from_utf8(resp.serialize("D")).unwrap();
        assert!(text.contains("<tds:Manufacturer>ONVIF-Camera</tds:Manufacturer>"));

        // Wrong password: 401 with a fresh challenge and an auth fault.
        let bad_ha1 = hex(Md5::digest(b"admin:onvifd:wrong").into());
        let bad_response = hex(Md5::digest(
            format!("{bad_ha1}:{nonce}:00000002:abcd:auth:{ha2}").as_bytes(),
        )
        .into());
        let authz = authz
            .replace(&response, &bad_response)
            .replace("nc=00000001", "nc=00000002");
        let raw = format!(
            "POST /onvif/device_service HTTP/1.1\r\nHost: cam\r\nAuthorization: {}\r\nContent-Length: {}\r\n\r\n{}",
            authz,
            body.len(),
            body
        );
        let req = parse_req(raw.as_bytes());
        let resp = svc.handle(&req, peer());
        assert_eq!(resp.status, 401);
        let text = String::from_utf8(resp.serialize("D")).unwrap();
        assert!(text.contains("WWW-Authenticate: Digest"));
        assert!(text.contains("wsse:FailedAuthentication"));
    }

    #[test]
    fn snapshot_service_path_answers_get_snapshot_uri() {
        let svc = service();
        let body = r#"<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"><e:Header><wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"><wsse:UsernameToken><wsse:Username>admin</wsse:Username><wsse:Password>admin</wsse:Password></wsse:UsernameToken></wsse:Security></e:Header><e:Body><GetSnapshotUri><ProfileToken>MainProfile</ProfileToken></GetSnapshotUri></e:Body></e:Envelope>"#;
        let raw = format!(
            "POST /onvif/snapshot_service HTTP/1.1\r\nHost: cam.local:8080\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let req = parse_req(raw.as_bytes());
        let resp = svc.handle(&req, peer());
        assert_eq!(resp.status, 200);
        let text = String::from_utf8(resp.serialize("D")).unwrap();
        assert!(text.contains("<tt:Uri>http://cam.local:8080/snapshot</tt:Uri>"));

        // The service exposes only the snapshot URI; anything else faults.
        let body = r#"<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"><e:Header><wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"><wsse:UsernameToken><wsse:Username>admin</wsse:Username><wsse:Password>admin</wsse:Password></wsse:UsernameToken></wsse:Security></e:Header><e:Body><GetProfiles/></e:Body></e:Envelope>"#;
        let raw = format!(
            "POST /onvif/snapshot_service HTTP/1.1\r\nHost: cam.local:8080\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let req = parse_req(raw.as_bytes());
        let resp = svc.handle(&req, peer());
        assert_eq!(resp.status, 400);
        let text = String::from_utf8(resp.serialize("D")).unwrap();
        assert!(text.contains("ter:ActionNotSupported"));
    }

    #[test]
    fn snapshot_requires_auth_then_serves_jpeg() {
        let svc = service();
        let req = parse_req(b"GET /snapshot HTTP/1.1\r\nHost: cam\r\n\r\n");
        let resp = svc.handle(&req, peer());
        assert_eq!(resp.status, 401);
    }

    #[test]
    fn unknown_path_is_404() {
        let svc = service();
        let req = parse_req(b"GET /admin HTTP/1.1\r\nHost: cam\r\n\r\n");
        assert_eq!(svc.handle(&req, peer()).status, 404);
        let req = parse_req(b"POST /onvif/ghost_service HTTP/1.1\r\nHost: cam\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(svc.handle(&req, peer()).status, 404);
    }

    #[test]
    fn get_on_soap_path_is_405() {
        let svc = service();
        let req = parse_req(b"GET /onvif/device_service HTTP/1.1\r\nHost: cam\r\n\r\n");
        let resp = svc.handle(&req, peer());
        assert_eq!(resp.status, 405);
        let text = String::from_utf8(resp.serialize("D")).unwrap();
        assert!(text.contains("Allow: POST"));
    }

    #[test]
    fn budget_exhaustion_sheds_with_503_fault() {
        // Too small for the SOAP scratch reservation.
        let svc = service_with_budget(MemoryBudget::new(1024));
        let body = r#"<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"><e:Body><GetProfiles/></e:Body></e:Envelope>"#;
        let raw = format!(
            "POST /onvif/media_service HTTP/1.1\r\nHost: cam\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let req = parse_req(raw.as_bytes());
        let resp = svc.handle(&req, peer());
        assert_eq!(resp.status, 503);
        let text = String::from_utf8(resp.serialize("D")).unwrap();
        assert!(text.contains("ter:NotAvailable"));
    }

    #[test]
    fn malformed_soap_is_invalid_arg_fault() {
        let svc = service();
        let raw = "POST /onvif/device_service HTTP/1.1\r\nHost: cam\r\nContent-Length: 7\r\n\r\nnot-xml";
        let req = parse_req(raw.as_bytes());
        let resp = svc.handle(&req, peer());
        assert_eq!(resp.status, 400);
    }
}
