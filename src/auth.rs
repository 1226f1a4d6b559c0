// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! ONVIF authentication: HTTP Digest (RFC 2617, MD5 + qop=auth) and
//! WS-UsernameToken.
//!
//! Nonces are 128-bit random values with a five-minute lifetime; a
//! `(nonce, nc)` pair may be used once, which is what makes a qop=auth
//! exchange single-use. Comparisons of client-supplied digests run in
//! constant time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use base::clock::Clocks;
use base::rng::Rng;
use base::{bail, err, strutil, Error};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use conf::{ConfigRuntime, DIGEST_REALM};
use md5::{Digest as _, Md5};
use nom::branch::alt;
use nom::bytes::complete::{take_while, take_while1};
use nom::character::complete::{char, space0};
use nom::multi::separated_list1;
use nom::sequence::{delimited, preceded, separated_pair};
use nom::IResult;
use ring::constant_time::verify_slices_are_equal;
use sha1::Sha1;
use tracing::debug;

/// Nonce validity window, and the WS-UsernameToken `Created` replay window.
pub const NONCE_WINDOW: Duration = Duration::from_secs(300);

/// Cap on tracked nonces; oldest are evicted first.
const MAX_NONCES: usize = 1024;

struct NonceEntry {
    issued: Duration,
    used_nc: HashSet<u64>,
}

pub struct Authenticator {
    rt: Arc<ConfigRuntime>,
    clocks: Arc<dyn Clocks>,
    rng: Arc<dyn Rng>,
    nonces: parking_lot::Mutex<HashMap<String, NonceEntry>>,
}

impl Authenticator {
    pub fn new(rt: Arc<ConfigRuntime>, clocks: Arc<dyn Clocks>, rng: Arc<dyn Rng>) -> Self {
        Authenticator {
            rt,
            clocks,
            rng,
            nonces: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Issues a fresh nonce and returns the `WWW-Authenticate` value.
    pub fn challenge(&self) -> String {
        let mut raw = [0u8; 16];
        self.rng.fill(&mut raw);
        let nonce = strutil::hex(&raw);
        let now = self.clocks.monotonic();
        let mut nonces = self.nonces.lock();
        nonces.retain(|_, e| now.saturating_sub(e.issued) < NONCE_WINDOW);
        if nonces.len() >= MAX_NONCES {
            if let Some(oldest) = nonces
                .iter()
                .min_by_key(|(_, e)| e.issued)
                .map(|(k, _)| k.clone())
            {
                nonces.remove(&oldest);
            }
        }
        nonces.insert(
            nonce.clone(),
            NonceEntry {
                issued: now,
                used_nc: HashSet::new(),
            },
        );
        format!("Digest realm=\"{DIGEST_REALM}\", nonce=\"{nonce}\", qop=\"auth\", algorithm=MD5")
    }

    /// Checks a request against HTTP Digest and/or WS-UsernameToken;
    /// either succeeding authenticates it. Returns the username.
    pub fn authenticate(
        &self,
        authorization: Option<&str>,
        method: &str,
        ws: Option<&crate::soap::WsToken>,
    ) -> Result<String, Error> {
        if let Some(value) = authorization {
            match self.verify_digest(value, method) {
                Ok(user) => return Ok(user),
                Err(e) => debug!(err = %e, "digest authorization rejected"),
            }
        }
        if let Some(token) = ws {
            match self.verify_ws(token) {
                Ok(user) => return Ok(user),
                Err(e) => debug!(err = %e, "ws-usernametoken rejected"),
            }
        }
        Err(err!(Auth, "no valid credentials"))
    }

    fn verify_digest(&self, authorization: &str, method: &str) -> Result<String, Error> {
        let params = parse_digest(authorization).ok_or_else(|| err!(Auth, "malformed digest"))?;
        let get = |k: &str| {
            params
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(k))
                .map(|&(_, v)| v)
        };
        let username = get("username").ok_or_else(|| err!(Auth, "missing username"))?;
        let realm = get("realm").unwrap_or_default();
        if realm != DIGEST_REALM {
            bail!(Auth, "wrong realm");
        }
        let nonce = get("nonce").ok_or_else(|| err!(Auth, "missing nonce"))?;
        let uri = get("uri").ok_or_else(|| err!(Auth, "missing uri"))?;
        let response = get("response").ok_or_else(|| err!(Auth, "missing response"))?;

        let rec = self
            .rt
            .users()
            .get(username)
            .ok_or_else(|| err!(Auth, "unknown user"))?;
        let ha1_hex = strutil::hex(rec.ha1());
        let ha2_hex = md5_hex(format!("{method}:{uri}").as_bytes());

        let expected = match get("qop") {
            Some(qop) if qop.eq_ignore_ascii_case("auth") => {
                let nc = get("nc").ok_or_else(|| err!(Auth, "missing nc"))?;
                let cnonce = get("cnonce").ok_or_else(|| err!(Auth, "missing cnonce"))?;
                self.consume_nonce(nonce, Some(nc))?;
                md5_hex(format!("{ha1_hex}:{nonce}:{nc}:{cnonce}:auth:{ha2_hex}").as_bytes())
            }
            Some(_) => bail!(Auth, "unsupported qop"),
            None => {
                self.consume_nonce(nonce, None)?;
                md5_hex(format!("{ha1_hex}:{nonce}:{ha2_hex}").as_bytes())
            }
        };
        let response = response.to_ascii_lowercase();
        verify_slices_are_equal(expected.as_bytes(), response.as_bytes())
            .map_err(|_| err!(Auth, "bad digest response"))?;
        Ok(username.to_owned())
    }

    /// Validates nonce freshness and, for qop=auth, single use per nc.
    fn consume_nonce(&self, nonce: &str, nc: Option<&str>) -> Result<(), Error> {
        let now = self.clocks.monotonic();
        let mut nonces = self.nonces.lock();
        let entry = nonces
            .get_mut(nonce)
            .ok_or_else(|| err!(Auth, "unknown nonce"))?;
        if now.saturating_sub(entry.issued) >= NONCE_WINDOW {
            nonces.remove(nonce);
            bail!(Auth, "stale nonce");
        }
        match nc {
            Some(nc) => {
                let nc =
                    u64::from_str_radix(nc, 16).map_err(|_| err!(Auth, "malformed nc"))?;
                if !entry.used_nc.insert(nc) {
                    bail!(Auth, "replayed nonce count");
                }
            }
            None => {
                // Without qop the whole nonce is single-use.
                nonces.remove(nonce);
            }
        }
        Ok(())
    }

    fn verify_ws(&self, token: &crate::soap::WsToken) -> Result<String, Error> {
        let rec = self
            .rt
            .users()
            .get(&token.username)
            .ok_or_else(|| err!(Auth, "unknown user"))?;
        let Some(secret) = rec.legacy_secret() else {
            bail!(Auth, "ws-usernametoken not enabled for this user");
        };
        if token.digest {
            let created = token
                .created
                .as_deref()
                .ok_or_else(|| err!(Auth, "missing Created"))?;
            let created_ts: jiff::Timestamp = created
                .parse()
                .map_err(|_| err!(Auth, "malformed Created"))?;
            let now = self.clocks.realtime();
            let skew = (now.as_second() - created_ts.as_second()).abs();
            if skew > NONCE_WINDOW.as_secs() as i64 {
                bail!(Auth, "Created outside replay window");
            }
            let nonce = match token.nonce_b64.as_deref() {
                Some(b64) => BASE64_STANDARD
                    .decode(b64)
                    .map_err(|_| err!(Auth, "malformed Nonce"))?,
                None => Vec::new(),
            };
            let expected = ws_password_digest(&nonce, created, secret);
            verify_slices_are_equal(expected.as_bytes(), token.password.as_bytes())
                .map_err(|_| err!(Auth, "bad password digest"))?;
        } else {
            verify_slices_are_equal(secret.as_bytes(), token.password.as_bytes())
                .map_err(|_| err!(Auth, "bad password"))?;
        }
        Ok(token.username.clone())
    }
}

/// `Base64(SHA1(nonce + created + password))` per the username token profile.
pub fn ws_password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut h = Sha1::new();
    h.update(nonce);
    h.update(created.as_bytes());
    h.update(password.as_bytes());
    BASE64_STANDARD.encode(h.finalize())
}

fn md5_hex(data: &[u8]) -> String {
    strutil::hex(&Md5::digest(data))
}

fn token_chars(i: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || "-._~+/=:".contains(c))(i)
}

fn quoted(i: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_while(|c: char| c != '"'), char('"'))(i)
}

fn param_name(i: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_')(i)
}

fn param(i: &str) -> IResult<&str, (&str, &str)> {
    preceded(
        space0,
        separated_pair(param_name, char('='), alt((quoted, token_chars))),
    )(i)
}

/// Parses `Digest k1="v1", k2=v2, ...` into pairs.
fn parse_digest(value: &str) -> Option<Vec<(&str, &str)>> {
    let rest = value.strip_prefix("Digest")?.trim_start();
    match separated_list1(char(','), param)(rest) {
        Ok((remaining, params)) if remaining.trim().is_empty() => Some(params),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn authenticator() -> (Arc<base::clock::SimulatedClocks>, Authenticator) {
        testutil::init();
        let clocks = testutil::clocks();
        let rt = Arc::new(conf::testutil::runtime_with_admin());
        let auth = Authenticator::new(
            rt,
            clocks.clone(),
            Arc::new(base::rng::SeqRng::new(0xFEED)),
        );
        (clocks, auth)
    }

    fn nonce_from_challenge(challenge: &str) -> String {
        let start = challenge.find("nonce=\"").unwrap() + 7;
        let end = challenge[start..].find('"').unwrap() + start;
        challenge[start..end].to_owned()
    }

    /// What a correct client sends for `admin:admin`.
    fn client_digest(nonce: &str, method: &str, uri: &str, password: &str, nc: &str) -> String {
        let ha1 = md5_hex(format!("admin:{DIGEST_REALM}:{password}").as_bytes());
        let ha2 = md5_hex(format!("{method}:{uri}").as_bytes());
        let response = md5_hex(format!("{ha1}:{nonce}:{nc}:0a4f113b:auth:{ha2}").as_bytes());
        format!(
            "Digest username=\"admin\", realm=\"{DIGEST_REALM}\", nonce=\"{nonce}\", \
             uri=\"{uri}\", qop=auth, nc={nc}, cnonce=\"0a4f113b\", response=\"{response}\", \
             algorithm=MD5"
        )
    }

    #[test]
    fn digest_round_trip() {
        let (_clocks, auth) = authenticator();
        let nonce = nonce_from_challenge(&auth.challenge());
        let header = client_digest(&nonce, "POST", "/onvif/device_service", "admin", "00000001");
        let user = auth
            .verify_digest(&header, "POST")
            .expect("valid digest accepted");
        assert_eq!(user, "admin");
    }

    #[test]
    fn wrong_password_rejected() {
        let (_clocks, auth) = authenticator();
        let nonce = nonce_from_challenge(&auth.challenge());
        let header = client_digest(&nonce, "POST", "/onvif/device_service", "wrong", "00000001");
        assert_eq!(
            auth.verify_digest(&header, "POST").unwrap_err().kind(),
            base::ErrorKind::Auth
        );
    }

    #[test]
    fn nc_replay_rejected_but_increment_accepted() {
        let (_clocks, auth) = authenticator();
        let nonce = nonce_from_challenge(&auth.challenge());
        let uri = "/onvif/device_service";
        auth.verify_digest(&client_digest(&nonce, "POST", uri, "admin", "00000001"), "POST")
            .unwrap();
        // Same nc again: replay.
        auth.verify_digest(&client_digest(&nonce, "POST", uri, "admin", "00000001"), "POST")
            .unwrap_err();
        // Next nc on the same nonce: fine, still within the window.
        auth.verify_digest(&client_digest(&nonce, "POST", uri, "admin", "00000002"), "POST")
            .unwrap();
    }

    #[test]
    fn stale_nonce_rejected() {
        let (clocks, auth) = authenticator();
        let nonce = nonce_from_challenge(&auth.challenge());
        clocks.sleep(Duration::from_secs(301));
        let header = client_digest(&nonce, "POST", "/x", "admin", "00000001");
        assert_eq!(
            auth.verify_digest(&header, "POST").unwrap_err().kind(),
            base::ErrorKind::Auth
        );
    }

    #[test]
    fn unknown_nonce_rejected() {
        let (_clocks, auth) = authenticator();
        let header = client_digest("feedfeedfeedfeed", "POST", "/x", "admin", "00000001");
        auth.verify_digest(&header, "POST").unwrap_err();
    }

    #[test]
    fn ws_password_digest_round_trip() {
        let (_clocks, auth) = authenticator();
        let created = "2026-08-01T00:01:00Z";
        let nonce = b"0123456789abcdef";
        let token = crate::soap::WsToken {
            username: "admin".to_owned(),
            password: ws_password_digest(nonce, created, "admin"),
            digest: true,
            nonce_b64: Some(BASE64_STANDARD.encode(nonce)),
            created: Some(created.to_owned()),
        };
        assert_eq!(auth.verify_ws(&token).unwrap(), "admin");

        let mut bad = token.clone();
        bad.password = ws_password_digest(nonce, created, "wrong");
        auth.verify_ws(&bad).unwrap_err();
    }

    #[test]
    fn ws_created_replay_window() {
        let (clocks, auth) = authenticator();
        clocks.sleep(Duration::from_secs(1000));
        // Created at epoch start, now 1000 s later: outside the window.
        let created = "2026-08-01T00:00:00Z";
        let token = crate::soap::WsToken {
            username: "admin".to_owned(),
            password: ws_password_digest(b"", created, "admin"),
            digest: true,
            nonce_b64: None,
            created: Some(created.to_owned()),
        };
        assert_eq!(auth.verify_ws(&token).unwrap_err().kind(), base::ErrorKind::Auth);
    }

    #[test]
    fn ws_password_text_constant_time_compare() {
        let (_clocks, auth) = authenticator();
        let token = crate::soap::WsToken {
            username: "admin".to_owned(),
            password: "admin".to_owned(),
            digest: false,
            nonce_b64: None,
            created: None,
        };
        assert_eq!(auth.verify_ws(&token).unwrap(), "admin");
        let bad = crate::soap::WsToken {
            password: "nimda".to_owned(),
            ..token
        };
        auth.verify_ws(&bad).unwrap_err();
    }

    #[test]
    fn authenticate_prefers_any_valid_mechanism() {
        let (_clocks, auth) = authenticator();
        // Nothing presented.
        assert_eq!(
            auth.authenticate(None, "POST", None).unwrap_err().kind(),
            base::ErrorKind::Auth
        );
        // Bad digest but good WS token.
        let token = crate::soap::WsToken {
            username: "admin".to_owned(),
            password: "admin".to_owned(),
            digest: false,
            nonce_b64: None,
            created: None,
        };
        let user = auth
            .authenticate(Some("Digest username=\"admin\""), "POST", Some(&token))
            .unwrap();
        assert_eq!(user, "admin");
    }

    #[test]
    fn digest_header_parser() {
        let parsed = parse_digest(
            "Digest username=\"admin\", realm=\"onvifd\", qop=auth, nc=00000001",
        )
        .unwrap();
        assert!(parsed.contains(&("username", "admin")));
        assert!(parsed.contains(&("qop", "auth")));
        assert!(parsed.contains(&("nc", "00000001")));
        assert!(parse_digest("Basic Zm9v").is_none());
    }
}
