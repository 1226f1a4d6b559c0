// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! User/credential store.
//!
//! At rest each user carries:
//!   * a PBKDF2-HMAC-SHA256 hash (`salt_hex$derived_hex`) — the canonical
//!     verifier for `verify_user`;
//!   * the HTTP Digest `HA1 = MD5(user:realm:password)`, which the Digest
//!     scheme requires the server to keep;
//!   * optionally a base64 legacy secret enabling WS-UsernameToken
//!     PasswordDigest/PasswordText checks for clients that cannot do HTTP
//!     Digest. Users created without it simply cannot use WS tokens.

use std::collections::BTreeMap;
use std::num::NonZeroU32;

use base::{bail, err, strutil, Error};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use md5::{Digest as _, Md5};
use parking_lot::Mutex;
use ring::pbkdf2;

/// Realm used for HTTP Digest challenges; baked into every stored HA1, so
/// changing it invalidates all Digest credentials.
pub const DIGEST_REALM: &str = "onvifd";

const PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;
const SALT_LEN: usize = 16;
const DERIVED_LEN: usize = 32;

/// Iteration count; modest because the target hardware is ARMv5-class.
fn iterations() -> NonZeroU32 {
    NonZeroU32::new(if cfg!(test) { 32 } else { 4096 }).unwrap()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessLevel {
    Administrator,
    Operator,
    User,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Administrator => "administrator",
            AccessLevel::Operator => "operator",
            AccessLevel::User => "user",
        }
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "administrator" => Ok(AccessLevel::Administrator),
            "operator" => Ok(AccessLevel::Operator),
            "user" => Ok(AccessLevel::User),
            _ => Err(err!(Invalid, "unknown access level {s:?}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct UserRecord {
    pub name: String,
    pub level: AccessLevel,
    /// `salt_hex$derived_hex`.
    pbkdf2: String,
    ha1: [u8; 16],
    legacy_secret: Option<String>,
}

impl UserRecord {
    /// The Digest `HA1` for this user.
    pub fn ha1(&self) -> &[u8; 16] {
        &self.ha1
    }

    /// The recoverable secret for WS-UsernameToken checks, if enabled.
    pub fn legacy_secret(&self) -> Option<&str> {
        self.legacy_secret.as_deref()
    }
}

fn compute_ha1(name: &str, password: &str) -> [u8; 16] {
    let mut h = Md5::new();
    h.update(name.as_bytes());
    h.update(b":");
    h.update(DIGEST_REALM.as_bytes());
    h.update(b":");
    h.update(password.as_bytes());
    h.finalize().into()
}

/// Thread-safe user table. Deliberately small: the device ships with a
/// handful of accounts, not a directory.
pub struct UserDb {
    // BTreeMap so saves emit users in a stable order.
    inner: Mutex<BTreeMap<String, UserRecord>>,
}

impl UserDb {
    pub fn new() -> Self {
        UserDb {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Adds or replaces a user, hashing the password. The cleartext is not
    /// retained.
    pub fn register(
        &self,
        name: &str,
        password: &str,
        level: AccessLevel,
        rng: &dyn base::rng::Rng,
    ) -> Result<(), Error> {
        self.register_inner(name, password, level, rng, false)
    }

    /// Like [`register`](Self::register), but additionally retains the
    /// secret for WS-UsernameToken compatibility. Used for the bootstrap
    /// admin account and for operators who explicitly opt legacy clients in.
    pub fn register_with_legacy(
        &self,
        name: &str,
        password: &str,
        level: AccessLevel,
        rng: &dyn base::rng::Rng,
    ) -> Result<(), Error> {
        self.register_inner(name, password, level, rng, true)
    }

    fn register_inner(
        &self,
        name: &str,
        password: &str,
        level: AccessLevel,
        rng: &dyn base::rng::Rng,
        legacy: bool,
    ) -> Result<(), Error> {
        if name.is_empty() || name.len() > 32 || name.contains(|c: char| c.is_control() || c == ':')
        {
            bail!(Invalid, "bad user name");
        }
        let mut salt = [0u8; SALT_LEN];
        rng.fill(&mut salt);
        let mut derived = [0u8; DERIVED_LEN];
        pbkdf2::derive(
            PBKDF2_ALG,
            iterations(),
            &salt,
            password.as_bytes(),
            &mut derived,
        );
        let rec = UserRecord {
            name: name.to_owned(),
            level,
            pbkdf2: format!("{}${}", strutil::hex(&salt), strutil::hex(&derived)),
            ha1: compute_ha1(name, password),
            legacy_secret: legacy.then(|| password.to_owned()),
        };
        self.inner.lock().insert(name.to_owned(), rec);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<(), Error> {
        match self.inner.lock().remove(name) {
            Some(_) => Ok(()),
            None => Err(err!(NotFound, "no such user {name:?}")),
        }
    }

    /// Verifies a password against the stored PBKDF2 hash.
    pub fn verify(&self, name: &str, password: &str) -> Result<(), Error> {
        let rec = self.get(name).ok_or_else(|| err!(Auth, "unknown user"))?;
        let (salt_hex, derived_hex) = rec
            .pbkdf2
            .split_once('$')
            .ok_or_else(|| err!(Internal, "malformed stored hash"))?;
        let salt: [u8; SALT_LEN] = strutil::dehex(salt_hex.as_bytes())
            .map_err(|_| err!(Internal, "malformed stored hash"))?;
        let derived: [u8; DERIVED_LEN] = strutil::dehex(derived_hex.as_bytes())
            .map_err(|_| err!(Internal, "malformed stored hash"))?;
        pbkdf2::verify(
            PBKDF2_ALG,
            iterations(),
            &salt,
            password.as_bytes(),
            &derived,
        )
        .map_err(|_| err!(Auth, "bad password for {name:?}"))
    }

    pub fn get(&self, name: &str) -> Option<UserRecord> {
        self.inner.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<(String, AccessLevel)> {
        self.inner
            .lock()
            .values()
            .map(|r| (r.name.clone(), r.level))
            .collect()
    }

    /// Serializes one `key = value` line body per user for the `[users]`
    /// INI section: `level:salt$derived:ha1_hex[:legacy_b64]`.
    pub fn to_ini(&self) -> Vec<(String, String)> {
        self.inner
            .lock()
            .values()
            .map(|r| {
                let mut v = format!(
                    "{}:{}:{}",
                    r.level.as_str(),
                    r.pbkdf2,
                    strutil::hex(&r.ha1)
                );
                if let Some(ref s) = r.legacy_secret {
                    v.push(':');
                    v.push_str(&BASE64_STANDARD.encode(s.as_bytes()));
                }
                (r.name.clone(), v)
            })
            .collect()
    }

    /// Parses a `[users]` line produced by [`to_ini`](Self::to_ini).
    pub fn insert_from_ini(&self, name: &str, value: &str) -> Result<(), Error> {
        let mut parts = value.split(':');
        let level = AccessLevel::parse(parts.next().unwrap_or_default())?;
        let pbkdf2 = parts
            .next()
            .ok_or_else(|| err!(Parse, "missing password hash"))?;
        if pbkdf2
            .split_once('$')
            .map(|(s, d)| s.len() != SALT_LEN * 2 || d.len() != DERIVED_LEN * 2)
            .unwrap_or(true)
        {
            bail!(Parse, "malformed password hash");
        }
        let ha1_hex = parts.next().ok_or_else(|| err!(Parse, "missing ha1"))?;
        let ha1: [u8; 16] =
            strutil::dehex(ha1_hex.as_bytes()).map_err(|_| err!(Parse, "malformed ha1"))?;
        let legacy_secret = match parts.next() {
            None => None,
            Some(b64) => Some(
                String::from_utf8(
                    BASE64_STANDARD
                        .decode(b64)
                        .map_err(|_| err!(Parse, "malformed legacy secret"))?,
                )
                .map_err(|_| err!(Parse, "malformed legacy secret"))?,
            ),
        };
        self.inner.lock().insert(
            name.to_owned(),
            UserRecord {
                name: name.to_owned(),
                level,
                pbkdf2: pbkdf2.to_owned(),
                ha1,
                legacy_secret,
            },
        );
        Ok(())
    }
}

impl Default for UserDb {
    fn default() -> Self {
        Self::new()
    }
}
