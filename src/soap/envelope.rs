// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! SOAP envelope parsing.
//!
//! We parse with `roxmltree` and match on local names only: ONVIF clients
//! use wildly different prefixes, and the operation vocabulary is unambiguous
//! without namespace checks on this class of device.

use base::{err, Error};
use roxmltree::{Document, Node};

use super::xml;

#[derive(Debug)]
pub struct SoapRequest<'input> {
    doc: Document<'input>,
}

/// A `<wsse:UsernameToken>` pulled from the SOAP header.
#[derive(Debug, Clone, PartialEq)]
pub struct WsToken {
    pub username: String,
    pub password: String,
    /// True for PasswordDigest, false for PasswordText.
    pub digest: bool,
    pub nonce_b64: Option<String>,
    pub created: Option<String>,
}

impl<'input> SoapRequest<'input> {
    pub fn parse(body: &'input str) -> Result<Self, Error> {
        let doc = Document::parse(body).map_err(|e| err!(Parse, "malformed SOAP envelope: {e}"))?;
        if doc.root_element().tag_name().name() != "Envelope" {
            return Err(err!(Parse, "not a SOAP envelope"));
        }
        let req = SoapRequest { doc };
        req.body()?; // must exist
        Ok(req)
    }

    fn body(&self) -> Result<Node<'_, 'input>, Error> {
        self.doc
            .root_element()
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "Body")
            .ok_or_else(|| err!(Parse, "envelope has no Body"))
    }

    /// The top-level body element naming the operation.
    pub fn operation_node(&self) -> Result<Node<'_, 'input>, Error> {
        self.body()?
            .children()
            .find(|n| n.is_element())
            .ok_or_else(|| err!(Parse, "empty SOAP Body"))
    }

    pub fn operation(&self) -> Result<&'input str, Error> {
        Ok(self.operation_node()?.tag_name().name())
    }

    /// The WS-UsernameToken, if the header carries one.
    pub fn ws_token(&self) -> Option<WsToken> {
        let token = xml::find(self.doc.root_element(), "UsernameToken")?;
        let username = xml::find_text(token, "Username")?.to_owned();
        let password_node = xml::find(token, "Password")?;
        let password = password_node.text().unwrap_or("").trim().to_owned();
        let digest = password_node
            .attribute("Type")
            .map(|t| t.ends_with("PasswordDigest"))
            .unwrap_or(false);
        Some(WsToken {
            username,
            password,
            digest,
            nonce_b64: xml::find_text(token, "Nonce").map(str::to_owned),
            created: xml::find_text(token, "Created").map(str::to_owned),
        })
    }
}
