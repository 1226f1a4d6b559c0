// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! SOAP action routing: `(service, operation)` → handler.

pub mod envelope;
pub mod fault;
pub mod xml;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use base::clock::Clocks;
use base::rng::Rng;
use base::{err, Error};
use conf::ConfigRuntime;
use tracing::debug;

use crate::hal::Hal;
use crate::router::StreamRouter;
pub use self::envelope::{SoapRequest, WsToken};

/// Long-lived collaborators every handler can reach.
pub struct Ctx {
    pub rt: Arc<ConfigRuntime>,
    pub hal: Hal,
    pub router: Arc<StreamRouter>,
    pub clocks: Arc<dyn Clocks>,
    pub rng: Arc<dyn Rng>,
}

/// Per-request context.
pub struct ReqCtx {
    /// Value of the HTTP `Host` header, for building stream/snapshot URIs.
    pub host: String,
    pub peer: IpAddr,
}

/// A handler renders the operation's response payload (the Body's inner
/// XML) or returns a typed error for the fault mapper.
pub type Handler =
    for<'a, 'input> fn(&Ctx, &ReqCtx, roxmltree::Node<'a, 'input>) -> Result<String, Error>;

pub struct Dispatcher {
    ctx: Ctx,
    handlers: HashMap<(&'static str, &'static str), Handler>,
}

impl Dispatcher {
    pub fn new(ctx: Ctx) -> Self {
        Dispatcher {
            ctx,
            handlers: HashMap::new(),
        }
    }

    /// Registration is additive; a duplicate is a wiring bug caught at
    /// startup.
    pub fn register(
        &mut self,
        service: &'static str,
        operation: &'static str,
        handler: Handler,
    ) -> Result<(), Error> {
        if self.handlers.insert((service, operation), handler).is_some() {
            return Err(err!(Internal, "duplicate handler {service}:{operation}"));
        }
        Ok(())
    }

    /// Routes an already-authenticated request. Returns the HTTP status and
    /// response envelope.
    pub fn dispatch(&self, service: &str, req: &SoapRequest, rctx: &ReqCtx) -> (u16, String) {
        let op_node = match req.operation_node() {
            Ok(n) => n,
            Err(e) => return fault::fault_for(&e),
        };
        let operation = op_node.tag_name().name();
        // The registry is small; scan rather than fight the borrow checker
        // over non-static tuple keys.
        let handler = self
            .handlers
            .iter()
            .find(|((s, o), _)| *s == service && *o == operation)
            .map(|(_, h)| h);
        let Some(handler) = handler else {
            debug!(service, operation, "no handler registered");
            return fault::action_not_supported(operation);
        };
        match handler(&self.ctx, rctx, op_node) {
            Ok(inner) => (200, fault::envelope(&inner)),
            Err(e) => {
                debug!(service, operation, err = %e, "handler error");
                fault::fault_for(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn ok_handler(
        _: &Ctx,
        _: &ReqCtx,
        _: roxmltree::Node<'_, '_>,
    ) -> Result<String, Error> {
        Ok("<tds:GetScopesResponse/>".to_owned())
    }

    #[test]
    fn duplicate_registration_is_error() {
        let mut d = Dispatcher::new(testutil::ctx());
        d.register("device", "GetScopes", ok_handler).unwrap();
        let e = d.register("device", "GetScopes", ok_handler).unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::Internal);
    }

    #[test]
    fn dispatch_hit_and_miss() {
        let mut d = Dispatcher::new(testutil::ctx());
        d.register("device", "GetScopes", ok_handler).unwrap();

        let body = r#"<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope"><e:Body><GetScopes/></e:Body></e:Envelope>"#;
        let req = SoapRequest::parse(body).unwrap();
        let rctx = testutil::req_ctx();

        let (status, xml) = d.dispatch("device", &req, &rctx);
        assert_eq!(status, 200);
        assert!(xml.contains("GetScopesResponse"));

        let (status, xml) = d.dispatch("media", &req, &rctx);
        assert_eq!(status, 400);
        assert!(xml.contains("ter:ActionNotSupported"));
    }
}
