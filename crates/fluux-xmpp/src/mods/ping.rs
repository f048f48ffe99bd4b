// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::time::Duration;

use anyhow::Result;
use jid::Jid;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::ping;
use xmpp_parsers::time::TimeResult;

use crate::client::ModuleContext;
use crate::mods::{Dispatch, Module};
use crate::ns;
use crate::util::RequestError;

/// The short deadline makes the ping usable as a connection liveness
/// probe after wake-from-sleep.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// XEP-0199: XMPP Ping
#[derive(Default, Clone)]
pub struct Ping {
    ctx: ModuleContext,
}

impl Module for Ping {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn handle_iq_stanza(&self, stanza: &Iq) -> Result<Dispatch> {
        let IqType::Get(payload) = &stanza.payload else {
            return Ok(Dispatch::Pass);
        };

        if payload.is("ping", ns::PING) {
            let mut result = Iq::from_result(stanza.id.clone(), None::<TimeResult>);
            result.to = stanza.from.clone();
            self.ctx.send_stanza(result)?;
            return Ok(Dispatch::Claimed);
        }

        // XEP-0202 rides along here; it is the same liveness surface.
        if payload.is("time", ns::TIME) {
            let mut result = Iq::from_result(
                stanza.id.clone(),
                Some(TimeResult(xmpp_parsers::date::DateTime(self.ctx.now()))),
            );
            result.to = stanza.from.clone();
            self.ctx.send_stanza(result)?;
            return Ok(Dispatch::Claimed);
        }

        Ok(Dispatch::Pass)
    }
}

impl Ping {
    pub async fn send_ping_to_server(&self) -> Result<(), RequestError> {
        self.send_ping(Jid::from(self.ctx.server_jid())).await
    }

    /// Pings `to` and fails fast. A timeout or error means the
    /// connection cannot be trusted.
    pub async fn send_ping(&self, to: Jid) -> Result<(), RequestError> {
        self.ctx
            .send_iq_with_timeout(
                Iq::from_get(self.ctx.generate_id(), ping::Ping).with_to(to),
                PING_TIMEOUT,
            )
            .await?;
        Ok(())
    }
}
