// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use jid::Jid;
use xmpp_parsers::blocking::{Block, BlocklistRequest, BlocklistResult, Unblock};
use xmpp_parsers::iq::{Iq, IqType};

use crate::client::ModuleContext;
use crate::event::Event as ClientEvent;
use crate::mods::{Dispatch, Module};
use crate::ns;
use crate::util::RequestError;

/// XEP-0191: Blocking Command
#[derive(Default, Clone)]
pub struct Blocking {
    ctx: ModuleContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The server pushed additions to the blocklist.
    Blocked { jids: Vec<Jid> },
    /// The server pushed removals from the blocklist.
    Unblocked { jids: Vec<Jid> },
    /// The whole blocklist was cleared.
    UnblockedAll,
}

impl Module for Blocking {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn handle_iq_stanza(&self, stanza: &Iq) -> Result<Dispatch> {
        let IqType::Set(payload) = &stanza.payload else {
            return Ok(Dispatch::Pass);
        };

        if !payload.has_ns(ns::BLOCKING) {
            return Ok(Dispatch::Pass);
        }

        match payload.name() {
            "block" => {
                let block = Block::try_from(payload.clone())?;
                self.ctx
                    .schedule_event(ClientEvent::Blocking(Event::Blocked { jids: block.items }));
            }
            "unblock" => {
                let unblock = Unblock::try_from(payload.clone())?;
                if unblock.items.is_empty() {
                    self.ctx
                        .schedule_event(ClientEvent::Blocking(Event::UnblockedAll));
                } else {
                    self.ctx
                        .schedule_event(ClientEvent::Blocking(Event::Unblocked {
                            jids: unblock.items,
                        }));
                }
            }
            _ => return Ok(Dispatch::Pass),
        }

        self.ctx
            .send_stanza(Iq::from_result(stanza.id.clone(), None::<BlocklistResult>))?;

        Ok(Dispatch::Claimed)
    }
}

impl Blocking {
    pub async fn load_blocklist(&self) -> Result<Vec<Jid>, RequestError> {
        let response = self
            .ctx
            .send_iq(Iq::from_get(self.ctx.generate_id(), BlocklistRequest))
            .await?
            .ok_or(RequestError::UnexpectedResponse)?;

        let blocklist =
            BlocklistResult::try_from(response).map_err(|err| RequestError::Generic {
                msg: err.to_string(),
            })?;
        Ok(blocklist.items)
    }

    pub async fn block(&self, jid: &Jid) -> Result<(), RequestError> {
        self.ctx
            .send_iq(Iq::from_set(
                self.ctx.generate_id(),
                Block {
                    items: vec![jid.clone()],
                },
            ))
            .await?;
        Ok(())
    }

    pub async fn unblock(&self, jid: &Jid) -> Result<(), RequestError> {
        self.ctx
            .send_iq(Iq::from_set(
                self.ctx.generate_id(),
                Unblock {
                    items: vec![jid.clone()],
                },
            ))
            .await?;
        Ok(())
    }

    /// Clears the blocklist entirely.
    pub async fn unblock_all(&self) -> Result<(), RequestError> {
        self.ctx
            .send_iq(Iq::from_set(
                self.ctx.generate_id(),
                Unblock { items: vec![] },
            ))
            .await?;
        Ok(())
    }
}
