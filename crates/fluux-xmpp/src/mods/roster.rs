// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use jid::{BareJid, Jid};
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::presence::{self, Presence, Show};
use xmpp_parsers::roster::{Ask, Item, Roster as RosterQuery, Subscription};

use crate::client::ModuleContext;
use crate::event::Event as ClientEvent;
use crate::mods::{Dispatch, Module};
use crate::ns;
use crate::util::RequestError;

/// Contact list (RFC 6121) plus the user-presence plumbing: inbound
/// presence fan-out and our own broadcast presence.
#[derive(Default, Clone)]
pub struct Roster {
    ctx: ModuleContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The server pushed a roster change (add, update, remove).
    Push { item: Item },
    /// Somebody asks to see our presence.
    SubscriptionRequest { from: BareJid, status: Option<String> },
    /// A contact's resource changed availability. Includes error
    /// presences, which record per-contact delivery problems.
    PresenceChanged { from: Jid, presence: Presence },
}

impl Module for Roster {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn handle_presence_stanza(&self, stanza: &Presence) -> Result<Dispatch> {
        // Room presences belong to the MUC module further down the chain.
        if stanza
            .payloads
            .iter()
            .any(|payload| payload.is("x", ns::MUC_USER))
        {
            return Ok(Dispatch::Pass);
        }

        let Some(from) = &stanza.from else {
            return Ok(Dispatch::Pass);
        };

        match stanza.type_ {
            presence::Type::Subscribe => {
                self.ctx
                    .schedule_event(ClientEvent::Roster(Event::SubscriptionRequest {
                        from: from.to_bare(),
                        status: stanza.statuses.values().next().cloned(),
                    }));
                Ok(Dispatch::Claimed)
            }
            presence::Type::None
            | presence::Type::Unavailable
            | presence::Type::Error
            | presence::Type::Subscribed
            | presence::Type::Unsubscribe
            | presence::Type::Unsubscribed => {
                self.ctx
                    .schedule_event(ClientEvent::Roster(Event::PresenceChanged {
                        from: from.clone(),
                        presence: stanza.clone(),
                    }));
                Ok(Dispatch::Claimed)
            }
            presence::Type::Probe => Ok(Dispatch::Pass),
        }
    }

    fn handle_iq_stanza(&self, stanza: &Iq) -> Result<Dispatch> {
        // Roster pushes arrive as iq sets and must be acked.
        let IqType::Set(payload) = &stanza.payload else {
            return Ok(Dispatch::Pass);
        };

        if !payload.is("query", ns::ROSTER) {
            return Ok(Dispatch::Pass);
        }

        let roster = RosterQuery::try_from(payload.clone())?;
        for item in roster.items {
            self.ctx
                .schedule_event(ClientEvent::Roster(Event::Push { item }));
        }

        self.ctx
            .send_stanza(Iq::from_result(stanza.id.clone(), None::<RosterQuery>))?;

        Ok(Dispatch::Claimed)
    }
}

impl Roster {
    pub async fn load_roster(&self) -> Result<Vec<Item>, RequestError> {
        let response = self
            .ctx
            .send_iq(Iq::from_get(
                self.ctx.generate_id(),
                RosterQuery {
                    ver: None,
                    items: vec![],
                },
            ))
            .await?
            .ok_or(RequestError::UnexpectedResponse)?;

        let roster = RosterQuery::try_from(response).map_err(|err| RequestError::Generic {
            msg: err.to_string(),
        })?;
        Ok(roster.items)
    }

    /// Adds a contact and, if requested, asks for presence subscription.
    pub async fn add_contact(
        &self,
        jid: &BareJid,
        name: Option<&str>,
        request_subscription: bool,
    ) -> Result<(), RequestError> {
        self.ctx
            .send_iq(Iq::from_set(
                self.ctx.generate_id(),
                RosterQuery {
                    ver: None,
                    items: vec![Item {
                        jid: jid.clone(),
                        name: name.map(str::to_string),
                        subscription: Subscription::None,
                        ask: Ask::None,
                        groups: vec![],
                    }],
                },
            ))
            .await?;

        if request_subscription {
            self.ctx
                .send_stanza(
                    Presence::new(presence::Type::Subscribe).with_to(Jid::from(jid.clone())),
                )
                .map_err(|err| RequestError::Generic {
                    msg: err.to_string(),
                })?;
        }

        Ok(())
    }

    pub async fn remove_contact(&self, jid: &BareJid) -> Result<(), RequestError> {
        self.ctx
            .send_iq(Iq::from_set(
                self.ctx.generate_id(),
                RosterQuery {
                    ver: None,
                    items: vec![Item {
                        jid: jid.clone(),
                        name: None,
                        subscription: Subscription::Remove,
                        ask: Ask::None,
                        groups: vec![],
                    }],
                },
            ))
            .await?;
        Ok(())
    }

    pub fn approve_subscription_request(&self, to: &BareJid) -> Result<()> {
        self.ctx
            .send_stanza(Presence::new(presence::Type::Subscribed).with_to(Jid::from(to.clone())))
    }

    pub fn deny_subscription_request(&self, to: &BareJid) -> Result<()> {
        self.ctx
            .send_stanza(Presence::new(presence::Type::Unsubscribed).with_to(Jid::from(to.clone())))
    }

    /// Broadcasts our presence, stamped with our entity caps. This is
    /// the single wire outlet of the presence machine's projection.
    pub fn set_presence(&self, show: Option<Show>, status: Option<&str>) -> Result<()> {
        let mut presence = Presence::new(presence::Type::None);
        presence.show = show;
        if let Some(status) = status {
            presence.set_status("", status);
        }
        presence.add_payload(crate::mods::caps::client_caps()?);
        self.ctx.send_stanza(presence)
    }

    /// Directed probes for contacts whose presence we never received.
    pub fn send_presence_probes(
        &self,
        jids: impl IntoIterator<Item = BareJid>,
    ) -> Result<()> {
        for jid in jids {
            self.ctx
                .send_stanza(Presence::new(presence::Type::Probe).with_to(Jid::from(jid)))?;
        }
        Ok(())
    }
}
