// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::time::Duration;

use anyhow::Result;
use jid::{BareJid, FullJid, Jid};
use xmpp_parsers::chatstates::ChatState;
use xmpp_parsers::message::MessageType;
use xmpp_parsers::muc::user::MucUser;
use xmpp_parsers::muc::muc::History;
use xmpp_parsers::muc::Muc as MucPayload;
use xmpp_parsers::presence::{self, Presence};
use xmpp_parsers::stanza_error::StanzaError;

use crate::client::ModuleContext;
use crate::event::Event as ClientEvent;
use crate::mods::{Dispatch, Module};
use crate::ns;
use crate::stanza::muc::{DirectInvite, MediatedInvite};
use crate::stanza::Message;
use crate::util::RequestError;

mod join_room_future;

/// How long we wait for the room's self-presence before a join is
/// declared failed.
const JOIN_TIMEOUT: Duration = Duration::from_secs(60);

/// XEP-0045: Multi-User Chat
#[derive(Default, Clone)]
pub struct Muc {
    ctx: ModuleContext,
}

/// Everything the room sent between our join presence and its subject
/// line, in protocol order: occupants, self-presence, history, subject.
#[derive(Debug, PartialEq, Clone)]
pub struct RoomOccupancy {
    pub user: MucUser,
    pub self_presence: Presence,
    pub presences: Vec<Presence>,
    pub subject: Option<String>,
    pub message_history: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// XEP-0249: Direct MUC Invitations
    DirectInvite { from: Jid, invite: DirectInvite },
    /// https://xmpp.org/extensions/xep-0045.html#invite-mediated
    MediatedInvite { from: Jid, invite: MediatedInvite },
    /// The server rejected an invite we sent.
    InviteError { room: Jid, error: StanzaError },
    /// Live group chat message (or correction, reaction, retraction…).
    Message(Message),
    /// The room's subject changed (or was delivered after join).
    Subject {
        room: BareJid,
        subject: Option<String>,
    },
    /// Typing notification from an occupant. The caller filters its own
    /// nickname.
    ChatStateChanged {
        room: BareJid,
        nick: String,
        chat_state: ChatState,
    },
    /// Presence carrying a `muc#user` payload: occupant joins, leaves,
    /// role changes, and our own self-presence.
    OccupantPresence(Presence),
}

impl Module for Muc {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn handle_presence_stanza(&self, stanza: &Presence) -> Result<Dispatch> {
        let is_room_presence = stanza
            .payloads
            .iter()
            .any(|payload| payload.is("x", ns::MUC_USER));

        if !is_room_presence {
            return Ok(Dispatch::Pass);
        }

        self.ctx
            .schedule_event(ClientEvent::Muc(Event::OccupantPresence(stanza.clone())));
        Ok(Dispatch::Claimed)
    }

    fn handle_message_stanza(&self, stanza: &Message) -> Result<Dispatch> {
        let Some(from) = &stanza.from else {
            return Ok(Dispatch::Pass);
        };

        if stanza.r#type == MessageType::Error {
            // An error reply to an invite we sent comes back with the
            // invite payload attached.
            if stanza.direct_invite.is_some() || stanza.mediated_invite.is_some() {
                if let Some(error) = &stanza.error {
                    self.ctx.schedule_event(ClientEvent::Muc(Event::InviteError {
                        room: from.clone(),
                        error: error.clone(),
                    }));
                    return Ok(Dispatch::Claimed);
                }
            }
            return Ok(Dispatch::Pass);
        }

        if let Some(direct_invite) = &stanza.direct_invite {
            self.ctx.schedule_event(ClientEvent::Muc(Event::DirectInvite {
                from: from.clone(),
                invite: direct_invite.clone(),
            }));
            return Ok(Dispatch::Claimed);
        }

        if let Some(mediated_invite) = &stanza.mediated_invite {
            if !mediated_invite.invites.is_empty() {
                self.ctx
                    .schedule_event(ClientEvent::Muc(Event::MediatedInvite {
                        from: from.clone(),
                        invite: mediated_invite.clone(),
                    }));
                return Ok(Dispatch::Claimed);
            }
        }

        if stanza.r#type != MessageType::Groupchat {
            return Ok(Dispatch::Pass);
        }

        if stanza.is_mam_message() {
            return Ok(Dispatch::Claimed);
        }

        let room = from.to_bare();
        let nick = from
            .resource()
            .map(|resource| resource.to_string())
            .unwrap_or_default();

        if let Some(chat_state) = &stanza.chat_state {
            self.ctx
                .schedule_event(ClientEvent::Muc(Event::ChatStateChanged {
                    room: room.clone(),
                    nick: nick.clone(),
                    chat_state: chat_state.clone(),
                }));
        }

        // Subject-only messages close the join handshake; they are not
        // room messages.
        if stanza.subject.is_some() && stanza.body.is_none() {
            self.ctx.schedule_event(ClientEvent::Muc(Event::Subject {
                room,
                subject: stanza.subject.clone().filter(|s| !s.is_empty()),
            }));
            return Ok(Dispatch::Claimed);
        }

        if stanza.body.is_none()
            && stanza.reactions.is_none()
            && stanza.retract.is_none()
            && stanza.replace.is_none()
            && stanza.fastening.is_none()
        {
            return Ok(Dispatch::Claimed);
        }

        self.ctx
            .schedule_event(ClientEvent::Muc(Event::Message(stanza.clone())));
        Ok(Dispatch::Claimed)
    }
}

impl Muc {
    /// Enters a room and waits for the join handshake to complete.
    /// https://xmpp.org/extensions/xep-0045.html#enter
    pub async fn join_room(
        &self,
        room_jid: &FullJid,
        password: Option<&str>,
    ) -> Result<RoomOccupancy, RequestError> {
        // History is fetched through MAM; zero out the in-band replay.
        let mut muc_payload =
            MucPayload::new().with_history(History::new().with_maxstanzas(0));
        if let Some(password) = password {
            muc_payload = muc_payload.with_password(password.to_string());
        }

        let presence = Presence::new(presence::Type::None)
            .with_to(room_jid.clone())
            .with_payloads(vec![muc_payload.into()]);

        let (mut self_presence, presences, message_history, subject) = self
            .ctx
            .send_stanza_with_future(
                presence,
                crate::util::RequestFuture::new_join_room_request(room_jid.clone())
                    .with_timeout(JOIN_TIMEOUT),
            )
            .await?;

        let payload = self_presence
            .payloads
            .iter()
            .position(|payload| payload.is("x", ns::MUC_USER))
            .map(|idx| self_presence.payloads.remove(idx))
            .ok_or(RequestError::UnexpectedResponse)?;

        Ok(RoomOccupancy {
            user: MucUser::try_from(payload).map_err(|err| RequestError::Generic {
                msg: err.to_string(),
            })?,
            self_presence,
            presences,
            subject,
            message_history,
        })
    }

    /// Exits a room.
    /// https://xmpp.org/extensions/xep-0045.html#exit
    pub fn leave_room(&self, room_jid: &FullJid) -> Result<()> {
        self.ctx
            .send_stanza(Presence::new(presence::Type::Unavailable).with_to(room_jid.clone()))
    }

    pub fn send_room_message(&self, message: Message) -> Result<()> {
        debug_assert!(message.r#type == MessageType::Groupchat);
        self.ctx.send_stanza(message)
    }

    pub fn set_room_subject(&self, room_jid: &BareJid, subject: Option<&str>) -> Result<()> {
        // An empty subject clears it.
        let message = Message::new()
            .set_id(self.ctx.generate_id().into())
            .set_type(MessageType::Groupchat)
            .set_to(room_jid.clone())
            .set_subject(subject.unwrap_or_default());
        self.ctx.send_stanza(message)
    }

    /// Sends a direct invite to a user.
    /// https://xmpp.org/extensions/xep-0045.html#invite-direct
    pub fn send_direct_invite(&self, to: impl Into<Jid>, invite: DirectInvite) -> Result<()> {
        let message = Message::new().set_to(to).set_direct_invite(invite);
        self.ctx.send_stanza(message)
    }

    /// Sends a mediated invite through the room.
    /// https://xmpp.org/extensions/xep-0045.html#invite-mediated
    pub fn send_mediated_invite(
        &self,
        room_jid: &BareJid,
        invite: MediatedInvite,
    ) -> Result<()> {
        let message = Message::new()
            .set_to(room_jid.clone())
            .set_mediated_invite(invite);
        self.ctx.send_stanza(message)
    }

    /// Queries the room's disco#info; the caller inspects the features
    /// (MAM support, room configuration) as needed.
    pub async fn query_room_info(
        &self,
        room_jid: &BareJid,
    ) -> Result<xmpp_parsers::disco::DiscoInfoResult, RequestError> {
        let response = self
            .ctx
            .send_iq(
                xmpp_parsers::iq::Iq::from_get(
                    self.ctx.generate_id(),
                    xmpp_parsers::disco::DiscoInfoQuery { node: None },
                )
                .with_to(room_jid.clone().into()),
            )
            .await?
            .ok_or(RequestError::UnexpectedResponse)?;

        xmpp_parsers::disco::DiscoInfoResult::try_from(response).map_err(|err| {
            RequestError::Generic {
                msg: err.to_string(),
            }
        })
    }
}

