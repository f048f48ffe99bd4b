// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::FullJid;
use xmpp_parsers::muc::user::{MucUser, Status};
use xmpp_parsers::presence::{self, Presence};
use xmpp_parsers::stanza_error::StanzaError;

use crate::ns;
use crate::stanza::Message;
use crate::util::{ElementReducerPoll, RequestError, RequestFuture, XmppElement};

/// Order of events (https://xmpp.org/extensions/xep-0045.html#order)
///   1. In-room presence from other occupants
///   2. In-room presence from the joining entity itself ("self-presence")
///   3. Room history (if any)
///   4. The room subject
///   5. Live messages, presence updates, new user joins, etc.
pub(super) struct JoinRoomState {
    room_jid: FullJid,
    presences: Vec<Presence>,
    self_presence: Option<Presence>,
    subject: Option<String>,
    message_history: Vec<Message>,
}

/// Self-presence is recognized by `muc#user` status code 110. Some
/// non-conformant servers omit the code; the nickname match against the
/// nick we requested is the compatibility fallback.
fn is_self_presence(presence: &Presence, from: &FullJid, requested: &FullJid) -> bool {
    let has_self_status = presence
        .payloads
        .iter()
        .filter(|payload| payload.is("x", ns::MUC_USER))
        .filter_map(|payload| MucUser::try_from(payload.clone()).ok())
        .any(|user| user.status.contains(&Status::SelfPresence));

    has_self_status || from.resource() == requested.resource()
}

impl RequestFuture<JoinRoomState, (Presence, Vec<Presence>, Vec<Message>, Option<String>)> {
    pub(super) fn new_join_room_request(room_jid: FullJid) -> Self {
        let room_bare_jid = room_jid.to_bare();

        RequestFuture::new(
            format!("MUC {room_jid}"),
            JoinRoomState {
                room_jid,
                presences: vec![],
                self_presence: None,
                subject: None,
                message_history: vec![],
            },
            move |state, element| {
                match element {
                    XmppElement::Presence(presence) => {
                        let Some(from) = presence
                            .from
                            .as_ref()
                            .and_then(|from| from.clone().try_into_full().ok())
                        else {
                            return Ok(ElementReducerPoll::Pending(Some(presence.into())));
                        };

                        // Only presences from our room count.
                        if from.to_bare() != room_bare_jid {
                            return Ok(ElementReducerPoll::Pending(Some(presence.into())));
                        }

                        let is_self = is_self_presence(&presence, &from, &state.room_jid);

                        // An error addressed at us ends the join.
                        if presence.type_ == presence::Type::Error && is_self {
                            return if let Some(error_payload) =
                                presence.payloads.iter().find(|p| p.name() == "error")
                            {
                                match StanzaError::try_from(error_payload.clone()) {
                                    Ok(err) => Err(RequestError::XMPP { err }),
                                    Err(error) => Err(RequestError::Generic {
                                        msg: error.to_string(),
                                    }),
                                }
                            } else {
                                Err(RequestError::Generic {
                                    msg: "Received error presence without an `error` payload."
                                        .to_string(),
                                })
                            };
                        }

                        if is_self {
                            state.self_presence = Some(presence.clone());
                        } else {
                            state.presences.push(presence.clone());
                        }

                        Ok(ElementReducerPoll::Pending(None))
                    }
                    XmppElement::Message(message) => {
                        // Only messages from our room, and never archive
                        // results: a MAM query running concurrently with
                        // the join must keep its messages.
                        if message.from.as_ref().map(|jid| jid.to_bare()).as_ref()
                            != Some(&room_bare_jid)
                            || message.is_mam_message()
                        {
                            return Ok(ElementReducerPoll::Pending(Some(message.into())));
                        }

                        if let Some(subject) = &message.subject {
                            // The subject closes the handshake.
                            state.subject = (!subject.is_empty()).then(|| subject.clone());
                            return Ok(ElementReducerPoll::Ready);
                        }

                        state.message_history.push(message.clone());
                        Ok(ElementReducerPoll::Pending(None))
                    }
                    XmppElement::Iq(_) | XmppElement::PubSubMessage(_) | XmppElement::Nonza(_) => {
                        Ok(ElementReducerPoll::Pending(Some(element)))
                    }
                }
            },
            |state| {
                (
                    state.self_presence.unwrap_or_else(|| {
                        panic!(
                            "Internal error. Missing self-presence in JoinRoomState for room {}.",
                            state.room_jid
                        )
                    }),
                    state.presences,
                    state.message_history,
                    state.subject,
                )
            },
        )
    }
}
