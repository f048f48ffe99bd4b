// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use chrono::Utc;
use jid::BareJid;
use tokio::sync::broadcast;
use tracing::debug;
use xmpp_parsers::chatstates::ChatState;
use xmpp_parsers::presence::{self, Presence};

use fluux_xmpp::mods::{blocking, chat, muc, pubsub, roster};
use fluux_xmpp::ns;
use fluux_xmpp::stanza::Message as MessageStanza;
use fluux_xmpp::Event as XmppEvent;

use crate::domain::message::{project_message, ProjectionContext};
use crate::domain::{ConversationId, MessageKind, MessageUpdate, Occupant};
use crate::event::*;
use crate::store::{ApplyOutcome, Store};

/// The only code that mutates the store (aside from the connection
/// manager's status writes). Translates protocol events into store
/// mutations and typed SDK events, in arrival order.
pub struct StoreBindings {
    store: Store,
    bus: broadcast::Sender<ClientEvent>,
    client: fluux_xmpp::Client,
}

impl StoreBindings {
    pub fn new(store: Store, bus: broadcast::Sender<ClientEvent>, client: fluux_xmpp::Client) -> Self {
        StoreBindings { store, bus, client }
    }

    pub fn handle_event(&self, event: XmppEvent) {
        match event {
            XmppEvent::Chat(event) => self.handle_chat_event(event),
            XmppEvent::Muc(event) => self.handle_muc_event(event),
            XmppEvent::Roster(event) => self.handle_roster_event(event),
            XmppEvent::PubSub(event) => self.handle_pubsub_event(event),
            XmppEvent::Blocking(event) => self.handle_blocking_event(event),
            // Connection-level events are applied by the connection
            // manager itself.
            XmppEvent::Client(_) => {}
        }
    }

    fn emit(&self, event: ClientEvent) {
        self.store.push_event(event.clone());
        let _ = self.bus.send(event);
    }

    // Chat

    fn handle_chat_event(&self, event: chat::Event) {
        match event {
            chat::Event::Message(stanza) => {
                self.apply_chat_stanza(&stanza, false);
            }
            // Carbon direction is derived from the sender, not from the
            // wrapper label; some servers mislabel them.
            chat::Event::Carbon(chat::Carbon::Received(stanza))
            | chat::Event::Carbon(chat::Carbon::Sent(stanza)) => {
                self.apply_chat_stanza(&stanza, true);
            }
            chat::Event::Sent(stanza) => {
                self.apply_chat_stanza(&stanza, true);
            }
            chat::Event::ChatStateChanged {
                from,
                chat_state,
                message_type: _,
            } => {
                let jid = from.to_bare();
                let is_typing = chat_state == ChatState::Composing;
                self.store
                    .with_conversation(&jid, |conversation| {
                        conversation.is_typing = is_typing;
                    });
                self.emit(ClientEvent::TypingChanged(TypingChangedEvent {
                    conversation: ConversationId::Chat(jid),
                    typing: is_typing.then(|| "composing".to_string()).into_iter().collect(),
                }));
            }
        }
    }

    /// `is_echo` marks stanzas that are copies of traffic (carbons,
    /// local echoes); the direction itself comes from comparing the
    /// sender against our own JID.
    fn apply_chat_stanza(&self, stanza: &MessageStanza, is_echo: bool) {
        let own_bare = self.client.connected_jid().map(|jid| jid.to_bare());
        let from_bare = stanza.from.as_ref().map(|from| from.to_bare());

        let is_outgoing = match (&own_bare, &from_bare) {
            (Some(own), Some(from)) => own == from,
            // Without a sender we only trust explicit echoes.
            _ => is_echo && from_bare.is_none(),
        };
        let is_live = !is_echo || !is_outgoing;

        // Conversations are keyed by the counterpart.
        let counterpart = if is_outgoing {
            stanza.to.as_ref().map(|to| to.to_bare())
        } else {
            from_bare
        };
        let Some(counterpart) = counterpart else {
            return;
        };

        // XEP-0191: inbound traffic from blocked JIDs never reaches the
        // store.
        if !is_outgoing && self.store.is_blocked(&counterpart) {
            debug!("Dropping message from blocked sender {counterpart}");
            return;
        }

        let Some(update) = project_message(
            stanza,
            &ProjectionContext {
                kind: MessageKind::Chat,
                is_outgoing,
                force_delayed: false,
                own_nick: None,
                now: Utc::now(),
            },
        ) else {
            return;
        };

        let conversation_id = ConversationId::Chat(counterpart.clone());
        let is_new = matches!(update, MessageUpdate::New(_));

        match self.store.apply_message_update(&conversation_id, update) {
            ApplyOutcome::Inserted(id) => {
                // The other side stopped typing the moment their
                // message arrived.
                if !is_outgoing {
                    self.store.with_conversation(&counterpart, |conversation| {
                        conversation.is_typing = false;
                        if !self.is_active(&conversation_id) {
                            conversation.unread_count += 1;
                            if conversation.first_new_message_id.is_none() {
                                conversation.first_new_message_id = Some(id.clone());
                            }
                        }
                    });
                }

                let message = self
                    .store
                    .conversation(&counterpart)
                    .and_then(|c| c.messages.iter().find(|m| m.id == id).cloned());
                if let Some(message) = message {
                    self.emit(ClientEvent::MessageReceived(MessageReceivedEvent {
                        conversation: conversation_id,
                        message,
                        is_live: is_live && !is_outgoing,
                    }));
                }
            }
            ApplyOutcome::Updated(id) => {
                self.emit(ClientEvent::MessageUpdated(MessageUpdatedEvent {
                    conversation: conversation_id,
                    message_id: id,
                }));
            }
            ApplyOutcome::Ignored => {
                if is_new {
                    debug!("Ignored duplicate or unresolvable chat message");
                }
            }
        }
    }

    // MUC

    fn handle_muc_event(&self, event: muc::Event) {
        match event {
            muc::Event::Message(stanza) => self.apply_room_stanza(&stanza),
            muc::Event::Subject { room, subject } => {
                self.store.with_room(&room, |r| r.subject = subject.clone());
                self.emit(ClientEvent::RoomSubjectChanged(RoomSubjectChangedEvent {
                    room,
                    subject,
                }));
            }
            muc::Event::ChatStateChanged {
                room,
                nick,
                chat_state,
            } => {
                let changed = self.store.with_room(&room, |r| {
                    // Our own composing notification is an echo.
                    if r.is_own_nick(&nick) {
                        return false;
                    }
                    match chat_state {
                        ChatState::Composing => r.typing_users.insert(nick.clone()),
                        _ => r.typing_users.remove(&nick),
                    }
                });

                if changed {
                    let typing = self
                        .store
                        .room(&room)
                        .map(|r| r.typing_users.iter().cloned().collect())
                        .unwrap_or_default();
                    self.emit(ClientEvent::TypingChanged(TypingChangedEvent {
                        conversation: ConversationId::Room(room),
                        typing,
                    }));
                }
            }
            muc::Event::OccupantPresence(presence) => self.apply_occupant_presence(&presence),
            muc::Event::DirectInvite { from, invite } => {
                self.emit(ClientEvent::RoomInviteReceived(RoomInviteReceivedEvent {
                    room: invite.jid,
                    from: Some(from.to_bare()),
                    reason: invite.reason,
                    password: invite.password,
                }));
            }
            muc::Event::MediatedInvite { from, invite } => {
                let room = from.to_bare();
                let inviter = invite
                    .invites
                    .first()
                    .and_then(|i| i.from.as_ref())
                    .map(|jid| jid.to_bare());
                let reason = invite.invites.first().and_then(|i| i.reason.clone());
                self.emit(ClientEvent::RoomInviteReceived(RoomInviteReceivedEvent {
                    room,
                    from: inviter,
                    reason,
                    password: invite.password,
                }));
            }
            muc::Event::InviteError { room, error } => {
                self.emit(ClientEvent::RoomInviteError(RoomInviteErrorEvent {
                    room: room.to_bare(),
                    condition: format!("{:?}", error.defined_condition),
                    text: error.texts.values().next().cloned(),
                }));
            }
        }
    }

    fn apply_room_stanza(&self, stanza: &MessageStanza) {
        let Some(room_jid) = stanza.from.as_ref().map(|from| from.to_bare()) else {
            return;
        };

        let own_nick = self.store.room(&room_jid).and_then(|room| room.nickname);

        let Some(update) = project_message(
            stanza,
            &ProjectionContext {
                kind: MessageKind::Groupchat,
                is_outgoing: stanza
                    .from
                    .as_ref()
                    .and_then(|from| from.resource())
                    .zip(own_nick.as_deref())
                    .map(|(nick, own)| nick.to_string().eq_ignore_ascii_case(own))
                    .unwrap_or(false),
                force_delayed: false,
                own_nick: own_nick.as_deref(),
                now: Utc::now(),
            },
        ) else {
            return;
        };

        let conversation_id = ConversationId::Room(room_jid.clone());

        match self.store.apply_message_update(&conversation_id, update) {
            ApplyOutcome::Inserted(id) => {
                let (message, is_outgoing) = self.store.with_room(&room_jid, |room| {
                    let message = room.messages.iter().find(|m| m.id == id).cloned();
                    let is_outgoing = message
                        .as_ref()
                        .map(|m| m.is_outgoing)
                        .unwrap_or(false);

                    if let Some(message) = &message {
                        room.typing_users.remove(
                            message.nick.as_deref().unwrap_or_default(),
                        );
                        if !is_outgoing && !message.is_delayed {
                            room.unread_count += 1;
                            if message.mentions_me {
                                room.mentions_count += 1;
                            }
                            if room.first_new_message_id.is_none() {
                                room.first_new_message_id = Some(id.clone());
                            }
                        }
                    }
                    (message, is_outgoing)
                });

                if let Some(message) = message {
                    self.emit(ClientEvent::MessageReceived(MessageReceivedEvent {
                        conversation: conversation_id,
                        message: message.clone(),
                        is_live: !is_outgoing && !message.is_delayed,
                    }));
                }
            }
            ApplyOutcome::Updated(id) => {
                self.emit(ClientEvent::MessageUpdated(MessageUpdatedEvent {
                    conversation: conversation_id,
                    message_id: id,
                }));
            }
            ApplyOutcome::Ignored => {}
        }
    }

    fn apply_occupant_presence(&self, presence: &Presence) {
        let Some(from) = presence
            .from
            .as_ref()
            .and_then(|from| from.clone().try_into_full().ok())
        else {
            return;
        };

        let room_jid = from.to_bare();
        let nick = from.resource().to_string();
        let available = presence.type_ != presence::Type::Unavailable;

        let Some(user) = presence
            .payloads
            .iter()
            .find(|payload| payload.is("x", ns::MUC_USER))
            .and_then(|payload| {
                xmpp_parsers::muc::user::MucUser::try_from(payload.clone()).ok()
            })
        else {
            return;
        };

        let is_self = user
            .status
            .contains(&xmpp_parsers::muc::user::Status::SelfPresence);

        let item = user.items.first();
        let occupant = Occupant {
            nick: nick.clone(),
            jid: item.and_then(|item| item.jid.as_ref()).map(|jid| jid.to_bare()),
            affiliation: item
                .map(|item| item.affiliation.clone())
                .unwrap_or(xmpp_parsers::muc::user::Affiliation::None),
            role: item
                .map(|item| item.role.clone())
                .unwrap_or(xmpp_parsers::muc::user::Role::None),
            show: presence.show.clone(),
            avatar_hash: avatar_hash_from_presence(presence),
        };

        let left = self.store.with_room(&room_jid, |room| {
            if is_self {
                if available {
                    room.mark_joined(occupant.clone());
                } else {
                    room.mark_left();
                }
                !available
            } else {
                room.apply_occupant(occupant.clone(), available);
                false
            }
        });

        if is_self && left {
            self.emit(ClientEvent::RoomLeft(RoomLeftEvent { room: room_jid }));
        } else if is_self {
            self.emit(ClientEvent::RoomJoined(RoomJoinedEvent { room: room_jid }));
        } else {
            self.emit(ClientEvent::RoomOccupantsChanged(
                RoomOccupantsChangedEvent { room: room_jid },
            ));
        }
    }

    // Roster

    fn handle_roster_event(&self, event: roster::Event) {
        match event {
            roster::Event::Push { item } => {
                if item.subscription == xmpp_parsers::roster::Subscription::Remove {
                    self.store.remove_contact(&item.jid);
                } else {
                    self.store.with_contact(&item.jid, |contact| {
                        contact.name = item.name.clone();
                        contact.subscription = item.subscription.clone();
                    });
                }
                self.emit(ClientEvent::RosterUpdated(RosterUpdatedEvent {}));
            }
            roster::Event::SubscriptionRequest { from, status } => {
                self.emit(ClientEvent::SubscriptionRequested(
                    SubscriptionRequestedEvent { from, status },
                ));
            }
            roster::Event::PresenceChanged { from, presence } => {
                let bare = from.to_bare();
                let resource = from
                    .resource()
                    .map(|resource| resource.to_string())
                    .unwrap_or_default();

                self.store.with_contact(&bare, |contact| match presence.type_ {
                    presence::Type::Unavailable => {
                        contact.presence.resources.remove(&resource);
                    }
                    presence::Type::Error => {
                        // Recorded against the contact; the connection
                        // is unaffected.
                        let error = presence
                            .payloads
                            .iter()
                            .find(|payload| payload.name() == "error")
                            .map(|payload| payload.text())
                            .unwrap_or_else(|| "presence error".to_string());
                        contact
                            .presence
                            .resources
                            .entry(resource.clone())
                            .or_default()
                            .error = Some(error);
                    }
                    _ => {
                        let entry = contact
                            .presence
                            .resources
                            .entry(resource.clone())
                            .or_default();
                        entry.show = presence.show.clone();
                        entry.status = presence.statuses.values().next().cloned();
                        entry.error = None;
                    }
                });

                if let Some(hash) = avatar_hash_from_presence(&presence) {
                    self.store
                        .with_contact(&bare, |contact| contact.avatar_hash = Some(hash.clone()));
                    self.emit(ClientEvent::AvatarChanged(AvatarChangedEvent {
                        jid: bare.clone(),
                        hash,
                    }));
                }

                self.emit(ClientEvent::ContactPresenceChanged(
                    ContactPresenceChangedEvent { jid: bare },
                ));
            }
        }
    }

    // PubSub

    fn handle_pubsub_event(&self, event: pubsub::Event) {
        match event {
            pubsub::Event::AvatarMetadataChanged { from, metadata } => {
                let bare = from.to_bare();
                let Some(info) = metadata.infos.first() else {
                    return;
                };
                let hash = info.id.to_string();
                self.store
                    .with_contact(&bare, |contact| contact.avatar_hash = Some(hash.clone()));
                self.emit(ClientEvent::AvatarChanged(AvatarChangedEvent {
                    jid: bare,
                    hash,
                }));
            }
            pubsub::Event::NicknameChanged { from, nickname } => {
                let bare = from.to_bare();
                self.store.with_contact(&bare, |contact| {
                    contact.name = Some(nickname.clone());
                });
                self.emit(ClientEvent::NicknameChanged(NicknameChangedEvent {
                    jid: bare,
                    nickname,
                }));
            }
            pubsub::Event::BookmarksChanged {
                published,
                retracted,
            } => {
                for bookmark in published {
                    self.store.with_room(&bookmark.jid, |room| {
                        room.is_bookmarked = true;
                        room.autojoin = bookmark.autojoin;
                        room.name = bookmark.name.clone().or_else(|| room.name.clone());
                        room.password = bookmark.password.clone();
                        if room.nickname.is_none() {
                            room.nickname = bookmark.nick.clone();
                        }
                    });
                    self.store.upsert_bookmark(bookmark);
                }
                for jid in retracted {
                    self.store.remove_bookmark(&jid);
                    self.store.with_room(&jid, |room| {
                        room.is_bookmarked = false;
                        room.autojoin = false;
                    });
                }
                self.emit(ClientEvent::BookmarksUpdated(BookmarksUpdatedEvent {}));
            }
            pubsub::Event::Published { node, .. } => {
                debug!("Ignoring PubSub event for unhandled node {node}");
            }
        }
    }

    // Blocking

    fn handle_blocking_event(&self, event: blocking::Event) {
        match event {
            blocking::Event::Blocked { jids } => {
                self.store
                    .add_blocked(jids.into_iter().map(|jid| jid.to_bare()));
            }
            blocking::Event::Unblocked { jids } => {
                self.store
                    .remove_blocked(jids.into_iter().map(|jid| jid.to_bare()));
            }
            blocking::Event::UnblockedAll => self.store.clear_blocklist(),
        }
        self.emit(ClientEvent::BlocklistUpdated(BlocklistUpdatedEvent {}));
    }

    fn is_active(&self, id: &ConversationId) -> bool {
        self.store.active_conversation().as_ref() == Some(id)
    }
}

/// XEP-0153: avatar hash advertised in presence.
fn avatar_hash_from_presence(presence: &Presence) -> Option<String> {
    let update = presence
        .payloads
        .iter()
        .find(|payload| payload.is("x", ns::VCARD_UPDATE))?;
    let photo = update.get_child("photo", ns::VCARD_UPDATE)?;
    let hash = photo.text();
    (!hash.is_empty()).then_some(hash)
}
