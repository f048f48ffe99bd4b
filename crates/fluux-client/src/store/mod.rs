// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use jid::BareJid;
use parking_lot::RwLock;
use tokio::sync::watch;

use fluux_xmpp::mods::admin::CommandItem;
use fluux_xmpp::mods::disco::ServerInfo;
use fluux_xmpp::stanza::bookmark::ConferenceBookmark;

use crate::connection::ConnectionStatus;
use crate::domain::{Contact, Conversation, ConversationId, Message, MessageUpdate, Room};
use crate::event::ClientEvent;

pub mod bindings;

const EVENT_RING_CAPACITY: usize = 100;

/// What applying a message stanza did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Inserted(String),
    Updated(String),
    /// Duplicate, unknown target, or rejected mutation.
    Ignored,
}

/// The single shared mutable surface of the runtime. All mutations go
/// through this API on the core task; consumers read snapshots and
/// subscribe to selector changes.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    conversations: RwLock<HashMap<BareJid, Conversation>>,
    rooms: RwLock<HashMap<BareJid, Room>>,
    contacts: RwLock<HashMap<BareJid, Contact>>,
    blocklist: RwLock<BTreeSet<BareJid>>,
    bookmarks: RwLock<Vec<ConferenceBookmark>>,
    server_info: RwLock<Option<ServerInfo>>,
    admin_commands: RwLock<Vec<CommandItem>>,
    recent_events: RwLock<VecDeque<ClientEvent>>,

    active_conversation: watch::Sender<Option<ConversationId>>,
    connection_status: watch::Sender<ConnectionStatus>,
    /// Bumped on every room mutation; the side-effect driver
    /// re-evaluates its room conditions on each change.
    rooms_rev: watch::Sender<u64>,
}

impl Default for Store {
    fn default() -> Self {
        Store::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let (active_conversation, _) = watch::channel(None);
        let (connection_status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (rooms_rev, _) = watch::channel(0);

        Store {
            inner: Arc::new(StoreInner {
                conversations: Default::default(),
                rooms: Default::default(),
                contacts: Default::default(),
                blocklist: Default::default(),
                bookmarks: Default::default(),
                server_info: Default::default(),
                admin_commands: Default::default(),
                recent_events: RwLock::new(VecDeque::with_capacity(EVENT_RING_CAPACITY)),
                active_conversation,
                connection_status,
                rooms_rev,
            }),
        }
    }

    // Selectors

    pub fn subscribe_active_conversation(&self) -> watch::Receiver<Option<ConversationId>> {
        self.inner.active_conversation.subscribe()
    }

    pub fn subscribe_connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.connection_status.subscribe()
    }

    pub fn subscribe_rooms(&self) -> watch::Receiver<u64> {
        self.inner.rooms_rev.subscribe()
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.inner.active_conversation.borrow().clone()
    }

    pub fn set_active_conversation(&self, id: Option<ConversationId>) {
        let _ = self.inner.active_conversation.send(id);
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner.connection_status.borrow().clone()
    }

    /// Applied directly by the connection manager, never through the
    /// bindings: an authentication event can fire before the bindings
    /// subscription is installed, and a duplicate mutation would race.
    pub fn set_connection_status(&self, status: ConnectionStatus) {
        let _ = self.inner.connection_status.send(status);
    }

    // Conversations

    pub fn conversation(&self, jid: &BareJid) -> Option<Conversation> {
        self.inner.conversations.read().get(jid).cloned()
    }

    pub fn conversation_ids(&self) -> Vec<BareJid> {
        self.inner.conversations.read().keys().cloned().collect()
    }

    pub fn with_conversation<R>(
        &self,
        jid: &BareJid,
        f: impl FnOnce(&mut Conversation) -> R,
    ) -> R {
        let mut conversations = self.inner.conversations.write();
        let conversation = conversations
            .entry(jid.clone())
            .or_insert_with(|| Conversation::new(jid.clone()));
        f(conversation)
    }

    // Rooms

    pub fn room(&self, jid: &BareJid) -> Option<Room> {
        self.inner.rooms.read().get(jid).cloned()
    }

    pub fn room_ids(&self) -> Vec<BareJid> {
        self.inner.rooms.read().keys().cloned().collect()
    }

    pub fn joined_room_ids(&self) -> Vec<BareJid> {
        self.inner
            .rooms
            .read()
            .values()
            .filter(|room| room.joined || room.is_joining)
            .map(|room| room.jid.clone())
            .collect()
    }

    pub fn with_room<R>(&self, jid: &BareJid, f: impl FnOnce(&mut Room) -> R) -> R {
        let result = {
            let mut rooms = self.inner.rooms.write();
            let room = rooms
                .entry(jid.clone())
                .or_insert_with(|| Room::new(jid.clone()));
            f(room)
        };
        self.bump_rooms_rev();
        result
    }

    fn bump_rooms_rev(&self) {
        self.inner.rooms_rev.send_modify(|rev| *rev += 1);
    }

    // Contacts

    pub fn contact(&self, jid: &BareJid) -> Option<Contact> {
        self.inner.contacts.read().get(jid).cloned()
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.inner.contacts.read().values().cloned().collect()
    }

    pub fn with_contact<R>(&self, jid: &BareJid, f: impl FnOnce(&mut Contact) -> R) -> R {
        let mut contacts = self.inner.contacts.write();
        let contact = contacts
            .entry(jid.clone())
            .or_insert_with(|| Contact::new(jid.clone()));
        f(contact)
    }

    pub fn remove_contact(&self, jid: &BareJid) {
        self.inner.contacts.write().remove(jid);
    }

    // Blocking

    pub fn blocklist(&self) -> BTreeSet<BareJid> {
        self.inner.blocklist.read().clone()
    }

    pub fn is_blocked(&self, jid: &BareJid) -> bool {
        self.inner.blocklist.read().contains(jid)
    }

    pub fn set_blocklist(&self, jids: impl IntoIterator<Item = BareJid>) {
        *self.inner.blocklist.write() = jids.into_iter().collect();
    }

    pub fn add_blocked(&self, jids: impl IntoIterator<Item = BareJid>) {
        self.inner.blocklist.write().extend(jids);
    }

    pub fn remove_blocked(&self, jids: impl IntoIterator<Item = BareJid>) {
        let mut blocklist = self.inner.blocklist.write();
        for jid in jids {
            blocklist.remove(&jid);
        }
    }

    pub fn clear_blocklist(&self) {
        self.inner.blocklist.write().clear();
    }

    // Bookmarks

    pub fn bookmarks(&self) -> Vec<ConferenceBookmark> {
        self.inner.bookmarks.read().clone()
    }

    pub fn set_bookmarks(&self, bookmarks: Vec<ConferenceBookmark>) {
        *self.inner.bookmarks.write() = bookmarks;
    }

    pub fn upsert_bookmark(&self, bookmark: ConferenceBookmark) {
        let mut bookmarks = self.inner.bookmarks.write();
        if let Some(existing) = bookmarks.iter_mut().find(|b| b.jid == bookmark.jid) {
            *existing = bookmark;
        } else {
            bookmarks.push(bookmark);
        }
    }

    pub fn remove_bookmark(&self, jid: &BareJid) {
        self.inner.bookmarks.write().retain(|b| &b.jid != jid);
    }

    // Server info & admin

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.inner.server_info.read().clone()
    }

    pub fn set_server_info(&self, info: ServerInfo) {
        *self.inner.server_info.write() = Some(info);
    }

    pub fn admin_commands(&self) -> Vec<CommandItem> {
        self.inner.admin_commands.read().clone()
    }

    pub fn set_admin_commands(&self, commands: Vec<CommandItem>) {
        *self.inner.admin_commands.write() = commands;
    }

    // Event ring (console slice)

    pub fn push_event(&self, event: ClientEvent) {
        let mut ring = self.inner.recent_events.write();
        if ring.len() == EVENT_RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(event);
    }

    pub fn recent_events(&self) -> Vec<ClientEvent> {
        self.inner.recent_events.read().iter().cloned().collect()
    }

    // Message application

    /// Applies a projected message mutation to the right conversation
    /// or room, enforcing identity and sender rules.
    pub fn apply_message_update(
        &self,
        conversation: &ConversationId,
        update: MessageUpdate,
    ) -> ApplyOutcome {
        match conversation {
            ConversationId::Chat(jid) => {
                self.with_conversation(jid, |c| apply_update(&mut c.messages, update))
            }
            ConversationId::Room(jid) => {
                self.with_room(jid, |room| apply_update(&mut room.messages, update))
            }
        }
    }

    /// Resets archive-sync state everywhere. Run on every transition
    /// back to online; catch-up happens lazily per conversation.
    pub fn reset_all_mam_states(&self) {
        for conversation in self.inner.conversations.write().values_mut() {
            conversation.mam.reset();
        }
        for room in self.inner.rooms.write().values_mut() {
            room.mam.reset();
            room.preview_fetched = false;
        }
        self.bump_rooms_rev();
    }
}

/// The mutation rules shared by conversations and rooms.
fn apply_update(messages: &mut Vec<Message>, update: MessageUpdate) -> ApplyOutcome {
    match update {
        MessageUpdate::New(message) => insert_message(messages, message),
        MessageUpdate::Correct {
            target,
            sender,
            body,
            attachment,
        } => {
            let Some(message) = find_target(messages, &target) else {
                return ApplyOutcome::Ignored;
            };
            // Only the original author may correct.
            if sender_key(message) != sender {
                return ApplyOutcome::Ignored;
            }
            if message.original_body.is_none() {
                message.original_body = Some(message.body.clone());
            }
            message.body = body;
            message.is_edited = true;
            if attachment.is_some() {
                message.attachment = attachment;
            }
            ApplyOutcome::Updated(message.id.clone())
        }
        MessageUpdate::Retract { target, sender, at } => {
            let Some(message) = find_target(messages, &target) else {
                return ApplyOutcome::Ignored;
            };
            // A retraction from anyone but the original sender leaves
            // the message untouched.
            if sender_key(message) != sender {
                return ApplyOutcome::Ignored;
            }
            message.is_retracted = true;
            message.retracted_at = Some(at);
            ApplyOutcome::Updated(message.id.clone())
        }
        MessageUpdate::React { target, by, emojis } => {
            let Some(message) = find_target(messages, &target) else {
                return ApplyOutcome::Ignored;
            };
            if emojis.is_empty() {
                message.reactions.remove(&by);
            } else {
                message.reactions.insert(by, emojis);
            }
            ApplyOutcome::Updated(message.id.clone())
        }
        MessageUpdate::Preview { target, preview } => {
            let Some(message) = find_target(messages, &target) else {
                return ApplyOutcome::Ignored;
            };
            message.link_preview = Some(preview);
            ApplyOutcome::Updated(message.id.clone())
        }
    }
}

fn sender_key(message: &Message) -> String {
    match message.kind {
        crate::domain::MessageKind::Chat => message.from.to_string(),
        crate::domain::MessageKind::Groupchat => message
            .nick
            .clone()
            .unwrap_or_else(|| message.from.to_string()),
    }
}

fn find_target<'a>(messages: &'a mut [Message], target: &str) -> Option<&'a mut Message> {
    messages.iter_mut().find(|m| m.answers_to(target))
}

/// Inserts keeping `(timestamp, id)` order. Duplicates by any known id
/// produce exactly one entry.
fn insert_message(messages: &mut Vec<Message>, message: Message) -> ApplyOutcome {
    let duplicate = messages.iter().any(|existing| {
        existing.id == message.id
            || (message.stanza_id.is_some() && existing.stanza_id == message.stanza_id)
    });
    if duplicate {
        return ApplyOutcome::Ignored;
    }

    let id = message.id.clone();
    let position = messages
        .iter()
        .rposition(|existing| {
            (existing.timestamp, existing.id.as_str()) <= (message.timestamp, message.id.as_str())
        })
        .map(|idx| idx + 1)
        .unwrap_or(0);
    messages.insert(position, message);
    ApplyOutcome::Inserted(id)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{TimeZone, Utc};

    use crate::domain::MessageKind;

    use super::*;

    fn message(client_id: &str, stanza_id: Option<&str>, from: &str, minute: u32) -> Message {
        Message {
            // Canonical identity prefers the server-assigned stanza-id.
            id: stanza_id.unwrap_or(client_id).to_string(),
            stanza_id: stanza_id.map(str::to_string),
            client_id: Some(client_id.to_string()),
            from: BareJid::from_str(from).unwrap(),
            nick: None,
            body: "hello".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
            is_outgoing: false,
            kind: MessageKind::Chat,
            is_delayed: false,
            no_styling: false,
            no_store: false,
            reactions: Default::default(),
            reply_to: None,
            is_edited: false,
            original_body: None,
            is_retracted: false,
            retracted_at: None,
            attachment: None,
            link_preview: None,
            mentions_me: false,
        }
    }

    #[test]
    fn test_duplicate_stanza_id_is_ignored() {
        let mut messages = vec![];
        assert_eq!(
            insert_message(&mut messages, message("m1", Some("s1"), "alice@x.y", 0)),
            ApplyOutcome::Inserted("s1".to_string())
        );
        assert_eq!(
            insert_message(&mut messages, message("m2", Some("s1"), "alice@x.y", 1)),
            ApplyOutcome::Ignored
        );
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_backward_page_merges_before_live_messages() {
        let mut messages = vec![];
        insert_message(&mut messages, message("live", Some("s9"), "alice@x.y", 30));
        insert_message(&mut messages, message("old", Some("s1"), "alice@x.y", 1));

        assert_eq!(messages[0].id, "s1");
        assert_eq!(messages[1].id, "s9");
    }

    #[test]
    fn test_retraction_by_stranger_is_ignored() {
        let mut messages = vec![];
        insert_message(&mut messages, message("m2", None, "alice@x.y", 0));

        let outcome = apply_update(
            &mut messages,
            MessageUpdate::Retract {
                target: "m2".to_string(),
                sender: "mallory@x.y".to_string(),
                at: Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap(),
            },
        );

        assert_eq!(outcome, ApplyOutcome::Ignored);
        assert!(!messages[0].is_retracted);
        assert_eq!(messages[0].retracted_at, None);
    }

    #[test]
    fn test_retraction_by_sender_marks_message() {
        let mut messages = vec![];
        insert_message(&mut messages, message("m2", None, "alice@x.y", 0));

        let outcome = apply_update(
            &mut messages,
            MessageUpdate::Retract {
                target: "m2".to_string(),
                sender: "alice@x.y".to_string(),
                at: Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap(),
            },
        );

        assert_eq!(outcome, ApplyOutcome::Updated("m2".to_string()));
        assert!(messages[0].is_retracted);
    }

    #[test]
    fn test_correction_keeps_original_body() {
        let mut messages = vec![];
        insert_message(&mut messages, message("m1", Some("s1"), "alice@x.y", 0));

        // Corrections address the client id even when the canonical id
        // is the stanza-id.
        let outcome = apply_update(
            &mut messages,
            MessageUpdate::Correct {
                target: "m1".to_string(),
                sender: "alice@x.y".to_string(),
                body: "fixed".to_string(),
                attachment: None,
            },
        );

        assert_eq!(outcome, ApplyOutcome::Updated("s1".to_string()));
        assert_eq!(messages[0].body, "fixed");
        assert_eq!(messages[0].original_body.as_deref(), Some("hello"));
        assert!(messages[0].is_edited);
    }

    #[test]
    fn test_reactions_replace_previous_set() {
        let mut messages = vec![];
        insert_message(&mut messages, message("m1", None, "alice@x.y", 0));

        apply_update(
            &mut messages,
            MessageUpdate::React {
                target: "m1".to_string(),
                by: "bob@x.y".to_string(),
                emojis: vec!["👍".to_string(), "🎉".to_string()],
            },
        );
        apply_update(
            &mut messages,
            MessageUpdate::React {
                target: "m1".to_string(),
                by: "bob@x.y".to_string(),
                emojis: vec!["❤".to_string()],
            },
        );

        assert_eq!(
            messages[0].reactions.get("bob@x.y"),
            Some(&vec!["❤".to_string()])
        );

        apply_update(
            &mut messages,
            MessageUpdate::React {
                target: "m1".to_string(),
                by: "bob@x.y".to_string(),
                emojis: vec![],
            },
        );
        assert!(messages[0].reactions.is_empty());
    }
}
