// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::{BTreeSet, HashMap};

use jid::BareJid;
use xmpp_parsers::muc::user::{Affiliation, Role};
use xmpp_parsers::presence::Show;

use crate::domain::{MamQueryState, Message};

#[derive(Debug, Clone, PartialEq)]
pub struct Occupant {
    pub nick: String,
    pub jid: Option<BareJid>,
    pub affiliation: Affiliation,
    pub role: Role,
    pub show: Option<Show>,
    pub avatar_hash: Option<String>,
}

/// A multi-user chat room and everything we know about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub jid: BareJid,
    pub name: Option<String>,
    /// The nickname we occupy (or requested while joining).
    pub nickname: Option<String>,
    pub joined: bool,
    pub is_joining: bool,
    pub subject: Option<String>,
    pub is_bookmarked: bool,
    pub autojoin: bool,
    pub password: Option<String>,
    /// Ephemeral rooms that auto-destroy when empty; their archive is
    /// never queried.
    pub is_quick_chat: bool,
    /// `None` until disco answered.
    pub supports_mam: Option<bool>,
    pub unread_count: u32,
    pub mentions_count: u32,
    pub typing_users: BTreeSet<String>,
    /// Only mutated by MUC presence stanzas.
    pub occupants: HashMap<String, Occupant>,
    /// Retains mappings for occupants who already left, so replies to
    /// ex-members still resolve in non-anonymous rooms.
    pub nick_to_jid_cache: HashMap<String, BareJid>,
    pub self_occupant: Option<Occupant>,
    pub messages: Vec<Message>,
    pub first_new_message_id: Option<String>,
    pub mam: MamQueryState,
    /// Sidebar preview fetched after this join.
    pub preview_fetched: bool,
}

impl Room {
    pub fn new(jid: BareJid) -> Self {
        // Quick Chats are ephemeral rooms created under a reserved
        // localpart prefix; servers destroy them when they empty out.
        let is_quick_chat = jid
            .node()
            .map(|node| node.to_string().starts_with("quickchat-"))
            .unwrap_or(false);

        Room {
            jid,
            name: None,
            nickname: None,
            joined: false,
            is_joining: false,
            subject: None,
            is_bookmarked: false,
            autojoin: false,
            password: None,
            is_quick_chat,
            supports_mam: None,
            unread_count: 0,
            mentions_count: 0,
            typing_users: BTreeSet::new(),
            occupants: HashMap::new(),
            nick_to_jid_cache: HashMap::new(),
            self_occupant: None,
            messages: Vec::new(),
            first_new_message_id: None,
            mam: MamQueryState::default(),
            preview_fetched: false,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn oldest_stanza_id_in_memory(&self) -> Option<&str> {
        self.messages
            .iter()
            .find_map(|message| message.stanza_id.as_deref())
    }

    pub fn newest_stanza_id_in_memory(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find_map(|message| message.stanza_id.as_deref())
    }

    /// `joined` implies a known self-occupant.
    pub fn mark_joined(&mut self, self_occupant: Occupant) {
        self.nickname = Some(self_occupant.nick.clone());
        self.self_occupant = Some(self_occupant);
        self.joined = true;
        self.is_joining = false;
    }

    pub fn mark_left(&mut self) {
        self.joined = false;
        self.is_joining = false;
        self.self_occupant = None;
        self.occupants.clear();
        self.typing_users.clear();
    }

    /// Applies one occupant presence. Leaving occupants stay in the
    /// nick→JID cache.
    pub fn apply_occupant(&mut self, occupant: Occupant, available: bool) {
        if let Some(jid) = &occupant.jid {
            self.nick_to_jid_cache
                .insert(occupant.nick.clone(), jid.clone());
        }

        if available {
            self.occupants.insert(occupant.nick.clone(), occupant);
        } else {
            self.occupants.remove(&occupant.nick);
            self.typing_users.remove(&occupant.nick);
        }
    }

    /// A composing notification from our own nickname is an echo, not
    /// somebody typing. Compare case-insensitively; some servers
    /// re-case nicknames.
    pub fn is_own_nick(&self, nick: &str) -> bool {
        self.nickname
            .as_deref()
            .map(|own| own.eq_ignore_ascii_case(nick))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn occupant(nick: &str, jid: Option<&str>) -> Occupant {
        Occupant {
            nick: nick.to_string(),
            jid: jid.map(|j| BareJid::from_str(j).unwrap()),
            affiliation: Affiliation::Member,
            role: Role::Participant,
            show: None,
            avatar_hash: None,
        }
    }

    #[test]
    fn test_nick_to_jid_cache_survives_leave() {
        let mut room = Room::new(BareJid::from_str("room@muc.x.y").unwrap());

        room.apply_occupant(occupant("alice", Some("alice@x.y")), true);
        assert!(room.occupants.contains_key("alice"));

        room.apply_occupant(occupant("alice", Some("alice@x.y")), false);
        assert!(!room.occupants.contains_key("alice"));
        assert_eq!(
            room.nick_to_jid_cache.get("alice"),
            Some(&BareJid::from_str("alice@x.y").unwrap())
        );
    }

    #[test]
    fn test_own_nick_comparison_is_case_insensitive() {
        let mut room = Room::new(BareJid::from_str("room@muc.x.y").unwrap());
        room.nickname = Some("Me".to_string());

        assert!(room.is_own_nick("me"));
        assert!(room.is_own_nick("ME"));
        assert!(!room.is_own_nick("bob"));
    }
}
