// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::BareJid;
use serde::{Deserialize, Serialize};
use xmpp_parsers::bookmarks2::Conference;

/// A XEP-0402 bookmark in the shape the rest of the stack consumes:
/// the PEP item id is the room JID, the payload is the conference
/// element.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ConferenceBookmark {
    pub jid: BareJid,
    pub name: Option<String>,
    pub autojoin: bool,
    pub nick: Option<String>,
    pub password: Option<String>,
}

impl ConferenceBookmark {
    pub fn from_conference(jid: BareJid, conference: Conference) -> Self {
        ConferenceBookmark {
            jid,
            name: conference.name,
            autojoin: conference.autojoin,
            nick: conference.nick.map(|nick| nick.to_string()),
            password: conference.password,
        }
    }

    pub fn into_conference(self) -> Conference {
        Conference {
            autojoin: self.autojoin,
            name: self.name,
            nick: self
                .nick
                .and_then(|nick| jid::ResourcePart::new(&nick).ok()),
            password: self.password,
            extensions: None,
        }
    }
}
