// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::BTreeMap;

use jid::BareJid;
use xmpp_parsers::presence::Show;
use xmpp_parsers::roster::Subscription;

/// Availability of one resource of a contact.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourcePresence {
    pub show: Option<Show>,
    pub status: Option<String>,
    /// Set when a presence of type error came back for this contact
    /// (e.g. `remote-server-not-found` on a probe). Scoped to the
    /// contact; the connection is unaffected.
    pub error: Option<String>,
}

/// Aggregated presence over all resources.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContactPresence {
    pub resources: BTreeMap<String, ResourcePresence>,
}

impl ContactPresence {
    pub fn is_online(&self) -> bool {
        self.resources.values().any(|r| r.error.is_none())
    }

    /// The "best" show across resources: any online resource without a
    /// show wins, then chat < away < xa < dnd in display priority.
    pub fn aggregated_show(&self) -> Option<Show> {
        let mut best: Option<Option<Show>> = None;
        for resource in self.resources.values() {
            if resource.error.is_some() {
                continue;
            }
            let rank = show_rank(&resource.show);
            let best_rank = best.as_ref().map(show_rank).unwrap_or(u8::MAX);
            if rank < best_rank {
                best = Some(resource.show.clone());
            }
        }
        best.flatten()
    }
}

fn show_rank(show: &Option<Show>) -> u8 {
    match show {
        None => 0,
        Some(Show::Chat) => 1,
        Some(Show::Away) => 2,
        Some(Show::Xa) => 3,
        Some(Show::Dnd) => 4,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub jid: BareJid,
    pub name: Option<String>,
    pub subscription: Subscription,
    pub presence: ContactPresence,
    pub avatar_hash: Option<String>,
}

impl Contact {
    pub fn new(jid: BareJid) -> Self {
        Contact {
            jid,
            name: None,
            subscription: Subscription::None,
            presence: ContactPresence::default(),
            avatar_hash: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregates_best_show_across_resources() {
        let mut presence = ContactPresence::default();
        presence.resources.insert(
            "phone".to_string(),
            ResourcePresence {
                show: Some(Show::Away),
                status: None,
                error: None,
            },
        );
        assert_eq!(presence.aggregated_show(), Some(Show::Away));

        presence.resources.insert(
            "desktop".to_string(),
            ResourcePresence::default(),
        );
        // A plain available resource beats an away one.
        assert_eq!(presence.aggregated_show(), None);
        assert!(presence.is_online());
    }
}
