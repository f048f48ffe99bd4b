// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use jid::{BareJid, Jid};

use crate::client::ModuleContext;
use crate::event::Event as ClientEvent;
use crate::mods::{Dispatch, Module};
use crate::ns;
use crate::stanza::avatar;
use crate::stanza::bookmark::ConferenceBookmark;
use crate::stanza::pubsub::{PubSubEvent, PubSubItem, PubSubMessage};

/// XEP-0060 event dispatch. Every `<event/>` lands here and is routed
/// by node to a typed event; nodes nobody owns surface as `Published`
/// for downstream consumers.
#[derive(Default, Clone)]
pub struct PubSub {
    ctx: ModuleContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// XEP-0084: a contact published new avatar metadata.
    AvatarMetadataChanged {
        from: Jid,
        metadata: avatar::Metadata,
    },
    /// XEP-0172: a contact changed their nickname.
    NicknameChanged { from: Jid, nickname: String },
    /// XEP-0402: the account's bookmarks changed.
    BookmarksChanged {
        published: Vec<ConferenceBookmark>,
        retracted: Vec<BareJid>,
    },
    /// Items published on a node this library doesn't interpret.
    Published {
        from: Jid,
        node: String,
        items: Vec<PubSubItem>,
    },
}

impl Module for PubSub {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn handle_pubsub_message(&self, pubsub: &PubSubMessage) -> Result<Dispatch> {
        for event in pubsub.events.iter() {
            self.dispatch_event(&pubsub.from, event)?;
        }
        Ok(Dispatch::Claimed)
    }
}

impl PubSub {
    fn dispatch_event(&self, from: &Jid, event: &PubSubEvent) -> Result<()> {
        match event.node.as_str() {
            ns::AVATAR_METADATA => {
                for item in &event.published {
                    let Some(payload) = &item.payload else {
                        continue;
                    };
                    let metadata = avatar::Metadata::try_from(payload.clone())?;
                    self.ctx
                        .schedule_event(ClientEvent::PubSub(Event::AvatarMetadataChanged {
                            from: from.clone(),
                            metadata,
                        }));
                }
            }
            ns::NICK => {
                for item in &event.published {
                    let Some(payload) = &item.payload else {
                        continue;
                    };
                    if !payload.is("nick", ns::NICK) {
                        continue;
                    }
                    self.ctx
                        .schedule_event(ClientEvent::PubSub(Event::NicknameChanged {
                            from: from.clone(),
                            nickname: payload.text(),
                        }));
                }
            }
            ns::BOOKMARKS2 => {
                let mut bookmarks = Vec::new();
                for item in &event.published {
                    let (Some(id), Some(payload)) = (&item.id, &item.payload) else {
                        continue;
                    };
                    let Ok(jid) = id.parse::<BareJid>() else {
                        continue;
                    };
                    let conference =
                        xmpp_parsers::bookmarks2::Conference::try_from(payload.clone())?;
                    bookmarks.push(ConferenceBookmark::from_conference(jid, conference));
                }

                let retracted = event
                    .retracted
                    .iter()
                    .filter_map(|id| id.parse::<BareJid>().ok())
                    .collect::<Vec<_>>();

                if !bookmarks.is_empty() || !retracted.is_empty() {
                    self.ctx
                        .schedule_event(ClientEvent::PubSub(Event::BookmarksChanged {
                            published: bookmarks,
                            retracted,
                        }));
                }
            }
            _ => {
                self.ctx
                    .schedule_event(ClientEvent::PubSub(Event::Published {
                        from: from.clone(),
                        node: event.node.clone(),
                        items: event.published.clone(),
                    }));
            }
        }

        Ok(())
    }
}
