// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::Jid;
use xmpp_parsers::carbons;
use xmpp_parsers::chatstates::ChatState;
use xmpp_parsers::delay::Delay;
use xmpp_parsers::mam;
use xmpp_parsers::message::MessageType;
use xmpp_parsers::oob::Oob;
use xmpp_parsers::reactions::{Reaction, Reactions};
use xmpp_parsers::stanza_id::{OriginId, StanzaId};

use crate::stanza::media::FileMetadata;
use crate::stanza::message::fasten::ApplyTo;
use crate::stanza::message::{Fallback, Id, Message, Reference, Reply, Retract};
use crate::stanza::muc::{DirectInvite, MediatedInvite};

impl Message {
    pub fn set_id(mut self, id: Id) -> Self {
        self.id = Some(id);
        self
    }

    pub fn set_stanza_id(mut self, stanza_id: StanzaId) -> Self {
        self.stanza_id = Some(stanza_id);
        self
    }

    pub fn set_origin_id(mut self, origin_id: OriginId) -> Self {
        self.origin_id = Some(origin_id);
        self
    }

    pub fn set_from(mut self, from: impl Into<Jid>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn set_to(mut self, to: impl Into<Jid>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn set_type(mut self, r#type: MessageType) -> Self {
        self.r#type = r#type;
        self
    }

    pub fn set_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn set_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn set_chat_state(mut self, chat_state: Option<ChatState>) -> Self {
        self.chat_state = chat_state;
        self
    }

    pub fn set_replace(mut self, id: Id) -> Self {
        self.replace = Some(id);
        self
    }

    pub fn set_message_reactions(
        mut self,
        id: Id,
        reactions: impl IntoIterator<Item = String>,
    ) -> Self {
        self.reactions = Some(Reactions {
            id: id.into_inner(),
            reactions: reactions
                .into_iter()
                .map(|emoji| Reaction { emoji })
                .collect(),
        });
        self
    }

    pub fn set_retract(mut self, id: Id) -> Self {
        self.retract = Some(Retract::new(id));
        self
    }

    pub fn set_fastening(mut self, fastening: ApplyTo) -> Self {
        self.fastening = Some(fastening);
        self
    }

    pub fn add_fallback(mut self, fallback: Fallback) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    pub fn set_reply(mut self, reply: Reply) -> Self {
        self.reply = Some(reply);
        self
    }

    pub fn add_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    pub fn set_delay(mut self, delay: Delay) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_oob(mut self, oob: Oob) -> Self {
        self.oob = Some(oob);
        self
    }

    pub fn set_file_metadata(mut self, metadata: FileMetadata) -> Self {
        self.file_metadata = Some(metadata);
        self
    }

    pub fn set_unstyled(mut self) -> Self {
        self.unstyled = true;
        self
    }

    pub fn set_no_store(mut self) -> Self {
        self.no_store = true;
        self
    }

    pub fn set_archived_message(mut self, archived_message: mam::Result_) -> Self {
        self.archived_message = Some(archived_message);
        self
    }

    pub fn set_received_carbon(mut self, carbon: carbons::Received) -> Self {
        self.received_carbon = Some(carbon);
        self
    }

    pub fn set_sent_carbon(mut self, carbon: carbons::Sent) -> Self {
        self.sent_carbon = Some(carbon);
        self
    }

    pub fn set_direct_invite(mut self, invite: DirectInvite) -> Self {
        self.direct_invite = Some(invite);
        self
    }

    pub fn set_mediated_invite(mut self, invite: MediatedInvite) -> Self {
        self.mediated_invite = Some(invite);
        self
    }
}
