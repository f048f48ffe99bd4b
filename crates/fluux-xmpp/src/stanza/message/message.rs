// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::Jid;
use minidom::Element;
use xmpp_parsers::carbons;
use xmpp_parsers::chatstates::ChatState;
use xmpp_parsers::delay::Delay;
use xmpp_parsers::mam;
use xmpp_parsers::message::{Body, MessageType, Subject};
use xmpp_parsers::message_correct::Replace;
use xmpp_parsers::oob::Oob;
use xmpp_parsers::reactions::Reactions;
use xmpp_parsers::stanza_error::StanzaError;
use xmpp_parsers::stanza_id::{OriginId, StanzaId};

use crate::ns;
use crate::stanza::media::{FileMetadata, Thumbnail};
use crate::stanza::message::fasten::ApplyTo;
use crate::stanza::message::{Fallback, Reference, Reply, Retract};
use crate::stanza::message::Id;
use crate::stanza::muc::{DirectInvite, MediatedInvite};

/// A `<message/>` stanza with every payload this library interprets
/// parsed out in a single pass. Unknown payloads are dropped.
#[derive(Debug, PartialEq, Clone)]
pub struct Message {
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    pub id: Option<Id>,
    pub stanza_id: Option<StanzaId>,
    pub origin_id: Option<OriginId>,
    pub r#type: MessageType,
    pub body: Option<String>,
    pub subject: Option<String>,
    pub chat_state: Option<ChatState>,
    pub replace: Option<Id>,
    pub reactions: Option<Reactions>,
    pub retract: Option<Retract>,
    pub fastening: Option<ApplyTo>,
    pub fallbacks: Vec<Fallback>,
    pub reply: Option<Reply>,
    pub references: Vec<Reference>,
    pub delay: Option<Delay>,
    pub oob: Option<Oob>,
    pub thumbnail: Option<Thumbnail>,
    pub file_metadata: Option<FileMetadata>,
    pub unstyled: bool,
    pub no_store: bool,
    pub archived_message: Option<mam::Result_>,
    pub sent_carbon: Option<carbons::Sent>,
    pub received_carbon: Option<carbons::Received>,
    pub direct_invite: Option<DirectInvite>,
    pub mediated_invite: Option<MediatedInvite>,
    pub error: Option<StanzaError>,
}

impl Default for Message {
    fn default() -> Self {
        Message {
            from: None,
            to: None,
            id: None,
            stanza_id: None,
            origin_id: None,
            r#type: MessageType::Normal,
            body: None,
            subject: None,
            chat_state: None,
            replace: None,
            reactions: None,
            retract: None,
            fastening: None,
            fallbacks: vec![],
            reply: None,
            references: vec![],
            delay: None,
            oob: None,
            thumbnail: None,
            file_metadata: None,
            unstyled: false,
            no_store: false,
            archived_message: None,
            sent_carbon: None,
            received_carbon: None,
            direct_invite: None,
            mediated_invite: None,
            error: None,
        }
    }
}

impl Message {
    pub fn new() -> Self {
        Message::default()
    }

    pub fn is_mam_message(&self) -> bool {
        self.archived_message.is_some()
    }

    /// The fallback marked for the given companion namespace, if any.
    pub fn fallback_for(&self, r#for: &str) -> Option<&Fallback> {
        self.fallbacks
            .iter()
            .find(|fallback| fallback.r#for.as_deref() == Some(r#for))
    }
}

impl TryFrom<xmpp_parsers::message::Message> for Message {
    type Error = anyhow::Error;

    fn try_from(root: xmpp_parsers::message::Message) -> Result<Self, Self::Error> {
        let mut message = Message::new();

        message.body = root
            .get_best_body(vec![])
            .map(|(_, body)| body.0.to_string());

        message.subject = root
            .get_best_subject(vec![])
            .map(|(_, subject)| subject.0.to_string());

        for payload in root.payloads.into_iter() {
            match payload {
                _ if payload.is("stanza-id", ns::SID) => {
                    message.stanza_id = Some(StanzaId::try_from(payload)?)
                }
                _ if payload.is("origin-id", ns::SID) => {
                    message.origin_id = Some(OriginId::try_from(payload)?)
                }
                _ if payload.has_ns(ns::CHATSTATES) => {
                    message.chat_state = Some(ChatState::try_from(payload)?)
                }
                _ if payload.is("replace", ns::MESSAGE_CORRECT) => {
                    message.replace = Some(Replace::try_from(payload)?.id.into())
                }
                _ if payload.is("reactions", ns::REACTIONS) => {
                    message.reactions = Some(Reactions::try_from(payload)?)
                }
                _ if payload.is("retract", ns::RETRACT) => {
                    message.retract = Some(Retract::try_from(payload)?)
                }
                _ if payload.is("apply-to", ns::FASTEN) => {
                    message.fastening = Some(ApplyTo::try_from(payload)?)
                }
                _ if payload.is("fallback", ns::FALLBACK) => {
                    message.fallbacks.push(Fallback::try_from(payload)?)
                }
                _ if payload.is("reply", ns::REPLY) => {
                    message.reply = Some(Reply::try_from(payload)?)
                }
                _ if payload.is("reference", ns::REFERENCE) => {
                    message.references.push(Reference::try_from(payload)?)
                }
                _ if payload.is("delay", ns::DELAY) => {
                    message.delay = Some(Delay::try_from(payload)?)
                }
                _ if payload.is("x", ns::OUT_OF_BAND_DATA) => {
                    message.oob = Some(Oob::try_from(payload)?)
                }
                _ if payload.is("thumbnail", ns::THUMBS) => {
                    message.thumbnail = Some(Thumbnail::try_from(payload)?)
                }
                _ if payload.is("file", ns::FILE_METADATA) => {
                    message.file_metadata = Some(FileMetadata::try_from(payload)?)
                }
                _ if payload.is("unstyled", ns::STYLING) => message.unstyled = true,
                _ if payload.is("no-store", ns::HINTS) => message.no_store = true,
                _ if payload.is("result", ns::MAM) => {
                    message.archived_message = Some(mam::Result_::try_from(payload)?)
                }
                _ if payload.is("sent", ns::CARBONS) => {
                    message.sent_carbon = Some(carbons::Sent::try_from(payload)?)
                }
                _ if payload.is("received", ns::CARBONS) => {
                    message.received_carbon = Some(carbons::Received::try_from(payload)?)
                }
                _ if payload.is("x", ns::DIRECT_MUC_INVITATIONS) => {
                    message.direct_invite = Some(DirectInvite::try_from(payload)?)
                }
                _ if payload.is("x", ns::MUC_USER) => {
                    let invite = MediatedInvite::try_from(payload)?;
                    if !invite.invites.is_empty() {
                        message.mediated_invite = Some(invite);
                    }
                }
                _ if payload.is("error", ns::DEFAULT_NS) => {
                    message.error = Some(StanzaError::try_from(payload)?)
                }
                _ => (),
            }
        }

        message.from = root.from;
        message.to = root.to;
        message.id = root.id.map(Into::into);
        message.r#type = root.type_;

        Ok(message)
    }
}

impl TryFrom<Element> for Message {
    type Error = anyhow::Error;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        Message::try_from(xmpp_parsers::message::Message::try_from(value)?)
    }
}

impl From<Message> for Element {
    fn from(value: Message) -> Self {
        xmpp_parsers::message::Message::from(value).into()
    }
}

impl From<Message> for xmpp_parsers::message::Message {
    fn from(value: Message) -> Self {
        let mut message = xmpp_parsers::message::Message::new(None);
        message.to = value.to;
        message.from = value.from;
        message.id = value.id.map(|id| id.into_inner());
        message.type_ = value.r#type;

        if let Some(body) = value.body {
            message.bodies.insert("".into(), Body(body));
        }
        if let Some(subject) = value.subject {
            message.subjects.insert("".into(), Subject(subject));
        }
        if let Some(stanza_id) = value.stanza_id {
            message.payloads.push(stanza_id.into())
        }
        if let Some(origin_id) = value.origin_id {
            message.payloads.push(origin_id.into())
        }
        if let Some(chat_state) = value.chat_state {
            message.payloads.push(chat_state.into())
        }
        if let Some(replace) = value.replace {
            message.payloads.push(
                Replace {
                    id: replace.into_inner(),
                }
                .into(),
            );
        }
        if let Some(reactions) = value.reactions {
            message.payloads.push(reactions.into());
        }
        if let Some(retract) = value.retract {
            message.payloads.push(retract.into());
        }
        if let Some(fastening) = value.fastening {
            message.payloads.push(fastening.into());
        }
        for fallback in value.fallbacks {
            message.payloads.push(fallback.into());
        }
        if let Some(reply) = value.reply {
            message.payloads.push(reply.into());
        }
        for reference in value.references {
            message.payloads.push(reference.into());
        }
        if let Some(delay) = value.delay {
            message.payloads.push(delay.into());
        }
        if let Some(oob) = value.oob {
            message.payloads.push(oob.into());
        }
        if let Some(thumbnail) = value.thumbnail {
            message.payloads.push(thumbnail.into());
        }
        if let Some(file_metadata) = value.file_metadata {
            message.payloads.push(file_metadata.into());
        }
        if value.unstyled {
            message
                .payloads
                .push(Element::builder("unstyled", ns::STYLING).build());
        }
        if value.no_store {
            message
                .payloads
                .push(Element::builder("no-store", ns::HINTS).build());
        }
        if let Some(archived_message) = value.archived_message {
            message.payloads.push(archived_message.into());
        }
        if let Some(received_carbon) = value.received_carbon {
            message.payloads.push(received_carbon.into());
        }
        if let Some(sent_carbon) = value.sent_carbon {
            message.payloads.push(sent_carbon.into());
        }
        if let Some(direct_invite) = value.direct_invite {
            message.payloads.push(direct_invite.into());
        }
        if let Some(mediated_invite) = value.mediated_invite {
            message.payloads.push(mediated_invite.into());
        }
        message
    }
}
