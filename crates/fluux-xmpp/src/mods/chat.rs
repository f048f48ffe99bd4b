// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use jid::Jid;
use xmpp_parsers::carbons;
use xmpp_parsers::chatstates::ChatState;
use xmpp_parsers::iq::Iq;
use xmpp_parsers::message::MessageType;
use xmpp_parsers::oob::Oob;

use crate::client::ModuleContext;
use crate::event::Event as ClientEvent;
use crate::mods::{Dispatch, Module};
use crate::ns;
use crate::stanza::media::{FileMetadata, Thumbnail};
use crate::stanza::message;
use crate::stanza::message::fasten::{ApplyTo, Meta};
use crate::stanza::message::{Fallback, Message, Reference, Reply};

/// Prefix prepended to corrections so that clients which do not
/// understand XEP-0308 still render something sensible. Marked as
/// fallback so conforming clients strip it again.
pub const CORRECTED_PREFIX: &str = "[Corrected] ";

const RETRACTION_FALLBACK_BODY: &str =
    "This person attempted to retract a previous message, but it's unsupported by your client.";

#[derive(Default, Clone)]
pub struct Chat {
    ctx: ModuleContext,
}

/// A message of ours echoed to (or from) another of our resources.
#[derive(Debug, Clone, PartialEq)]
pub enum Carbon {
    Received(Message),
    Sent(Message),
}

/// An attachment to send: the uploaded file's URL plus whatever
/// metadata is known.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attachment {
    pub url: String,
    pub media_type: Option<String>,
    pub name: Option<String>,
    pub size: Option<u64>,
    pub thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(Message),
    Carbon(Carbon),
    Sent(Message),
    ChatStateChanged {
        from: Jid,
        chat_state: ChatState,
        message_type: MessageType,
    },
}

impl Module for Chat {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn handle_message_stanza(&self, stanza: &Message) -> Result<Dispatch> {
        // Archive results that no collector wanted must not enter the
        // live pipeline.
        if stanza.is_mam_message() {
            return Ok(Dispatch::Claimed);
        }

        // Group chat traffic and room invites belong to the MUC module.
        if stanza.r#type == MessageType::Groupchat {
            return Ok(Dispatch::Pass);
        }
        if stanza.direct_invite.is_some() || stanza.mediated_invite.is_some() {
            return Ok(Dispatch::Pass);
        }

        let is_carbon = stanza.received_carbon.is_some() || stanza.sent_carbon.is_some();

        // Chat states from carbons would echo our own typing back at us.
        if !is_carbon {
            if let (Some(from), Some(chat_state)) = (stanza.from.clone(), stanza.chat_state.clone())
            {
                self.ctx
                    .schedule_event(ClientEvent::Chat(Event::ChatStateChanged {
                        from,
                        chat_state,
                        message_type: stanza.r#type.clone(),
                    }));
            }
        }

        if let Some(received_carbon) = &stanza.received_carbon {
            // Ignore carbons from invalid senders.
            // CVE-2017-5589
            // https://rt-solutions.de/en/cve-2017-5589_xmpp_carbons/
            if stanza.from == Some(Jid::from(self.ctx.bare_jid())) {
                let message = unwrap_carbon(received_carbon.forwarded.clone())?;
                self.ctx
                    .schedule_event(ClientEvent::Chat(Event::Carbon(Carbon::Received(message))));
            }
            return Ok(Dispatch::Claimed);
        }

        if let Some(sent_carbon) = &stanza.sent_carbon {
            if stanza.from == Some(Jid::from(self.ctx.bare_jid())) {
                let message = unwrap_carbon(sent_carbon.forwarded.clone())?;
                self.ctx
                    .schedule_event(ClientEvent::Chat(Event::Carbon(Carbon::Sent(message))));
            }
            return Ok(Dispatch::Claimed);
        }

        // A bare chat state needs no message event.
        if stanza.body.is_none()
            && stanza.subject.is_none()
            && stanza.reactions.is_none()
            && stanza.retract.is_none()
            && stanza.replace.is_none()
            && stanza.fastening.is_none()
        {
            return Ok(Dispatch::Claimed);
        }

        self.ctx
            .schedule_event(ClientEvent::Chat(Event::Message(stanza.clone())));

        Ok(Dispatch::Claimed)
    }
}

impl Chat {
    pub fn send_message(
        &self,
        to: impl Into<Jid>,
        body: impl Into<String>,
        message_type: &MessageType,
        reply_to: Option<Reply>,
        mentions: impl IntoIterator<Item = Reference>,
        attachment: Option<Attachment>,
    ) -> Result<()> {
        let mut stanza = Message::new()
            .set_type(message_type.clone())
            .set_id(self.ctx.generate_id().into())
            .set_from(self.ctx.full_jid())
            .set_to(to);

        stanza = apply_body_and_attachment(stanza, body.into(), attachment);

        if let Some(reply) = reply_to {
            stanza = stanza.set_reply(reply);
        }
        for mention in mentions {
            stanza = stanza.add_reference(mention);
        }

        self.send_message_stanza(stanza)
    }

    /// XEP-0308. The correction body carries a visible `[Corrected] `
    /// prefix marked as fallback for the correction namespace.
    pub fn send_correction(
        &self,
        id: message::Id,
        to: impl Into<Jid>,
        body: impl Into<String>,
        message_type: &MessageType,
        attachment: Option<Attachment>,
    ) -> Result<()> {
        let body = format!("{CORRECTED_PREFIX}{}", body.into());
        let prefix_len = CORRECTED_PREFIX.chars().count();

        let mut stanza = Message::new()
            .set_type(message_type.clone())
            .set_id(self.ctx.generate_id().into())
            .set_from(self.ctx.full_jid())
            .set_to(to)
            .set_replace(id)
            .add_fallback(
                Fallback::new(ns::MESSAGE_CORRECT).with_body_range(0, prefix_len),
            );

        stanza = apply_body_and_attachment(stanza, body, attachment);

        self.send_message_stanza(stanza)
    }

    /// XEP-0424. The retraction's sender must match the original
    /// sender; receivers enforce this.
    pub fn retract_message(
        &self,
        id: message::Id,
        to: impl Into<Jid>,
        message_type: &MessageType,
    ) -> Result<()> {
        let stanza = Message::new()
            .set_type(message_type.clone())
            .set_id(self.ctx.generate_id().into())
            .set_from(self.ctx.full_jid())
            .set_to(to)
            .set_body(RETRACTION_FALLBACK_BODY)
            .set_retract(id)
            .add_fallback(Fallback {
                r#for: Some(ns::RETRACT.to_string()),
                subjects: vec![],
                bodies: vec![],
            });
        self.send_message_stanza(stanza)
    }

    /// XEP-0444. The set replaces all of our previous reactions on the
    /// target message.
    pub fn react_to_message(
        &self,
        id: message::Id,
        to: impl Into<Jid>,
        reactions: impl IntoIterator<Item = String>,
        message_type: &MessageType,
    ) -> Result<()> {
        let stanza = Message::new()
            .set_type(message_type.clone())
            .set_id(self.ctx.generate_id().into())
            .set_from(self.ctx.full_jid())
            .set_to(to)
            .set_message_reactions(id, reactions);
        self.send_message_stanza(stanza)
    }

    pub fn send_chat_state(
        &self,
        to: impl Into<Jid>,
        chat_state: ChatState,
        message_type: &MessageType,
    ) -> Result<()> {
        let stanza = Message::new()
            .set_type(message_type.clone())
            .set_from(self.ctx.full_jid())
            .set_to(to)
            .set_chat_state(Some(chat_state));
        self.ctx.send_stanza(stanza)
    }

    /// XEP-0422: fastens OGP meta tags onto an earlier message of ours
    /// so receivers can render a link preview.
    pub fn send_link_preview(
        &self,
        target_id: message::Id,
        to: impl Into<Jid>,
        metas: impl IntoIterator<Item = Meta>,
        message_type: &MessageType,
    ) -> Result<()> {
        let mut fastening = ApplyTo::new(target_id);
        for meta in metas {
            fastening = fastening.with_payload(meta);
        }

        let stanza = Message::new()
            .set_type(message_type.clone())
            .set_id(self.ctx.generate_id().into())
            .set_from(self.ctx.full_jid())
            .set_to(to)
            .set_fastening(fastening)
            .set_no_store();
        self.ctx.send_stanza(stanza)
    }

    pub fn set_message_carbons_enabled(&self, enabled: bool) -> Result<()> {
        if enabled {
            self.ctx
                .send_stanza(Iq::from_set(self.ctx.generate_id(), carbons::Enable))
        } else {
            self.ctx
                .send_stanza(Iq::from_set(self.ctx.generate_id(), carbons::Disable))
        }
    }
}

impl Chat {
    fn send_message_stanza(&self, message: Message) -> Result<()> {
        self.ctx
            .schedule_event(ClientEvent::Chat(Event::Sent(message.clone())));
        self.ctx.send_stanza(message)
    }
}

/// Builds the outgoing body for an optional attachment. The user's text
/// survives in front of the URL; the XEP-0428 range covers only the URL
/// tail so OOB-aware clients drop the link but keep the text.
fn apply_body_and_attachment(
    mut stanza: Message,
    body: String,
    attachment: Option<Attachment>,
) -> Message {
    let Some(attachment) = attachment else {
        return stanza.set_body(body);
    };

    let full_body = if body.is_empty() {
        attachment.url.clone()
    } else {
        format!("{body}\n{}", attachment.url)
    };

    let url_chars = attachment.url.chars().count();
    let total_chars = full_body.chars().count();

    stanza = stanza
        .set_body(full_body)
        .set_oob(Oob {
            url: attachment.url,
            desc: None,
        })
        .add_fallback(
            Fallback::new(ns::OUT_OF_BAND_DATA)
                .with_body_range(total_chars - url_chars, total_chars),
        );

    if attachment.media_type.is_some() || attachment.name.is_some() || attachment.size.is_some() {
        stanza = stanza.set_file_metadata(FileMetadata {
            media_type: attachment.media_type,
            name: attachment.name,
            size: attachment.size,
            width: None,
            height: None,
            desc: None,
            thumbnail: attachment.thumbnail,
        });
    }

    stanza
}

fn unwrap_carbon(forwarded: xmpp_parsers::forwarding::Forwarded) -> Result<Message> {
    let mut message = Message::try_from(
        forwarded
            .stanza
            .ok_or_else(|| anyhow::anyhow!("forwarded carbon is missing its message stanza"))?,
    )?;
    if message.delay.is_none() {
        message.delay = forwarded.delay;
    }
    Ok(message)
}
