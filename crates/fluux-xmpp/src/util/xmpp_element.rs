// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::Element;
use xmpp_parsers::iq::Iq;
use xmpp_parsers::message::MessageType;
use xmpp_parsers::presence::Presence;
use xmpp_parsers::sm;

use crate::ns;
use crate::stanza::{Message, PubSubMessage};

/// Classified inbound stream element. Everything the router and the
/// pending request futures operate on.
#[derive(Debug)]
pub enum XmppElement {
    Presence(Presence),
    Message(Message),
    Iq(Iq),
    PubSubMessage(PubSubMessage),
    /// XEP-0198 stream-management nonza. Consumed by the connection
    /// layer, never dispatched to modules.
    Nonza(sm::Nonza),
}

impl XmppElement {
    /// Classifies a raw stream element. Returns `Ok(None)` for elements
    /// that are not addressed to the stanza layer at all.
    pub fn try_from_element(value: Element) -> Result<Option<Self>, anyhow::Error> {
        if value.is("iq", ns::JABBER_CLIENT) {
            Ok(Some(Self::Iq(Iq::try_from(value)?)))
        } else if value.is("message", ns::JABBER_CLIENT) {
            let message = xmpp_parsers::message::Message::try_from(value)?;

            if message.type_ != MessageType::Headline {
                return Ok(Some(Self::Message(message.try_into()?)));
            }

            Ok(Some(Self::PubSubMessage(message.try_into()?)))
        } else if value.is("presence", ns::JABBER_CLIENT) {
            Ok(Some(Self::Presence(value.try_into()?)))
        } else if value.has_ns(ns::SM) {
            Ok(Some(Self::Nonza(sm::Nonza::try_from(value)?)))
        } else {
            Ok(None)
        }
    }

    /// True for the three stanza kinds that count towards the XEP-0198
    /// inbound counter.
    pub fn counts_towards_sm(&self) -> bool {
        matches!(
            self,
            Self::Presence(_) | Self::Message(_) | Self::Iq(_) | Self::PubSubMessage(_)
        )
    }
}

impl From<Iq> for XmppElement {
    fn from(value: Iq) -> Self {
        Self::Iq(value)
    }
}

impl From<Message> for XmppElement {
    fn from(value: Message) -> Self {
        Self::Message(value)
    }
}

impl From<Presence> for XmppElement {
    fn from(value: Presence) -> Self {
        Self::Presence(value)
    }
}

impl From<PubSubMessage> for XmppElement {
    fn from(value: PubSubMessage) -> Self {
        Self::PubSubMessage(value)
    }
}
