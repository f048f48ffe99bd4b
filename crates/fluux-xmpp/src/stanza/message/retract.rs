// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::Element;
use xmpp_parsers::message::MessagePayload;

use crate::ns;
use crate::stanza::message;
use crate::util::{ElementExt, ParseError};

/// XEP-0424: Message Retraction
#[derive(Debug, PartialEq, Clone)]
pub struct Retract {
    /// Id of the message being retracted, as assigned by the sender.
    pub id: message::Id,
}

impl Retract {
    pub fn new(id: message::Id) -> Self {
        Retract { id }
    }
}

impl TryFrom<Element> for Retract {
    type Error = ParseError;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("retract", ns::RETRACT)?;
        Ok(Retract {
            id: value.attr_req("id")?.into(),
        })
    }
}

impl From<Retract> for Element {
    fn from(value: Retract) -> Self {
        Element::builder("retract", ns::RETRACT)
            .attr("id", value.id)
            .build()
    }
}

impl MessagePayload for Retract {}
