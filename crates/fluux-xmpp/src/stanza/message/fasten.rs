// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::Element;
use xmpp_parsers::message::MessagePayload;

use crate::ns;
use crate::stanza::message;
use crate::util::{ElementExt, ParseError};

/// XEP-0422: Message Fastening
///
/// Fastens payloads onto an earlier message. The only payloads this
/// library interprets are OGP `<meta/>` tags (link previews).
#[derive(Debug, PartialEq, Clone)]
pub struct ApplyTo {
    pub id: message::Id,
    pub payloads: Vec<FastenedPayload>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum FastenedPayload {
    /// An OGP property/content pair fastened to the target message.
    Meta(Meta),
    Other(Element),
}

/// OGP meta tag as fastened by link-preview-aware clients.
#[derive(Debug, PartialEq, Clone)]
pub struct Meta {
    pub property: String,
    pub content: String,
}

impl ApplyTo {
    pub fn new(id: message::Id) -> Self {
        ApplyTo {
            id,
            payloads: vec![],
        }
    }

    pub fn with_payload(mut self, payload: impl Into<FastenedPayload>) -> Self {
        self.payloads.push(payload.into());
        self
    }

    pub fn meta_tags(&self) -> impl Iterator<Item = &Meta> {
        self.payloads.iter().filter_map(|payload| match payload {
            FastenedPayload::Meta(meta) => Some(meta),
            FastenedPayload::Other(_) => None,
        })
    }
}

impl From<Meta> for FastenedPayload {
    fn from(value: Meta) -> Self {
        FastenedPayload::Meta(value)
    }
}

impl TryFrom<Element> for ApplyTo {
    type Error = ParseError;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("apply-to", ns::FASTEN)?;

        let payloads = value
            .children()
            .map(|child| {
                if child.is("meta", ns::XHTML) {
                    Ok(FastenedPayload::Meta(Meta {
                        property: child.attr_req("property")?.to_string(),
                        content: child.attr_req("content")?.to_string(),
                    }))
                } else {
                    Ok(FastenedPayload::Other(child.clone()))
                }
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        Ok(ApplyTo {
            id: value.attr_req("id")?.into(),
            payloads,
        })
    }
}

impl From<ApplyTo> for Element {
    fn from(value: ApplyTo) -> Self {
        Element::builder("apply-to", ns::FASTEN)
            .attr("id", value.id)
            .append_all(value.payloads.into_iter().map(|payload| match payload {
                FastenedPayload::Meta(meta) => Element::builder("meta", ns::XHTML)
                    .attr("property", meta.property)
                    .attr("content", meta.content)
                    .build(),
                FastenedPayload::Other(element) => element,
            }))
            .build()
    }
}

impl MessagePayload for ApplyTo {}
