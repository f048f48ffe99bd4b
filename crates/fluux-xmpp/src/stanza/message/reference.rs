// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::Element;
use xmpp_parsers::message::MessagePayload;

use crate::ns;
use crate::util::{ElementExt, ParseError};

/// XEP-0372: References, as used for mentions (`@nick`).
#[derive(Debug, PartialEq, Clone)]
pub struct Reference {
    pub r#type: ReferenceType,
    pub uri: String,
    pub begin: Option<usize>,
    pub end: Option<usize>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum ReferenceType {
    Mention,
    Data,
}

impl Reference {
    pub fn mention(uri: impl Into<String>, begin: usize, end: usize) -> Self {
        Reference {
            r#type: ReferenceType::Mention,
            uri: uri.into(),
            begin: Some(begin),
            end: Some(end),
        }
    }
}

impl TryFrom<Element> for Reference {
    type Error = ParseError;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("reference", ns::REFERENCE)?;

        let r#type = match value.attr_req("type")? {
            "mention" => ReferenceType::Mention,
            "data" => ReferenceType::Data,
            other => {
                return Err(ParseError::Generic {
                    msg: format!("Unknown reference type '{other}'"),
                })
            }
        };

        Ok(Reference {
            r#type,
            uri: value.attr_req("uri")?.to_string(),
            begin: value.attr("begin").map(|v| v.parse()).transpose()?,
            end: value.attr("end").map(|v| v.parse()).transpose()?,
        })
    }
}

impl From<Reference> for Element {
    fn from(value: Reference) -> Self {
        Element::builder("reference", ns::REFERENCE)
            .attr(
                "type",
                match value.r#type {
                    ReferenceType::Mention => "mention",
                    ReferenceType::Data => "data",
                },
            )
            .attr("uri", value.uri)
            .attr("begin", value.begin)
            .attr("end", value.end)
            .build()
    }
}

impl MessagePayload for Reference {}
