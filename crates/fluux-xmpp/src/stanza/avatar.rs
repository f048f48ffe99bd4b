// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::Element;

use crate::ns;
use crate::util::{ElementExt, ParseError};

crate::id_string!(
    /// SHA-1 of the image bytes, which doubles as the PEP item id.
    ImageId
);

/// XEP-0084: User Avatar metadata node payload.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Metadata {
    pub infos: Vec<Info>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Info {
    pub id: ImageId,
    pub media_type: String,
    pub bytes: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub url: Option<String>,
}

impl TryFrom<Element> for Metadata {
    type Error = ParseError;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("metadata", ns::AVATAR_METADATA)?;

        let infos = value
            .children()
            .filter(|child| child.name() == "info")
            .map(|child| {
                Ok(Info {
                    id: child.attr_req("id")?.into(),
                    media_type: child.attr_req("type")?.to_string(),
                    bytes: child.attr_req("bytes")?.parse()?,
                    width: child.attr("width").map(|v| v.parse()).transpose()?,
                    height: child.attr("height").map(|v| v.parse()).transpose()?,
                    url: child.attr("url").map(str::to_string),
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        Ok(Metadata { infos })
    }
}

impl From<Metadata> for Element {
    fn from(value: Metadata) -> Self {
        Element::builder("metadata", ns::AVATAR_METADATA)
            .append_all(value.infos.into_iter().map(|info| {
                Element::builder("info", ns::AVATAR_METADATA)
                    .attr("id", info.id)
                    .attr("type", info.media_type)
                    .attr("bytes", info.bytes)
                    .attr("width", info.width)
                    .attr("height", info.height)
                    .attr("url", info.url)
                    .build()
            }))
            .build()
    }
}

/// XEP-0084: User Avatar data node payload, base64 image bytes.
#[derive(Debug, PartialEq, Clone)]
pub struct Data {
    pub base64: String,
}

impl TryFrom<Element> for Data {
    type Error = ParseError;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("data", ns::AVATAR_DATA)?;
        Ok(Data {
            base64: value.text().split_whitespace().collect(),
        })
    }
}

impl From<Data> for Element {
    fn from(value: Data) -> Self {
        Element::builder("data", ns::AVATAR_DATA)
            .append(value.base64)
            .build()
    }
}
