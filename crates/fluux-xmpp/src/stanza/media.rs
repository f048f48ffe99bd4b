// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::Element;
use xmpp_parsers::message::MessagePayload;

use crate::ns;
use crate::util::{ElementExt, ParseError};

/// XEP-0264: Jingle Content Thumbnails
#[derive(Debug, PartialEq, Clone)]
pub struct Thumbnail {
    pub uri: String,
    pub media_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl TryFrom<Element> for Thumbnail {
    type Error = ParseError;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("thumbnail", ns::THUMBS)?;
        Ok(Thumbnail {
            uri: value.attr_req("uri")?.to_string(),
            media_type: value.attr("media-type").map(str::to_string),
            width: value.attr("width").map(|v| v.parse()).transpose()?,
            height: value.attr("height").map(|v| v.parse()).transpose()?,
        })
    }
}

impl From<Thumbnail> for Element {
    fn from(value: Thumbnail) -> Self {
        Element::builder("thumbnail", ns::THUMBS)
            .attr("uri", value.uri)
            .attr("media-type", value.media_type)
            .attr("width", value.width)
            .attr("height", value.height)
            .build()
    }
}

impl MessagePayload for Thumbnail {}

/// XEP-0446: File metadata element
#[derive(Debug, PartialEq, Clone, Default)]
pub struct FileMetadata {
    pub media_type: Option<String>,
    pub name: Option<String>,
    pub size: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub desc: Option<String>,
    pub thumbnail: Option<Thumbnail>,
}

impl TryFrom<Element> for FileMetadata {
    type Error = ParseError;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("file", ns::FILE_METADATA)?;

        let mut metadata = FileMetadata::default();

        for child in value.children() {
            match child.name() {
                "media-type" => metadata.media_type = Some(child.text()),
                "name" => metadata.name = Some(child.text()),
                "size" => metadata.size = Some(child.text().parse()?),
                "width" => metadata.width = Some(child.text().parse()?),
                "height" => metadata.height = Some(child.text().parse()?),
                "desc" => metadata.desc = Some(child.text()),
                "thumbnail" if child.has_ns(ns::THUMBS) => {
                    metadata.thumbnail = Some(Thumbnail::try_from(child.clone())?)
                }
                _ => (),
            }
        }

        Ok(metadata)
    }
}

impl From<FileMetadata> for Element {
    fn from(value: FileMetadata) -> Self {
        let child = |name: &str, text: String| {
            Element::builder(name, ns::FILE_METADATA).append(text).build()
        };

        Element::builder("file", ns::FILE_METADATA)
            .append_all(
                value
                    .media_type
                    .map(|media_type| child("media-type", media_type)),
            )
            .append_all(value.name.map(|name| child("name", name)))
            .append_all(value.size.map(|size| child("size", size.to_string())))
            .append_all(value.width.map(|width| child("width", width.to_string())))
            .append_all(
                value
                    .height
                    .map(|height| child("height", height.to_string())),
            )
            .append_all(value.desc.map(|desc| child("desc", desc)))
            .append_all(value.thumbnail.map(Element::from))
            .build()
    }
}

impl MessagePayload for FileMetadata {}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_parses_file_metadata_with_thumbnail() -> Result<(), ParseError> {
        let element = Element::from_str(
            r#"<file xmlns="urn:xmpp:file:metadata:0">
                <media-type>image/png</media-type>
                <name>screenshot.png</name>
                <size>48392</size>
                <width>1024</width>
                <height>768</height>
                <thumbnail xmlns="urn:xmpp:thumbs:1" uri="cid:sha1+abc@bob.xmpp.org" media-type="image/png" width="128" height="96"/>
            </file>"#,
        )
        .unwrap();

        let metadata = FileMetadata::try_from(element)?;
        assert_eq!(metadata.media_type.as_deref(), Some("image/png"));
        assert_eq!(metadata.name.as_deref(), Some("screenshot.png"));
        assert_eq!(metadata.size, Some(48392));
        assert_eq!(
            metadata.thumbnail,
            Some(Thumbnail {
                uri: "cid:sha1+abc@bob.xmpp.org".to_string(),
                media_type: Some("image/png".to_string()),
                width: Some(128),
                height: Some(96),
            })
        );

        Ok(())
    }
}
