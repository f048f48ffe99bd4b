// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::Element;
use xmpp_parsers::iq::{IqGetPayload, IqResultPayload};

use crate::ns;
use crate::util::{ElementExt, ParseError};

/// The slice of vcard-temp (XEP-0054) this library consumes: the photo
/// used by XEP-0153 avatar fallbacks, plus full name and nickname.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct VCard {
    pub full_name: Option<String>,
    pub nickname: Option<String>,
    pub photo: Option<Photo>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Photo {
    pub media_type: Option<String>,
    /// Base64-encoded image bytes, as carried on the wire.
    pub binval: String,
}

/// Empty `<vCard/>` request payload.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct VCardRequest;

impl TryFrom<Element> for VCard {
    type Error = ParseError;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("vCard", ns::VCARD)?;

        let mut vcard = VCard::default();

        for child in value.children() {
            match child.name() {
                "FN" => vcard.full_name = Some(child.text()),
                "NICKNAME" => vcard.nickname = Some(child.text()),
                "PHOTO" => {
                    let Some(binval) = child.get_child("BINVAL", ns::VCARD) else {
                        continue;
                    };
                    vcard.photo = Some(Photo {
                        media_type: child
                            .get_child("TYPE", ns::VCARD)
                            .map(|media_type| media_type.text()),
                        binval: binval.text().split_whitespace().collect(),
                    });
                }
                _ => (),
            }
        }

        Ok(vcard)
    }
}

impl From<VCard> for Element {
    fn from(value: VCard) -> Self {
        Element::builder("vCard", ns::VCARD)
            .append_all(
                value
                    .full_name
                    .map(|full_name| Element::builder("FN", ns::VCARD).append(full_name)),
            )
            .append_all(
                value
                    .nickname
                    .map(|nickname| Element::builder("NICKNAME", ns::VCARD).append(nickname)),
            )
            .append_all(value.photo.map(|photo| {
                Element::builder("PHOTO", ns::VCARD)
                    .append_all(
                        photo
                            .media_type
                            .map(|media_type| Element::builder("TYPE", ns::VCARD).append(media_type)),
                    )
                    .append(Element::builder("BINVAL", ns::VCARD).append(photo.binval).build())
            }))
            .build()
    }
}

impl From<VCardRequest> for Element {
    fn from(_value: VCardRequest) -> Self {
        Element::builder("vCard", ns::VCARD).build()
    }
}

impl TryFrom<Element> for VCardRequest {
    type Error = ParseError;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("vCard", ns::VCARD)?;
        Ok(VCardRequest)
    }
}

impl IqGetPayload for VCardRequest {}
impl IqResultPayload for VCard {}
