// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as Base64;
use base64::Engine;
use jid::{BareJid, Jid};
use sha1::{Digest, Sha1};
use xmpp_parsers::iq::{Iq, IqType};

use crate::client::ModuleContext;
use crate::mods::Module;
use crate::ns;
use crate::stanza::avatar::{self, ImageId};
use crate::stanza::pubsub::query as pubsub_query;
use crate::stanza::vcard::{VCard, VCardRequest};
use crate::util::RequestError;

/// Own-profile publication (XEP-0084 avatar, XEP-0172 nickname) and
/// vCard (XEP-0054/0153) retrieval for contact, occupant and room
/// avatars.
#[derive(Default, Clone)]
pub struct Profile {
    ctx: ModuleContext,
}

impl Module for Profile {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }
}

impl Profile {
    /// Publishes an avatar: first the data node, then the metadata node
    /// which notifies subscribers. Returns the image id (SHA-1 of the
    /// bytes).
    pub async fn publish_avatar(
        &self,
        image_data: &[u8],
        media_type: &str,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<ImageId, RequestError> {
        let id = ImageId::from(hex_digest(image_data));

        let data_payload = avatar::Data {
            base64: Base64.encode(image_data),
        };
        self.send_pubsub_set(pubsub_query::publish(
            ns::AVATAR_DATA,
            Some(id.as_ref()),
            data_payload.into(),
            None,
        ))
        .await?;

        let metadata = avatar::Metadata {
            infos: vec![avatar::Info {
                id: id.clone(),
                media_type: media_type.to_string(),
                bytes: image_data.len() as u32,
                width,
                height,
                url: None,
            }],
        };
        self.send_pubsub_set(pubsub_query::publish(
            ns::AVATAR_METADATA,
            Some(id.as_ref()),
            metadata.into(),
            None,
        ))
        .await?;

        Ok(id)
    }

    /// Loads the avatar bytes a contact advertised in their metadata.
    pub async fn load_avatar_data(
        &self,
        from: &BareJid,
        id: &ImageId,
    ) -> Result<Option<Vec<u8>>, RequestError> {
        let response = self
            .ctx
            .send_iq(Iq {
                from: None,
                to: Some(Jid::from(from.clone())),
                id: self.ctx.generate_id(),
                payload: IqType::Get(pubsub_query::items(ns::AVATAR_DATA, &[id.as_ref()], None)),
            })
            .await?
            .ok_or(RequestError::UnexpectedResponse)?;

        let items = pubsub_query::parse_items_response(response)?;
        let Some(payload) = items.into_iter().find_map(|item| item.payload) else {
            return Ok(None);
        };

        let data = avatar::Data::try_from(payload)?;
        let bytes = Base64
            .decode(&data.base64)
            .map_err(|err| RequestError::Generic {
                msg: format!("Invalid base64 in avatar data: {err}"),
            })?;
        Ok(Some(bytes))
    }

    /// XEP-0172: publishes the user nickname.
    pub async fn publish_nickname(&self, nickname: &str) -> Result<(), RequestError> {
        let payload = minidom::Element::builder("nick", ns::NICK)
            .append(nickname)
            .build();
        self.send_pubsub_set(pubsub_query::publish(ns::NICK, None, payload, None))
            .await
    }

    /// Fetches a vCard, used as avatar fallback for contacts and for
    /// MUC room/occupant avatars.
    pub async fn load_vcard(&self, from: impl Into<Jid>) -> Result<Option<VCard>, RequestError> {
        let response = self
            .ctx
            .send_iq(
                Iq::from_get(self.ctx.generate_id(), VCardRequest).with_to(from.into()),
            )
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) if err.is_item_not_found_err() => return Ok(None),
            Err(err) => return Err(err),
        };

        let Some(response) = response else {
            return Ok(None);
        };

        Ok(Some(VCard::try_from(response)?))
    }

    async fn send_pubsub_set(&self, payload: minidom::Element) -> Result<(), RequestError> {
        self.ctx
            .send_iq(Iq {
                from: None,
                to: None,
                id: self.ctx.generate_id(),
                payload: IqType::Set(payload),
            })
            .await?;
        Ok(())
    }
}

fn hex_digest(data: &[u8]) -> String {
    let digest = Sha1::digest(data);
    digest
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>()
}
