// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use jid::BareJid;
use xmpp_parsers::data_forms::{DataForm, DataFormType, Field};
use xmpp_parsers::iq::{Iq, IqType};

use crate::client::ModuleContext;
use crate::mods::Module;
use crate::ns;
use crate::stanza::bookmark::ConferenceBookmark;
use crate::stanza::pubsub::query as pubsub_query;
use crate::util::RequestError;

/// XEP-0402: PEP Native Bookmarks. Change notifications arrive through
/// the PubSub module; this module owns the fetch/publish operations.
#[derive(Default, Clone)]
pub struct Bookmark {
    ctx: ModuleContext,
}

impl Module for Bookmark {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }
}

impl Bookmark {
    /// Loads all bookmarks from the account's PEP node. An absent node
    /// means "no bookmarks yet".
    pub async fn load_bookmarks(&self) -> Result<Vec<ConferenceBookmark>, RequestError> {
        let response = self
            .ctx
            .send_iq(Iq {
                from: None,
                to: None,
                id: self.ctx.generate_id(),
                payload: IqType::Get(pubsub_query::items(ns::BOOKMARKS2, &[], None)),
            })
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) if err.is_item_not_found_err() => return Ok(vec![]),
            Err(err) => return Err(err),
        };

        let Some(response) = response else {
            return Ok(vec![]);
        };

        let items = pubsub_query::parse_items_response(response)?;
        let mut bookmarks = Vec::with_capacity(items.len());

        for item in items {
            let (Some(id), Some(payload)) = (item.id, item.payload) else {
                continue;
            };
            let Ok(jid) = id.parse::<BareJid>() else {
                continue;
            };
            let conference = xmpp_parsers::bookmarks2::Conference::try_from(payload)
                .map_err(|err| RequestError::Generic {
                    msg: err.to_string(),
                })?;
            bookmarks.push(ConferenceBookmark::from_conference(jid, conference));
        }

        Ok(bookmarks)
    }

    /// Saves (or overwrites) one bookmark. The item id is the room JID.
    pub async fn publish_bookmark(
        &self,
        bookmark: ConferenceBookmark,
    ) -> Result<(), RequestError> {
        let jid = bookmark.jid.clone();
        let payload = pubsub_query::publish(
            ns::BOOKMARKS2,
            Some(&jid.to_string()),
            bookmark.into_conference().into(),
            Some(publish_options()),
        );

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

    pub async fn retract_bookmark(&self, jid: &BareJid) -> Result<(), RequestError> {
        self.ctx
            .send_iq(Iq {
                from: None,
                to: None,
                id: self.ctx.generate_id(),
                payload: IqType::Set(pubsub_query::retract(
                    ns::BOOKMARKS2,
                    &jid.to_string(),
                    true,
                )),
            })
            .await?;
        Ok(())
    }
}

/// XEP-0402 mandates whitelist access and per-item persistence so the
/// bookmark list survives and stays private.
fn publish_options() -> DataForm {
    DataForm::new(
        DataFormType::Submit,
        ns::PUBSUB_PUBLISH_OPTIONS,
        vec![
            Field::text_single("pubsub#persist_items", "true"),
            Field::text_single("pubsub#max_items", "max"),
            Field::text_single("pubsub#send_last_published_item", "never"),
            Field::text_single("pubsub#access_model", "whitelist"),
        ],
    )
}
