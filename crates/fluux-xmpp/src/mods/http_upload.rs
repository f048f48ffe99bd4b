// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use jid::BareJid;
use xmpp_parsers::http_upload::{SlotRequest, SlotResult};
use xmpp_parsers::iq::Iq;

use crate::client::ModuleContext;
use crate::mods::Module;
use crate::util::RequestError;

/// XEP-0363: HTTP File Upload. Only the slot negotiation lives here;
/// the PUT itself is the caller's HTTP transport's business.
#[derive(Default, Clone)]
pub struct HttpUpload {
    ctx: ModuleContext,
}

impl Module for HttpUpload {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }
}

impl HttpUpload {
    pub async fn request_slot(
        &self,
        service: &BareJid,
        filename: &str,
        size: u64,
        content_type: Option<&str>,
    ) -> Result<SlotResult, RequestError> {
        let response = self
            .ctx
            .send_iq(
                Iq::from_get(
                    self.ctx.generate_id(),
                    SlotRequest {
                        filename: filename.to_string(),
                        size,
                        content_type: content_type.map(str::to_string),
                    },
                )
                .with_to(service.clone().into()),
            )
            .await?
            .ok_or(RequestError::UnexpectedResponse)?;

        SlotResult::try_from(response).map_err(|err| RequestError::Generic {
            msg: err.to_string(),
        })
    }
}
