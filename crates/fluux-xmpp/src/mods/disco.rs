// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use jid::{BareJid, Jid};
use xmpp_parsers::disco::{DiscoInfoQuery, DiscoInfoResult, DiscoItemsQuery, DiscoItemsResult};
use xmpp_parsers::iq::Iq;

use crate::client::ModuleContext;
use crate::mods::Module;
use crate::ns;
use crate::util::RequestError;

/// XEP-0030: Service Discovery. Outbound queries only; answering
/// inbound disco#info requests is the Caps module's business.
#[derive(Default, Clone)]
pub struct Disco {
    ctx: ModuleContext,
}

/// What the rest of the stack needs to know about the server, derived
/// from disco#info on the account's domain and disco#items on its
/// components.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct ServerInfo {
    pub features: Vec<String>,
    pub supports_mam: bool,
    pub supports_carbons: bool,
    pub muc_service: Option<BareJid>,
    pub http_upload_service: Option<BareJid>,
}

impl Module for Disco {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }
}

impl Disco {
    pub async fn query_info(
        &self,
        to: impl Into<Jid>,
        node: Option<String>,
    ) -> Result<DiscoInfoResult, RequestError> {
        let response = self
            .ctx
            .send_iq(
                Iq::from_get(self.ctx.generate_id(), DiscoInfoQuery { node }).with_to(to.into()),
            )
            .await?
            .ok_or(RequestError::UnexpectedResponse)?;

        DiscoInfoResult::try_from(response).map_err(|err| RequestError::Generic {
            msg: err.to_string(),
        })
    }

    pub async fn query_items(
        &self,
        to: impl Into<Jid>,
        node: Option<String>,
    ) -> Result<DiscoItemsResult, RequestError> {
        let response = self
            .ctx
            .send_iq(
                Iq::from_get(
                    self.ctx.generate_id(),
                    DiscoItemsQuery { node, rsm: None },
                )
                .with_to(to.into()),
            )
            .await?
            .ok_or(RequestError::UnexpectedResponse)?;

        DiscoItemsResult::try_from(response).map_err(|err| RequestError::Generic {
            msg: err.to_string(),
        })
    }

    /// Discovers the server's own features plus the MUC and HTTP-upload
    /// components. A component that fails its info query is skipped, not
    /// fatal.
    pub async fn fetch_server_info(&self) -> Result<ServerInfo, RequestError> {
        let server_jid = self.ctx.server_jid();
        let info = self.query_info(server_jid.clone(), None).await?;

        let mut server_info = ServerInfo {
            features: info
                .features
                .iter()
                .map(|feature| feature.var.to_string())
                .collect(),
            supports_mam: info.features.iter().any(|f| f.var == ns::MAM),
            supports_carbons: info.features.iter().any(|f| f.var == ns::CARBONS),
            muc_service: None,
            http_upload_service: None,
        };

        let Ok(items) = self.query_items(server_jid, None).await else {
            return Ok(server_info);
        };

        for item in items.items {
            let component = item.jid.to_bare();
            let Ok(info) = self.query_info(component.clone(), None).await else {
                continue;
            };

            let is_muc = info
                .identities
                .iter()
                .any(|identity| identity.category == "conference" && identity.type_ == "text");
            if is_muc && server_info.muc_service.is_none() {
                server_info.muc_service = Some(component.clone());
            }

            if info.features.iter().any(|f| f.var == ns::HTTP_UPLOAD)
                && server_info.http_upload_service.is_none()
            {
                server_info.http_upload_service = Some(component);
            }
        }

        Ok(server_info)
    }
}
