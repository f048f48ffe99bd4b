// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use jid::Jid;
use xmpp_parsers::caps;
use xmpp_parsers::disco::{DiscoInfoQuery, DiscoInfoResult, Feature, Identity};
use xmpp_parsers::hashes::Algo;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::presence::Presence;

use crate::client::ModuleContext;
use crate::mods::{Dispatch, Module};
use crate::ns;

/// XEP-0115: Entity Capabilities. Holds our advertised identity and
/// feature set, answers disco#info queries for it, and stamps outgoing
/// presences with the verification hash.
#[derive(Default, Clone)]
pub struct Caps {
    ctx: ModuleContext,
}

/// The node URI identifying this client implementation.
pub const CAPS_NODE: &str = "https://fluux.io";

/// Features this library implements and advertises.
pub fn client_features() -> Vec<Feature> {
    [
        ns::DISCO_INFO,
        ns::CAPS,
        ns::CHATSTATES,
        ns::CARBONS,
        ns::SID,
        ns::MESSAGE_CORRECT,
        ns::REACTIONS,
        ns::RETRACT,
        ns::FALLBACK,
        ns::REPLY,
        ns::STYLING,
        ns::PING,
        ns::TIME,
    ]
    .into_iter()
    .map(Feature::new)
    .collect()
}

pub fn client_identity() -> Identity {
    Identity::new("client", "pc", "en", "Fluux")
}

/// Our own disco#info response payload.
pub fn client_disco_info(node: Option<String>) -> DiscoInfoResult {
    DiscoInfoResult {
        node,
        identities: vec![client_identity()],
        features: client_features(),
        extensions: vec![],
    }
}

/// The `<c/>` element to attach to presences.
pub fn client_caps() -> Result<caps::Caps> {
    let data = caps::compute_disco(&client_disco_info(None));
    let hash = caps::hash_caps(&data, Algo::Sha_1)
        .map_err(|msg| anyhow::format_err!("Failed to hash caps: {msg}"))?;
    Ok(caps::Caps::new(CAPS_NODE, hash))
}

impl Module for Caps {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn handle_iq_stanza(&self, stanza: &Iq) -> Result<Dispatch> {
        let IqType::Get(payload) = &stanza.payload else {
            return Ok(Dispatch::Pass);
        };

        if !payload.is("query", ns::DISCO_INFO) {
            return Ok(Dispatch::Pass);
        }

        let Some(from) = &stanza.from else {
            return Ok(Dispatch::Claimed);
        };

        let query = DiscoInfoQuery::try_from(payload.clone())?;
        self.send_disco_response(from.clone(), stanza.id.clone(), query.node)?;

        Ok(Dispatch::Claimed)
    }
}

impl Caps {
    fn send_disco_response(&self, to: Jid, id: String, node: Option<String>) -> Result<()> {
        self.ctx
            .send_stanza(Iq::from_result(id, Some(client_disco_info(node))).with_to(to))
    }

    /// Broadcasts a presence carrying only our caps. Used right after
    /// authentication, before the presence machine takes over.
    pub fn publish_capabilities(&self) -> Result<()> {
        let mut presence = Presence::new(xmpp_parsers::presence::Type::None);
        presence.add_payload(client_caps()?);
        self.ctx.send_stanza(presence)
    }
}
