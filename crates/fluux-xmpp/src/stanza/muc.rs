// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::{BareJid, Jid};
use minidom::Element;
use xmpp_parsers::message::MessagePayload;

use crate::ns;
use crate::util::{ElementExt, ParseError};

/// XEP-0249: Direct MUC Invitations
#[derive(Debug, PartialEq, Clone)]
pub struct DirectInvite {
    pub jid: BareJid,
    pub password: Option<String>,
    pub reason: Option<String>,
}

impl TryFrom<Element> for DirectInvite {
    type Error = ParseError;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("x", ns::DIRECT_MUC_INVITATIONS)?;
        Ok(DirectInvite {
            jid: value
                .attr_req("jid")?
                .parse()
                .map_err(ParseError::from)?,
            password: value.attr("password").map(str::to_string),
            reason: value.attr("reason").map(str::to_string),
        })
    }
}

impl From<DirectInvite> for Element {
    fn from(value: DirectInvite) -> Self {
        Element::builder("x", ns::DIRECT_MUC_INVITATIONS)
            .attr("jid", value.jid)
            .attr("password", value.password)
            .attr("reason", value.reason)
            .build()
    }
}

impl MessagePayload for DirectInvite {}

/// Mediated invite carried in a `muc#user` payload.
/// https://xmpp.org/extensions/xep-0045.html#invite-mediated
#[derive(Debug, PartialEq, Clone, Default)]
pub struct MediatedInvite {
    pub invites: Vec<Invite>,
    pub password: Option<String>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Invite {
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    pub reason: Option<String>,
}

impl TryFrom<Element> for MediatedInvite {
    type Error = ParseError;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("x", ns::MUC_USER)?;

        let mut invite = MediatedInvite::default();

        for child in value.children() {
            match child.name() {
                "invite" => invite.invites.push(Invite {
                    from: child
                        .attr("from")
                        .map(|from| from.parse())
                        .transpose()
                        .map_err(ParseError::from)?,
                    to: child
                        .attr("to")
                        .map(|to| to.parse())
                        .transpose()
                        .map_err(ParseError::from)?,
                    reason: child
                        .get_child("reason", ns::MUC_USER)
                        .map(|reason| reason.text()),
                }),
                "password" => invite.password = Some(child.text()),
                _ => (),
            }
        }

        Ok(invite)
    }
}

impl From<MediatedInvite> for Element {
    fn from(value: MediatedInvite) -> Self {
        Element::builder("x", ns::MUC_USER)
            .append_all(value.invites.into_iter().map(|invite| {
                Element::builder("invite", ns::MUC_USER)
                    .attr("from", invite.from)
                    .attr("to", invite.to)
                    .append_all(
                        invite
                            .reason
                            .map(|reason| Element::builder("reason", ns::MUC_USER).append(reason)),
                    )
                    .build()
            }))
            .append_all(
                value
                    .password
                    .map(|password| Element::builder("password", ns::MUC_USER).append(password)),
            )
            .build()
    }
}

impl MessagePayload for MediatedInvite {}
