// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::future::Future;
use std::time::Duration;

use jid::BareJid;
use tracing::error;
use xmpp_parsers::data_forms::{DataForm, DataFormType, Field};
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::mam::{Fin, QueryId, Result_};
use xmpp_parsers::rsm::SetQuery;

use crate::client::ModuleContext;
use crate::mods::Module;
use crate::ns;
use crate::stanza::Message;
use crate::util::{ElementReducerPoll, RequestError, RequestFuture, XmppElement};

const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// XEP-0313: Message Archive Management
#[derive(Default, Clone)]
pub struct Mam {
    ctx: ModuleContext,
}

impl Module for Mam {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }
}

/// One message out of the archive, already unwrapped from its
/// `<forwarded/>` envelope. The `delay` on the message is the archive
/// timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedMessage {
    /// The archive id (stanza-id) under which the server stored it.
    pub id: String,
    pub message: Message,
}

impl Mam {
    /// Pages through a 1:1 conversation's archive. Backward pages pass
    /// `before`, forward catch-ups pass `after`. With neither, the
    /// server returns the newest page.
    pub fn query_chat<'a>(
        &self,
        with: &BareJid,
        before: impl Into<Option<&'a str>>,
        after: impl Into<Option<&'a str>>,
        max_count: impl Into<Option<usize>>,
    ) -> impl Future<Output = Result<(Vec<ArchivedMessage>, Fin), RequestError>> {
        let query_id = QueryId(self.ctx.generate_id());
        let id = self.ctx.generate_id();

        let iq = Iq::from_set(
            id.clone(),
            xmpp_parsers::mam::Query {
                queryid: Some(query_id.clone()),
                node: None,
                form: Some(DataForm::new(
                    DataFormType::Submit,
                    ns::MAM,
                    vec![Field::text_single("with", &with.to_string())],
                )),
                set: Some(page(before.into(), after.into(), max_count.into())),
                flip_page: false,
            },
        );

        self.ctx.send_stanza_with_future(
            iq,
            RequestFuture::new_mam_collector(id, query_id).with_timeout(QUERY_TIMEOUT),
        )
    }

    /// Pages through a room's archive. Rooms are addressed directly and
    /// take no `with` filter.
    pub fn query_room<'a>(
        &self,
        room: &BareJid,
        before: impl Into<Option<&'a str>>,
        after: impl Into<Option<&'a str>>,
        max_count: impl Into<Option<usize>>,
    ) -> impl Future<Output = Result<(Vec<ArchivedMessage>, Fin), RequestError>> {
        let query_id = QueryId(self.ctx.generate_id());
        let id = self.ctx.generate_id();

        let iq = Iq::from_set(
            id.clone(),
            xmpp_parsers::mam::Query {
                queryid: Some(query_id.clone()),
                node: None,
                form: None,
                set: Some(page(before.into(), after.into(), max_count.into())),
                flip_page: false,
            },
        )
        .with_to(room.clone().into());

        self.ctx.send_stanza_with_future(
            iq,
            RequestFuture::new_mam_collector(id, query_id).with_timeout(QUERY_TIMEOUT),
        )
    }
}

/// An unbounded `before` ("") requests the newest page when no cursor
/// is known.
fn page(before: Option<&str>, after: Option<&str>, max: Option<usize>) -> SetQuery {
    let mut before = before.map(str::to_string);
    let after = after.map(str::to_string);

    if before.is_none() && after.is_none() {
        before = Some("".to_string())
    }

    SetQuery {
        max,
        after,
        before,
        index: None,
    }
}

struct MamCollectorState {
    id: String,
    query_id: QueryId,
    fin: Option<Fin>,
    messages: Vec<ArchivedMessage>,
}

impl RequestFuture<MamCollectorState, (Vec<ArchivedMessage>, Fin)> {
    fn new_mam_collector(id: String, query_id: QueryId) -> Self {
        RequestFuture::new(
            format!("MAM {id}"),
            MamCollectorState {
                id,
                query_id,
                fin: None,
                messages: vec![],
            },
            |state, element| match element {
                XmppElement::Iq(iq) => {
                    if iq.id != state.id {
                        return Ok(ElementReducerPoll::Pending(Some(iq.into())));
                    }

                    if let IqType::Error(error) = iq.payload {
                        return Err(error.into());
                    }

                    let IqType::Result(Some(payload)) = iq.payload else {
                        return Ok(ElementReducerPoll::Pending(Some(iq.into())));
                    };

                    let fin = match Fin::try_from(payload) {
                        Ok(fin) => fin,
                        Err(err) => {
                            error!("Failed to parse MAM fin element. {err}");
                            return Err(RequestError::UnexpectedResponse);
                        }
                    };

                    state.fin = Some(fin);
                    Ok(ElementReducerPoll::Ready)
                }
                XmppElement::Message(message) => {
                    let Some(archived) = &message.archived_message else {
                        return Ok(ElementReducerPoll::Pending(Some(message.into())));
                    };

                    if archived.queryid.as_ref() != Some(&state.query_id) {
                        return Ok(ElementReducerPoll::Pending(Some(message.into())));
                    }

                    match unwrap_archived(archived) {
                        Ok(archived_message) => state.messages.push(archived_message),
                        Err(err) => {
                            // A malformed archive entry must not kill the
                            // whole page.
                            error!("Failed to parse archived message. {err}");
                        }
                    }
                    Ok(ElementReducerPoll::Pending(None))
                }
                XmppElement::Presence(_) | XmppElement::PubSubMessage(_) | XmppElement::Nonza(_) => {
                    Ok(ElementReducerPoll::Pending(Some(element)))
                }
            },
            |state| {
                (
                    state.messages,
                    state
                        .fin
                        .expect("Internal error. Missing fin in MamCollectorState."),
                )
            },
        )
    }
}

fn unwrap_archived(archived: &Result_) -> anyhow::Result<ArchivedMessage> {
    let mut message = Message::try_from(
        archived
            .forwarded
            .stanza
            .clone()
            .ok_or_else(|| anyhow::anyhow!("archived message is missing its forwarded stanza"))?,
    )?;
    if message.delay.is_none() {
        message.delay = archived.forwarded.delay.clone();
    }

    Ok(ArchivedMessage {
        id: archived.id.clone(),
        message,
    })
}
