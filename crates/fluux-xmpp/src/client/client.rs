// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::any::TypeId;
use std::fmt::{Debug, Formatter};
use std::mem;
use std::sync::Arc;
use std::task::Waker;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use jid::FullJid;
use minidom::Element;
use secrecy::SecretString;
use tracing::{error, warn};
use xmpp_parsers::sm::{Enable, Nonza};

use crate::client::builder::ClientBuilder;
use crate::client::module_context::ModuleContextInner;
use crate::client::sm::{SmAction, SmState};
use crate::client::{Event, ModuleContext, ModuleLookup};
use crate::connector::{ConnectionError, ConnectionEvent};
use crate::mods::{AnyModule, Dispatch};
use crate::util::{ElementReducerPoll, ModuleFuturePoll, RequestFuture, XmppElement};
use crate::Event as ClientEvent;
use crate::{mods, RequestError};

#[derive(Clone)]
pub struct Client {
    pub(super) inner: Arc<ClientInner>,
}

impl Debug for Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish()
    }
}

const SM_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub async fn connect(
        &self,
        jid: &FullJid,
        password: SecretString,
    ) -> Result<(), ConnectionError> {
        self.inner.clone().connect(jid, password).await
    }

    pub fn disconnect(&self) {
        self.inner.disconnect()
    }

    pub fn connected_jid(&self) -> Option<FullJid> {
        self.inner.context.jid.read().clone()
    }

    pub fn get_mod<M: AnyModule + Clone>(&self) -> M {
        self.inner.get_mod()
    }

    pub fn send_raw_stanza(&self, stanza: impl Into<Element>) -> Result<()> {
        self.inner.context.send_stanza(stanza.into())
    }

    /// Negotiates XEP-0198 on a freshly bound stream.
    pub async fn enable_sm(&self) -> Result<SmState, RequestError> {
        self.inner.context.sm.lock().begin_enable();

        let context = ModuleContext {
            inner: self.inner.context.clone(),
        };
        let enable: Element = Nonza::Enable(Enable::new().with_resume()).into();
        let enabled = context
            .send_stanza_with_future(
                enable,
                RequestFuture::new_sm_handshake("SM enable").with_timeout(SM_HANDSHAKE_TIMEOUT),
            )
            .await?;

        match enabled {
            SmHandshake::Enabled(state) => Ok(state),
            SmHandshake::Resumed { .. } => Err(RequestError::UnexpectedResponse),
        }
    }

    /// Attempts to resume a previous XEP-0198 session. On success the
    /// server replays everything it never acked; the tracker resends our
    /// own unacked queue.
    pub async fn resume_sm(&self, state: SmState) -> Result<u32, RequestError> {
        self.inner.context.sm.lock().begin_resume(&state);

        let context = ModuleContext {
            inner: self.inner.context.clone(),
        };
        let resume: Element = state.resume_nonza().into();
        let result = context
            .send_stanza_with_future(
                resume,
                RequestFuture::new_sm_handshake("SM resume").with_timeout(SM_HANDSHAKE_TIMEOUT),
            )
            .await?;

        match result {
            SmHandshake::Resumed { handled_by_server } => Ok(handled_by_server),
            SmHandshake::Enabled(_) => Err(RequestError::UnexpectedResponse),
        }
    }

    /// Snapshot of the current SM session for persistence. Cheap and
    /// synchronous so it can run from an unload handler.
    pub fn sm_state(&self) -> Option<SmState> {
        self.inner.context.sm.lock().state()
    }
}

pub(super) struct ClientInner {
    pub context: Arc<ModuleContextInner>,
    pub mods: Arc<ModuleLookup>,
}

impl ClientInner {
    async fn connect(
        self: Arc<Self>,
        jid: &FullJid,
        password: SecretString,
    ) -> Result<(), ConnectionError> {
        self.disconnect();

        *self.context.jid.write() = Some(jid.clone());

        let inner = self.clone();

        let connection = (self.context.connector_provider)()
            .connect(
                jid,
                password,
                Box::new(move |_, event| {
                    let inner = inner.clone();

                    Box::pin(async move { inner.handle_event(event).await })
                }),
            )
            .await?;

        self.context.connection.write().replace(connection);

        for (_, m) in self.mods.iter() {
            if let Err(err) = m.read().handle_connect() {
                error!("Module failed to handle connect: {err}");
            }
        }

        self.context
            .clone()
            .schedule_event(ClientEvent::Client(Event::Connected));

        Ok(())
    }

    fn disconnect(&self) {
        Self::cancel_pending_futures(&self.context);
        self.context.sm.lock().reset();
        self.context.disconnect()
    }

    fn get_mod<M: AnyModule + Clone>(&self) -> M {
        let Some(entry) = self.mods.iter().find(|(k, _)| k == &TypeId::of::<M>()) else {
            panic!("Could not find requested module.")
        };
        entry.1.read().as_any().downcast_ref::<M>().unwrap().clone()
    }

    async fn handle_event(self: Arc<Self>, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Disconnected { error } => {
                Self::cancel_pending_futures(&self.context);
                self.context
                    .clone()
                    .schedule_event(ClientEvent::Client(Event::Disconnected { error }))
            }
            ConnectionEvent::Stanza(stanza) => {
                Self::handle_stanza(&self.context, &self.mods, stanza)
            }
            ConnectionEvent::TimeoutTimer => Self::purge_expired_futures(&self.context),
            ConnectionEvent::PingTimer => {
                let ping = self.get_mod::<mods::Ping>();
                if let Err(err) = ping.send_ping_to_server().await {
                    warn!("Failed to send ping. {err}");
                }
                self.context
                    .clone()
                    .schedule_event(ClientEvent::Client(Event::PingTimer));
            }
        }
    }

    fn handle_stanza(ctx: &Arc<ModuleContextInner>, mods: &ModuleLookup, stanza: Element) {
        ctx.clone()
            .schedule_event(ClientEvent::Client(Event::IncomingStanza(stanza.clone())));

        let element = match XmppElement::try_from_element(stanza) {
            Ok(None) => return,
            Ok(Some(elem)) => elem,
            Err(err) => {
                error!("Failed to parse stanza. {err}");
                return;
            }
        };

        // XEP-0198 bookkeeping happens before anything can observe the
        // element: the tracker either counts the stanza or consumes the
        // nonza's side effects (acks, replay).
        match &element {
            XmppElement::Nonza(nonza) => {
                let actions = ctx.sm.lock().process_nonza(nonza);
                for action in actions {
                    match action {
                        SmAction::SendAck(a) => {
                            if let Err(err) = ctx.send_raw(Nonza::Ack(a).into()) {
                                error!("Failed to answer ack request: {err}");
                            }
                        }
                        SmAction::Replay(stanzas) => {
                            for stanza in stanzas {
                                if let Err(err) = ctx.send_raw(stanza) {
                                    error!("Failed to replay stanza: {err}");
                                }
                            }
                        }
                    }
                }
            }
            element if element.counts_towards_sm() => {
                ctx.sm.lock().mark_inbound_handled();
            }
            _ => {}
        }

        // Archive collectors, IQ correlation and handshakes come before
        // the module chain.
        let Some(element) = Self::visit_futures_with_element(ctx, element) else {
            return;
        };

        // Nonzas never reach the modules.
        if matches!(element, XmppElement::Nonza(_)) {
            return;
        }

        for (_, m) in mods.iter() {
            match m.read().handle_element(&element) {
                Ok(Dispatch::Claimed) => break,
                Ok(Dispatch::Pass) => (),
                Err(err) => error!("Module failed to handle element: {err}"),
            }
        }
    }

    fn visit_futures_with_element(
        ctx: &ModuleContextInner,
        mut element: XmppElement,
    ) -> Option<XmppElement> {
        let mut idx = 0;
        let mut pending_futures = ctx.mod_futures.lock();

        while idx < pending_futures.len() {
            let poll = pending_futures[idx].state.lock().handle_element(element);

            match poll {
                ModuleFuturePoll::Pending(Some(e)) => {
                    idx += 1;
                    element = e;
                }
                ModuleFuturePoll::Pending(None) => return None,
                ModuleFuturePoll::Ready(waker) => {
                    pending_futures.remove(idx);

                    if let Some(waker) = waker {
                        waker.wake()
                    }

                    return None;
                }
            }
        }

        Some(element)
    }

    fn purge_expired_futures(ctx: &ModuleContextInner) {
        let mut pending_futures = ctx.mod_futures.lock();

        let now: SystemTime = ctx.time_provider.now().into();
        let mut wakers = Vec::<Waker>::new();
        let mut idx = 0;

        while idx < pending_futures.len() {
            if now < pending_futures[idx].deadline {
                idx += 1
            } else {
                if let Some(waker) = pending_futures[idx].state.lock().fail_with_timeout() {
                    wakers.push(waker);
                }
                pending_futures.remove(idx);
            }
        }
        drop(pending_futures);

        for waker in wakers {
            waker.wake()
        }
    }

    fn cancel_pending_futures(ctx: &ModuleContextInner) {
        let pending_futures = {
            let mut guard = ctx.mod_futures.lock();
            mem::take(&mut *guard)
        };

        for fut in pending_futures {
            if let Some(waker) = fut.state.lock().fail_with_disconnect() {
                waker.wake()
            }
        }
    }
}

/// Result of an SM handshake round-trip.
enum SmHandshake {
    Enabled(SmState),
    Resumed { handled_by_server: u32 },
}

impl RequestFuture<Option<SmHandshake>, SmHandshake> {
    fn new_sm_handshake(identifier: &str) -> Self {
        RequestFuture::new(
            identifier,
            None,
            |state, element| {
                let XmppElement::Nonza(nonza) = &element else {
                    return Ok(ElementReducerPoll::Pending(Some(element)));
                };

                match nonza {
                    Nonza::Enabled(enabled) => {
                        let Some(id) = &enabled.id else {
                            return Err(RequestError::Generic {
                                msg: "Server enabled stream management without resumption"
                                    .to_string(),
                            });
                        };
                        *state = Some(SmHandshake::Enabled(SmState {
                            id: id.0.clone(),
                            inbound: 0,
                        }));
                        return Ok(ElementReducerPoll::Ready);
                    }
                    Nonza::Resumed(resumed) => {
                        *state = Some(SmHandshake::Resumed {
                            handled_by_server: resumed.h,
                        });
                        return Ok(ElementReducerPoll::Ready);
                    }
                    Nonza::Failed(failed) => {
                        return Err(RequestError::Generic {
                            msg: format!(
                                "Stream management negotiation failed: {:?}",
                                failed.error
                            ),
                        })
                    }
                    _ => (),
                }

                Ok(ElementReducerPoll::Pending(Some(element)))
            },
            |state| state.expect("Missing result in SM handshake"),
        )
    }
}

impl TryFrom<Arc<ModuleContextInner>> for Client {
    type Error = anyhow::Error;

    fn try_from(value: Arc<ModuleContextInner>) -> std::result::Result<Self, Self::Error> {
        let mods = value.mods.upgrade().ok_or(anyhow::format_err!(
            "Used module after client was released."
        ))?;

        Ok(Client {
            inner: Arc::new(ClientInner {
                context: value,
                mods,
            }),
        })
    }
}
