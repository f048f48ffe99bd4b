// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use jid::{BareJid, DomainPart, FullJid, Jid, NodePart, ResourcePart};
use minidom::Element;
use parking_lot::{Mutex, RwLock};
use xmpp_parsers::iq::Iq;

use crate::client::builder::UndefinedConnector;
use crate::client::sm::SmTracker;
use crate::client::{ConnectorProvider, EventHandler, ModuleLookup};
use crate::connector::{Connection, PinnedFuture};
use crate::deps::{IDProvider, SystemTimeProvider, TimeProvider, UUIDProvider};
use crate::util::{ModuleFutureState, RequestError, RequestFuture};
use crate::Event;

/// The capability handle every module receives. Modules never see the
/// client; everything they may do goes through here.
#[derive(Clone)]
pub struct ModuleContext {
    pub(super) inner: Arc<ModuleContextInner>,
}

impl ModuleContext {
    pub(crate) fn send_iq(
        &self,
        iq: Iq,
    ) -> impl Future<Output = Result<Option<Element>, RequestError>> {
        let future = RequestFuture::new_iq_request(iq.id.clone());
        self.send_stanza_with_future(iq, future)
    }

    pub(crate) fn send_iq_with_timeout(
        &self,
        iq: Iq,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<Element>, RequestError>> {
        let future = RequestFuture::new_iq_request(iq.id.clone()).with_timeout(timeout);
        self.send_stanza_with_future(iq, future)
    }

    pub(crate) fn send_stanza_with_future<T: Send + 'static, U: 'static>(
        &self,
        stanza: impl Into<Element>,
        future: RequestFuture<T, U>,
    ) -> impl Future<Output = Result<U, RequestError>> {
        self.inner.mod_futures.lock().push(ModFutureStateEntry {
            state: future.state.clone(),
            deadline: SystemTime::from(self.inner.time_provider.now()) + future.timeout,
        });

        if let Err(err) = self.send_stanza(stanza) {
            return RequestFuture::failed(RequestError::Generic {
                msg: err.to_string(),
            });
        }

        future
    }

    pub(crate) fn send_stanza(&self, stanza: impl Into<Element>) -> Result<()> {
        self.inner.send_stanza(stanza.into())
    }

    pub(crate) fn full_jid(&self) -> FullJid {
        self.inner
            .jid
            .read()
            .as_ref()
            .cloned()
            .unwrap_or(FullJid::from_parts(
                Some(&NodePart::new("placeholder").unwrap()),
                &DomainPart::new("fluux.io").unwrap(),
                &ResourcePart::new("lib").unwrap(),
            ))
    }

    pub(crate) fn bare_jid(&self) -> BareJid {
        self.full_jid().to_bare()
    }

    pub(crate) fn server_jid(&self) -> BareJid {
        BareJid::from_parts(None, &self.full_jid().domain())
    }

    pub(crate) fn generate_id(&self) -> String {
        self.inner.id_provider.new_id()
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.inner.time_provider.now()
    }

    pub(crate) fn schedule_event(&self, event: Event) {
        self.inner.clone().schedule_event(event)
    }

    #[allow(dead_code)]
    pub(crate) fn disconnect(&self) {
        self.inner.disconnect();
    }
}

pub struct ModuleContextInner {
    pub jid: RwLock<Option<FullJid>>,
    pub connector_provider: ConnectorProvider,
    pub connection: RwLock<Option<Box<dyn Connection>>>,
    pub event_handler: EventHandler,
    pub mods: Weak<ModuleLookup>,
    pub mod_futures: Mutex<Vec<ModFutureStateEntry>>,
    pub sm: Mutex<SmTracker>,
    pub id_provider: Box<dyn IDProvider>,
    pub time_provider: Box<dyn TimeProvider>,
}

impl ModuleContextInner {
    /// Sends a stanza, tracking it for XEP-0198 replay.
    pub(crate) fn send_stanza(&self, stanza: Element) -> Result<()> {
        self.sm.lock().track_outbound(&stanza);
        self.send_raw(stanza)
    }

    /// Sends an element without touching the outbound SM queue. Nonzas
    /// and replayed stanzas go through here.
    pub(crate) fn send_raw(&self, element: Element) -> Result<()> {
        let Some(conn) = &*self.connection.read() else {
            return Ok(());
        };
        conn.send_stanza(element)
    }

    #[cfg(not(feature = "test"))]
    pub(crate) fn schedule_event(self: Arc<Self>, event: Event) {
        let fut = (self.event_handler)(self.clone().try_into().unwrap(), event);
        tokio::spawn(fut);
    }

    #[cfg(feature = "test")]
    pub(crate) fn schedule_event(self: Arc<Self>, event: Event) {
        tokio::task::block_in_place(move || {
            let fut = (self.event_handler)(self.clone().try_into().unwrap(), event);
            tokio::runtime::Handle::current().block_on(async move { fut.await });
        });
    }

    pub(crate) fn disconnect(&self) {
        if let Some(conn) = self.connection.write().take() {
            conn.disconnect()
        }
    }
}

pub struct ModFutureStateEntry {
    pub state: Arc<Mutex<dyn ModuleFutureState>>,
    pub deadline: SystemTime,
}

impl Default for ModuleContext {
    fn default() -> Self {
        ModuleContext {
            inner: Arc::new(ModuleContextInner {
                connector_provider: Box::new(|| Box::new(UndefinedConnector {})),
                jid: RwLock::new(None),
                connection: Default::default(),
                event_handler: Box::new(|_, _| Box::pin(async {}) as PinnedFuture<_>),
                mods: Default::default(),
                mod_futures: Default::default(),
                sm: Default::default(),
                id_provider: Box::new(UUIDProvider::new()),
                time_provider: Box::new(SystemTimeProvider::default()),
            }),
        }
    }
}
