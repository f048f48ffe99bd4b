// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::any::TypeId;

use minidom::Element;
use parking_lot::RwLock;

pub use builder::ClientBuilder;
#[allow(clippy::module_inception)]
pub(crate) mod client;
pub use client::Client;
pub use module_context::ModuleContext;
pub(crate) use module_context::ModuleContextInner;
pub use sm::{SmPhase, SmState};

use crate::connector::{ConnectionError, Connector, PinnedFuture};
use crate::mods::AnyModule;

pub(crate) mod builder;
mod module_context;
pub(crate) mod sm;

pub(crate) type ModuleLookup = Vec<(TypeId, RwLock<Box<dyn AnyModule>>)>;

pub type ConnectorProvider = Box<dyn Fn() -> Box<dyn Connector> + Send + Sync>;
pub type EventHandler = Box<dyn Fn(Client, crate::Event) -> PinnedFuture<()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected,
    Disconnected { error: Option<ConnectionError> },
    /// Every inbound stanza, before any module interprets it. For
    /// advanced observers; regular consumers use the typed events.
    IncomingStanza(Element),
    PingTimer,
}
