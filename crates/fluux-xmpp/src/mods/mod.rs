// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::any::Any;

use anyhow::Result;
use jid::Jid;
use xmpp_parsers::iq::Iq;
use xmpp_parsers::presence::Presence;
use xmpp_parsers::pubsub::event::PubSubEvent;

pub use admin::Admin;
pub use blocking::Blocking;
pub use bookmark::Bookmark;
pub use caps::Caps;
pub use chat::Chat;
pub use disco::Disco;
pub use http_upload::HttpUpload;
pub use mam::Mam;
pub use muc::Muc;
pub use ping::Ping;
pub use profile::Profile;
pub use pubsub::PubSub;
pub use roster::Roster;

use crate::client::ModuleContext;
use crate::stanza::{Message, PubSubMessage};
use crate::util::XmppElement;

pub mod admin;
pub mod blocking;
pub mod bookmark;
pub mod caps;
pub mod chat;
pub mod disco;
pub mod http_upload;
pub mod mam;
pub mod muc;
pub mod ping;
pub mod profile;
pub mod pubsub;
pub mod roster;

/// Outcome of offering an element to a module. `Claimed` stops the
/// dispatch chain; observers return `Pass` so later modules still see
/// the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Claimed,
    Pass,
}

pub trait Module: Any + Send + Sync {
    fn register_with(&mut self, context: ModuleContext);

    fn handle_connect(&self) -> Result<()> {
        Ok(())
    }

    fn handle_element(&self, element: &XmppElement) -> Result<Dispatch> {
        match element {
            XmppElement::Presence(ref p) => self.handle_presence_stanza(p),
            XmppElement::Message(ref m) => self.handle_message_stanza(m),
            XmppElement::Iq(ref i) => self.handle_iq_stanza(i),
            XmppElement::PubSubMessage(ref m) => self.handle_pubsub_message(m),
            XmppElement::Nonza(_) => Ok(Dispatch::Pass),
        }
    }

    fn handle_pubsub_message(&self, pubsub: &PubSubMessage) -> Result<Dispatch> {
        for event in pubsub.events.iter() {
            self.handle_pubsub_event(&pubsub.from, event)?;
        }
        Ok(Dispatch::Pass)
    }

    fn handle_presence_stanza(&self, _stanza: &Presence) -> Result<Dispatch> {
        Ok(Dispatch::Pass)
    }
    fn handle_message_stanza(&self, _stanza: &Message) -> Result<Dispatch> {
        Ok(Dispatch::Pass)
    }
    fn handle_iq_stanza(&self, _stanza: &Iq) -> Result<Dispatch> {
        Ok(Dispatch::Pass)
    }
    fn handle_pubsub_event(&self, _from: &Jid, _event: &PubSubEvent) -> Result<()> {
        Ok(())
    }
}

pub trait AnyModule: Module {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Module> AnyModule for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
