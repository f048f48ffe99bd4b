// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use client::{Client, ClientBuilder, SmPhase, SmState};
pub use connector::{
    Connection, ConnectionError, Connector, Endpoint, EndpointResolver,
};
pub use deps::{IDProvider, SystemTimeProvider, TimeProvider, UUIDProvider};
pub use event::Event;
pub use stanza::ns;
pub use util::{parse_bool, ElementExt, ParseError, RequestError, XmppElement};

pub mod client;
pub mod connector;
mod deps;
mod event;
pub mod mods;
pub mod stanza;
#[macro_use]
mod util;

#[cfg(feature = "test")]
pub mod test;

/// Convenience macros for tests and examples.
#[macro_export]
macro_rules! jid {
    ($jid:expr) => {
        $jid.parse::<jid::Jid>().unwrap()
    };
}

#[macro_export]
macro_rules! bare {
    ($jid:expr) => {
        $jid.parse::<jid::BareJid>().unwrap()
    };
}

#[macro_export]
macro_rules! full {
    ($jid:expr) => {
        $jid.parse::<jid::FullJid>().unwrap()
    };
}
