// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use message::Message;
pub use pubsub::PubSubMessage;

pub mod adhoc;
pub mod avatar;
pub mod bookmark;
pub mod media;
pub mod message;
pub mod muc;
pub mod ns;
pub mod pubsub;
pub mod vcard;
