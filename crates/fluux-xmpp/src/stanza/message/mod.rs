// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use fallback::{Fallback, Range};
pub use fasten::{ApplyTo, FastenedPayload, Meta};
pub use message::Message;
pub use reference::Reference;
pub use reply::Reply;
pub use retract::Retract;

mod builder;
pub mod fallback;
pub mod fasten;
pub mod message;
pub mod reference;
pub mod reply;
pub mod retract;

crate::id_string!(
    /// Client-assigned message id.
    Id
);
