// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use connected_client::{BareJidTestAdditions, ClientTestAdditions, ConnectedClient};
pub use connector::{Connection, Connector};
pub use incrementing_id_provider::IncrementingIDProvider;

mod connected_client;
mod connector;
mod incrementing_id_provider;
