// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use connector::{
    is_dead_socket_error, Connection, ConnectionError, ConnectionEvent, ConnectionEventHandler,
    Connector, PinnedFuture,
};
pub use endpoint::{Endpoint, EndpointResolver};

#[allow(clippy::module_inception)]
mod connector;
mod endpoint;
pub mod tokio_xmpp;
