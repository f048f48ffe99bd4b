// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use backoff::Backoff;
pub use manager::{ConnectionManager, Credentials, SystemState};
pub use state::{ConnectionState, ConnectionStatus};

mod backoff;
mod manager;
mod state;
