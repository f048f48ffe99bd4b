// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use machine::{
    AutoAwayConfig, MachineContext, PresenceEvent, PresenceMachine, PresenceSnapshot,
    PresenceState, UserPreference,
};
pub use projection::PresenceProjection;

mod machine;
mod projection;
