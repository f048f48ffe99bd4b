// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

/// The full lifecycle of one connection, driven exclusively by the
/// connection manager. External code can only request `connect`,
/// `disconnect`, `cancel_reconnect` and `trigger_reconnect`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Resolving,
    Opening,
    Authenticating,
    Bound,
    /// Stream established, SM negotiated (or declined by the server).
    Live {
        resumed: bool,
    },
    Reconnecting {
        attempt: u32,
    },
    /// Fatal error; never retried.
    Terminal {
        reason: String,
    },
    Disconnected,
}

impl ConnectionState {
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Live { .. })
    }
}

/// The coarse status projected into the store. This is what consumers
/// and the side-effect driver see.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Online,
    Reconnecting {
        attempt: u32,
    },
    Terminal {
        reason: String,
    },
}

impl From<&ConnectionState> for ConnectionStatus {
    fn from(state: &ConnectionState) -> Self {
        match state {
            ConnectionState::Idle | ConnectionState::Disconnected => {
                ConnectionStatus::Disconnected
            }
            ConnectionState::Resolving
            | ConnectionState::Opening
            | ConnectionState::Authenticating
            | ConnectionState::Bound => ConnectionStatus::Connecting,
            ConnectionState::Live { .. } => ConnectionStatus::Online,
            ConnectionState::Reconnecting { attempt } => ConnectionStatus::Reconnecting {
                attempt: *attempt,
            },
            ConnectionState::Terminal { reason } => ConnectionStatus::Terminal {
                reason: reason.clone(),
            },
        }
    }
}
