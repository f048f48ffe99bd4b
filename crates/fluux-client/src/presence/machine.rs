// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use xmpp_parsers::presence::Show;

use crate::storage::{self, StorageAdapter, PRESENCE_MACHINE_KEY};

/// What the user explicitly picked. Never cleared by auto-away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum UserPreference {
    #[default]
    Online,
    Away,
    Dnd,
}

/// Hierarchical presence state. The `Connected` substates mirror the
/// user preference plus the two automatic degradations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PresenceState {
    #[default]
    Disconnected,
    UserOnline,
    UserAway,
    UserDnd,
    /// Entered on idle detection; remembers where to go back to.
    AutoAway,
    /// Entered on system sleep.
    AutoXa,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoAwayConfig {
    pub enabled: bool,
    pub idle_after_secs: u64,
}

impl Default for AutoAwayConfig {
    fn default() -> Self {
        AutoAwayConfig {
            enabled: true,
            idle_after_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MachineContext {
    pub last_user_preference: UserPreference,
    pub status_message: Option<String>,
    pub idle_since: Option<DateTime<Utc>>,
    pub pre_auto_away_state: Option<UserPreference>,
    pub pre_auto_away_status_message: Option<String>,
    pub auto_away_config: AutoAwayConfig,
}

/// The serialized form written to storage on every transition. Dates
/// travel as ISO strings through serde.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub state: PresenceState,
    pub context: MachineContext,
}

impl PresenceSnapshot {
    /// The wire projection of this state: `Some((show, status))`, or
    /// `None` while disconnected (nothing to send, ever).
    pub fn wire_presence(&self) -> Option<(Option<Show>, Option<String>)> {
        let status = self.context.status_message.clone();
        match self.state {
            PresenceState::Disconnected => None,
            PresenceState::UserOnline => Some((None, status)),
            PresenceState::UserAway => Some((Some(Show::Away), status)),
            PresenceState::UserDnd => Some((Some(Show::Dnd), status)),
            PresenceState::AutoAway => Some((Some(Show::Away), status)),
            PresenceState::AutoXa => Some((Some(Show::Xa), status)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    Connect,
    Disconnect,
    SetPresence {
        preference: UserPreference,
        status: Option<String>,
    },
    IdleDetected {
        since: DateTime<Utc>,
    },
    WakeDetected,
    SleepDetected,
    ActivityDetected,
}

/// User-presence state machine. Pure transitions; persistence happens
/// as a side effect on every applied event.
pub struct PresenceMachine {
    state: PresenceState,
    context: MachineContext,
    storage: std::sync::Arc<dyn StorageAdapter>,
}

impl PresenceMachine {
    /// Restores from storage when a snapshot exists. The top-level
    /// state always starts as `Disconnected`; only the context
    /// survives, so a later `Connect` deterministically re-enters the
    /// right substate.
    pub fn restore(storage: std::sync::Arc<dyn StorageAdapter>) -> Self {
        let context = storage::get_or_log(&*storage, PRESENCE_MACHINE_KEY)
            .and_then(|json| match serde_json::from_str::<PresenceSnapshot>(&json) {
                Ok(snapshot) => Some(snapshot.context),
                Err(err) => {
                    warn!("Discarding unreadable presence snapshot: {err}");
                    None
                }
            })
            .unwrap_or_default();

        PresenceMachine {
            state: PresenceState::Disconnected,
            context,
            storage,
        }
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot {
            state: self.state,
            context: self.context.clone(),
        }
    }

    /// Applies one event. Returns the new snapshot when the machine
    /// moved, `None` when the event was a no-op in this state.
    pub fn apply(&mut self, event: PresenceEvent) -> Option<PresenceSnapshot> {
        let next = self.transition(event)?;
        self.state = next;
        self.persist();
        Some(self.snapshot())
    }

    fn transition(&mut self, event: PresenceEvent) -> Option<PresenceState> {
        use PresenceEvent::*;
        use PresenceState::*;

        match (self.state, event) {
            // Reconnecting restores what the user chose before the
            // disconnect: somebody who picked dnd stays dnd.
            (Disconnected, Connect) => Some(state_for(self.context.last_user_preference)),
            (Disconnected, _) => None,

            (_, Disconnect) => Some(Disconnected),

            (_, SetPresence { preference, status }) => {
                self.context.last_user_preference = preference;
                self.context.status_message = status;
                self.context.pre_auto_away_state = None;
                self.context.pre_auto_away_status_message = None;
                Some(state_for(preference))
            }

            (UserOnline | UserAway | UserDnd, IdleDetected { since }) => {
                if !self.context.auto_away_config.enabled {
                    return None;
                }
                self.context.idle_since = Some(since);
                self.context.pre_auto_away_state = Some(self.context.last_user_preference);
                self.context.pre_auto_away_status_message = self.context.status_message.clone();
                Some(AutoAway)
            }
            (AutoAway | AutoXa, IdleDetected { .. }) => None,

            (UserOnline | UserAway | UserDnd, SleepDetected) => {
                self.context.pre_auto_away_state = Some(self.context.last_user_preference);
                self.context.pre_auto_away_status_message = self.context.status_message.clone();
                Some(AutoXa)
            }
            (AutoAway, SleepDetected) => Some(AutoXa),
            (AutoXa, SleepDetected) => None,

            (AutoAway | AutoXa, ActivityDetected) | (AutoXa, WakeDetected) => {
                self.context.idle_since = None;
                // Restore exactly what was captured on entry.
                let restored = match self.context.pre_auto_away_state.take() {
                    Some(preference) => {
                        self.context.status_message =
                            self.context.pre_auto_away_status_message.take();
                        preference
                    }
                    None => self.context.last_user_preference,
                };
                Some(state_for(restored))
            }

            (_, ActivityDetected | WakeDetected) => None,
        }
    }

    fn persist(&self) {
        match serde_json::to_string(&self.snapshot()) {
            Ok(json) => storage::set_or_log(&*self.storage, PRESENCE_MACHINE_KEY, &json),
            Err(err) => warn!("Failed to serialize presence snapshot: {err}"),
        }
    }
}

fn state_for(preference: UserPreference) -> PresenceState {
    match preference {
        UserPreference::Online => PresenceState::UserOnline,
        UserPreference::Away => PresenceState::UserAway,
        UserPreference::Dnd => PresenceState::UserDnd,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::storage::InMemoryStorage;

    use super::*;

    fn machine() -> PresenceMachine {
        PresenceMachine::restore(Arc::new(InMemoryStorage::new()))
    }

    #[test]
    fn test_connect_restores_last_user_preference() {
        let mut machine = machine();
        machine.apply(PresenceEvent::Connect);
        machine.apply(PresenceEvent::SetPresence {
            preference: UserPreference::Dnd,
            status: Some("Heads down".to_string()),
        });

        machine.apply(PresenceEvent::Disconnect);
        assert_eq!(machine.snapshot().state, PresenceState::Disconnected);

        let snapshot = machine.apply(PresenceEvent::Connect).unwrap();
        assert_eq!(snapshot.state, PresenceState::UserDnd);
        assert_eq!(
            snapshot.wire_presence(),
            Some((Some(Show::Dnd), Some("Heads down".to_string())))
        );
    }

    #[test]
    fn test_activity_restores_pre_auto_away_state() {
        let mut machine = machine();
        machine.apply(PresenceEvent::Connect);
        machine.apply(PresenceEvent::SetPresence {
            preference: UserPreference::Dnd,
            status: Some("Busy".to_string()),
        });

        machine.apply(PresenceEvent::IdleDetected { since: Utc::now() });
        assert_eq!(machine.snapshot().state, PresenceState::AutoAway);

        let snapshot = machine.apply(PresenceEvent::ActivityDetected).unwrap();
        assert_eq!(snapshot.state, PresenceState::UserDnd);
        assert_eq!(
            snapshot.wire_presence(),
            Some((Some(Show::Dnd), Some("Busy".to_string())))
        );
    }

    #[test]
    fn test_set_presence_always_overwrites_preference() {
        let mut machine = machine();
        machine.apply(PresenceEvent::Connect);
        machine.apply(PresenceEvent::IdleDetected { since: Utc::now() });

        // Explicit choice wins even while auto-away.
        let snapshot = machine
            .apply(PresenceEvent::SetPresence {
                preference: UserPreference::Away,
                status: Some("brb".to_string()),
            })
            .unwrap();
        assert_eq!(snapshot.state, PresenceState::UserAway);
        assert_eq!(snapshot.context.last_user_preference, UserPreference::Away);
        assert_eq!(snapshot.context.pre_auto_away_state, None);
    }

    #[test]
    fn test_wake_exits_auto_xa() {
        let mut machine = machine();
        machine.apply(PresenceEvent::Connect);
        machine.apply(PresenceEvent::SleepDetected);
        assert_eq!(machine.snapshot().state, PresenceState::AutoXa);

        let snapshot = machine.apply(PresenceEvent::WakeDetected).unwrap();
        assert_eq!(snapshot.state, PresenceState::UserOnline);
    }

    #[test]
    fn test_restore_forces_disconnected_but_keeps_context() {
        let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());

        {
            let mut machine = PresenceMachine::restore(storage.clone());
            machine.apply(PresenceEvent::Connect);
            machine.apply(PresenceEvent::SetPresence {
                preference: UserPreference::Away,
                status: Some("Out for lunch".to_string()),
            });
        }

        let mut restored = PresenceMachine::restore(storage);
        assert_eq!(restored.snapshot().state, PresenceState::Disconnected);

        let snapshot = restored.apply(PresenceEvent::Connect).unwrap();
        assert_eq!(snapshot.state, PresenceState::UserAway);
        assert_eq!(
            snapshot.context.status_message.as_deref(),
            Some("Out for lunch")
        );
    }

    #[test]
    fn test_disabled_auto_away_ignores_idle() {
        let mut machine = machine();
        machine.apply(PresenceEvent::Connect);
        machine.context.auto_away_config.enabled = false;

        assert_eq!(
            machine.apply(PresenceEvent::IdleDetected { since: Utc::now() }),
            None
        );
        assert_eq!(machine.snapshot().state, PresenceState::UserOnline);
    }
}
