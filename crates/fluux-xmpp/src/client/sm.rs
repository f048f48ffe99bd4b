// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::VecDeque;

use minidom::Element;
use serde::{Deserialize, Serialize};
use xmpp_parsers::sm::{self, A, Nonza};

/// Persistable XEP-0198 session: stream id plus the count of stanzas we
/// handled. This is what survives a process restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmState {
    pub id: String,
    pub inbound: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmPhase {
    #[default]
    Disabled,
    Enabling,
    Enabled,
    Resuming,
}

/// What the stream layer must do after a nonza was processed.
#[derive(Debug)]
pub(crate) enum SmAction {
    SendAck(A),
    /// Stanzas the server never acked; resend them after `<resumed/>`.
    Replay(Vec<Element>),
}

/// Client-side stream management. Counts inbound stanzas, queues
/// outbound stanzas until the server acks them, and drives the
/// enable/resume handshakes' state.
#[derive(Debug, Default)]
pub(crate) struct SmTracker {
    phase: SmPhase,
    stream_id: Option<String>,
    resume_supported: bool,
    inbound_handled: u32,
    last_acked_by_server: u32,
    unacked_stanzas: VecDeque<Element>,
}

impl SmTracker {
    pub fn phase(&self) -> SmPhase {
        self.phase
    }

    pub fn state(&self) -> Option<SmState> {
        let id = self.stream_id.clone()?;
        Some(SmState {
            id,
            inbound: self.inbound_handled,
        })
    }

    pub fn begin_enable(&mut self) {
        self.reset();
        self.phase = SmPhase::Enabling;
    }

    pub fn begin_resume(&mut self, state: &SmState) {
        self.phase = SmPhase::Resuming;
        self.stream_id = Some(state.id.clone());
        self.resume_supported = true;
        self.inbound_handled = state.inbound;
    }

    pub fn reset(&mut self) {
        self.phase = SmPhase::Disabled;
        self.stream_id = None;
        self.resume_supported = false;
        self.inbound_handled = 0;
        self.last_acked_by_server = 0;
        self.unacked_stanzas.clear();
    }

    /// The inbound counter is non-decreasing for the lifetime of one
    /// session; it only resets together with the session itself.
    pub fn mark_inbound_handled(&mut self) {
        if matches!(self.phase, SmPhase::Enabled | SmPhase::Resuming) {
            self.inbound_handled = self.inbound_handled.wrapping_add(1);
        }
    }

    pub fn track_outbound(&mut self, stanza: &Element) {
        // Nonzas are not stanzas; they never enter the replay queue.
        if stanza.has_ns(crate::ns::SM) {
            return;
        }
        if matches!(self.phase, SmPhase::Enabled | SmPhase::Resuming) {
            self.unacked_stanzas.push_back(stanza.clone());
        }
    }

    pub fn process_nonza(&mut self, nonza: &Nonza) -> Vec<SmAction> {
        match nonza {
            Nonza::Enabled(enabled) => {
                self.phase = SmPhase::Enabled;
                self.resume_supported = enabled.resume;
                self.stream_id = if enabled.resume {
                    enabled.id.clone().map(|id| id.0)
                } else {
                    None
                };
                vec![]
            }
            Nonza::Ack(ack) => {
                self.apply_ack(ack.h);
                vec![]
            }
            Nonza::Req(_) => vec![SmAction::SendAck(A::new(self.inbound_handled))],
            Nonza::Resumed(resumed) => {
                if self.stream_id.as_deref() != Some(resumed.previd.0.as_str()) {
                    tracing::warn!(
                        "Received <resumed/> for unexpected stream id '{}'",
                        resumed.previd.0
                    );
                    return vec![];
                }
                self.apply_ack(resumed.h);
                self.phase = SmPhase::Enabled;
                vec![SmAction::Replay(
                    self.unacked_stanzas.iter().cloned().collect(),
                )]
            }
            Nonza::Failed(failed) => {
                if let Some(handled) = failed.h {
                    self.apply_ack(handled);
                }
                self.reset();
                vec![]
            }
            // Client-only nonzas coming *from* the server are a protocol
            // violation; drop them.
            Nonza::Enable(_) | Nonza::Resume(_) => vec![],
        }
    }

    fn apply_ack(&mut self, handled: u32) {
        let newly_acked = handled.wrapping_sub(self.last_acked_by_server) as usize;
        if newly_acked > self.unacked_stanzas.len() {
            tracing::warn!(
                "Server acked {newly_acked} stanza(s) but only {} are pending",
                self.unacked_stanzas.len()
            );
            self.unacked_stanzas.clear();
        } else {
            for _ in 0..newly_acked {
                self.unacked_stanzas.pop_front();
            }
        }
        self.last_acked_by_server = handled;
    }
}

impl SmState {
    pub(crate) fn resume_nonza(&self) -> Nonza {
        Nonza::Resume(sm::Resume {
            h: self.inbound,
            previd: sm::StreamId(self.id.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use xmpp_parsers::sm::{Enabled, Resumed, StreamId, R};

    use super::*;

    fn enabled(id: &str) -> Nonza {
        Nonza::Enabled(Enabled {
            id: Some(StreamId(id.to_string())),
            location: None,
            max: None,
            resume: true,
        })
    }

    #[test]
    fn test_counts_inbound_once_enabled() {
        let mut tracker = SmTracker::default();
        tracker.mark_inbound_handled();
        assert_eq!(tracker.state(), None);

        tracker.begin_enable();
        tracker.process_nonza(&enabled("s1"));
        tracker.mark_inbound_handled();
        tracker.mark_inbound_handled();

        assert_eq!(
            tracker.state(),
            Some(SmState {
                id: "s1".to_string(),
                inbound: 2
            })
        );
    }

    #[test]
    fn test_answers_ack_requests_with_handled_count() {
        let mut tracker = SmTracker::default();
        tracker.begin_enable();
        tracker.process_nonza(&enabled("s1"));
        tracker.mark_inbound_handled();

        let actions = tracker.process_nonza(&Nonza::Req(R));
        assert!(matches!(&actions[..], [SmAction::SendAck(a)] if a.h == 1));
    }

    #[test]
    fn test_resumption_replays_only_unacked_stanzas() {
        let mut tracker = SmTracker::default();
        tracker.begin_enable();
        tracker.process_nonza(&enabled("s1"));

        let one = Element::from_str("<message xmlns='jabber:client' id='one'/>").unwrap();
        let two = Element::from_str("<message xmlns='jabber:client' id='two'/>").unwrap();
        tracker.track_outbound(&one);
        tracker.track_outbound(&two);

        tracker.begin_resume(&SmState {
            id: "s1".to_string(),
            inbound: 5,
        });
        let actions = tracker.process_nonza(&Nonza::Resumed(Resumed {
            h: 1,
            previd: StreamId("s1".to_string()),
        }));

        let [SmAction::Replay(stanzas)] = &actions[..] else {
            panic!("Expected replay action");
        };
        assert_eq!(stanzas.len(), 1);
        assert_eq!(stanzas[0].attr("id"), Some("two"));
        assert_eq!(tracker.phase(), SmPhase::Enabled);
    }

    #[test]
    fn test_failed_resumption_resets_session() {
        let mut tracker = SmTracker::default();
        tracker.begin_resume(&SmState {
            id: "s1".to_string(),
            inbound: 5,
        });
        tracker.process_nonza(&Nonza::Failed(xmpp_parsers::sm::Failed {
            h: None,
            error: None,
        }));
        assert_eq!(tracker.phase(), SmPhase::Disabled);
        assert_eq!(tracker.state(), None);
    }
}
