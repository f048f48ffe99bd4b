// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::time::{Duration, Instant};

use tracing::{debug, error};
use xmpp_parsers::presence::Show;

use fluux_xmpp::mods::Roster;

use crate::connection::ConnectionState;
use crate::presence::PresenceSnapshot;

const FAILURE_WINDOW: Duration = Duration::from_secs(30);
const MAX_LOGGED_FAILURES: u32 = 3;

/// Observes the presence machine and turns state changes into wire
/// presence. The first observed tick is a baseline and never sent; a
/// stanza goes out only when `(show, status)` actually changed and the
/// connection is live.
pub struct PresenceProjection {
    last_projected: Option<Option<(Option<Show>, Option<String>)>>,
    failures: u32,
    window_started: Option<Instant>,
    suppressing: bool,
}

impl Default for PresenceProjection {
    fn default() -> Self {
        PresenceProjection {
            last_projected: None,
            failures: 0,
            window_started: None,
            suppressing: false,
        }
    }
}

impl PresenceProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one machine snapshot. Returns `true` when a stanza was
    /// sent.
    pub fn observe(
        &mut self,
        snapshot: &PresenceSnapshot,
        connection: &ConnectionState,
        roster: &Roster,
    ) -> bool {
        let projected = snapshot.wire_presence();

        let is_baseline = self.last_projected.is_none();
        let changed = self.last_projected.as_ref() != Some(&projected);
        self.last_projected = Some(projected.clone());

        if is_baseline || !changed {
            return false;
        }

        // Disconnected projects to nothing; the stream is gone anyway.
        let Some((show, status)) = projected else {
            return false;
        };

        // Never send while reconnecting or resuming; the queued SM
        // replay would duplicate it anyway.
        if !connection.is_live() {
            debug!("Suppressing presence update while connection is not live");
            return false;
        }
        match roster.set_presence(show, status.as_deref()) {
            Ok(()) => {
                self.failures = 0;
                self.window_started = None;
                self.suppressing = false;
                true
            }
            Err(err) => {
                self.record_failure(err);
                false
            }
        }
    }

    /// After three consecutive failures inside a 30-second window the
    /// error log goes quiet until a send succeeds again.
    fn record_failure(&mut self, err: anyhow::Error) {
        let now = Instant::now();
        match self.window_started {
            Some(started) if now.duration_since(started) <= FAILURE_WINDOW => {
                self.failures += 1;
            }
            _ => {
                self.window_started = Some(now);
                self.failures = 1;
                self.suppressing = false;
            }
        }

        if self.failures >= MAX_LOGGED_FAILURES {
            if !self.suppressing {
                error!("Failed to send presence {} times in a row; silencing further errors: {err}", self.failures);
                self.suppressing = true;
            }
        } else if !self.suppressing {
            error!("Failed to send presence: {err}");
        }
    }
}
