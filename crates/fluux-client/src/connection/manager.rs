// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jid::FullJid;
use parking_lot::Mutex;
use secrecy::SecretString;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use fluux_xmpp::client::SmState;
use fluux_xmpp::{mods, Client, ConnectionError};

use crate::connection::{Backoff, ConnectionState, ConnectionStatus};
use crate::event::{AuthenticatedEvent, ClientEvent, ConnectionStatusChangedEvent};
use crate::storage::{
    self, StorageAdapter, LAST_ENDPOINT_KEY, SM_STATE_KEY,
};
use crate::store::Store;

/// How long the server keeps a detached XEP-0198 session around. Sleep
/// gaps beyond this skip verification and reconnect immediately.
const DEFAULT_RESUME_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct Credentials {
    pub jid: FullJid,
    pub password: SecretString,
    pub endpoint: Option<String>,
}

/// System-level notifications fed in by the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemState {
    Awake { slept: Option<Duration> },
    Sleeping,
    Visible,
    Hidden,
}

/// Called after every successful transition to live, with `(resumed,
/// session generation)`. The session orchestrator hangs off this hook.
pub(crate) type SessionHook = Box<dyn Fn(bool, u64) + Send + Sync>;

/// Owns the transport (through the protocol client) and is the only
/// component that drives the connection state machine.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    client: Client,
    store: Store,
    storage: Arc<dyn StorageAdapter>,
    bus: broadcast::Sender<ClientEvent>,
    state: Mutex<ConnectionState>,
    credentials: Mutex<Option<Credentials>>,
    backoff: Backoff,
    attempt: AtomicU32,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    generation: Arc<AtomicU64>,
    resume_timeout: Duration,
    user_disconnected: AtomicBool,
    session_hook: Mutex<Option<SessionHook>>,
}

impl ConnectionManager {
    pub(crate) fn new(
        client: Client,
        store: Store,
        storage: Arc<dyn StorageAdapter>,
        bus: broadcast::Sender<ClientEvent>,
    ) -> Self {
        ConnectionManager {
            inner: Arc::new(ManagerInner {
                client,
                store,
                storage,
                bus,
                state: Mutex::new(ConnectionState::Idle),
                credentials: Mutex::new(None),
                backoff: Backoff::default(),
                attempt: AtomicU32::new(0),
                reconnect_task: Mutex::new(None),
                generation: Arc::new(AtomicU64::new(0)),
                resume_timeout: DEFAULT_RESUME_TIMEOUT,
                user_disconnected: AtomicBool::new(false),
                session_hook: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn set_session_hook(&self, hook: SessionHook) {
        *self.inner.session_hook.lock() = Some(hook);
    }

    pub(crate) fn generation_counter(&self) -> Arc<AtomicU64> {
        self.inner.generation.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().clone()
    }

    pub async fn connect(
        &self,
        jid: FullJid,
        password: SecretString,
        endpoint: Option<String>,
        allow_resume: bool,
    ) -> Result<(), ConnectionError> {
        *self.inner.credentials.lock() = Some(Credentials {
            jid,
            password,
            endpoint,
        });
        self.inner.user_disconnected.store(false, Ordering::SeqCst);
        self.inner.attempt.store(0, Ordering::SeqCst);
        self.connect_attempt(allow_resume).await
    }

    async fn connect_attempt(&self, allow_resume: bool) -> Result<(), ConnectionError> {
        let Some(credentials) = self.inner.credentials.lock().clone() else {
            return Err(ConnectionError::Generic {
                msg: "connect() was never called".to_string(),
            });
        };

        self.set_state(ConnectionState::Resolving);
        self.set_state(ConnectionState::Opening);

        match self
            .inner
            .client
            .connect(&credentials.jid, credentials.password.clone())
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_fatal() => {
                self.set_state(ConnectionState::Terminal {
                    reason: err.to_string(),
                });
                return Err(err);
            }
            Err(err) => {
                warn!("Connection attempt failed: {err}");
                self.schedule_reconnect();
                return Err(err);
            }
        }

        self.set_state(ConnectionState::Authenticating);
        self.set_state(ConnectionState::Bound);

        // SM: resume if we hold a session, otherwise negotiate a fresh
        // one. A declined negotiation leaves the stream usable.
        let mut resumed = false;
        let saved = allow_resume.then(|| self.load_sm_state()).flatten();

        if let Some(saved) = saved {
            match self.inner.client.resume_sm(saved).await {
                Ok(handled) => {
                    info!("Resumed stream management session (server handled {handled})");
                    resumed = true;
                }
                Err(err) => {
                    info!("Stream resumption failed, falling back to a fresh session: {err}");
                    self.clear_sm_state();
                }
            }
        }

        if !resumed {
            match self.inner.client.enable_sm().await {
                Ok(state) => self.persist_sm(&state),
                Err(err) => warn!("Server declined stream management: {err}"),
            }
        }

        self.inner.attempt.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Live { resumed });

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.emit(ClientEvent::Authenticated(AuthenticatedEvent {
            jid: credentials.jid.clone(),
            resumed,
        }));

        if let Some(hook) = &*self.inner.session_hook.lock() {
            hook(resumed, generation);
        }

        Ok(())
    }

    /// Fed by the protocol client's `Disconnected` event.
    pub(crate) fn handle_disconnected(&self, error: Option<ConnectionError>) {
        self.persist_sm_state();

        if self.inner.user_disconnected.load(Ordering::SeqCst) {
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        match error {
            Some(err) if err.is_fatal() => {
                self.set_state(ConnectionState::Terminal {
                    reason: err.to_string(),
                });
            }
            _ => self.schedule_reconnect(),
        }
    }

    fn schedule_reconnect(&self) {
        let attempt = self.inner.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(ConnectionState::Reconnecting { attempt });

        let delay = self.inner.backoff.delay(attempt);
        info!("Reconnecting in {delay:?} (attempt {attempt})");

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if manager.inner.user_disconnected.load(Ordering::SeqCst) {
                return;
            }
            let _ = manager.connect_attempt(true).await;
        });

        self.replace_reconnect_task(Some(handle));
    }

    /// Cancellation is atomic: an in-flight timer is aborted before the
    /// state changes.
    pub fn cancel_reconnect(&self) {
        self.replace_reconnect_task(None);
        if matches!(self.state(), ConnectionState::Reconnecting { .. }) {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Skips the remaining backoff and retries now.
    pub fn trigger_reconnect(&self) {
        self.replace_reconnect_task(None);

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let _ = manager.connect_attempt(true).await;
        });
        self.replace_reconnect_task(Some(handle));
    }

    pub async fn disconnect(&self) {
        self.inner.user_disconnected.store(true, Ordering::SeqCst);
        self.replace_reconnect_task(None);

        // An explicit disconnect ends the SM session for good.
        self.clear_sm_state();
        self.inner.client.disconnect();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Probes the server when the status claims we're online. A failed
    /// or timed-out ping means the socket is dead even though no error
    /// surfaced yet.
    pub async fn verify_connection(&self) {
        if self.inner.store.connection_status() != ConnectionStatus::Online {
            return;
        }

        let ping = self.inner.client.get_mod::<mods::Ping>();
        if let Err(err) = ping.send_ping_to_server().await {
            self.handle_dead_socket(&err.to_string());
        }
    }

    /// Wake-from-sleep can leave the socket FD "open" in the OS table
    /// while unusable; the status store still reads online. Reconcile
    /// by force-reconnecting.
    pub fn handle_dead_socket(&self, diagnostic: &str) {
        error!("Dead socket detected while status reads online: {diagnostic}");
        self.persist_sm_state();
        self.inner.client.disconnect();

        self.inner.attempt.store(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Reconnecting { attempt: 1 });

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let _ = manager.connect_attempt(true).await;
        });
        self.replace_reconnect_task(Some(handle));
    }

    pub async fn notify_system_state(&self, state: SystemState) {
        match state {
            SystemState::Awake { slept } => {
                let beyond_resume_window = slept
                    .map(|slept| slept > self.inner.resume_timeout)
                    .unwrap_or(false);

                if beyond_resume_window {
                    // The server has dropped the session by now; a
                    // verification ping would only waste its timeout.
                    self.trigger_reconnect();
                } else {
                    self.verify_connection().await;
                }
            }
            SystemState::Sleeping | SystemState::Hidden => {
                self.persist_sm_state();
            }
            SystemState::Visible => {
                self.verify_connection().await;
            }
        }
    }

    /// Synchronous on purpose: the inbound counter advances on every
    /// received stanza and the unload path cannot await a write.
    pub fn persist_sm_state(&self) {
        if let Some(state) = self.inner.client.sm_state() {
            self.persist_sm(&state);
        }
    }

    /// Pin the endpoint for subsequent (re)connects; the default
    /// connector provider reads it back.
    pub(crate) fn remember_endpoint(&self, endpoint: &str) {
        storage::set_or_log(&*self.inner.storage, LAST_ENDPOINT_KEY, endpoint);
    }

    fn persist_sm(&self, state: &SmState) {
        match serde_json::to_string(state) {
            Ok(json) => storage::set_or_log(&*self.inner.storage, SM_STATE_KEY, &json),
            Err(err) => warn!("Failed to serialize SM state: {err}"),
        }
    }

    fn load_sm_state(&self) -> Option<SmState> {
        let json = storage::get_or_log(&*self.inner.storage, SM_STATE_KEY)?;
        match serde_json::from_str(&json) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!("Discarding unreadable SM state: {err}");
                None
            }
        }
    }

    fn clear_sm_state(&self) {
        storage::remove_or_log(&*self.inner.storage, SM_STATE_KEY);
    }

    fn replace_reconnect_task(&self, task: Option<JoinHandle<()>>) {
        let previous = {
            let mut guard = self.inner.reconnect_task.lock();
            std::mem::replace(&mut *guard, task)
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let status = ConnectionStatus::from(&state);
        let changed = {
            let mut guard = self.inner.state.lock();
            let changed = ConnectionStatus::from(&*guard) != status;
            *guard = state;
            changed
        };

        // Status is applied directly, not through the bindings (see
        // Store::set_connection_status).
        self.inner.store.set_connection_status(status.clone());

        if changed {
            self.emit(ClientEvent::ConnectionStatusChanged(
                ConnectionStatusChangedEvent { status },
            ));
        }
    }

    fn emit(&self, event: ClientEvent) {
        self.inner.store.push_event(event.clone());
        let _ = self.inner.bus.send(event);
    }
}
