// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use jid::{BareJid, FullJid, Jid};
use parking_lot::Mutex;
use secrecy::SecretString;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use xmpp_parsers::chatstates::ChatState;
use xmpp_parsers::data_forms::DataForm;
use xmpp_parsers::message::MessageType;

use fluux_xmpp::client::ConnectorProvider;
use fluux_xmpp::mods;
use fluux_xmpp::stanza::adhoc;
use fluux_xmpp::stanza::bookmark::ConferenceBookmark;
use fluux_xmpp::stanza::message::{self as stanza_message, Meta, Reference, Reply};
use fluux_xmpp::stanza::vcard::VCard;
use fluux_xmpp::{Client as XmppClient, ConnectionError, Event as XmppEvent, IDProvider};

use crate::cache::MessageCache;
use crate::connection::{ConnectionManager, ConnectionState, SystemState};
use crate::event::{ClientEvent, UserPresenceChangedEvent};
use crate::mam_service::MamService;
use crate::presence::{
    PresenceEvent, PresenceMachine, PresenceProjection, PresenceSnapshot, UserPreference,
};
use crate::session::{self, SessionContext};
use crate::storage::{InMemoryStorage, StorageAdapter};
use crate::store::bindings::StoreBindings;
use crate::store::Store;
use crate::domain::ConversationId;
use crate::effects::SideEffectDriver;

const EVENT_BUS_CAPACITY: usize = 256;

/// The Fluux SDK core client: one long-lived connection, a typed event
/// stream, and an observable store.
#[derive(Clone)]
pub struct FluuxClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    xmpp: XmppClient,
    store: Store,
    bus: broadcast::Sender<ClientEvent>,
    manager: ConnectionManager,
    mam: MamService,
    presence: Arc<Mutex<PresenceMachine>>,
    projection: Arc<Mutex<PresenceProjection>>,
    effects_task: Mutex<Option<JoinHandle<()>>>,
}

/// Shared with the protocol client's event handler. Filled in once the
/// full runtime exists; events arriving before that are connection
/// noise and safe to drop.
struct RuntimeHandles {
    manager: ConnectionManager,
    bindings: StoreBindings,
    presence: Arc<Mutex<PresenceMachine>>,
    projection: Arc<Mutex<PresenceProjection>>,
    xmpp: XmppClient,
    store: Store,
    bus: broadcast::Sender<ClientEvent>,
}

impl RuntimeHandles {
    fn dispatch(&self, event: XmppEvent) {
        match event {
            XmppEvent::Client(fluux_xmpp::client::Event::Disconnected { error }) => {
                self.manager.handle_disconnected(error);
                apply_presence_event(
                    &self.presence,
                    &self.projection,
                    &self.manager,
                    &self.xmpp,
                    &self.store,
                    &self.bus,
                    PresenceEvent::Disconnect,
                );
            }
            XmppEvent::Client(fluux_xmpp::client::Event::PingTimer) => {
                // Cheap periodic safety net for the inbound counter.
                self.manager.persist_sm_state();
            }
            XmppEvent::Client(_) => {}
            other => self.bindings.handle_event(other),
        }
    }
}

pub struct FluuxClientBuilder {
    connector_provider: Option<ConnectorProvider>,
    storage: Arc<dyn StorageAdapter>,
    cache: Option<Arc<dyn MessageCache>>,
    id_provider: Option<Arc<dyn IDProvider>>,
}

impl Default for FluuxClientBuilder {
    fn default() -> Self {
        FluuxClientBuilder {
            connector_provider: None,
            storage: Arc::new(InMemoryStorage::new()),
            cache: None,
            id_provider: None,
        }
    }
}

impl FluuxClientBuilder {
    /// The transport. Defaults to the native TCP/TLS connector; a
    /// WebSocket bridge plugs in here.
    pub fn set_connector_provider(mut self, provider: ConnectorProvider) -> Self {
        self.connector_provider = Some(provider);
        self
    }

    pub fn set_storage(mut self, storage: Arc<dyn StorageAdapter>) -> Self {
        self.storage = storage;
        self
    }

    pub fn set_message_cache(mut self, cache: Arc<dyn MessageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn set_id_provider(mut self, id_provider: Arc<dyn IDProvider>) -> Self {
        self.id_provider = Some(id_provider);
        self
    }

    pub fn build(self) -> FluuxClient {
        let (bus, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let store = Store::new();

        let handles: Arc<OnceLock<RuntimeHandles>> = Arc::new(OnceLock::new());

        let mut xmpp_builder = XmppClient::builder();
        if let Some(provider) = self.connector_provider {
            xmpp_builder = xmpp_builder.set_connector_provider(provider);
        } else {
            // Native connector. When an endpoint was pinned (explicit
            // override, or the one that worked before a resume), reuse
            // it instead of resolving again.
            let storage = self.storage.clone();
            xmpp_builder = xmpp_builder.set_connector_provider(Box::new(move || {
                use fluux_xmpp::connector::tokio_xmpp::Connector;

                let pinned = storage
                    .get(crate::storage::LAST_ENDPOINT_KEY)
                    .ok()
                    .flatten()
                    .and_then(|url| fluux_xmpp::Endpoint::from_override(&url).ok());

                match pinned {
                    Some(endpoint) => Box::new(Connector::with_endpoint(endpoint)),
                    None => Box::new(Connector::new()),
                }
            }));
        }
        if let Some(id_provider) = self.id_provider {
            xmpp_builder = xmpp_builder.set_id_provider(id_provider);
        }

        let handler_handles = handles.clone();
        let xmpp = xmpp_builder
            .set_event_handler(move |_, event| {
                let handles = handler_handles.clone();
                async move {
                    if let Some(handles) = handles.get() {
                        handles.dispatch(event);
                    }
                }
            })
            .build();

        let manager = ConnectionManager::new(
            xmpp.clone(),
            store.clone(),
            self.storage.clone(),
            bus.clone(),
        );
        let mam = MamService::new(xmpp.clone(), store.clone(), bus.clone());
        let presence = Arc::new(Mutex::new(PresenceMachine::restore(self.storage.clone())));
        let projection = Arc::new(Mutex::new(PresenceProjection::new()));

        // The restored (disconnected) state is the projection baseline;
        // the first real transition after connect diffs against it.
        {
            let snapshot = presence.lock().snapshot();
            let roster = xmpp.get_mod::<mods::Roster>();
            projection
                .lock()
                .observe(&snapshot, &ConnectionState::Idle, &roster);
        }
        let bindings = StoreBindings::new(store.clone(), bus.clone(), xmpp.clone());

        let _ = handles.set(RuntimeHandles {
            manager: manager.clone(),
            bindings,
            presence: presence.clone(),
            projection: projection.clone(),
            xmpp: xmpp.clone(),
            store: store.clone(),
            bus: bus.clone(),
        });

        // The post-connect workflow, re-armed for every transition to
        // live with the generation it belongs to.
        {
            let session_ctx = SessionContext {
                client: xmpp.clone(),
                store: store.clone(),
                bus: bus.clone(),
                mam: mam.clone(),
                generation: manager.generation_counter(),
            };
            let presence = presence.clone();
            let projection = projection.clone();
            let manager_for_hook = manager.clone();
            let xmpp_for_hook = xmpp.clone();
            let store_for_hook = store.clone();
            let bus_for_hook = bus.clone();

            manager.set_session_hook(Box::new(move |resumed, generation| {
                apply_presence_event(
                    &presence,
                    &projection,
                    &manager_for_hook,
                    &xmpp_for_hook,
                    &store_for_hook,
                    &bus_for_hook,
                    PresenceEvent::Connect,
                );

                let ctx = session_ctx.clone();
                tokio::spawn(async move {
                    session::handle_connection_success(ctx, resumed, generation).await;
                });
            }));
        }

        let effects = SideEffectDriver::new(store.clone(), mam.clone(), self.cache.clone());
        let effects_task = effects.spawn();

        FluuxClient {
            inner: Arc::new(ClientInner {
                xmpp,
                store,
                bus,
                manager,
                mam,
                presence,
                projection,
                effects_task: Mutex::new(Some(effects_task)),
            }),
        }
    }
}

impl FluuxClient {
    pub fn builder() -> FluuxClientBuilder {
        FluuxClientBuilder::default()
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.bus.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.manager.state()
    }

    // Lifecycle

    pub async fn connect(
        &self,
        jid: FullJid,
        password: SecretString,
        endpoint: Option<String>,
        resume: bool,
    ) -> Result<(), ConnectionError> {
        if let Some(endpoint) = &endpoint {
            self.inner.manager.remember_endpoint(endpoint);
        }
        self.inner
            .manager
            .connect(jid, password, endpoint, resume)
            .await
    }

    pub async fn disconnect(&self) {
        self.apply_presence(PresenceEvent::Disconnect);
        self.inner.manager.disconnect().await;
    }

    pub fn cancel_reconnect(&self) {
        self.inner.manager.cancel_reconnect();
    }

    pub fn trigger_reconnect(&self) {
        self.inner.manager.trigger_reconnect();
    }

    pub async fn verify_connection(&self) {
        self.inner.manager.verify_connection().await;
    }

    pub async fn notify_system_state(&self, state: SystemState) {
        match &state {
            SystemState::Sleeping => {
                self.apply_presence(PresenceEvent::SleepDetected);
            }
            SystemState::Awake { .. } => {
                self.apply_presence(PresenceEvent::WakeDetected);
            }
            SystemState::Visible | SystemState::Hidden => {}
        }
        self.inner.manager.notify_system_state(state).await;
    }

    /// Synchronous SM persistence for the unload path.
    pub fn persist_sm_state(&self) {
        self.inner.manager.persist_sm_state();
    }

    pub async fn destroy(&self) {
        if let Some(task) = self.inner.effects_task.lock().take() {
            task.abort();
        }
        self.inner.manager.disconnect().await;
    }

    // Presence

    pub fn set_presence(&self, preference: UserPreference, status: Option<String>) {
        self.apply_presence(PresenceEvent::SetPresence { preference, status });
    }

    pub fn notify_idle(&self, since: DateTime<Utc>) {
        self.apply_presence(PresenceEvent::IdleDetected { since });
    }

    pub fn notify_activity(&self) {
        self.apply_presence(PresenceEvent::ActivityDetected);
    }

    pub fn presence_snapshot(&self) -> PresenceSnapshot {
        self.inner.presence.lock().snapshot()
    }

    fn apply_presence(&self, event: PresenceEvent) {
        apply_presence_event(
            &self.inner.presence,
            &self.inner.projection,
            &self.inner.manager,
            &self.inner.xmpp,
            &self.inner.store,
            &self.inner.bus,
            event,
        );
    }

    // Chat

    /// Opens (and creates if needed) a 1:1 conversation and makes it
    /// the active one, which triggers cache load and archive catch-up.
    pub fn open_conversation(&self, jid: &BareJid) {
        self.inner.store.with_conversation(jid, |_| {});
        self.inner
            .store
            .set_active_conversation(Some(ConversationId::Chat(jid.clone())));
    }

    pub fn open_room(&self, jid: &BareJid) {
        self.inner
            .store
            .set_active_conversation(Some(ConversationId::Room(jid.clone())));
    }

    pub fn send_message(
        &self,
        to: &BareJid,
        body: impl Into<String>,
        reply_to: Option<Reply>,
        mentions: Vec<Reference>,
        attachment: Option<mods::chat::Attachment>,
    ) -> anyhow::Result<()> {
        let chat = self.inner.xmpp.get_mod::<mods::Chat>();
        chat.send_message(
            Jid::from(to.clone()),
            body,
            &MessageType::Chat,
            reply_to,
            mentions,
            attachment,
        )
    }

    pub fn send_correction(
        &self,
        to: &BareJid,
        target: stanza_message::Id,
        body: impl Into<String>,
        attachment: Option<mods::chat::Attachment>,
    ) -> anyhow::Result<()> {
        let chat = self.inner.xmpp.get_mod::<mods::Chat>();
        chat.send_correction(target, Jid::from(to.clone()), body, &MessageType::Chat, attachment)
    }

    pub fn retract_message(&self, to: &BareJid, target: stanza_message::Id) -> anyhow::Result<()> {
        let chat = self.inner.xmpp.get_mod::<mods::Chat>();
        chat.retract_message(target, Jid::from(to.clone()), &MessageType::Chat)
    }

    pub fn send_reaction(
        &self,
        to: &BareJid,
        target: stanza_message::Id,
        emojis: Vec<String>,
    ) -> anyhow::Result<()> {
        let chat = self.inner.xmpp.get_mod::<mods::Chat>();
        chat.react_to_message(target, Jid::from(to.clone()), emojis, &MessageType::Chat)
    }

    pub fn send_chat_state(&self, to: &BareJid, state: ChatState) -> anyhow::Result<()> {
        let chat = self.inner.xmpp.get_mod::<mods::Chat>();
        chat.send_chat_state(Jid::from(to.clone()), state, &MessageType::Chat)
    }

    pub fn send_link_preview(
        &self,
        to: &BareJid,
        target: stanza_message::Id,
        metas: Vec<Meta>,
    ) -> anyhow::Result<()> {
        let chat = self.inner.xmpp.get_mod::<mods::Chat>();
        chat.send_link_preview(target, Jid::from(to.clone()), metas, &MessageType::Chat)
    }

    // MUC

    pub async fn join_room(
        &self,
        jid: &BareJid,
        nickname: Option<&str>,
        password: Option<&str>,
    ) -> anyhow::Result<()> {
        let ctx = self.session_context();
        session::join_room(&ctx, jid, nickname, password).await
    }

    pub fn leave_room(&self, jid: &BareJid) -> anyhow::Result<()> {
        let room = self.inner.store.room(jid);
        let nick = room
            .and_then(|room| room.nickname)
            .ok_or_else(|| anyhow::format_err!("Not in room {jid}"))?;
        let resource = jid::ResourcePart::new(&nick)?;

        let muc = self.inner.xmpp.get_mod::<mods::Muc>();
        muc.leave_room(&jid.with_resource(&resource))
    }

    pub fn send_room_message(&self, room: &BareJid, body: impl Into<String>) -> anyhow::Result<()> {
        let muc = self.inner.xmpp.get_mod::<mods::Muc>();
        let message = fluux_xmpp::stanza::Message::new()
            .set_type(MessageType::Groupchat)
            .set_id(self.generate_id().into())
            .set_to(Jid::from(room.clone()))
            .set_body(body);
        muc.send_room_message(message)
    }

    pub async fn fetch_bookmarks(&self) -> anyhow::Result<Vec<ConferenceBookmark>> {
        let bookmark = self.inner.xmpp.get_mod::<mods::Bookmark>();
        let bookmarks = bookmark.load_bookmarks().await?;
        session::apply_bookmarks(&self.session_context(), &bookmarks);
        Ok(bookmarks)
    }

    pub async fn save_bookmark(&self, bookmark: ConferenceBookmark) -> anyhow::Result<()> {
        let module = self.inner.xmpp.get_mod::<mods::Bookmark>();
        module.publish_bookmark(bookmark).await?;
        Ok(())
    }

    /// Rejoins every room we are supposed to be in: autojoin bookmarks
    /// plus rooms joined before the connection dropped, deduped.
    pub async fn rejoin_active_rooms(&self) -> anyhow::Result<()> {
        let ctx = self.session_context();

        let mut to_join: Vec<BareJid> = self
            .inner
            .store
            .bookmarks()
            .into_iter()
            .filter(|bookmark| bookmark.autojoin)
            .map(|bookmark| bookmark.jid)
            .collect();
        for jid in self.inner.store.joined_room_ids() {
            if !to_join.contains(&jid) {
                to_join.push(jid);
            }
        }

        for jid in to_join {
            if let Err(err) = session::join_room(&ctx, &jid, None, None).await {
                tracing::warn!("Failed to rejoin {jid}: {err}");
            }
        }
        Ok(())
    }

    // MAM

    pub async fn load_older_messages(&self, conversation: &ConversationId) {
        self.inner.mam.load_older(conversation).await;
    }

    pub async fn catch_up(&self, conversation: &ConversationId) {
        self.inner.mam.catch_up(conversation).await;
    }

    pub async fn refresh_previews(&self) {
        self.inner.mam.refresh_previews().await;
    }

    // Roster

    pub async fn add_contact(
        &self,
        jid: &BareJid,
        name: Option<&str>,
        request_subscription: bool,
    ) -> anyhow::Result<()> {
        let roster = self.inner.xmpp.get_mod::<mods::Roster>();
        roster.add_contact(jid, name, request_subscription).await?;
        Ok(())
    }

    pub async fn remove_contact(&self, jid: &BareJid) -> anyhow::Result<()> {
        let roster = self.inner.xmpp.get_mod::<mods::Roster>();
        roster.remove_contact(jid).await?;
        Ok(())
    }

    pub fn approve_subscription(&self, jid: &BareJid) -> anyhow::Result<()> {
        let roster = self.inner.xmpp.get_mod::<mods::Roster>();
        roster.approve_subscription_request(jid)
    }

    pub fn deny_subscription(&self, jid: &BareJid) -> anyhow::Result<()> {
        let roster = self.inner.xmpp.get_mod::<mods::Roster>();
        roster.deny_subscription_request(jid)
    }

    pub fn send_presence_probes(
        &self,
        jids: impl IntoIterator<Item = BareJid>,
    ) -> anyhow::Result<()> {
        let roster = self.inner.xmpp.get_mod::<mods::Roster>();
        roster.send_presence_probes(jids)
    }

    // Profile

    pub async fn publish_avatar(
        &self,
        image_data: &[u8],
        media_type: &str,
        width: Option<u32>,
        height: Option<u32>,
    ) -> anyhow::Result<String> {
        let profile = self.inner.xmpp.get_mod::<mods::Profile>();
        let id = profile
            .publish_avatar(image_data, media_type, width, height)
            .await?;
        Ok(id.to_string())
    }

    pub async fn publish_nickname(&self, nickname: &str) -> anyhow::Result<()> {
        let profile = self.inner.xmpp.get_mod::<mods::Profile>();
        profile.publish_nickname(nickname).await?;
        Ok(())
    }

    pub async fn fetch_vcard(&self, jid: &BareJid) -> anyhow::Result<Option<VCard>> {
        let profile = self.inner.xmpp.get_mod::<mods::Profile>();
        Ok(profile.load_vcard(Jid::from(jid.clone())).await?)
    }

    // Discovery

    pub async fn fetch_server_info(&self) -> anyhow::Result<()> {
        let disco = self.inner.xmpp.get_mod::<mods::Disco>();
        let info = disco.fetch_server_info().await?;
        self.inner.store.set_server_info(info);
        Ok(())
    }

    /// Negotiates an HTTP upload slot on the service discovered via
    /// disco. The PUT itself happens outside the core.
    pub async fn request_upload_slot(
        &self,
        filename: &str,
        size: u64,
        content_type: Option<&str>,
    ) -> anyhow::Result<xmpp_parsers::http_upload::SlotResult> {
        let service = self
            .inner
            .store
            .server_info()
            .and_then(|info| info.http_upload_service)
            .ok_or_else(|| anyhow::format_err!("Server offers no HTTP upload service"))?;

        let upload = self.inner.xmpp.get_mod::<mods::HttpUpload>();
        Ok(upload
            .request_slot(&service, filename, size, content_type)
            .await?)
    }

    // Blocking

    pub async fn block(&self, jid: &BareJid) -> anyhow::Result<()> {
        let blocking = self.inner.xmpp.get_mod::<mods::Blocking>();
        blocking.block(&Jid::from(jid.clone())).await?;
        Ok(())
    }

    pub async fn unblock(&self, jid: &BareJid) -> anyhow::Result<()> {
        let blocking = self.inner.xmpp.get_mod::<mods::Blocking>();
        blocking.unblock(&Jid::from(jid.clone())).await?;
        Ok(())
    }

    pub async fn get_blocklist(&self) -> anyhow::Result<Vec<BareJid>> {
        let blocking = self.inner.xmpp.get_mod::<mods::Blocking>();
        let jids = blocking.load_blocklist().await?;
        let bare: Vec<BareJid> = jids.into_iter().map(|jid| jid.to_bare()).collect();
        self.inner.store.set_blocklist(bare.clone());
        Ok(bare)
    }

    // Admin

    pub async fn discover_admin_commands(&self) -> anyhow::Result<Vec<mods::admin::CommandItem>> {
        let admin = self.inner.xmpp.get_mod::<mods::Admin>();
        let disco = self.inner.xmpp.get_mod::<mods::Disco>();
        let commands = admin.discover_commands(&disco).await?;
        self.inner.store.set_admin_commands(commands.clone());
        Ok(commands)
    }

    pub async fn execute_admin_command(&self, node: &str) -> anyhow::Result<adhoc::Command> {
        let admin = self.inner.xmpp.get_mod::<mods::Admin>();
        let server = self
            .inner
            .xmpp
            .connected_jid()
            .map(|jid| BareJid::from_parts(None, &jid.domain()))
            .ok_or_else(|| anyhow::format_err!("Not connected"))?;
        Ok(admin.execute(Jid::from(server), node).await?)
    }

    pub async fn continue_admin_command(
        &self,
        node: &str,
        sessionid: &str,
        action: adhoc::Action,
        form: Option<DataForm>,
    ) -> anyhow::Result<adhoc::Command> {
        let admin = self.inner.xmpp.get_mod::<mods::Admin>();
        let server = self
            .inner
            .xmpp
            .connected_jid()
            .map(|jid| BareJid::from_parts(None, &jid.domain()))
            .ok_or_else(|| anyhow::format_err!("Not connected"))?;
        Ok(admin
            .continue_session(Jid::from(server), node, sessionid, action, form)
            .await?)
    }

    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn session_context(&self) -> SessionContext {
        SessionContext {
            client: self.inner.xmpp.clone(),
            store: self.inner.store.clone(),
            bus: self.inner.bus.clone(),
            mam: self.inner.mam.clone(),
            generation: self.inner.manager.generation_counter(),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_presence_event(
    presence: &Arc<Mutex<PresenceMachine>>,
    projection: &Arc<Mutex<PresenceProjection>>,
    manager: &ConnectionManager,
    xmpp: &XmppClient,
    store: &Store,
    bus: &broadcast::Sender<ClientEvent>,
    event: PresenceEvent,
) {
    let Some(snapshot) = presence.lock().apply(event) else {
        return;
    };

    let state = manager.state();
    let roster = xmpp.get_mod::<mods::Roster>();
    projection.lock().observe(&snapshot, &state, &roster);

    let event = ClientEvent::UserPresenceChanged(UserPresenceChangedEvent { snapshot });
    store.push_event(event.clone());
    let _ = bus.send(event);
}
