// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::HashMap;
use std::sync::Arc;

use jid::BareJid;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::MessageCache;
use crate::connection::ConnectionStatus;
use crate::domain::{ConversationId, MessageUpdate};
use crate::mam_service::MamService;
use crate::store::Store;

/// How many cached messages are loaded when a conversation opens.
const CACHE_LOAD_LIMIT: usize = 100;

/// Watches store selectors and turns state changes into work: cache
/// loads, archive catch-ups and sidebar previews. No other component
/// polls the store.
pub struct SideEffectDriver {
    store: Store,
    mam: MamService,
    cache: Option<Arc<dyn MessageCache>>,
}

impl SideEffectDriver {
    pub(crate) fn new(
        store: Store,
        mam: MamService,
        cache: Option<Arc<dyn MessageCache>>,
    ) -> Self {
        SideEffectDriver { store, mam, cache }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut active_rx = self.store.subscribe_active_conversation();
        let mut status_rx = self.store.subscribe_connection_status();
        let mut rooms_rx = self.store.subscribe_rooms();

        let mut last_status = status_rx.borrow().clone();
        // Last seen `supports_mam` per room, to spot false→true edges.
        let mut mam_support_seen: HashMap<BareJid, Option<bool>> = HashMap::new();

        loop {
            tokio::select! {
                changed = active_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let active = active_rx.borrow_and_update().clone();
                    if let Some(active) = active {
                        self.on_conversation_activated(&active).await;
                    }
                }
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = status_rx.borrow_and_update().clone();
                    if status == ConnectionStatus::Online && last_status != ConnectionStatus::Online {
                        self.on_back_online().await;
                    }
                    last_status = status;
                }
                changed = rooms_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    rooms_rx.borrow_and_update();
                    self.on_rooms_changed(&mut mam_support_seen).await;
                }
            }
        }
    }

    /// Opening a conversation: load the cached tail, then catch up with
    /// the archive.
    async fn on_conversation_activated(&self, active: &ConversationId) {
        if let Some(cache) = &self.cache {
            let cached = cache.load_recent(active, CACHE_LOAD_LIMIT);
            if !cached.is_empty() {
                debug!("Loaded {} cached messages for {active:?}", cached.len());
            }
            for message in cached {
                self.store
                    .apply_message_update(active, MessageUpdate::New(message));
            }
        }

        if self.may_query(active) {
            self.mam.catch_up(active).await;
        }
    }

    /// Reconnected: every sync cursor is suspect. Reset them all and
    /// catch up the active conversation only; the rest follow lazily
    /// when opened.
    async fn on_back_online(&self) {
        self.store.reset_all_mam_states();

        if let Some(active) = self.store.active_conversation() {
            if self.may_query(&active) {
                self.mam.catch_up(&active).await;
            }
        }
    }

    async fn on_rooms_changed(&self, mam_support_seen: &mut HashMap<BareJid, Option<bool>>) {
        let active = self.store.active_conversation();

        for jid in self.store.room_ids() {
            let Some(room) = self.store.room(&jid) else {
                continue;
            };

            let previous = mam_support_seen
                .insert(jid.clone(), room.supports_mam)
                .flatten();

            // Quick-Chat archives are ephemeral; never query them.
            if room.is_quick_chat {
                continue;
            }

            // The active room gained MAM support → catch up now.
            let gained_mam =
                previous != Some(true) && room.supports_mam == Some(true);
            let is_active = active == Some(ConversationId::Room(jid.clone()));

            if gained_mam && is_active {
                self.mam.catch_up(&ConversationId::Room(jid.clone())).await;
                continue;
            }

            // Join completed → fetch the sidebar preview once.
            if room.joined
                && !room.is_joining
                && room.supports_mam == Some(true)
                && !room.preview_fetched
            {
                // Mark first so a re-entrant watch tick doesn't fetch
                // twice.
                self.store.with_room(&jid, |room| room.preview_fetched = true);
                self.mam.fetch_room_preview(&jid).await;
            }
        }
    }

    fn may_query(&self, conversation: &ConversationId) -> bool {
        match conversation {
            ConversationId::Chat(_) => self
                .store
                .server_info()
                .map(|info| info.supports_mam)
                .unwrap_or(false),
            ConversationId::Room(jid) => self
                .store
                .room(jid)
                .map(|room| !room.is_quick_chat && room.supports_mam == Some(true))
                .unwrap_or(false),
        }
    }
}
