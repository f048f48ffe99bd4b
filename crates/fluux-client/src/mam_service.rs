// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use chrono::Utc;
use futures::stream::{self, StreamExt};
use jid::BareJid;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use fluux_xmpp::mods::mam::ArchivedMessage;
use fluux_xmpp::mods::Mam;
use fluux_xmpp::Client;

use crate::domain::message::{project_message, ProjectionContext};
use crate::domain::{ConversationId, MessageKind, MessageUpdate};
use crate::event::{ClientEvent, MamSyncCompletedEvent, SyncDirection};
use crate::store::{ApplyOutcome, Store};

/// How many conversations fetch their sidebar preview concurrently.
const PREVIEW_CONCURRENCY: usize = 3;
const PAGE_SIZE: usize = 50;

/// Archive synchronization: lazy catch-up for conversations and rooms,
/// backward pagination, and sidebar previews.
#[derive(Clone)]
pub struct MamService {
    client: Client,
    store: Store,
    bus: broadcast::Sender<ClientEvent>,
}

impl MamService {
    pub(crate) fn new(client: Client, store: Store, bus: broadcast::Sender<ClientEvent>) -> Self {
        MamService { client, store, bus }
    }

    /// Brings a conversation up to live. With a known newest stanza-id
    /// this is a forward query; otherwise the newest page is fetched.
    /// Self-guards against concurrent and redundant runs.
    pub async fn catch_up(&self, conversation: &ConversationId) {
        if !self.begin_loading(conversation, false) {
            return;
        }

        let newest = self.newest_stanza_id(conversation);
        let direction = if newest.is_some() {
            SyncDirection::Forward
        } else {
            SyncDirection::Backward
        };

        let result = match conversation {
            ConversationId::Chat(jid) => {
                let mam = self.client.get_mod::<Mam>();
                mam.query_chat(jid, None::<&str>, newest.as_deref(), PAGE_SIZE).await
            }
            ConversationId::Room(jid) => {
                let mam = self.client.get_mod::<Mam>();
                mam.query_room(jid, None::<&str>, newest.as_deref(), PAGE_SIZE).await
            }
        };

        match result {
            Ok((messages, fin)) => {
                let inserted = self.apply_archived(conversation, &messages);
                self.finish_loading(conversation, |state| {
                    state.has_queried = true;
                    state.is_caught_up_to_live = true;
                    if direction == SyncDirection::Backward {
                        state.is_history_complete = fin.complete;
                        state.oldest_fetched_id = first_archive_id(&messages);
                    }
                });
                self.emit_sync_completed(conversation, direction, inserted, fin.complete);
            }
            Err(err) => {
                warn!("Archive catch-up for {conversation:?} failed: {err}");
                self.finish_loading(conversation, |state| {
                    state.error = Some(err.to_string());
                });
            }
        }
    }

    /// Loads one page of older history. The cursor is the oldest
    /// stanza-id currently in memory; `oldest_fetched_id` is
    /// deliberately not consulted (it can drift after an initial
    /// fetch-new query and would leave a gap).
    pub async fn load_older(&self, conversation: &ConversationId) {
        if self.is_history_complete(conversation) {
            debug!("History already complete for {conversation:?}");
            return;
        }
        if !self.begin_loading(conversation, true) {
            return;
        }

        let before = self.oldest_stanza_id(conversation);

        let result = match conversation {
            ConversationId::Chat(jid) => {
                let mam = self.client.get_mod::<Mam>();
                mam.query_chat(jid, before.as_deref(), None::<&str>, PAGE_SIZE).await
            }
            ConversationId::Room(jid) => {
                let mam = self.client.get_mod::<Mam>();
                mam.query_room(jid, before.as_deref(), None::<&str>, PAGE_SIZE).await
            }
        };

        match result {
            Ok((messages, fin)) => {
                let inserted = self.apply_archived(conversation, &messages);
                self.finish_loading(conversation, |state| {
                    state.has_queried = true;
                    state.is_history_complete = fin.complete;
                    state.oldest_fetched_id = first_archive_id(&messages);
                });
                self.emit_sync_completed(
                    conversation,
                    SyncDirection::Backward,
                    inserted,
                    fin.complete,
                );
            }
            Err(err) => {
                warn!("History page for {conversation:?} failed: {err}");
                self.finish_loading(conversation, |state| {
                    state.error = Some(err.to_string());
                });
            }
        }
    }

    /// Fetches the newest message of every known 1:1 conversation for
    /// the sidebar, respecting the concurrency cap.
    pub async fn refresh_previews(&self) {
        let conversations = self.store.conversation_ids();

        stream::iter(conversations)
            .map(|jid| {
                let service = self.clone();
                async move { service.fetch_chat_preview(&jid).await }
            })
            .buffer_unordered(PREVIEW_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;
    }

    async fn fetch_chat_preview(&self, jid: &BareJid) {
        let mam = self.client.get_mod::<Mam>();
        match mam.query_chat(jid, None::<&str>, None::<&str>, 1).await {
            Ok((messages, _)) => {
                self.apply_archived(&ConversationId::Chat(jid.clone()), &messages);
            }
            Err(err) => debug!("Preview fetch for {jid} failed: {err}"),
        }
    }

    /// One newest message for a room's sidebar preview.
    pub async fn fetch_room_preview(&self, jid: &BareJid) {
        let mam = self.client.get_mod::<Mam>();
        match mam.query_room(jid, None::<&str>, None::<&str>, 1).await {
            Ok((messages, _)) => {
                self.apply_archived(&ConversationId::Room(jid.clone()), &messages);
            }
            Err(err) => debug!("Room preview fetch for {jid} failed: {err}"),
        }
    }

    fn apply_archived(
        &self,
        conversation: &ConversationId,
        messages: &[ArchivedMessage],
    ) -> usize {
        let own_nick = match conversation {
            ConversationId::Chat(_) => None,
            ConversationId::Room(jid) => self.store.room(jid).and_then(|room| room.nickname),
        };
        let own_bare = self
            .client
            .connected_jid()
            .map(|jid| jid.to_bare());

        let mut inserted = 0;
        for archived in messages {
            let is_outgoing = match conversation {
                ConversationId::Chat(_) => {
                    let from = archived.message.from.as_ref().map(|from| from.to_bare());
                    from.is_some() && from == own_bare
                }
                ConversationId::Room(_) => {
                    let nick = archived
                        .message
                        .from
                        .as_ref()
                        .and_then(|from| from.resource())
                        .map(|resource| resource.to_string());
                    matches!((&nick, &own_nick), (Some(nick), Some(own)) if nick.eq_ignore_ascii_case(own))
                }
            };

            let Some(mut update) = project_message(
                &archived.message,
                &ProjectionContext {
                    kind: match conversation {
                        ConversationId::Chat(_) => MessageKind::Chat,
                        ConversationId::Room(_) => MessageKind::Groupchat,
                    },
                    is_outgoing,
                    force_delayed: true,
                    own_nick: own_nick.as_deref(),
                    now: Utc::now(),
                },
            ) else {
                continue;
            };

            // Archive entries know their stanza-id even when the
            // original message didn't carry one.
            if let MessageUpdate::New(message) = &mut update {
                if message.stanza_id.is_none() {
                    message.stanza_id = Some(archived.id.clone());
                    message.id = archived.id.clone();
                }
            }

            if let ApplyOutcome::Inserted(_) =
                self.store.apply_message_update(conversation, update)
            {
                inserted += 1;
            }
        }
        inserted
    }

    fn begin_loading(&self, conversation: &ConversationId, allow_caught_up: bool) -> bool {
        self.with_state(conversation, |state| {
            if state.is_loading {
                return false;
            }
            if !allow_caught_up && state.is_caught_up_to_live {
                return false;
            }
            state.is_loading = true;
            state.error = None;
            true
        })
    }

    fn finish_loading(
        &self,
        conversation: &ConversationId,
        f: impl FnOnce(&mut crate::domain::MamQueryState),
    ) {
        self.with_state(conversation, |state| {
            state.is_loading = false;
            f(state);
        });
    }

    fn with_state<R>(
        &self,
        conversation: &ConversationId,
        f: impl FnOnce(&mut crate::domain::MamQueryState) -> R,
    ) -> R {
        match conversation {
            ConversationId::Chat(jid) => self.store.with_conversation(jid, |c| f(&mut c.mam)),
            ConversationId::Room(jid) => self.store.with_room(jid, |room| f(&mut room.mam)),
        }
    }

    fn newest_stanza_id(&self, conversation: &ConversationId) -> Option<String> {
        match conversation {
            ConversationId::Chat(jid) => self
                .store
                .conversation(jid)
                .and_then(|c| c.newest_stanza_id_in_memory().map(str::to_string)),
            ConversationId::Room(jid) => self
                .store
                .room(jid)
                .and_then(|room| room.newest_stanza_id_in_memory().map(str::to_string)),
        }
    }

    fn oldest_stanza_id(&self, conversation: &ConversationId) -> Option<String> {
        match conversation {
            ConversationId::Chat(jid) => self
                .store
                .conversation(jid)
                .and_then(|c| c.oldest_stanza_id_in_memory().map(str::to_string)),
            ConversationId::Room(jid) => self
                .store
                .room(jid)
                .and_then(|room| room.oldest_stanza_id_in_memory().map(str::to_string)),
        }
    }

    fn is_history_complete(&self, conversation: &ConversationId) -> bool {
        match conversation {
            ConversationId::Chat(jid) => self
                .store
                .conversation(jid)
                .map(|c| c.mam.is_history_complete)
                .unwrap_or(false),
            ConversationId::Room(jid) => self
                .store
                .room(jid)
                .map(|room| room.mam.is_history_complete)
                .unwrap_or(false),
        }
    }

    fn emit_sync_completed(
        &self,
        conversation: &ConversationId,
        direction: SyncDirection,
        new_messages: usize,
        complete: bool,
    ) {
        let event = ClientEvent::MamSyncCompleted(MamSyncCompletedEvent {
            conversation: conversation.clone(),
            direction,
            new_messages,
            complete,
            at: Utc::now(),
        });
        self.store.push_event(event.clone());
        let _ = self.bus.send(event);
    }
}

fn first_archive_id(messages: &[ArchivedMessage]) -> Option<String> {
    messages.first().map(|archived| archived.id.clone())
}
