// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use jid::BareJid;
use tokio::sync::broadcast;
use tracing::{info, warn};

use fluux_xmpp::mods;
use fluux_xmpp::stanza::bookmark::ConferenceBookmark;
use fluux_xmpp::Client;

use crate::domain::Occupant;
use crate::event::{ClientEvent, RoomJoinedEvent, ServerInfoUpdatedEvent};
use crate::mam_service::MamService;
use crate::store::Store;

/// Everything the post-connect workflow needs. Cheap to clone; handed
/// to the spawned task.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub client: Client,
    pub store: Store,
    pub bus: broadcast::Sender<ClientEvent>,
    pub mam: MamService,
    pub generation: Arc<AtomicU64>,
}

impl SessionContext {
    /// True once a newer connection superseded the one this workflow
    /// belongs to. Checked after every await; a stale workflow stops
    /// writing immediately.
    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    fn emit(&self, event: ClientEvent) {
        self.store.push_event(event.clone());
        let _ = self.bus.send(event);
    }
}

/// The post-connect workflow. SM-resumed sessions skip the whole
/// bootstrap: the server replays what we missed, and sync state was
/// already reset when the status flipped back to online.
pub(crate) async fn handle_connection_success(
    ctx: SessionContext,
    resumed: bool,
    generation: u64,
) {
    if resumed {
        info!("Session resumed; skipping bootstrap workflow");
        return;
    }

    if ctx.is_stale(generation) {
        return;
    }

    // Carbons first so no live message slips by uncopied.
    let chat = ctx.client.get_mod::<mods::Chat>();
    if let Err(err) = chat.set_message_carbons_enabled(true) {
        warn!("Failed to enable carbons: {err}");
    }

    // Contact list.
    let roster = ctx.client.get_mod::<mods::Roster>();
    match roster.load_roster().await {
        Ok(items) => {
            if ctx.is_stale(generation) {
                return;
            }
            for item in items {
                ctx.store.with_contact(&item.jid, |contact| {
                    contact.name = item.name.clone();
                    contact.subscription = item.subscription.clone();
                });
            }
            ctx.emit(ClientEvent::RosterUpdated(crate::event::RosterUpdatedEvent {}));
        }
        Err(err) => warn!("Failed to load roster: {err}"),
    }
    if ctx.is_stale(generation) {
        return;
    }

    // Server features drive MAM, uploads and the MUC service.
    let disco = ctx.client.get_mod::<mods::Disco>();
    match disco.fetch_server_info().await {
        Ok(info) => {
            if ctx.is_stale(generation) {
                return;
            }
            ctx.store.set_server_info(info);
            ctx.emit(ClientEvent::ServerInfoUpdated(ServerInfoUpdatedEvent {}));
        }
        Err(err) => warn!("Failed to fetch server info: {err}"),
    }
    if ctx.is_stale(generation) {
        return;
    }

    // Blocklist before messages are projected, so blocked traffic is
    // filtered from the first stanza on.
    let blocking = ctx.client.get_mod::<mods::Blocking>();
    match blocking.load_blocklist().await {
        Ok(jids) => {
            if ctx.is_stale(generation) {
                return;
            }
            ctx.store
                .set_blocklist(jids.into_iter().map(|jid| jid.to_bare()));
        }
        Err(err) => warn!("Failed to load blocklist: {err}"),
    }
    if ctx.is_stale(generation) {
        return;
    }

    // Bookmarks, then the room rejoin pass: autojoin bookmarks plus
    // every room we were in before the connection dropped, deduped.
    let bookmark = ctx.client.get_mod::<mods::Bookmark>();
    let bookmarks = match bookmark.load_bookmarks().await {
        Ok(bookmarks) => {
            if ctx.is_stale(generation) {
                return;
            }
            apply_bookmarks(&ctx, &bookmarks);
            bookmarks
        }
        Err(err) => {
            warn!("Failed to load bookmarks: {err}");
            vec![]
        }
    };

    let mut to_join: Vec<BareJid> = bookmarks
        .iter()
        .filter(|bookmark| bookmark.autojoin)
        .map(|bookmark| bookmark.jid.clone())
        .collect();
    for jid in ctx.store.joined_room_ids() {
        if !to_join.contains(&jid) {
            to_join.push(jid);
        }
    }

    for jid in to_join {
        if ctx.is_stale(generation) {
            return;
        }
        if let Err(err) = join_room(&ctx, &jid, None, None).await {
            warn!("Failed to join room {jid}: {err}");
        }
    }

    if ctx.is_stale(generation) {
        return;
    }

    // Sidebar previews for every known conversation ("Refreshing
    // previews" background task, capped concurrency).
    ctx.mam.refresh_previews().await;
}

pub(crate) fn apply_bookmarks(ctx: &SessionContext, bookmarks: &[ConferenceBookmark]) {
    for bookmark in bookmarks {
        ctx.store.with_room(&bookmark.jid, |room| {
            room.is_bookmarked = true;
            room.autojoin = bookmark.autojoin;
            room.name = bookmark.name.clone().or_else(|| room.name.clone());
            room.password = bookmark.password.clone();
            if room.nickname.is_none() {
                room.nickname = bookmark.nick.clone();
            }
        });
    }
    ctx.store.set_bookmarks(bookmarks.to_vec());
}

/// Joins a room and projects the handshake result into the store. Also
/// discovers the room's MAM support, falling back to the service-level
/// flag when room disco fails.
pub(crate) async fn join_room(
    ctx: &SessionContext,
    jid: &BareJid,
    nickname: Option<&str>,
    password: Option<&str>,
) -> anyhow::Result<()> {
    let (nick, password) = ctx.store.with_room(jid, |room| {
        if let Some(nickname) = nickname {
            room.nickname = Some(nickname.to_string());
        }
        if let Some(password) = password {
            room.password = Some(password.to_string());
        }
        room.is_joining = true;
        (
            room.nickname.clone().unwrap_or_else(|| "fluux".to_string()),
            room.password.clone(),
        )
    });

    let resource = jid::ResourcePart::new(&nick)
        .map_err(|err| anyhow::format_err!("Invalid nickname '{nick}': {err}"))?;
    let room_full = jid.with_resource(&resource);

    let muc = ctx.client.get_mod::<mods::Muc>();
    let occupancy = match muc.join_room(&room_full, password.as_deref()).await {
        Ok(occupancy) => occupancy,
        Err(err) => {
            ctx.store.with_room(jid, |room| room.is_joining = false);
            return Err(err.into());
        }
    };

    let item = occupancy.user.items.first();
    let self_occupant = Occupant {
        nick: nick.clone(),
        jid: item
            .and_then(|item| item.jid.as_ref())
            .map(|jid| jid.to_bare()),
        affiliation: item
            .map(|item| item.affiliation.clone())
            .unwrap_or(xmpp_parsers::muc::user::Affiliation::None),
        role: item
            .map(|item| item.role.clone())
            .unwrap_or(xmpp_parsers::muc::user::Role::None),
        show: None,
        avatar_hash: None,
    };

    ctx.store.with_room(jid, |room| {
        room.mark_joined(self_occupant);
        room.subject = occupancy.subject.clone();

        for presence in &occupancy.presences {
            let Some(from) = presence
                .from
                .as_ref()
                .and_then(|from| from.clone().try_into_full().ok())
            else {
                continue;
            };
            let user = presence
                .payloads
                .iter()
                .find(|payload| payload.is("x", fluux_xmpp::ns::MUC_USER))
                .and_then(|payload| {
                    xmpp_parsers::muc::user::MucUser::try_from(payload.clone()).ok()
                });
            let item = user.as_ref().and_then(|user| user.items.first());

            room.apply_occupant(
                Occupant {
                    nick: from.resource().to_string(),
                    jid: item
                        .and_then(|item| item.jid.as_ref())
                        .map(|jid| jid.to_bare()),
                    affiliation: item
                        .map(|item| item.affiliation.clone())
                        .unwrap_or(xmpp_parsers::muc::user::Affiliation::None),
                    role: item
                        .map(|item| item.role.clone())
                        .unwrap_or(xmpp_parsers::muc::user::Role::None),
                    show: presence.show.clone(),
                    avatar_hash: None,
                },
                true,
            );
        }
    });

    ctx.emit(ClientEvent::RoomJoined(RoomJoinedEvent { room: jid.clone() }));

    // Room-level MAM discovery; service-level flag as fallback.
    let supports_mam = match muc.query_room_info(jid).await {
        Ok(info) => info
            .features
            .iter()
            .any(|feature| feature.var == fluux_xmpp::ns::MAM),
        Err(err) => {
            warn!("Room disco for {jid} failed, using service-level MAM flag: {err}");
            ctx.store
                .server_info()
                .map(|info| info.supports_mam)
                .unwrap_or(false)
        }
    };
    ctx.store
        .with_room(jid, |room| room.supports_mam = Some(supports_mam));

    Ok(())
}
