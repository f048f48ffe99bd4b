// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use minidom::Element;
use pretty_assertions::assert_eq;
use xmpp_parsers::message::MessageType;
use xmpp_parsers::muc::user::{Affiliation, Item, MucUser, Role, Status};
use xmpp_parsers::presence::{self, Presence};

use fluux_xmpp::stanza::message::Message;
use fluux_xmpp::stanza::muc::{DirectInvite, Invite, MediatedInvite};
use fluux_xmpp::test::ClientTestAdditions;
use fluux_xmpp::{bare, full, jid, mods, Client, Event};

fn occupant_presence(from: &str, affiliation: Affiliation, role: Role, is_self: bool) -> Presence {
    let mut user = MucUser::new().with_items(vec![Item::new(affiliation, role)]);
    if is_self {
        user = user.with_statuses(vec![Status::SelfPresence]);
    }
    Presence::new(presence::Type::None)
        .with_from(jid!(from))
        .with_payloads(vec![user.into()])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_join_room_collects_occupants_history_and_subject() -> Result<()> {
    let client = Client::connected_client().await?;

    client.connection.set_stanza_handler(move |stanza| {
        if stanza.name() != "presence" {
            return vec![];
        }

        let history: Element = Message::new()
            .set_type(MessageType::Groupchat)
            .set_from(jid!("room@muc.fluux.io/alice"))
            .set_body("earlier message")
            .into();

        let subject: Element = Message::new()
            .set_type(MessageType::Groupchat)
            .set_from(jid!("room@muc.fluux.io"))
            .set_subject("Weekly sync")
            .into();

        vec![
            occupant_presence(
                "room@muc.fluux.io/alice",
                Affiliation::Admin,
                Role::Moderator,
                false,
            )
            .into(),
            occupant_presence(
                "room@muc.fluux.io/me",
                Affiliation::Member,
                Role::Participant,
                true,
            )
            .into(),
            history,
            subject,
        ]
    });

    let muc = client.client.get_mod::<mods::Muc>();
    let occupancy = muc
        .join_room(&full!("room@muc.fluux.io/me"), None)
        .await?;

    assert_eq!(occupancy.presences.len(), 1);
    assert_eq!(occupancy.message_history.len(), 1);
    assert_eq!(occupancy.subject.as_deref(), Some("Weekly sync"));
    assert!(occupancy.user.status.contains(&Status::SelfPresence));

    // The join presence itself must have requested zero in-band history.
    let sent = client.connection.sent_stanzas();
    let join = &sent[0];
    let x = join
        .get_child("x", "http://jabber.org/protocol/muc")
        .expect("Missing muc payload");
    assert_eq!(
        x.get_child("history", "http://jabber.org/protocol/muc")
            .and_then(|history| history.attr("maxstanzas")),
        Some("0")
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_join_room_recognizes_self_presence_without_status_code() -> Result<()> {
    let client = Client::connected_client().await?;

    // A non-conformant server omitting status 110; the nick match must
    // close the join anyway.
    client.connection.set_stanza_handler(move |stanza| {
        if stanza.name() != "presence" {
            return vec![];
        }

        let subject: Element = Message::new()
            .set_type(MessageType::Groupchat)
            .set_from(jid!("room@muc.fluux.io"))
            .set_subject("")
            .into();

        vec![
            occupant_presence(
                "room@muc.fluux.io/me",
                Affiliation::Member,
                Role::Participant,
                false,
            )
            .into(),
            subject,
        ]
    });

    let muc = client.client.get_mod::<mods::Muc>();
    let occupancy = muc
        .join_room(&full!("room@muc.fluux.io/me"), None)
        .await?;

    assert_eq!(occupancy.subject, None);
    assert_eq!(occupancy.presences.len(), 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_emits_room_message_event_with_occupant_nick() -> Result<()> {
    let client = Client::connected_client().await?;

    let message = Message::new()
        .set_type(MessageType::Groupchat)
        .set_from(jid!("room@muc.fluux.io/alice"))
        .set_body("hi all");

    client.connection.receive_stanza(message.clone()).await;

    assert_eq!(
        client.domain_events(),
        vec![Event::Muc(mods::muc::Event::Message(message))]
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_emits_subject_event_for_bodyless_subject() -> Result<()> {
    let client = Client::connected_client().await?;

    client
        .connection
        .receive_stanza(
            Message::new()
                .set_type(MessageType::Groupchat)
                .set_from(jid!("room@muc.fluux.io"))
                .set_subject("New subject"),
        )
        .await;

    assert_eq!(
        client.domain_events(),
        vec![Event::Muc(mods::muc::Event::Subject {
            room: bare!("room@muc.fluux.io"),
            subject: Some("New subject".to_string()),
        })]
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_emits_occupant_presence_event() -> Result<()> {
    let client = Client::connected_client().await?;

    let presence = occupant_presence(
        "room@muc.fluux.io/bob",
        Affiliation::None,
        Role::Participant,
        false,
    );
    client.connection.receive_stanza(presence.clone()).await;

    assert_eq!(
        client.domain_events(),
        vec![Event::Muc(mods::muc::Event::OccupantPresence(presence))]
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_emits_invite_events() -> Result<()> {
    let client = Client::connected_client().await?;

    client
        .connection
        .receive_stanza(Message::new().set_from(jid!("friend@fluux.io")).set_direct_invite(
            DirectInvite {
                jid: bare!("room@muc.fluux.io"),
                password: None,
                reason: Some("join us".to_string()),
            },
        ))
        .await;

    client
        .connection
        .receive_stanza(
            Message::new()
                .set_from(jid!("room@muc.fluux.io"))
                .set_mediated_invite(MediatedInvite {
                    invites: vec![Invite {
                        from: Some(jid!("friend@fluux.io")),
                        to: None,
                        reason: None,
                    }],
                    password: None,
                }),
        )
        .await;

    let events = client.domain_events();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0],
        Event::Muc(mods::muc::Event::DirectInvite { .. })
    ));
    assert!(matches!(
        events[1],
        Event::Muc(mods::muc::Event::MediatedInvite { .. })
    ));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_suppresses_own_composing_echo_at_consumer_level() -> Result<()> {
    let client = Client::connected_client().await?;

    // The module reports every occupant's chat state including our own
    // nick; the runtime filters its own nickname case-insensitively.
    client
        .connection
        .receive_stanza(
            Message::new()
                .set_type(MessageType::Groupchat)
                .set_from(jid!("room@muc.fluux.io/Me"))
                .set_chat_state(Some(xmpp_parsers::chatstates::ChatState::Composing)),
        )
        .await;

    assert_eq!(
        client.domain_events(),
        vec![Event::Muc(mods::muc::Event::ChatStateChanged {
            room: bare!("room@muc.fluux.io"),
            nick: "Me".to_string(),
            chat_state: xmpp_parsers::chatstates::ChatState::Composing,
        })]
    );

    Ok(())
}
