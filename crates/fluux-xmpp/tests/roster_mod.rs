// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use minidom::Element;
use pretty_assertions::assert_eq;
use xmpp_parsers::presence::{self, Presence, Show};

use fluux_xmpp::test::ClientTestAdditions;
use fluux_xmpp::{bare, jid, mods, Client, Event};

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_loads_roster() -> Result<()> {
    let client = Client::connected_client().await?;

    client.connection.set_stanza_handler(move |stanza| {
        if stanza.name() != "iq" {
            return vec![];
        }
        vec![r#"<iq xmlns="jabber:client" id="id-1" type="result">
                <query xmlns="jabber:iq:roster">
                    <item jid="alice@fluux.io" name="Alice" subscription="both"/>
                    <item jid="bob@fluux.io" subscription="to"/>
                </query>
            </iq>"#
            .parse::<Element>()
            .unwrap()]
    });

    let roster = client.client.get_mod::<mods::Roster>();
    let items = roster.load_roster().await?;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].jid, bare!("alice@fluux.io"));
    assert_eq!(items[0].name.as_deref(), Some("Alice"));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_emits_subscription_request_event() -> Result<()> {
    let client = Client::connected_client().await?;

    let mut presence =
        Presence::new(presence::Type::Subscribe).with_from(jid!("stranger@fluux.io"));
    presence.set_status("", "Hi, it's me");
    client.connection.receive_stanza(presence).await;

    assert_eq!(
        client.domain_events(),
        vec![Event::Roster(mods::roster::Event::SubscriptionRequest {
            from: bare!("stranger@fluux.io"),
            status: Some("Hi, it's me".to_string()),
        })]
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_emits_presence_changed_event() -> Result<()> {
    let client = Client::connected_client().await?;

    let presence = Presence::new(presence::Type::None)
        .with_from(jid!("alice@fluux.io/phone"))
        .with_show(Show::Away);
    client.connection.receive_stanza(presence.clone()).await;

    assert_eq!(
        client.domain_events(),
        vec![Event::Roster(mods::roster::Event::PresenceChanged {
            from: jid!("alice@fluux.io/phone"),
            presence,
        })]
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_acks_roster_push_and_emits_event() -> Result<()> {
    let client = Client::connected_client().await?;

    client
        .connection
        .receive_stanza(
            r#"<iq xmlns="jabber:client" id="push-1" type="set">
                <query xmlns="jabber:iq:roster">
                    <item jid="carol@fluux.io" subscription="from"/>
                </query>
            </iq>"#
                .parse::<Element>()
                .unwrap(),
        )
        .await;

    let events = client.domain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Roster(mods::roster::Event::Push { item }) if item.jid == bare!("carol@fluux.io")
    ));

    // The push must be acked with an empty result.
    let ack = client
        .connection
        .sent_stanzas()
        .into_iter()
        .find(|stanza| stanza.name() == "iq" && stanza.attr("id") == Some("push-1"))
        .expect("Missing roster push ack");
    assert_eq!(ack.attr("type"), Some("result"));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_set_presence_broadcasts_show_and_status() -> Result<()> {
    let client = Client::connected_client().await?;

    let roster = client.client.get_mod::<mods::Roster>();
    roster.set_presence(Some(Show::Dnd), Some("In a meeting"))?;

    let sent = client.connection.sent_stanzas();
    assert_eq!(sent.len(), 1);

    let presence = Presence::try_from(sent[0].clone())?;
    assert_eq!(presence.show, Some(Show::Dnd));
    assert_eq!(presence.statuses.get(""), Some(&"In a meeting".to_string()));
    assert_eq!(presence.to, None);

    Ok(())
}
