// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use minidom::Element;
use pretty_assertions::assert_eq;

use fluux_xmpp::test::ClientTestAdditions;
use fluux_xmpp::{bare, mods, Client};

fn archive_result(queryid: &str, archive_id: &str, body: &str) -> Element {
    format!(
        r#"<message xmlns="jabber:client" to="test@fluux.io">
            <result xmlns="urn:xmpp:mam:2" queryid="{queryid}" id="{archive_id}">
                <forwarded xmlns="urn:xmpp:forward:0">
                    <delay xmlns="urn:xmpp:delay" stamp="2024-01-15T10:30:00Z"/>
                    <message xmlns="jabber:client" from="alice@fluux.io/desktop" type="chat">
                        <body>{body}</body>
                    </message>
                </forwarded>
            </result>
        </message>"#
    )
    .parse()
    .unwrap()
}

fn fin_result(iq_id: &str, first: &str, last: &str, complete: bool) -> Element {
    format!(
        r#"<iq xmlns="jabber:client" id="{iq_id}" type="result">
            <fin xmlns="urn:xmpp:mam:2" complete="{complete}">
                <set xmlns="http://jabber.org/protocol/rsm">
                    <first>{first}</first>
                    <last>{last}</last>
                    <count>2</count>
                </set>
            </fin>
        </iq>"#
    )
    .parse()
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_collects_archive_page_until_fin() -> Result<()> {
    let client = Client::connected_client().await?;

    client.connection.set_stanza_handler(move |stanza| {
        if stanza.name() != "iq" {
            return vec![];
        }
        // The generated ids are deterministic: id-1 is the queryid,
        // id-2 the iq id.
        vec![
            archive_result("id-1", "arch-1", "first message"),
            archive_result("id-1", "arch-2", "second message"),
            fin_result("id-2", "arch-1", "arch-2", true),
        ]
    });

    let mam = client.client.get_mod::<mods::Mam>();
    let (messages, fin) = mam
        .query_chat(&bare!("alice@fluux.io"), None, None, Some(50))
        .await?;

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, "arch-1");
    assert_eq!(messages[0].message.body.as_deref(), Some("first message"));
    assert!(messages[0].message.delay.is_some());
    assert_eq!(messages[1].id, "arch-2");
    assert!(fin.complete);

    // Archive results must never surface as live chat events.
    let chat_events = client
        .domain_events()
        .into_iter()
        .filter(|event| matches!(event, fluux_xmpp::Event::Chat(_)))
        .count();
    assert_eq!(chat_events, 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_ignores_results_for_other_queries() -> Result<()> {
    let client = Client::connected_client().await?;

    client.connection.set_stanza_handler(move |stanza| {
        if stanza.name() != "iq" {
            return vec![];
        }
        vec![
            // Stale result from an earlier, abandoned query.
            archive_result("stale-query", "arch-0", "old noise"),
            archive_result("id-1", "arch-1", "wanted"),
            fin_result("id-2", "arch-1", "arch-1", false),
        ]
    });

    let mam = client.client.get_mod::<mods::Mam>();
    let (messages, fin) = mam
        .query_chat(&bare!("alice@fluux.io"), Some("arch-5"), None, Some(25))
        .await?;

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, "arch-1");
    assert!(!fin.complete);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_backward_page_uses_before_cursor() -> Result<()> {
    let client = Client::connected_client().await?;

    client.connection.set_stanza_handler(move |stanza| {
        if stanza.name() != "iq" {
            return vec![];
        }
        vec![fin_result("id-2", "", "", true)]
    });

    let mam = client.client.get_mod::<mods::Mam>();
    let _ = mam
        .query_room(&bare!("room@muc.fluux.io"), Some("oldest-in-memory"), None, Some(30))
        .await?;

    let sent = client.connection.sent_stanzas();
    let query = sent[0]
        .get_child("query", "urn:xmpp:mam:2")
        .expect("Missing MAM query");
    let set = query
        .get_child("set", "http://jabber.org/protocol/rsm")
        .expect("Missing RSM set");

    assert_eq!(
        set.get_child("before", "http://jabber.org/protocol/rsm")
            .map(|el| el.text()),
        Some("oldest-in-memory".to_string())
    );
    assert_eq!(sent[0].attr("to"), Some("room@muc.fluux.io"));

    Ok(())
}
