// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use minidom::Element;
use pretty_assertions::assert_eq;
use xmpp_parsers::message::MessageType;

use fluux_xmpp::stanza::message::Message;
use fluux_xmpp::test::ClientTestAdditions;
use fluux_xmpp::{jid, Client, SmState};

fn enabled(id: &str) -> Element {
    format!(r#"<enabled xmlns="urn:xmpp:sm:3" id="{id}" resume="true"/>"#)
        .parse()
        .unwrap()
}

fn chat_message(body: &str) -> Message {
    Message::new()
        .set_type(MessageType::Chat)
        .set_from(jid!("alice@fluux.io/desktop"))
        .set_body(body)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_enable_establishes_session_and_counts_inbound() -> Result<()> {
    let client = Client::connected_client().await?;

    client.connection.set_stanza_handler(move |stanza| {
        if stanza.name() == "enable" {
            vec![enabled("stream-1")]
        } else {
            vec![]
        }
    });

    let state = client.client.enable_sm().await?;
    assert_eq!(
        state,
        SmState {
            id: "stream-1".to_string(),
            inbound: 0
        }
    );

    client.connection.receive_stanza(chat_message("one")).await;
    client.connection.receive_stanza(chat_message("two")).await;

    assert_eq!(
        client.client.sm_state(),
        Some(SmState {
            id: "stream-1".to_string(),
            inbound: 2
        })
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_answers_ack_requests() -> Result<()> {
    let client = Client::connected_client().await?;

    client.connection.set_stanza_handler(move |stanza| {
        if stanza.name() == "enable" {
            vec![enabled("stream-1")]
        } else {
            vec![]
        }
    });

    client.client.enable_sm().await?;
    client.connection.receive_stanza(chat_message("one")).await;
    client
        .connection
        .receive_stanza(r#"<r xmlns="urn:xmpp:sm:3"/>"#.parse::<Element>().unwrap())
        .await;

    let ack = client
        .connection
        .sent_stanzas()
        .into_iter()
        .find(|stanza| stanza.name() == "a")
        .expect("Missing <a/> answer");
    assert_eq!(ack.attr("h"), Some("1"));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_resume_replays_unacked_stanzas() -> Result<()> {
    let client = Client::connected_client().await?;

    client.connection.set_stanza_handler(move |stanza| {
        if stanza.name() == "resume" {
            assert_eq!(stanza.attr("previd"), Some("stream-1"));
            assert_eq!(stanza.attr("h"), Some("5"));
            vec![
                r#"<resumed xmlns="urn:xmpp:sm:3" h="0" previd="stream-1"/>"#
                    .parse::<Element>()
                    .unwrap(),
            ]
        } else {
            vec![]
        }
    });

    let handled = client
        .client
        .resume_sm(SmState {
            id: "stream-1".to_string(),
            inbound: 5,
        })
        .await?;
    assert_eq!(handled, 0);

    // The restored counter keeps growing from where it left off.
    client.connection.receive_stanza(chat_message("six")).await;
    assert_eq!(
        client.client.sm_state(),
        Some(SmState {
            id: "stream-1".to_string(),
            inbound: 6
        })
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_failed_resume_clears_session() -> Result<()> {
    let client = Client::connected_client().await?;

    client.connection.set_stanza_handler(move |stanza| {
        if stanza.name() == "resume" {
            vec![r#"<failed xmlns="urn:xmpp:sm:3"/>"#.parse::<Element>().unwrap()]
        } else {
            vec![]
        }
    });

    let result = client
        .client
        .resume_sm(SmState {
            id: "stream-1".to_string(),
            inbound: 5,
        })
        .await;

    assert!(result.is_err());
    assert_eq!(client.client.sm_state(), None);

    Ok(())
}
