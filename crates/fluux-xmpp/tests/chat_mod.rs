// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use pretty_assertions::assert_eq;
use xmpp_parsers::carbons;
use xmpp_parsers::chatstates::ChatState;
use xmpp_parsers::forwarding::Forwarded;
use xmpp_parsers::message::MessageType;

use fluux_xmpp::stanza::message::{Fallback, Message};
use fluux_xmpp::test::{BareJidTestAdditions, ClientTestAdditions};
use fluux_xmpp::{bare, jid, mods, Client, Event};
use jid::BareJid;

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_sends_message_event() -> Result<()> {
    let client = Client::connected_client().await?;

    let message = Message::new()
        .set_type(MessageType::Chat)
        .set_from(jid!("sender@fluux.io/desktop"))
        .set_body("Hello World");

    client.connection.receive_stanza(message.clone()).await;

    assert_eq!(
        client.domain_events(),
        vec![Event::Chat(mods::chat::Event::Message(message))]
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_does_not_send_message_event_for_archived_message() -> Result<()> {
    let client = Client::connected_client().await?;

    let message = r#"<message xmlns="jabber:client" to="test@fluux.io">
        <result xmlns="urn:xmpp:mam:2" id="28482-98726-73623" queryid="f27">
            <forwarded xmlns="urn:xmpp:forward:0">
                <message xmlns="jabber:client" from="sender@fluux.io/desktop" type="chat">
                    <body>Hello World</body>
                </message>
            </forwarded>
        </result>
    </message>"#
        .parse::<minidom::Element>()
        .unwrap();

    client.connection.receive_stanza(message).await;
    assert_eq!(client.domain_events(), vec![]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_sends_received_carbon_event() -> Result<()> {
    let client = Client::connected_client().await?;

    let inner = Message::new()
        .set_type(MessageType::Chat)
        .set_id("nested-msg-id".into())
        .set_from(jid!("sender@fluux.io/desktop"))
        .set_body("Hello World");

    let carbon = carbons::Received {
        forwarded: Forwarded {
            delay: None,
            message: inner.clone().into(),
        },
    };

    let wrapper = Message::new()
        .set_from(BareJid::ours())
        .set_type(MessageType::Chat)
        .set_received_carbon(carbon);

    client.connection.receive_stanza(wrapper).await;

    assert_eq!(
        client.domain_events(),
        vec![Event::Chat(mods::chat::Event::Carbon(
            mods::chat::Carbon::Received(inner)
        ))]
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_ignores_carbon_from_spoofed_sender() -> Result<()> {
    let client = Client::connected_client().await?;

    let carbon = carbons::Received {
        forwarded: Forwarded {
            delay: None,
            message: Message::new()
                .set_type(MessageType::Chat)
                .set_id("nested-msg-id".into())
                .set_body("Gotcha")
                .into(),
        },
    };

    let wrapper = Message::new()
        .set_from(bare!("spoof@fluux.io"))
        .set_type(MessageType::Chat)
        .set_received_carbon(carbon);

    client.connection.receive_stanza(wrapper).await;
    assert_eq!(client.domain_events(), vec![]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_sends_chat_state_event_but_not_for_carbons() -> Result<()> {
    let client = Client::connected_client().await?;

    client
        .connection
        .receive_stanza(
            Message::new()
                .set_type(MessageType::Chat)
                .set_from(jid!("sender@fluux.io/desktop"))
                .set_chat_state(Some(ChatState::Composing)),
        )
        .await;

    assert_eq!(
        client.domain_events(),
        vec![Event::Chat(mods::chat::Event::ChatStateChanged {
            from: jid!("sender@fluux.io/desktop"),
            chat_state: ChatState::Composing,
            message_type: MessageType::Chat,
        })]
    );

    // A carbon-wrapped chat state would echo our own typing back.
    let carbon_wrapper = Message::new()
        .set_from(BareJid::ours())
        .set_type(MessageType::Chat)
        .set_sent_carbon(carbons::Sent {
            forwarded: Forwarded {
                delay: None,
                message: Message::new()
                    .set_type(MessageType::Chat)
                    .set_from(jid!("test@fluux.io/other"))
                    .set_chat_state(Some(ChatState::Composing))
                    .into(),
            },
        });

    client.sent_events.write().clear();
    client.connection.receive_stanza(carbon_wrapper).await;

    let typing_events = client
        .domain_events()
        .into_iter()
        .filter(|event| {
            matches!(
                event,
                Event::Chat(mods::chat::Event::ChatStateChanged { .. })
            )
        })
        .count();
    assert_eq!(typing_events, 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_send_message_with_attachment_keeps_user_text() -> Result<()> {
    let client = Client::connected_client().await?;

    let chat = client.client.get_mod::<mods::Chat>();
    chat.send_message(
        jid!("recv@fluux.io"),
        "Look at this",
        &MessageType::Chat,
        None,
        vec![],
        Some(mods::chat::Attachment {
            url: "https://upload.fluux.io/abc/cat.png".to_string(),
            media_type: Some("image/png".to_string()),
            name: Some("cat.png".to_string()),
            size: Some(1024),
            thumbnail: None,
        }),
    )?;

    let sent = client.connection.sent_stanzas();
    assert_eq!(sent.len(), 1);

    let message = Message::try_from(sent[0].clone())?;
    assert_eq!(
        message.body.as_deref(),
        Some("Look at this\nhttps://upload.fluux.io/abc/cat.png")
    );
    assert_eq!(
        message.oob.as_ref().map(|oob| oob.url.as_str()),
        Some("https://upload.fluux.io/abc/cat.png")
    );

    // The fallback range must cover only the URL tail, not the user's
    // text.
    let fallback = message
        .fallback_for("jabber:x:oob")
        .expect("Missing OOB fallback");
    let body = message.body.as_deref().unwrap();
    let url_start = body.chars().count() - "https://upload.fluux.io/abc/cat.png".chars().count();
    assert_eq!(fallback.bodies[0].start, Some(url_start));
    assert_eq!(fallback.bodies[0].end, Some(body.chars().count()));
    assert!(url_start > 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_send_correction_marks_prefix_as_fallback() -> Result<()> {
    let client = Client::connected_client().await?;

    let chat = client.client.get_mod::<mods::Chat>();
    chat.send_correction(
        "orig-1".into(),
        jid!("recv@fluux.io"),
        "Fixed text",
        &MessageType::Chat,
        None,
    )?;

    let sent = client.connection.sent_stanzas();
    assert_eq!(sent.len(), 1);

    let message = Message::try_from(sent[0].clone())?;
    assert_eq!(message.body.as_deref(), Some("[Corrected] Fixed text"));
    assert_eq!(message.replace, Some("orig-1".into()));

    let fallback: &Fallback = message
        .fallback_for("urn:xmpp:message-correct:0")
        .expect("Missing correction fallback");
    assert_eq!(fallback.bodies[0].start, Some(0));
    assert_eq!(fallback.bodies[0].end, Some("[Corrected] ".chars().count()));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_send_reaction_replaces_emoji_set() -> Result<()> {
    let client = Client::connected_client().await?;

    let chat = client.client.get_mod::<mods::Chat>();
    chat.react_to_message(
        "msg-1".into(),
        jid!("recv@fluux.io"),
        vec!["👍".to_string(), "🎉".to_string()],
        &MessageType::Chat,
    )?;

    let sent = client.connection.sent_stanzas();
    let message = Message::try_from(sent[0].clone())?;
    let reactions = message.reactions.expect("Missing reactions");

    assert_eq!(reactions.id, "msg-1");
    assert_eq!(
        reactions
            .reactions
            .iter()
            .map(|r| r.emoji.as_str())
            .collect::<Vec<_>>(),
        vec!["👍", "🎉"]
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_retraction_carries_tombstone_body() -> Result<()> {
    let client = Client::connected_client().await?;

    let chat = client.client.get_mod::<mods::Chat>();
    chat.retract_message("msg-1".into(), jid!("recv@fluux.io"), &MessageType::Chat)?;

    let sent = client.connection.sent_stanzas();
    let message = Message::try_from(sent[0].clone())?;

    assert_eq!(
        message.retract.map(|retract| retract.id),
        Some("msg-1".into())
    );
    assert!(message.body.is_some());
    assert!(message
        .fallback_for("urn:xmpp:message-retract:1")
        .is_some());

    Ok(())
}
