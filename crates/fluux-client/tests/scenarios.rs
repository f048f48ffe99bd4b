// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! End-to-end scenarios against the mock transport: carbons, stream
//! resumption, bridge dedup, retraction rules, reply fallbacks and the
//! archive cursor.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use jid::{BareJid, FullJid};
use minidom::Element;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use fluux_client::domain::{ConversationId, Message, MessageKind};
use fluux_client::storage::InMemoryStorage;
use fluux_client::{ConnectionStatus, FluuxClient};
use fluux_xmpp::test::{Connection, Connector};

fn bare(s: &str) -> BareJid {
    BareJid::from_str(s).unwrap()
}

fn el(xml: &str) -> Element {
    xml.parse().unwrap()
}

/// Default fake-server behavior: accept SM enable/resume, answer MAM
/// queries with an empty complete page, and record resume attempts.
fn install_server(connection: &Connection, resumes: Arc<Mutex<Vec<(String, String)>>>) {
    connection.set_stanza_handler(move |stanza| {
        match stanza.name() {
            "enable" => {
                return vec![el(r#"<enabled xmlns="urn:xmpp:sm:3" id="S1" resume="true"/>"#)]
            }
            "resume" => {
                resumes.lock().push((
                    stanza.attr("previd").unwrap_or_default().to_string(),
                    stanza.attr("h").unwrap_or_default().to_string(),
                ));
                return vec![el(
                    r#"<resumed xmlns="urn:xmpp:sm:3" h="0" previd="S1"/>"#,
                )];
            }
            "iq" => {
                let is_mam = stanza
                    .get_child("query", "urn:xmpp:mam:2")
                    .is_some();
                if is_mam {
                    let id = stanza.attr("id").unwrap_or_default();
                    return vec![el(&format!(
                        r#"<iq xmlns="jabber:client" id="{id}" type="result">
                            <fin xmlns="urn:xmpp:mam:2" complete="true">
                                <set xmlns="http://jabber.org/protocol/rsm"><count>0</count></set>
                            </fin>
                        </iq>"#
                    ))];
                }
            }
            _ => {}
        }
        vec![]
    });
}

async fn connected_client(connection: &Connection) -> FluuxClient {
    let client = FluuxClient::builder()
        .set_connector_provider(Connector::provider(connection.clone()))
        .set_storage(Arc::new(InMemoryStorage::new()))
        .build();

    client
        .connect(
            FullJid::from_str("me@x.y/desktop").unwrap(),
            "secret".to_string().into(),
            None,
            true,
        )
        .await
        .expect("connect failed");

    client
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_s1_carbon_echo_does_not_duplicate() {
    let connection = Connection::default();
    install_server(&connection, Arc::new(Mutex::new(vec![])));
    let client = connected_client(&connection).await;

    connection
        .receive_stanza(el(
            r#"<message xmlns="jabber:client" id="m1" from="alice@x.y/a" to="me@x.y" type="chat"><body>hi</body></message>"#,
        ))
        .await;

    connection
        .receive_stanza(el(
            r#"<message xmlns="jabber:client" from="me@x.y" to="me@x.y/b" type="chat">
                <sent xmlns="urn:xmpp:carbons:2">
                    <forwarded xmlns="urn:xmpp:forward:0">
                        <message xmlns="jabber:client" id="m1" from="alice@x.y/a" to="me@x.y" type="chat"><body>hi</body></message>
                    </forwarded>
                </sent>
            </message>"#,
        ))
        .await;

    let conversation = client
        .store()
        .conversation(&bare("alice@x.y"))
        .expect("Missing conversation");

    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].id, "m1");
    assert!(!conversation.messages[0].is_outgoing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_s2_sm_resume_after_connection_loss() {
    let connection = Connection::default();
    let resumes = Arc::new(Mutex::new(vec![]));
    install_server(&connection, resumes.clone());
    let client = connected_client(&connection).await;

    // Five stanzas handled on the live stream.
    for n in 1..=5 {
        connection
            .receive_stanza(el(&format!(
                r#"<message xmlns="jabber:client" id="m{n}" from="alice@x.y/a" to="me@x.y" type="chat"><body>msg {n}</body></message>"#
            )))
            .await;
    }

    // Network drops.
    connection.receive_disconnect(None).await;
    assert!(matches!(
        client.store().connection_status(),
        ConnectionStatus::Reconnecting { .. }
    ));

    // Backoff for attempt 1 is ~1s; wait for the reconnect to land.
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(client.store().connection_status(), ConnectionStatus::Online);
    assert_eq!(
        resumes.lock().clone(),
        vec![("S1".to_string(), "5".to_string())]
    );

    // The server now replays what it never acked; the replayed stanza
    // must be delivered...
    connection
        .receive_stanza(el(
            r#"<message xmlns="jabber:client" id="m6" from="alice@x.y/a" to="me@x.y" type="chat"><body>replayed</body></message>"#,
        ))
        .await;

    let conversation = client
        .store()
        .conversation(&bare("alice@x.y"))
        .expect("Missing conversation");

    // ...and the five acknowledged ones must not double up.
    assert_eq!(conversation.messages.len(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_s3_idless_bridge_message_deduplicates() {
    let connection = Connection::default();
    install_server(&connection, Arc::new(Mutex::new(vec![])));
    let client = connected_client(&connection).await;

    let stanza = r#"<message xmlns="jabber:client" from="ch@biboumi.x.y/ircNick" type="groupchat"><body>hello</body><delay xmlns="urn:xmpp:delay" stamp="2024-01-15T10:30:00Z"/></message>"#;

    connection.receive_stanza(el(stanza)).await;
    connection.receive_stanza(el(stanza)).await;

    let room = client
        .store()
        .room(&bare("ch@biboumi.x.y"))
        .expect("Missing room");

    assert_eq!(room.messages.len(), 1);

    let id = &room.messages[0].id;
    let parts: Vec<&str> = id.splitn(3, '-').collect();
    assert_eq!(parts[0], "stable");
    assert_eq!(parts[1].len(), 8);
    assert_eq!(parts[2].len(), 8);
    assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_s4_retraction_by_stranger_is_ignored() {
    let connection = Connection::default();
    install_server(&connection, Arc::new(Mutex::new(vec![])));
    let client = connected_client(&connection).await;

    connection
        .receive_stanza(el(
            r#"<message xmlns="jabber:client" id="m2" from="alice@x.y/a" to="me@x.y" type="chat"><body>original</body></message>"#,
        ))
        .await;

    connection
        .receive_stanza(el(
            r#"<message xmlns="jabber:client" from="mallory@x.y/m" to="me@x.y" type="chat"><retract id="m2" xmlns="urn:xmpp:message-retract:1"/></message>"#,
        ))
        .await;

    let conversation = client
        .store()
        .conversation(&bare("alice@x.y"))
        .expect("Missing conversation");

    assert_eq!(conversation.messages.len(), 1);
    assert!(!conversation.messages[0].is_retracted);
    assert_eq!(conversation.messages[0].retracted_at, None);
    assert_eq!(conversation.messages[0].body, "original");

    // The legitimate sender may retract.
    connection
        .receive_stanza(el(
            r#"<message xmlns="jabber:client" from="alice@x.y/a" to="me@x.y" type="chat"><retract id="m2" xmlns="urn:xmpp:message-retract:1"/></message>"#,
        ))
        .await;

    let conversation = client
        .store()
        .conversation(&bare("alice@x.y"))
        .expect("Missing conversation");
    assert!(conversation.messages[0].is_retracted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_s5_reply_fallback_is_stripped() {
    let connection = Connection::default();
    install_server(&connection, Arc::new(Mutex::new(vec![])));
    let client = connected_client(&connection).await;

    connection
        .receive_stanza(el(
            r#"<message xmlns="jabber:client" id="r1" from="bob@x.y/b" to="me@x.y" type="chat">
                <body>&gt; Alice: Hello
My reply</body>
                <reply xmlns="urn:xmpp:reply:0" id="orig-1" to="alice@x.y"/>
                <fallback xmlns="urn:xmpp:fallback:0" for="urn:xmpp:reply:0"><body start="0" end="15"/></fallback>
            </message>"#,
        ))
        .await;

    let conversation = client
        .store()
        .conversation(&bare("bob@x.y"))
        .expect("Missing conversation");

    let message = &conversation.messages[0];
    assert_eq!(message.body, "My reply");

    let reply_to = message.reply_to.as_ref().expect("Missing reply_to");
    assert_eq!(reply_to.id, "orig-1");
    assert_eq!(reply_to.fallback_body.as_deref(), Some("Alice: Hello"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_s6_backward_page_uses_oldest_in_memory_cursor() {
    let connection = Connection::default();
    install_server(&connection, Arc::new(Mutex::new(vec![])));
    let client = connected_client(&connection).await;

    // Conversation holds messages A, B, C (A oldest), while the MAM
    // bookkeeping claims a different oldest-fetched id.
    let alice = bare("alice@x.y");
    client.store().with_conversation(&alice, |conversation| {
        for (idx, stanza_id) in ["A", "B", "C"].iter().enumerate() {
            conversation.messages.push(Message {
                id: stanza_id.to_string(),
                stanza_id: Some(stanza_id.to_string()),
                client_id: None,
                from: bare("alice@x.y"),
                nick: None,
                body: format!("message {stanza_id}"),
                timestamp: Utc
                    .with_ymd_and_hms(2024, 3, 1, 12, idx as u32, 0)
                    .unwrap(),
                is_outgoing: false,
                kind: MessageKind::Chat,
                is_delayed: true,
                no_styling: false,
                no_store: false,
                reactions: Default::default(),
                reply_to: None,
                is_edited: false,
                original_body: None,
                is_retracted: false,
                retracted_at: None,
                attachment: None,
                link_preview: None,
                mentions_me: false,
            });
        }
        conversation.mam.oldest_fetched_id = Some("B".to_string());
    });

    connection.reset();
    client
        .load_older_messages(&ConversationId::Chat(alice))
        .await;

    let query = connection
        .sent_stanzas()
        .into_iter()
        .find(|stanza| stanza.get_child("query", "urn:xmpp:mam:2").is_some())
        .expect("No MAM query was sent");

    let set = query
        .get_child("query", "urn:xmpp:mam:2")
        .unwrap()
        .get_child("set", "http://jabber.org/protocol/rsm")
        .expect("Missing RSM set");

    assert_eq!(
        set.get_child("before", "http://jabber.org/protocol/rsm")
            .map(|el| el.text()),
        Some("A".to_string())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_presence_is_sent_on_connect_and_on_change() {
    let connection = Connection::default();
    install_server(&connection, Arc::new(Mutex::new(vec![])));
    let client = connected_client(&connection).await;

    let initial_presences = connection
        .sent_stanzas()
        .into_iter()
        .filter(|stanza| stanza.name() == "presence")
        .count();
    assert_eq!(initial_presences, 1, "initial available presence");

    connection.reset();
    client.set_presence(
        fluux_client::presence::UserPreference::Dnd,
        Some("Focus time".to_string()),
    );

    let presences: Vec<Element> = connection
        .sent_stanzas()
        .into_iter()
        .filter(|stanza| stanza.name() == "presence")
        .collect();
    assert_eq!(presences.len(), 1);
    assert_eq!(
        presences[0]
            .get_child("show", "jabber:client")
            .map(|show| show.text()),
        Some("dnd".to_string())
    );
    assert_eq!(
        presences[0]
            .get_child("status", "jabber:client")
            .map(|status| status.text()),
        Some("Focus time".to_string())
    );

    // An identical preference again must not produce a second stanza.
    connection.reset();
    client.set_presence(
        fluux_client::presence::UserPreference::Dnd,
        Some("Focus time".to_string()),
    );
    let repeat = connection
        .sent_stanzas()
        .into_iter()
        .filter(|stanza| stanza.name() == "presence")
        .count();
    assert_eq!(repeat, 0);
}
