// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use jid::BareJid;
use sha1::{Digest, Sha1};

use fluux_xmpp::ns;
use fluux_xmpp::stanza::message::Message as MessageStanza;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Chat,
    Groupchat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplyTo {
    pub id: String,
    pub to: Option<BareJid>,
    /// The quoted text the sender embedded for legacy clients,
    /// stripped of its `> ` markers. Used for the in-reply-to preview.
    pub fallback_body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attachment {
    pub url: String,
    pub media_type: Option<String>,
    pub name: Option<String>,
    pub size: Option<u64>,
    pub thumbnail_uri: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkPreview {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub site_name: Option<String>,
}

/// A message as projected into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Canonical identity: server stanza-id, else the client id, else a
    /// deterministic fingerprint for bridge traffic without ids.
    pub id: String,
    pub stanza_id: Option<String>,
    pub client_id: Option<String>,
    pub from: BareJid,
    /// Occupant nickname for group chat messages.
    pub nick: Option<String>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub is_outgoing: bool,
    pub kind: MessageKind,
    pub is_delayed: bool,
    pub no_styling: bool,
    pub no_store: bool,
    /// Reactions keyed by reactor (bare JID for chat, nick for rooms).
    pub reactions: BTreeMap<String, Vec<String>>,
    pub reply_to: Option<ReplyTo>,
    pub is_edited: bool,
    pub original_body: Option<String>,
    pub is_retracted: bool,
    pub retracted_at: Option<DateTime<Utc>>,
    pub attachment: Option<Attachment>,
    pub link_preview: Option<LinkPreview>,
    pub mentions_me: bool,
}

impl Message {
    /// True when `target` is any of this message's wire identities.
    pub fn answers_to(&self, target: &str) -> bool {
        self.id == target
            || self.stanza_id.as_deref() == Some(target)
            || self.client_id.as_deref() == Some(target)
    }
}

/// What an inbound message stanza means for the store.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageUpdate {
    New(Message),
    /// XEP-0308: replace the target's body instead of inserting.
    Correct {
        target: String,
        sender: String,
        body: String,
        attachment: Option<Attachment>,
    },
    /// XEP-0424: mark the target retracted. Receivers verify the
    /// sender against the original.
    Retract {
        target: String,
        sender: String,
        at: DateTime<Utc>,
    },
    /// XEP-0444: replace the reactor's whole emoji set on the target.
    React {
        target: String,
        by: String,
        emojis: Vec<String>,
    },
    /// XEP-0422 + OGP: attach a link preview to the target.
    Preview {
        target: String,
        preview: LinkPreview,
    },
}

pub struct ProjectionContext<'a> {
    pub kind: MessageKind,
    pub is_outgoing: bool,
    pub force_delayed: bool,
    /// Our nickname in the room, for mention detection.
    pub own_nick: Option<&'a str>,
    pub now: DateTime<Utc>,
}

/// One pass over a parsed stanza. Returns `None` for stanzas that carry
/// nothing the store needs (bare chat states and the like).
pub fn project_message(stanza: &MessageStanza, ctx: &ProjectionContext) -> Option<MessageUpdate> {
    let from = stanza.from.as_ref()?;
    let from_bare = from.to_bare();
    let nick = (ctx.kind == MessageKind::Groupchat)
        .then(|| from.resource().map(|resource| resource.to_string()))
        .flatten();

    // The sender identity mutations are verified against: the bare JID
    // in 1:1 chats, the nickname in rooms (real JIDs may be hidden).
    let sender_key = match ctx.kind {
        MessageKind::Chat => from_bare.to_string(),
        MessageKind::Groupchat => nick.clone().unwrap_or_else(|| from_bare.to_string()),
    };

    let timestamp = stanza
        .delay
        .as_ref()
        .map(|delay| delay.stamp.0.with_timezone(&Utc))
        .unwrap_or(ctx.now);

    if let Some(retract) = &stanza.retract {
        return Some(MessageUpdate::Retract {
            target: retract.id.to_string(),
            sender: sender_key,
            at: timestamp,
        });
    }

    if let Some(reactions) = &stanza.reactions {
        return Some(MessageUpdate::React {
            target: reactions.id.clone(),
            by: sender_key,
            emojis: reactions
                .reactions
                .iter()
                .map(|reaction| reaction.emoji.clone())
                .collect(),
        });
    }

    if let Some(fastening) = &stanza.fastening {
        let preview = link_preview_from_metas(fastening.meta_tags());
        if preview != LinkPreview::default() {
            return Some(MessageUpdate::Preview {
                target: fastening.id.to_string(),
                preview,
            });
        }
        return None;
    }

    let raw_body = stanza.body.as_deref()?;
    let (body, reply_fallback) = strip_fallbacks(raw_body, stanza);
    let attachment = attachment_from_stanza(stanza);

    if let Some(replace) = &stanza.replace {
        return Some(MessageUpdate::Correct {
            target: replace.to_string(),
            sender: sender_key,
            body,
            attachment,
        });
    }

    let client_id = stanza.id.as_ref().map(|id| id.to_string());
    let stanza_id = stanza.stanza_id.as_ref().map(|sid| sid.id.clone());
    let id = stanza_id
        .clone()
        .or_else(|| client_id.clone())
        .unwrap_or_else(|| fingerprint(&from_bare, raw_body, &timestamp));

    let reply_to = stanza.reply.as_ref().map(|reply| ReplyTo {
        id: reply.id.clone(),
        to: reply.to.as_ref().map(|to| to.to_bare()),
        fallback_body: reply_fallback,
    });

    let mentions_me = detect_mention(stanza, &body, ctx.own_nick);

    Some(MessageUpdate::New(Message {
        id,
        stanza_id,
        client_id,
        from: from_bare,
        nick,
        body,
        timestamp,
        is_outgoing: ctx.is_outgoing,
        kind: ctx.kind,
        is_delayed: ctx.force_delayed || stanza.delay.is_some(),
        no_styling: stanza.unstyled,
        no_store: stanza.no_store,
        reactions: BTreeMap::new(),
        reply_to,
        is_edited: false,
        original_body: None,
        is_retracted: false,
        retracted_at: None,
        attachment,
        link_preview: None,
        mentions_me,
    }))
}

/// Stable identity for messages that carry neither a stanza-id nor a
/// client id (IRC bridges, mostly). Replays of the same wire message
/// synthesize the same id so the store can reject the duplicate.
pub fn fingerprint(from: &BareJid, body: &str, timestamp: &DateTime<Utc>) -> String {
    format!(
        "stable-{}-{}",
        hash8(from.to_string().as_bytes()),
        hash8(format!("{body}{}", timestamp.to_rfc3339()).as_bytes())
    )
}

fn hash8(data: &[u8]) -> String {
    let digest = Sha1::digest(data);
    digest
        .iter()
        .take(4)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Removes every fallback range from the visible body. The range marked
/// for the reply namespace is returned separately (it becomes the
/// quoted preview), everything else is dropped.
fn strip_fallbacks(body: &str, stanza: &MessageStanza) -> (String, Option<String>) {
    let chars: Vec<char> = body.chars().collect();
    let mut keep = vec![true; chars.len()];
    let mut reply_fallback = None;

    for fallback in &stanza.fallbacks {
        for range in &fallback.bodies {
            let start = range.start.unwrap_or(0).min(chars.len());
            let end = range.end.unwrap_or(chars.len()).min(chars.len());
            if start >= end {
                continue;
            }

            if fallback.r#for.as_deref() == Some(ns::REPLY) && reply_fallback.is_none() {
                let quoted: String = chars[start..end].iter().collect();
                reply_fallback = Some(unquote(&quoted));
            }

            for flag in keep[start..end].iter_mut() {
                *flag = false;
            }
        }
    }

    let stripped: String = chars
        .iter()
        .zip(keep.iter())
        .filter_map(|(c, keep)| keep.then_some(*c))
        .collect();

    (stripped.trim_matches('\n').to_string(), reply_fallback)
}

/// `"> Alice: Hello\n"` → `"Alice: Hello"`.
fn unquote(quoted: &str) -> String {
    quoted
        .lines()
        .map(|line| {
            line.strip_prefix("> ")
                .or_else(|| line.strip_prefix('>'))
                .unwrap_or(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

fn attachment_from_stanza(stanza: &MessageStanza) -> Option<Attachment> {
    let oob = stanza.oob.as_ref()?;

    let mut attachment = Attachment {
        url: oob.url.clone(),
        ..Attachment::default()
    };

    if let Some(metadata) = &stanza.file_metadata {
        attachment.media_type = metadata.media_type.clone();
        attachment.name = metadata.name.clone();
        attachment.size = metadata.size;
        attachment.width = metadata.width;
        attachment.height = metadata.height;
        attachment.thumbnail_uri = metadata
            .thumbnail
            .as_ref()
            .map(|thumbnail| thumbnail.uri.clone());
    }

    if attachment.thumbnail_uri.is_none() {
        attachment.thumbnail_uri = stanza
            .thumbnail
            .as_ref()
            .map(|thumbnail| thumbnail.uri.clone());
    }

    Some(attachment)
}

fn link_preview_from_metas<'a>(
    metas: impl Iterator<Item = &'a fluux_xmpp::stanza::message::Meta>,
) -> LinkPreview {
    let mut preview = LinkPreview::default();
    for meta in metas {
        match meta.property.as_str() {
            "og:url" => preview.url = Some(meta.content.clone()),
            "og:title" => preview.title = Some(meta.content.clone()),
            "og:description" => preview.description = Some(meta.content.clone()),
            "og:image" => preview.image = Some(meta.content.clone()),
            "og:site_name" => preview.site_name = Some(meta.content.clone()),
            _ => (),
        }
    }
    preview
}

fn detect_mention(stanza: &MessageStanza, body: &str, own_nick: Option<&str>) -> bool {
    let Some(own_nick) = own_nick else {
        return false;
    };

    // XEP-0372 references win over plain-text scanning.
    let has_reference = stanza.references.iter().any(|reference| {
        reference
            .uri
            .strip_prefix("xmpp:")
            .map(|uri| uri.eq_ignore_ascii_case(own_nick))
            .unwrap_or(false)
    });
    if has_reference {
        return true;
    }

    let lowered = body.to_lowercase();
    lowered.contains(&format!("@{}", own_nick.to_lowercase())) || lowered.contains("@all")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use std::str::FromStr;

    use fluux_xmpp::stanza::message::{Fallback, Range, Reply};
    use xmpp_parsers::message::MessageType;

    use super::*;

    fn ctx(kind: MessageKind) -> ProjectionContext<'static> {
        ProjectionContext {
            kind,
            is_outgoing: false,
            force_delayed: false,
            own_nick: None,
            now: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_prefers_stanza_id_over_client_id() {
        let stanza = MessageStanza::new()
            .set_type(MessageType::Chat)
            .set_from(jid::Jid::from_str("alice@x.y/a").unwrap())
            .set_id("client-1".into())
            .set_stanza_id(xmpp_parsers::stanza_id::StanzaId {
                id: "server-1".to_string(),
                by: jid::Jid::from_str("me@x.y").unwrap(),
            })
            .set_body("hi");

        let Some(MessageUpdate::New(message)) = project_message(&stanza, &ctx(MessageKind::Chat))
        else {
            panic!("Expected new message");
        };

        assert_eq!(message.id, "server-1");
        assert_eq!(message.client_id.as_deref(), Some("client-1"));
    }

    #[test]
    fn test_synthesizes_stable_fingerprint_for_idless_messages() {
        let stanza = MessageStanza::new()
            .set_type(MessageType::Groupchat)
            .set_from(jid::Jid::from_str("ch@biboumi.x.y/ircNick").unwrap())
            .set_body("hello")
            .set_delay(xmpp_parsers::delay::Delay {
                from: None,
                stamp: xmpp_parsers::date::DateTime::from_str("2024-01-15T10:30:00Z").unwrap(),
                data: None,
            });

        let first = project_message(&stanza, &ctx(MessageKind::Groupchat));
        let second = project_message(&stanza, &ctx(MessageKind::Groupchat));

        let (Some(MessageUpdate::New(a)), Some(MessageUpdate::New(b))) = (first, second) else {
            panic!("Expected new messages");
        };

        assert_eq!(a.id, b.id);
        let parts: Vec<&str> = a.id.splitn(3, '-').collect();
        assert_eq!(parts[0], "stable");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_strips_reply_fallback_and_keeps_quote() {
        let stanza = MessageStanza::new()
            .set_type(MessageType::Chat)
            .set_from(jid::Jid::from_str("bob@x.y/b").unwrap())
            .set_body("> Alice: Hello\nMy reply")
            .set_reply(Reply::new("orig-1", None::<jid::Jid>))
            .add_fallback(Fallback {
                r#for: Some(ns::REPLY.to_string()),
                subjects: vec![],
                bodies: vec![Range {
                    start: Some(0),
                    end: Some(15),
                }],
            });

        let Some(MessageUpdate::New(message)) = project_message(&stanza, &ctx(MessageKind::Chat))
        else {
            panic!("Expected new message");
        };

        assert_eq!(message.body, "My reply");
        let reply_to = message.reply_to.expect("Missing reply_to");
        assert_eq!(reply_to.id, "orig-1");
        assert_eq!(reply_to.fallback_body.as_deref(), Some("Alice: Hello"));
    }

    #[test]
    fn test_merges_oob_and_metadata_into_attachment() {
        let stanza = MessageStanza::new()
            .set_type(MessageType::Chat)
            .set_from(jid::Jid::from_str("bob@x.y/b").unwrap())
            .set_body("https://files.x.y/cat.png")
            .set_oob(xmpp_parsers::oob::Oob {
                url: "https://files.x.y/cat.png".to_string(),
                desc: None,
            })
            .set_file_metadata(fluux_xmpp::stanza::media::FileMetadata {
                media_type: Some("image/png".to_string()),
                name: Some("cat.png".to_string()),
                size: Some(2048),
                width: None,
                height: None,
                desc: None,
                thumbnail: None,
            });

        let Some(MessageUpdate::New(message)) = project_message(&stanza, &ctx(MessageKind::Chat))
        else {
            panic!("Expected new message");
        };

        let attachment = message.attachment.expect("Missing attachment");
        assert_eq!(attachment.url, "https://files.x.y/cat.png");
        assert_eq!(attachment.media_type.as_deref(), Some("image/png"));
        assert_eq!(attachment.size, Some(2048));
    }

    #[test]
    fn test_retraction_projects_sender_identity() {
        let stanza = MessageStanza::new()
            .set_type(MessageType::Chat)
            .set_from(jid::Jid::from_str("mallory@x.y/evil").unwrap())
            .set_retract("m2".into());

        let update = project_message(&stanza, &ctx(MessageKind::Chat));
        assert_eq!(
            update,
            Some(MessageUpdate::Retract {
                target: "m2".to_string(),
                sender: "mallory@x.y".to_string(),
                at: ctx(MessageKind::Chat).now,
            })
        );
    }

    #[test]
    fn test_detects_mentions_case_insensitively() {
        let stanza = MessageStanza::new()
            .set_type(MessageType::Groupchat)
            .set_from(jid::Jid::from_str("room@muc.x.y/alice").unwrap())
            .set_body("ping @Bob, got a minute?");

        let ctx = ProjectionContext {
            own_nick: Some("bob"),
            ..ctx(MessageKind::Groupchat)
        };

        let Some(MessageUpdate::New(message)) = project_message(&stanza, &ctx) else {
            panic!("Expected new message");
        };
        assert!(message.mentions_me);
    }
}
