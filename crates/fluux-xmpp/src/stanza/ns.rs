// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use xmpp_parsers::ns::*;

// See all at: https://xmpp.org/registrar/namespaces.html

/// XEP-0424: Message Retraction
pub const RETRACT: &str = "urn:xmpp:message-retract:1";

/// XEP-0422: Message Fastening
pub const FASTEN: &str = "urn:xmpp:fasten:0";

/// XEP-0428: Fallback Indication
pub const FALLBACK: &str = "urn:xmpp:fallback:0";

/// XEP-0334: Message Processing Hints
pub const HINTS: &str = "urn:xmpp:hints";

/// XEP-0461: Message Replies
pub const REPLY: &str = "urn:xmpp:reply:0";

/// XEP-0372: References
pub const REFERENCE: &str = "urn:xmpp:reference:0";

/// XEP-0393: Message Styling
pub const STYLING: &str = "urn:xmpp:styling:0";

/// XEP-0066: Out of Band Data
pub const OUT_OF_BAND_DATA: &str = "jabber:x:oob";

/// XEP-0264: Jingle Content Thumbnails
pub const THUMBS: &str = "urn:xmpp:thumbs:1";

/// XEP-0446: File Metadata Element
pub const FILE_METADATA: &str = "urn:xmpp:file:metadata:0";

/// OGP meta tags fastened to a message (XEP-0422 application)
pub const XHTML: &str = "http://www.w3.org/1999/xhtml";

/// XEP-0050: Ad-Hoc Commands
pub const COMMANDS: &str = "http://jabber.org/protocol/commands";

/// XEP-0133: Service Administration
pub const ADMIN: &str = "http://jabber.org/protocol/admin";

/// XEP-0249: Direct MUC Invitations
pub const DIRECT_MUC_INVITATIONS: &str = "jabber:x:conference";

/// XEP-0045: Multi-User Chat
pub const MUC_ROOMINFO: &str = "http://jabber.org/protocol/muc#roominfo";

/// XEP-0156: Discovering Alternative XMPP Connection Methods
pub const HOST_META: &str = "http://docs.oasis-open.org/ns/xri/xrd-1.0";

/// XEP-0313: Message Archive Management (the version this library speaks)
pub const MAM2: &str = "urn:xmpp:mam:2";

/// XEP-0060: form type for publish options
pub const PUBSUB_PUBLISH_OPTIONS: &str = "http://jabber.org/protocol/pubsub#publish-options";

/// XEP-0202: Entity Time
pub const TIME: &str = "urn:xmpp:time";

/// XEP-0319: Last User Interaction in Presence
pub const IDLE: &str = "urn:xmpp:idle:1";
