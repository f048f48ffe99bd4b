// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use contact::{Contact, ContactPresence, ResourcePresence};
pub use conversation::{Conversation, ConversationId};
pub use mam_state::MamQueryState;
pub use message::{Attachment, LinkPreview, Message, MessageKind, MessageUpdate, ReplyTo};
pub use room::{Occupant, Room};

pub mod contact;
pub mod conversation;
pub mod mam_state;
pub mod message;
pub mod room;
