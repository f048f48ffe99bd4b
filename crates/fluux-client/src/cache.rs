// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use crate::domain::{ConversationId, Message};

/// The interface the runtime expects from a local message cache. The
/// cache itself (SQLite, IndexedDB, …) lives outside the core.
pub trait MessageCache: Send + Sync {
    /// The most recent messages of a conversation, oldest first.
    fn load_recent(&self, conversation: &ConversationId, limit: usize) -> Vec<Message>;

    /// Persist messages after they entered the store. Best effort.
    fn store_messages(&self, conversation: &ConversationId, messages: &[Message]);
}
