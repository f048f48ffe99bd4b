// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use crate::{client, mods};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Client(client::Event),
    Blocking(mods::blocking::Event),
    Chat(mods::chat::Event),
    Muc(mods::muc::Event),
    PubSub(mods::pubsub::Event),
    Roster(mods::roster::Event),
}
