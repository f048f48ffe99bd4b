// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::task::Waker;

use crate::util::XmppElement;

pub(crate) enum ModuleFuturePoll {
    /// The future is not finished. An element that was offered but not
    /// consumed travels back so the next future (or the modules) can see it.
    Pending(Option<XmppElement>),
    Ready(Option<Waker>),
}

pub(crate) trait ModuleFutureState: Send {
    fn handle_element(&mut self, element: XmppElement) -> ModuleFuturePoll;
    fn fail_with_timeout(&mut self) -> Option<Waker>;
    fn fail_with_disconnect(&mut self) -> Option<Waker>;
}
