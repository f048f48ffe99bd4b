// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use element_ext::{parse_bool, ElementExt};
pub(crate) use module_future_state::{ModuleFuturePoll, ModuleFutureState};
pub use request_error::{ParseError, RequestError};
pub(crate) use request_future::{ElementReducerPoll, RequestFuture};
pub use xmpp_element::XmppElement;

pub mod element_ext;
#[macro_use]
pub mod id_string_macro;
mod module_future_state;
mod request_error;
mod request_future;
mod xmpp_element;
