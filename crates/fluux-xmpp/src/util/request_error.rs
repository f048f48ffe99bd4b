// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use xmpp_parsers::stanza_error::{DefinedCondition, StanzaError};

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Request timed out")]
    TimedOut,
    #[error("Disconnected")]
    Disconnected,
    #[error("Unexpected server response")]
    UnexpectedResponse,
    #[error("XMPP error: {err:?}")]
    XMPP { err: StanzaError },
    #[error("Request error: {msg}")]
    Generic { msg: String },
}

impl RequestError {
    pub fn defined_condition(&self) -> Option<DefinedCondition> {
        let RequestError::XMPP { err } = self else {
            return None;
        };
        Some(err.defined_condition.clone())
    }

    pub fn is_item_not_found_err(&self) -> bool {
        self.defined_condition() == Some(DefinedCondition::ItemNotFound)
    }

    pub fn is_forbidden_err(&self) -> bool {
        self.defined_condition() == Some(DefinedCondition::Forbidden)
    }
}

impl From<StanzaError> for RequestError {
    fn from(err: StanzaError) -> Self {
        RequestError::XMPP { err }
    }
}

impl From<ParseError> for RequestError {
    fn from(err: ParseError) -> Self {
        RequestError::Generic {
            msg: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for RequestError {
    fn from(err: anyhow::Error) -> Self {
        RequestError::Generic {
            msg: err.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Missing attribute '{attribute}' in element '{element}'")]
    MissingAttribute { attribute: String, element: String },
    #[error("Missing child '{child}' in element '{element}'")]
    MissingChild { child: String, element: String },
    #[error("Expected element {expected}, got {got}")]
    UnexpectedElement { expected: String, got: String },
    #[error("{msg}")]
    Generic { msg: String },
}

impl From<jid::Error> for ParseError {
    fn from(err: jid::Error) -> Self {
        ParseError::Generic {
            msg: err.to_string(),
        }
    }
}

impl From<std::num::ParseIntError> for ParseError {
    fn from(err: std::num::ParseIntError) -> Self {
        ParseError::Generic {
            msg: err.to_string(),
        }
    }
}
