// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use jid::FullJid;
use minidom::Element;
use secrecy::SecretString;

pub type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("Timed out")]
    TimedOut,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Resource conflict")]
    Conflict,
    #[error("Dead socket: {msg}")]
    DeadSocket { msg: String },
    #[error("{msg}")]
    Generic { msg: String },
}

impl ConnectionError {
    /// Fatal errors drive the client to its terminal state and are
    /// never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConnectionError::InvalidCredentials | ConnectionError::Conflict
        )
    }

    /// Classifies a transport write error. Dead-socket signatures must be
    /// treated as loss-of-connection even while the connection status
    /// still reads online; the status store lags the socket by design of
    /// the OS socket table (wake-from-sleep leaves the FD "open" but
    /// unusable).
    pub fn from_write_error(msg: String) -> Self {
        if is_dead_socket_error(&msg) {
            ConnectionError::DeadSocket { msg }
        } else {
            ConnectionError::Generic { msg }
        }
    }
}

/// Known signatures of writes against a socket that is already gone.
pub fn is_dead_socket_error(msg: &str) -> bool {
    const SIGNATURES: &[&str] = &[
        "socket.write",
        "WebSocket is not open",
        "socket is null",
        "broken pipe",
        "connection reset",
        "channel closed",
    ];
    let msg = msg.to_ascii_lowercase();
    SIGNATURES
        .iter()
        .any(|signature| msg.contains(&signature.to_ascii_lowercase()))
}

pub type ConnectionEventHandler =
    Box<dyn Fn(&dyn Connection, ConnectionEvent) -> PinnedFuture<()> + Send + Sync>;

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        jid: &FullJid,
        password: SecretString,
        event_handler: ConnectionEventHandler,
    ) -> Result<Box<dyn Connection>, ConnectionError>;
}

#[derive(Debug)]
pub enum ConnectionEvent {
    Disconnected { error: Option<ConnectionError> },
    Stanza(Element),
    TimeoutTimer,
    PingTimer,
}

pub trait Connection: Send + Sync {
    fn send_stanza(&self, stanza: Element) -> Result<()>;
    fn disconnect(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_dead_socket_signatures() {
        assert!(is_dead_socket_error("WebSocket is not open"));
        assert!(is_dead_socket_error("Error: socket.write failed"));
        assert!(is_dead_socket_error("Broken pipe (os error 32)"));
        assert!(!is_dead_socket_error("stream closed by peer"));

        assert_eq!(
            ConnectionError::from_write_error("socket is null".to_string()),
            ConnectionError::DeadSocket {
                msg: "socket is null".to_string()
            }
        );
    }
}
