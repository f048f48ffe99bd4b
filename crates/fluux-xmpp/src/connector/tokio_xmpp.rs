// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use jid::FullJid;
use minidom::Element;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::{task, time};
use tokio_xmpp::connect::{DnsConfig, StartTlsServerConnector};
use tokio_xmpp::{Client as XmppClient, Error, Event};
use tracing::error;

use crate::client::ConnectorProvider;
use crate::connector::endpoint::{Endpoint, EndpointResolver};
use crate::connector::{
    Connection as ConnectionTrait, ConnectionError, ConnectionEvent, ConnectionEventHandler,
    Connector as ConnectorTrait,
};

const PING_INTERVAL: Duration = Duration::from_secs(60);
const TIMEOUT_INTERVAL: Duration = Duration::from_secs(2);

/// Native TCP/TLS connector backed by tokio-xmpp. WebSocket transports
/// plug in through their own `Connector` implementation supplied at
/// client construction.
pub struct Connector {
    endpoint: Option<Endpoint>,
}

impl Connector {
    pub fn new() -> Self {
        Connector { endpoint: None }
    }

    /// Pinned to a known endpoint: used to resume on the host that
    /// worked before, surviving DNS cache flushes across sleep.
    pub fn with_endpoint(endpoint: Endpoint) -> Self {
        Connector {
            endpoint: Some(endpoint),
        }
    }

    pub fn provider() -> ConnectorProvider {
        Box::new(|| Box::new(Connector::new()))
    }

    pub fn provider_with_endpoint(endpoint: Endpoint) -> ConnectorProvider {
        Box::new(move || Box::new(Connector::with_endpoint(endpoint.clone())))
    }

    async fn open_stream(
        &self,
        jid: &FullJid,
        password: &SecretString,
        endpoint: Option<&Endpoint>,
    ) -> Result<XmppClient<StartTlsServerConnector>, ConnectionError> {
        let mut client = match endpoint {
            None => XmppClient::new(jid.clone(), password.expose_secret().to_string()),
            Some(Endpoint::Tcp { host, port, .. }) => XmppClient::new_starttls(
                jid.clone(),
                password.expose_secret().to_string(),
                DnsConfig::addr(&format!("{host}:{port}")),
            ),
            Some(Endpoint::WebSocket { url }) => {
                return Err(ConnectionError::Generic {
                    msg: format!(
                        "The native connector cannot reach WebSocket endpoint {url}. \
                         Provide a WebSocket connector instead."
                    ),
                });
            }
        };
        client.set_reconnect(false);

        while let Some(event) = client.next().await {
            match event {
                Event::Disconnected(Error::Auth(_)) => {
                    return Err(ConnectionError::InvalidCredentials);
                }
                Event::Disconnected(e) => {
                    return Err(ConnectionError::Generic { msg: e.to_string() });
                }
                Event::Online { .. } => break,
                Event::Stanza(stanza) => {
                    return Err(ConnectionError::Generic {
                        msg: format!("Received unexpected stanza {:?}", stanza),
                    });
                }
            }
        }

        Ok(client)
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectorTrait for Connector {
    async fn connect(
        &self,
        jid: &FullJid,
        password: SecretString,
        event_handler: ConnectionEventHandler,
    ) -> Result<Box<dyn ConnectionTrait>, ConnectionError> {
        // Pinned endpoint, or walk the resolution ladder. The first
        // endpoint that completes the stream handshake wins.
        let endpoints: Vec<Option<Endpoint>> = match &self.endpoint {
            Some(endpoint) => vec![Some(endpoint.clone())],
            None => {
                let resolved = EndpointResolver::default()
                    .resolve(&jid.domain().to_string(), None)
                    .await;
                let mut candidates: Vec<Option<Endpoint>> = resolved
                    .into_iter()
                    .filter(|endpoint| matches!(endpoint, Endpoint::Tcp { .. }))
                    .map(Some)
                    .collect();
                // tokio-xmpp's own SRV logic as the last resort.
                candidates.push(None);
                candidates
            }
        };

        let mut last_error = ConnectionError::Generic {
            msg: "No reachable endpoint".to_string(),
        };

        for endpoint in &endpoints {
            match self.open_stream(jid, &password, endpoint.as_ref()).await {
                Ok(client) => return Ok(Box::new(Connection::new(client, event_handler))),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    error!("Endpoint {endpoint:?} failed: {err}");
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }
}

enum Command {
    Send(Element),
    Disconnect,
}

pub struct Connection {
    sender: Arc<UnboundedSender<Command>>,
    _stream_handle: Option<JoinHandle<()>>,
    _ping_handle: Option<JoinHandle<()>>,
    _timeout_handle: Option<JoinHandle<()>>,
}

impl Connection {
    fn new(client: XmppClient<StartTlsServerConnector>, event_handler: ConnectionEventHandler) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let sender = Arc::new(tx);
        let event_handler = Arc::new(event_handler);

        // One task owns the client; tokio-xmpp 4.x sends through
        // `&mut self`, so reads and writes are serialized here.
        let stream_handle = {
            let conn = Connection::new_with_sender(sender.clone());
            let event_handler = event_handler.clone();

            task::spawn(async move {
                let mut client = client;
                loop {
                    tokio::select! {
                        command = rx.recv() => match command {
                            None | Some(Command::Disconnect) => {
                                if let Err(err) = client.send_end().await {
                                    error!("Failed to close stream: {err}");
                                }
                                break;
                            }
                            Some(Command::Send(stanza)) => {
                                if let Err(err) = client.send_stanza(stanza).await {
                                    error!("Failed to send stanza: {err}");
                                    (event_handler)(&conn, ConnectionEvent::Disconnected {
                                        error: Some(ConnectionError::from_write_error(err.to_string())),
                                    }).await;
                                    break;
                                }
                            }
                        },
                        event = client.next() => match event {
                            None => {
                                (event_handler)(&conn, ConnectionEvent::Disconnected { error: None }).await;
                                break;
                            }
                            Some(Event::Disconnected(err)) => {
                                (event_handler)(&conn, ConnectionEvent::Disconnected {
                                    error: Some(ConnectionError::Generic { msg: err.to_string() }),
                                }).await;
                                break;
                            }
                            Some(Event::Online { .. }) => (),
                            Some(Event::Stanza(stanza)) => {
                                (event_handler)(&conn, ConnectionEvent::Stanza(stanza)).await;
                            }
                        },
                    }
                }
            })
        };

        let ping_handle = {
            let conn = Connection::new_with_sender(sender.clone());
            let event_handler = event_handler.clone();

            task::spawn(async move {
                let mut interval = time::interval(PING_INTERVAL);
                interval.tick().await;

                loop {
                    interval.tick().await;
                    (event_handler)(&conn, ConnectionEvent::PingTimer).await;
                }
            })
        };

        let timeout_handle = {
            let conn = Connection::new_with_sender(sender.clone());
            let event_handler = event_handler.clone();

            task::spawn(async move {
                let mut interval = time::interval(TIMEOUT_INTERVAL);

                loop {
                    interval.tick().await;
                    (event_handler)(&conn, ConnectionEvent::TimeoutTimer).await;
                }
            })
        };

        Connection {
            sender,
            _stream_handle: Some(stream_handle),
            _ping_handle: Some(ping_handle),
            _timeout_handle: Some(timeout_handle),
        }
    }

    fn new_with_sender(sender: Arc<UnboundedSender<Command>>) -> Self {
        Connection {
            sender,
            _stream_handle: None,
            _ping_handle: None,
            _timeout_handle: None,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(handle) = self._ping_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self._timeout_handle.take() {
            handle.abort();
        }
    }
}

impl ConnectionTrait for Connection {
    fn send_stanza(&self, stanza: Element) -> Result<()> {
        self.sender
            .send(Command::Send(stanza))
            .map_err(|_| ConnectionError::DeadSocket {
                msg: "channel closed".to_string(),
            })?;
        Ok(())
    }

    fn disconnect(&self) {
        let _ = self.sender.send(Command::Disconnect);
    }
}
