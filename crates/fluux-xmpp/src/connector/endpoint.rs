// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use hickory_resolver::TokioAsyncResolver;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::connector::ConnectionError;

/// A concrete place to open a stream to, in preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// RFC 7395 WebSocket endpoint (`ws://` / `wss://`).
    WebSocket { url: String },
    /// Native TCP. `direct_tls` selects TLS-on-connect (5223) over
    /// STARTTLS (5222).
    Tcp {
        host: String,
        port: u16,
        direct_tls: bool,
    },
}

impl Endpoint {
    /// Parses an explicit override URI (`ws://`, `wss://`, `tcp://`, `tls://`).
    pub fn from_override(uri: &str) -> Result<Self, ConnectionError> {
        let url = Url::parse(uri).map_err(|err| ConnectionError::Generic {
            msg: format!("Invalid endpoint URL '{uri}': {err}"),
        })?;

        let host = url
            .host_str()
            .ok_or_else(|| ConnectionError::Generic {
                msg: format!("Endpoint URL '{uri}' has no host"),
            })?
            .to_string();

        match url.scheme() {
            "ws" | "wss" => Ok(Endpoint::WebSocket {
                url: uri.to_string(),
            }),
            "tcp" => Ok(Endpoint::Tcp {
                host,
                port: url.port().unwrap_or(5222),
                direct_tls: false,
            }),
            "tls" => Ok(Endpoint::Tcp {
                host,
                port: url.port().unwrap_or(5223),
                direct_tls: true,
            }),
            other => Err(ConnectionError::Generic {
                msg: format!("Unsupported endpoint scheme '{other}'"),
            }),
        }
    }
}

/// Resolves the endpoints to try for a bare domain, in order:
/// explicit override → XEP-0156 host-meta → SRV records → direct
/// host:port fallbacks. The first endpoint that completes the stream
/// header wins; the caller keeps the winner for resumption so a DNS
/// cache flush across sleep cannot move the session.
pub struct EndpointResolver {
    http: reqwest::Client,
}

impl Default for EndpointResolver {
    fn default() -> Self {
        EndpointResolver {
            http: reqwest::Client::new(),
        }
    }
}

impl EndpointResolver {
    pub async fn resolve(&self, domain: &str, override_url: Option<&str>) -> Vec<Endpoint> {
        if let Some(url) = override_url {
            match Endpoint::from_override(url) {
                Ok(endpoint) => return vec![endpoint],
                Err(err) => warn!("Ignoring invalid endpoint override: {err}"),
            }
        }

        let mut endpoints = Vec::new();

        match self.lookup_host_meta(domain).await {
            Ok(mut found) => endpoints.append(&mut found),
            Err(err) => debug!("host-meta lookup for {domain} failed: {err}"),
        }

        match self.lookup_srv(domain).await {
            Ok(mut found) => endpoints.append(&mut found),
            Err(err) => debug!("SRV lookup for {domain} failed: {err}"),
        }

        // Last resort per RFC 6120 §3.2.2.
        endpoints.push(Endpoint::Tcp {
            host: domain.to_string(),
            port: 5223,
            direct_tls: true,
        });
        endpoints.push(Endpoint::Tcp {
            host: domain.to_string(),
            port: 5222,
            direct_tls: false,
        });

        endpoints.dedup();
        endpoints
    }

    /// XEP-0156 host-meta lookup, JSON flavor.
    async fn lookup_host_meta(&self, domain: &str) -> anyhow::Result<Vec<Endpoint>> {
        let url = format!("https://{domain}/.well-known/host-meta.json");
        let body: Value = self.http.get(&url).send().await?.json().await?;

        let mut endpoints = Vec::new();
        let Some(links) = body.get("links").and_then(Value::as_array) else {
            return Ok(endpoints);
        };

        for link in links {
            let rel = link.get("rel").and_then(Value::as_str);
            let href = link.get("href").and_then(Value::as_str);
            if rel == Some("urn:xmpp:alt-connections:websocket") {
                if let Some(href) = href {
                    endpoints.push(Endpoint::WebSocket {
                        url: href.to_string(),
                    });
                }
            }
        }

        Ok(endpoints)
    }

    async fn lookup_srv(&self, domain: &str) -> anyhow::Result<Vec<Endpoint>> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()?;
        let mut endpoints = Vec::new();

        if let Ok(lookup) = resolver
            .srv_lookup(format!("_xmpps-client._tcp.{domain}."))
            .await
        {
            for record in lookup.iter() {
                endpoints.push(Endpoint::Tcp {
                    host: record.target().to_utf8().trim_end_matches('.').to_string(),
                    port: record.port(),
                    direct_tls: true,
                });
            }
        }

        if let Ok(lookup) = resolver
            .srv_lookup(format!("_xmpp-client._tcp.{domain}."))
            .await
        {
            for record in lookup.iter() {
                endpoints.push(Endpoint::Tcp {
                    host: record.target().to_utf8().trim_end_matches('.').to_string(),
                    port: record.port(),
                    direct_tls: false,
                });
            }
        }

        Ok(endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_override_schemes() {
        assert_eq!(
            Endpoint::from_override("wss://chat.example.org/ws").unwrap(),
            Endpoint::WebSocket {
                url: "wss://chat.example.org/ws".to_string()
            }
        );
        assert_eq!(
            Endpoint::from_override("tcp://example.org").unwrap(),
            Endpoint::Tcp {
                host: "example.org".to_string(),
                port: 5222,
                direct_tls: false,
            }
        );
        assert_eq!(
            Endpoint::from_override("tls://example.org:443").unwrap(),
            Endpoint::Tcp {
                host: "example.org".to_string(),
                port: 443,
                direct_tls: true,
            }
        );
        assert!(Endpoint::from_override("ftp://example.org").is_err());
    }
}
