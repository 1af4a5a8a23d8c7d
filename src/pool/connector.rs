//! Physical connection establishment.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::codec::{Channel, Settings};

/// Destination a pool serves: scheme, host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct RouteKey {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl RouteKey {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// `https` route on the given host and port.
    pub fn https(host: impl Into<String>, port: u16) -> Self {
        Self::new("https", host, port)
    }

    /// Value for the `:authority` pseudo-header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Opens protocol-upgraded channels to a route.
///
/// DNS, TCP, TLS and ALPN all happen behind this call. `settings` are the
/// local SETTINGS to announce during the preface.
pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        route: &RouteKey,
        settings: &Settings,
    ) -> impl Future<Output = std::io::Result<Channel>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_display_and_authority() {
        let route = RouteKey::https("example.com", 443);
        assert_eq!(route.to_string(), "https://example.com:443");
        assert_eq!(route.authority(), "example.com:443");
    }
}
