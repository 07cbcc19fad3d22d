//! Client and listener addresses.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Endpoint
// ============================================================================

/// Address of a remote WebSocket endpoint.
///
/// # Example
///
/// ```
/// use websocket_tools::Endpoint;
///
/// let endpoint = Endpoint::new("localhost", 9001, "/ws").unwrap();
/// assert_eq!(endpoint.url().as_str(), "ws://localhost:9001/ws");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    path: String,
    url: Url,
}

impl Endpoint {
    /// Builds and validates an endpoint.
    ///
    /// An empty path means `/`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the host is empty, the port is zero or the path
    ///   does not start with `/`
    /// - [`Error::Url`] if the parts do not form a valid URL
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Result<Self> {
        let host = host.into();
        let path = normalize_path(path.into())?;

        if host.trim().is_empty() {
            return Err(Error::config("Host must not be empty"));
        }
        if port == 0 {
            return Err(Error::config("Client port must be greater than zero"));
        }

        // IPv6 literals need brackets inside a URL.
        let authority = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let url = Url::parse(&format!("ws://{authority}{path}"))?;

        Ok(Self {
            host,
            port,
            path,
            url,
        })
    }

    /// Host name or address.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Request path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full `ws://` URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Upgrade request for this endpoint, with fresh handshake headers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if tungstenite rejects the URL.
    pub fn request(&self) -> Result<Request> {
        Ok(self.url.as_str().into_client_request()?)
    }

    /// Host without IPv6 brackets, for socket resolution.
    #[must_use]
    pub(crate) fn bare_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }
}

// ============================================================================
// ListenEndpoint
// ============================================================================

/// Local address a server listens on.
///
/// Port `0` requests an ephemeral port; the resolved port is available from
/// the server once it is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenEndpoint {
    ip: IpAddr,
    port: u16,
    path: String,
}

impl ListenEndpoint {
    /// Builds and validates a listen endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the path does not start with `/`.
    pub fn new(ip: IpAddr, port: u16, path: impl Into<String>) -> Result<Self> {
        Ok(Self {
            ip,
            port,
            path: normalize_path(path.into())?,
        })
    }

    /// Bind address.
    #[inline]
    #[must_use]
    pub const fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Requested port (`0` for ephemeral).
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Path that upgrade requests must target.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Socket address to bind.
    #[inline]
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn normalize_path(path: String) -> Result<String> {
    if path.is_empty() {
        return Ok("/".to_string());
    }
    if !path.starts_with('/') {
        return Err(Error::config(format!(
            "Path must start with '/': {path:?}"
        )));
    }
    Ok(path)
}

// ============================================================================
// Tests
// ============================================================================
