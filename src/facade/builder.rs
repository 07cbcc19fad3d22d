//! Builders for clients and servers.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use websocket_tools::{Client, ClientHandlers};
//!
//! # fn example() -> websocket_tools::Result<()> {
//! let client = Client::builder()
//!     .host("127.0.0.1")
//!     .port(9001)
//!     .path("/ws")
//!     .timeout(Duration::from_secs(1))
//!     .connect(ClientHandlers::new(|_, _, _: &()| {}, |_, _: &()| {}), ())?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::IpAddr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::handlers::{ClientHandlers, ServerHandlers};
use crate::transport::{Endpoint, ListenEndpoint, TokioTransport, Transport, TransportOptions};

use super::client::Client;
use super::options::{ClientOptions, ServerOptions};
use super::server::Server;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for a [`Client`].
#[derive(Debug, Default, Clone)]
pub struct ClientBuilder {
    /// Remote host.
    host: Option<String>,
    /// Remote port.
    port: Option<u16>,
    /// Request path; `/` when unset.
    path: Option<String>,
    /// Timeout and backend options.
    options: ClientOptions,
}

impl ClientBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the remote host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the remote port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the request path.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the construction timeout. Zero waits forever.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Sets the backend options.
    #[inline]
    #[must_use]
    pub fn transport_options(mut self, transport: TransportOptions) -> Self {
        self.options.transport = transport;
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Connects over a new tokio backend.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if host or port is missing or the options are invalid
    /// - Any error from [`Client::create`]
    pub fn connect<C>(self, handlers: ClientHandlers<C>, context: C) -> Result<Client>
    where
        C: Send + Sync + 'static,
    {
        let endpoint = self.validate()?;
        let transport = TokioTransport::from_options(self.options.transport.clone())?;
        Client::open(transport, &endpoint, handlers, context, self.options.timeout)
    }

    /// Connects over the given backend.
    ///
    /// The builder's transport options are ignored; `transport` was already
    /// configured when it was created.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub fn connect_with<B, C>(
        self,
        transport: B,
        handlers: ClientHandlers<C>,
        context: C,
    ) -> Result<Client<B>>
    where
        B: Transport,
        C: Send + Sync + 'static,
    {
        let endpoint = self.validate()?;
        Client::open(transport, &endpoint, handlers, context, self.options.timeout)
    }

    fn validate(&self) -> Result<Endpoint> {
        let host = self.host.as_deref().ok_or_else(|| {
            Error::config(
                "Host is required. Use .host() to set it.\n\
                 Example: Client::builder().host(\"127.0.0.1\")",
            )
        })?;
        let port = self.port.ok_or_else(|| {
            Error::config(
                "Port is required. Use .port() to set it.\n\
                 Example: Client::builder().port(9001)",
            )
        })?;
        self.options.validate().map_err(Error::config)?;

        Endpoint::new(host, port, self.path.clone().unwrap_or_default())
    }
}

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for a [`Server`].
#[derive(Debug, Default, Clone)]
pub struct ServerBuilder {
    /// Listening port; ephemeral when unset.
    port: u16,
    /// Upgrade path; `/` when unset.
    path: Option<String>,
    /// Bind address, timeout and backend options.
    options: ServerOptions,
}

impl ServerBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.options.bind_ip = ip;
        self
    }

    /// Sets the listening port. `0` picks an ephemeral port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the upgrade path.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the construction timeout. Zero waits forever.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Sets the backend options.
    #[inline]
    #[must_use]
    pub fn transport_options(mut self, transport: TransportOptions) -> Self {
        self.options.transport = transport;
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    /// Listens over a new tokio backend.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the path or options are invalid
    /// - Any error from [`Server::create`]
    pub fn listen<C>(self, handlers: ServerHandlers<C>, context: C) -> Result<Server>
    where
        C: Send + Sync + 'static,
    {
        let endpoint = self.validate()?;
        let transport = TokioTransport::from_options(self.options.transport.clone())?;
        Server::open(transport, &endpoint, handlers, context, self.options.timeout)
    }

    /// Listens over the given backend.
    ///
    /// # Errors
    ///
    /// Same as [`listen`](Self::listen).
    pub fn listen_with<B, C>(
        self,
        transport: B,
        handlers: ServerHandlers<C>,
        context: C,
    ) -> Result<Server<B>>
    where
        B: Transport,
        C: Send + Sync + 'static,
    {
        let endpoint = self.validate()?;
        Server::open(transport, &endpoint, handlers, context, self.options.timeout)
    }

    fn validate(&self) -> Result<ListenEndpoint> {
        self.options.validate().map_err(Error::config)?;
        ListenEndpoint::new(
            self.options.bind_ip,
            self.port,
            self.path.clone().unwrap_or_default(),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;

    fn handlers() -> ClientHandlers<()> {
        ClientHandlers::new(|_, _, _: &()| {}, |_, _: &()| {})
    }

    #[test]
    fn test_client_builder_requires_host() {
        let result = ClientBuilder::new().port(9001).connect(handlers(), ());
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_client_builder_requires_port() {
        let result = ClientBuilder::new().host("127.0.0.1").connect(handlers(), ());
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_client_builder_rejects_bad_path() {
        let result = ClientBuilder::new()
            .host("127.0.0.1")
            .port(9001)
            .path("no-slash")
            .connect(handlers(), ());
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_client_builder_endpoint() {
        let endpoint = ClientBuilder::new()
            .host("localhost")
            .port(9001)
            .validate()
            .unwrap();
        assert_eq!(endpoint.url().as_str(), "ws://localhost:9001/");
    }

    #[test]
    fn test_server_builder_defaults() {
        let builder = ServerBuilder::new();
        let endpoint = builder.validate().unwrap();
        assert_eq!(endpoint.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(endpoint.port(), 0);
        assert_eq!(endpoint.path(), "/");
        assert_eq!(builder.options.timeout, Duration::from_millis(400));
    }

    #[test]
    fn test_server_builder_rejects_invalid_transport() {
        let result = ServerBuilder::new()
            .transport_options(TransportOptions::new().with_worker_threads(0))
            .validate();
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
