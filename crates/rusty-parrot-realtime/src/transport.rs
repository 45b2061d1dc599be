//! Transport abstraction between the session engine and the remote service.
//!
//! The engine only sees [`Connector`], [`EventSink`] and [`EventSource`]; the
//! WebSocket implementation lives in [`crate::ws`].

use async_trait::async_trait;

use rusty_parrot_core::{ParrotError, Result};

use crate::protocol::{ClientEvent, InboundEvent};

/// Everything needed to open one session.
#[derive(Clone)]
pub struct ConnectRequest {
    pub url: String,
    pub api_key: Option<String>,
    /// Value of the `OpenAI-Beta` header.
    pub beta: String,
}

impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("beta", &self.beta)
            .finish()
    }
}

impl ConnectRequest {
    /// The credential, checked for presence and header-safety before any dial.
    pub fn credential(&self) -> Result<&str> {
        let key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ParrotError::Connection("no API key configured".into()))?;

        if !key.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ParrotError::Connection(
                "API key contains characters that cannot be sent in a header".into(),
            ));
        }
        Ok(key)
    }
}

/// Outbound half of an open session.
#[async_trait]
pub trait EventSink: Send {
    async fn send(&mut self, event: &ClientEvent) -> Result<()>;

    /// Close the underlying connection. Called at most once by [`crate::Session`].
    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of an open session.
#[async_trait]
pub trait EventSource: Send {
    /// Next decoded event. `None` once the remote side has closed.
    async fn next_event(&mut self) -> Option<Result<InboundEvent>>;
}

/// An open, not yet configured, duplex session.
pub struct Connection {
    pub sink: Box<dyn EventSink>,
    pub source: Box<dyn EventSource>,
}

/// Opens sessions against a remote endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, request: &ConnectRequest) -> Result<Connection>;
}
