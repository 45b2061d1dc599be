//! WebSocket transport built on tokio-tungstenite.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use rusty_parrot_core::{ParrotError, Result};

use crate::protocol::{ClientEvent, InboundEvent};
use crate::transport::{ConnectRequest, Connection, Connector, EventSink, EventSource};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials the realtime endpoint over `ws://` or `wss://`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Connection> {
        let api_key = request.credential()?;

        let mut ws_request = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ParrotError::Connection(format!("invalid endpoint URL: {e}")))?;
        let headers = ws_request.headers_mut();
        headers.insert(
            "Authorization",
            format!("Bearer {api_key}")
                .parse()
                .map_err(|e| ParrotError::Connection(format!("invalid auth header: {e}")))?,
        );
        headers.insert(
            "OpenAI-Beta",
            request
                .beta
                .parse()
                .map_err(|e| ParrotError::Connection(format!("invalid beta header: {e}")))?,
        );

        debug!(url = %request.url, "Dialing realtime endpoint");
        let (stream, _response) = tokio_tungstenite::connect_async(ws_request)
            .await
            .map_err(handshake_error)?;
        info!(url = %request.url, "Realtime connection established");

        let (sink, source) = stream.split();
        Ok(Connection {
            sink: Box::new(WsSink { inner: sink }),
            source: Box::new(WsSource { inner: source }),
        })
    }
}

fn handshake_error(e: tungstenite::Error) -> ParrotError {
    match e {
        tungstenite::Error::Http(response) => ParrotError::Connection(format!(
            "handshake rejected with HTTP {}",
            response.status()
        )),
        other => ParrotError::Connection(format!("failed to connect: {other}")),
    }
}

struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl EventSink for WsSink {
    async fn send(&mut self, event: &ClientEvent) -> Result<()> {
        let json = event.to_json()?;
        trace!(event = event.name(), bytes = json.len(), "Sending client event");
        self.inner
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| ParrotError::Connection(format!("failed to send {}: {e}", event.name())))
    }

    async fn close(&mut self) -> Result<()> {
        match self.inner.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(ParrotError::Connection(format!("failed to close: {e}"))),
        }
    }
}

struct WsSource {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl EventSource for WsSource {
    async fn next_event(&mut self) -> Option<Result<InboundEvent>> {
        loop {
            let message = match self.inner.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => {
                    return Some(Err(ParrotError::Connection(format!(
                        "websocket read failed: {e}"
                    ))));
                }
            };

            match message {
                Message::Text(text) => return Some(InboundEvent::decode(text.as_str())),
                Message::Close(frame) => {
                    debug!(?frame, "Remote closed the connection");
                    return None;
                }
                Message::Binary(data) => {
                    warn!(bytes = data.len(), "Ignoring unexpected binary frame");
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}
