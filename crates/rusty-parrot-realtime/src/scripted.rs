//! In-memory scripted transport for tests.
//!
//! Each connection replays the same script of inbound events and records every
//! outbound event, connect and close in a shared [`TransportStats`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use rusty_parrot_core::{ParrotError, Result};

use crate::protocol::{ClientEvent, InboundEvent};
use crate::transport::{ConnectRequest, Connection, Connector, EventSink, EventSource};

/// One scripted step on the inbound side.
#[derive(Debug, Clone)]
pub enum Step {
    Event(InboundEvent),
    /// Run a raw wire message through [`InboundEvent::decode`].
    Raw(String),
    /// Emit a transport-level read failure.
    Fail(String),
    Delay(Duration),
    /// Hold further events until the client has sent `response.create`.
    AwaitResponseCreate,
}

impl From<InboundEvent> for Step {
    fn from(event: InboundEvent) -> Self {
        Step::Event(event)
    }
}

/// Counters shared by every connection a [`ScriptedConnector`] opens.
#[derive(Debug)]
pub struct TransportStats {
    connects: AtomicUsize,
    closes: AtomicUsize,
    sent: Mutex<Vec<ClientEvent>>,
    response_requested: watch::Sender<bool>,
}

impl TransportStats {
    fn new() -> Self {
        let (response_requested, _) = watch::channel(false);
        Self {
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            response_requested,
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<ClientEvent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Wire names of the sent events, in order.
    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent().iter().map(ClientEvent::name).collect()
    }
}

pub struct ScriptedConnector {
    script: Vec<Step>,
    hang_when_done: bool,
    connect_error: Option<String>,
    stats: Arc<TransportStats>,
}

impl ScriptedConnector {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: script.into_iter().collect(),
            hang_when_done: false,
            connect_error: None,
            stats: Arc::new(TransportStats::new()),
        }
    }

    /// Script made only of events.
    pub fn events(events: impl IntoIterator<Item = InboundEvent>) -> Self {
        Self::new(events.into_iter().map(Step::Event))
    }

    /// Keep the connection open without further events once the script is spent.
    pub fn hang_when_done(mut self) -> Self {
        self.hang_when_done = true;
        self
    }

    /// Every connect attempt fails with a connection error.
    pub fn refusing(message: impl Into<String>) -> Self {
        let mut connector = Self::new([]);
        connector.connect_error = Some(message.into());
        connector
    }

    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Connection> {
        request.credential()?;
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.connect_error {
            return Err(ParrotError::Connection(message.clone()));
        }
        Ok(Connection {
            sink: Box::new(ScriptedSink {
                stats: Arc::clone(&self.stats),
                closed: false,
            }),
            source: Box::new(ScriptedSource {
                steps: self.script.clone().into_iter(),
                hang_when_done: self.hang_when_done,
                stats: Arc::clone(&self.stats),
            }),
        })
    }
}

struct ScriptedSink {
    stats: Arc<TransportStats>,
    closed: bool,
}

#[async_trait]
impl EventSink for ScriptedSink {
    async fn send(&mut self, event: &ClientEvent) -> Result<()> {
        if self.closed {
            return Err(ParrotError::Connection("send on closed connection".into()));
        }
        if let Ok(mut sent) = self.stats.sent.lock() {
            sent.push(event.clone());
        }
        if matches!(event, ClientEvent::ResponseCreate) {
            self.stats.response_requested.send_replace(true);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedSource {
    steps: std::vec::IntoIter<Step>,
    hang_when_done: bool,
    stats: Arc<TransportStats>,
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn next_event(&mut self) -> Option<Result<InboundEvent>> {
        loop {
            match self.steps.next() {
                Some(Step::Event(event)) => return Some(Ok(event)),
                Some(Step::Raw(text)) => return Some(InboundEvent::decode(&text)),
                Some(Step::Fail(message)) => return Some(Err(ParrotError::Connection(message))),
                Some(Step::Delay(delay)) => tokio::time::sleep(delay).await,
                Some(Step::AwaitResponseCreate) => {
                    let mut rx = self.stats.response_requested.subscribe();
                    let _ = rx.wait_for(|requested| *requested).await;
                }
                None if self.hang_when_done => std::future::pending::<()>().await,
                None => return None,
            }
        }
    }
}
