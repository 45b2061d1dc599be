//! Per-request session: lifecycle state plus exclusive ownership of one
//! connection.

use tracing::{debug, warn};

use rusty_parrot_core::{ParrotError, Result};

use crate::transport::{Connection, EventSink, EventSource};

/// Lifecycle of one session. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Configuring,
    Streaming,
    Committed,
    AwaitingCompletion,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed) => true,
            (Idle, Connecting) => true,
            (Connecting, Configuring) => true,
            (Configuring, Streaming) | (Configuring, Committed) => true,
            (Streaming, Committed) => true,
            (Committed, AwaitingCompletion) => true,
            (AwaitingCompletion, Completed) => true,
            _ => false,
        }
    }
}

pub struct Session {
    id: String,
    state: SessionState,
    sink: Option<Box<dyn EventSink>>,
    source: Option<Box<dyn EventSource>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: SessionState::Idle,
            sink: None,
            source: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ParrotError::Other(anyhow::anyhow!(
                "invalid session transition {:?} -> {:?}",
                self.state,
                next
            )));
        }
        debug!(session_id = %self.id, from = ?self.state, to = ?next, "Session state");
        self.state = next;
        Ok(())
    }

    /// Take ownership of a freshly opened connection.
    pub fn attach(&mut self, connection: Connection) {
        debug_assert!(self.sink.is_none(), "session already holds a connection");
        self.sink = Some(connection.sink);
        self.source = Some(connection.source);
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    pub fn sink_mut(&mut self) -> Result<&mut Box<dyn EventSink>> {
        self.sink
            .as_mut()
            .ok_or_else(|| ParrotError::Connection("session is not connected".into()))
    }

    pub fn source_mut(&mut self) -> Result<&mut Box<dyn EventSource>> {
        self.source
            .as_mut()
            .ok_or_else(|| ParrotError::Connection("session is not connected".into()))
    }

    /// Hand the inbound half to a router task.
    pub fn take_source(&mut self) -> Option<Box<dyn EventSource>> {
        self.source.take()
    }

    /// Close the connection and clear the handle. Safe to call repeatedly; the
    /// sink is closed at most once. A session that has not reached a terminal
    /// state is marked `Failed`.
    pub async fn teardown(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Failed;
        }
        self.source = None;
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                warn!(session_id = %self.id, error = %e, "Error closing connection");
            }
            debug!(session_id = %self.id, state = ?self.state, "Session torn down");
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.sink.is_some() {
            warn!(session_id = %self.id, "Session dropped without teardown");
        }
    }
}
