//! Realtime speech-translation sessions.
//!
//! A [`SessionEngine`] owns the protocol state machine for one connection per
//! request: connect, configure, upload audio, receive typed events, assemble
//! output, disconnect. The transport is abstracted behind [`Connector`] so the
//! WebSocket implementation in [`ws`] can be swapped for a scripted one in tests.

pub mod engine;
pub mod protocol;
pub mod router;
pub mod session;
pub mod transport;
pub mod ws;

#[cfg(any(test, feature = "test-support"))]
pub mod scripted;

pub use engine::{
    EngineSettings, SessionEngine, SessionProfile, TranslationStream, collect_transcript,
};
pub use protocol::{ClientEvent, InboundEvent};
pub use router::{BackpressureGate, Routed, Router, StreamEnd};
pub use session::{Session, SessionState};
pub use transport::{ConnectRequest, Connection, Connector, EventSink, EventSource};
