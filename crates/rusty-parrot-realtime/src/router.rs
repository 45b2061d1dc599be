//! Response event router.
//!
//! Consumes inbound events for one streaming session and fans them out to an
//! audio queue and a text queue, each terminated by a [`StreamEnd`] sentinel.
//! Flow-control events toggle the shared [`BackpressureGate`]. The router never
//! closes the connection.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use rusty_parrot_core::ParrotError;

use crate::protocol::InboundEvent;
use crate::transport::EventSource;

/// Advisory send gate. Starts open; a backpressure warning closes it and
/// `session.idle` reopens it.
#[derive(Debug, Clone)]
pub struct BackpressureGate {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for BackpressureGate {
    fn default() -> Self {
        Self::new()
    }
}

impl BackpressureGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx: Arc::new(tx) }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    pub fn close(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the gate is open. Returns immediately when it already is.
    pub async fn wait_open(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|open| *open).await;
    }
}

/// Why a queue ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The matching `*.done` or `response.done` arrived.
    Completed,
    /// The remote reported an error event.
    Failed { kind: String, message: String },
    /// The connection closed or broke before completion.
    Disconnected,
}

/// One queue entry: a payload or the end-of-stream sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed<T> {
    Item(T),
    End(StreamEnd),
}

/// Whether the router keeps reading after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub type AudioQueue = mpsc::UnboundedReceiver<Routed<Vec<u8>>>;
pub type TextQueue = mpsc::UnboundedReceiver<Routed<String>>;

pub struct Router {
    session_id: String,
    gate: BackpressureGate,
    audio_tx: Option<mpsc::UnboundedSender<Routed<Vec<u8>>>>,
    text_tx: Option<mpsc::UnboundedSender<Routed<String>>>,
}

impl Router {
    /// Create a router plus the receiving ends of its audio and text queues.
    pub fn new(session_id: impl Into<String>, gate: BackpressureGate) -> (Self, AudioQueue, TextQueue) {
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let (text_tx, text_rx) = mpsc::unbounded_channel();
        let router = Self {
            session_id: session_id.into(),
            gate,
            audio_tx: Some(audio_tx),
            text_tx: Some(text_tx),
        };
        (router, audio_rx, text_rx)
    }

    /// Dispatch one event.
    pub fn route(&mut self, event: InboundEvent) -> Flow {
        match event {
            InboundEvent::AudioDelta(bytes) => {
                if let Some(tx) = &self.audio_tx {
                    let _ = tx.send(Routed::Item(bytes));
                }
            }
            InboundEvent::TextDelta(text) => {
                if let Some(tx) = &self.text_tx {
                    let _ = tx.send(Routed::Item(text));
                }
            }
            InboundEvent::AudioDone => self.end_audio(StreamEnd::Completed),
            InboundEvent::TextDone => self.end_text(StreamEnd::Completed),
            InboundEvent::ResponseDone => {
                debug!(session_id = %self.session_id, "Response complete");
                self.end_all(StreamEnd::Completed);
            }
            InboundEvent::BackpressureWarning => {
                warn!(session_id = %self.session_id, "Backpressure warning, pausing uploads");
                self.gate.close();
            }
            InboundEvent::SessionIdle => {
                debug!(session_id = %self.session_id, "Session idle, resuming uploads");
                self.gate.open();
            }
            InboundEvent::Error { kind, message } => {
                error!(session_id = %self.session_id, kind = %kind, message = %message, "Remote error event");
                self.end_all(StreamEnd::Failed { kind, message });
                return Flow::Stop;
            }
            InboundEvent::SessionCreated | InboundEvent::SessionUpdated => {
                debug!(session_id = %self.session_id, "Session acknowledged");
            }
            InboundEvent::Other { kind, .. } => {
                debug!(session_id = %self.session_id, event = %kind, "Ignoring event");
            }
        }

        if self.audio_tx.is_none() && self.text_tx.is_none() {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    /// Read the source until it closes or a terminating event is routed.
    ///
    /// The gate is reopened on return so a stalled upload reaches the closed
    /// sink instead of waiting forever.
    pub async fn run(mut self, source: Box<dyn EventSource>) {
        self.consume(source).await;
        self.gate.open();
    }

    async fn consume(&mut self, mut source: Box<dyn EventSource>) {
        while let Some(next) = source.next_event().await {
            match next {
                Ok(event) => {
                    if self.route(event) == Flow::Stop {
                        info!(session_id = %self.session_id, "Router finished");
                        return;
                    }
                }
                Err(e) => {
                    error!(session_id = %self.session_id, error = %e, "Inbound transport error");
                    let (kind, message) = match e {
                        ParrotError::Decode(message) => ("decode", message),
                        other => ("transport", other.to_string()),
                    };
                    self.end_all(StreamEnd::Failed {
                        kind: kind.into(),
                        message,
                    });
                    return;
                }
            }
        }
        debug!(session_id = %self.session_id, "Inbound stream closed");
        self.end_all(StreamEnd::Disconnected);
    }

    fn end_audio(&mut self, end: StreamEnd) {
        if let Some(tx) = self.audio_tx.take() {
            let _ = tx.send(Routed::End(end));
        }
    }

    fn end_text(&mut self, end: StreamEnd) {
        if let Some(tx) = self.text_tx.take() {
            let _ = tx.send(Routed::End(end));
        }
    }

    fn end_all(&mut self, end: StreamEnd) {
        self.end_text(end.clone());
        self.end_audio(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn drain<T>(rx: &mut mpsc::UnboundedReceiver<Routed<T>>) -> Vec<Routed<T>> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_audio_and_text_are_routed_to_their_queues() {
        let (mut router, mut audio, mut text) = Router::new("s", BackpressureGate::new());

        assert_eq!(router.route(InboundEvent::AudioDelta(b"A".to_vec())), Flow::Continue);
        assert_eq!(router.route(InboundEvent::TextDelta("Bon".into())), Flow::Continue);
        assert_eq!(router.route(InboundEvent::AudioDelta(b"B".to_vec())), Flow::Continue);
        assert_eq!(router.route(InboundEvent::AudioDone), Flow::Continue);
        assert_eq!(router.route(InboundEvent::TextDone), Flow::Stop);

        assert_eq!(
            drain(&mut audio),
            vec![
                Routed::Item(b"A".to_vec()),
                Routed::Item(b"B".to_vec()),
                Routed::End(StreamEnd::Completed)
            ]
        );
        assert_eq!(
            drain(&mut text),
            vec![Routed::Item("Bon".to_string()), Routed::End(StreamEnd::Completed)]
        );
    }

    #[test]
    fn test_deltas_after_done_are_dropped() {
        let (mut router, mut audio, _text) = Router::new("s", BackpressureGate::new());
        router.route(InboundEvent::AudioDone);
        router.route(InboundEvent::AudioDelta(b"late".to_vec()));
        assert_eq!(drain(&mut audio), vec![Routed::End(StreamEnd::Completed)]);
    }

    #[test]
    fn test_response_done_ends_both_queues() {
        let (mut router, mut audio, mut text) = Router::new("s", BackpressureGate::new());
        assert_eq!(router.route(InboundEvent::ResponseDone), Flow::Stop);
        assert_eq!(drain(&mut audio), vec![Routed::End(StreamEnd::Completed)]);
        assert_eq!(drain(&mut text), vec![Routed::End(StreamEnd::Completed)]);
    }

    #[test]
    fn test_error_event_ends_queues_with_failure() {
        let (mut router, mut audio, mut text) = Router::new("s", BackpressureGate::new());
        router.route(InboundEvent::AudioDelta(b"A".to_vec()));
        let flow = router.route(InboundEvent::Error {
            kind: "rate_limit_error".into(),
            message: "Rate limit exceeded".into(),
        });
        assert_eq!(flow, Flow::Stop);

        let failed = StreamEnd::Failed {
            kind: "rate_limit_error".into(),
            message: "Rate limit exceeded".into(),
        };
        assert_eq!(
            drain(&mut audio),
            vec![Routed::Item(b"A".to_vec()), Routed::End(failed.clone())]
        );
        assert_eq!(drain(&mut text), vec![Routed::End(failed)]);
    }

    #[test]
    fn test_flow_control_toggles_gate() {
        let gate = BackpressureGate::new();
        let (mut router, _audio, _text) = Router::new("s", gate.clone());
        assert!(gate.is_open());

        router.route(InboundEvent::BackpressureWarning);
        assert!(!gate.is_open());
        router.route(InboundEvent::BackpressureWarning);
        assert!(!gate.is_open());

        router.route(InboundEvent::SessionIdle);
        assert!(gate.is_open());
    }

    #[test]
    fn test_lifecycle_and_unknown_events_continue() {
        let (mut router, mut audio, _text) = Router::new("s", BackpressureGate::new());
        assert_eq!(router.route(InboundEvent::SessionCreated), Flow::Continue);
        assert_eq!(router.route(InboundEvent::SessionUpdated), Flow::Continue);
        assert_eq!(
            router.route(InboundEvent::Other {
                kind: "rate_limits.updated".into(),
                raw: serde_json::json!({}),
            }),
            Flow::Continue
        );
        assert!(drain(&mut audio).is_empty());
    }

    #[tokio::test]
    async fn test_gate_wait_open_resolves_after_idle() {
        let gate = BackpressureGate::new();
        gate.close();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_open().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.open();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("gate should reopen")
            .unwrap();
    }

    #[tokio::test]
    async fn test_gate_wait_open_is_immediate_when_open() {
        let gate = BackpressureGate::new();
        tokio::time::timeout(Duration::from_millis(50), gate.wait_open())
            .await
            .expect("open gate must not block");
    }

    struct ListSource(std::collections::VecDeque<rusty_parrot_core::Result<InboundEvent>>);

    #[async_trait::async_trait]
    impl EventSource for ListSource {
        async fn next_event(&mut self) -> Option<rusty_parrot_core::Result<InboundEvent>> {
            self.0.pop_front()
        }
    }

    fn source(items: Vec<rusty_parrot_core::Result<InboundEvent>>) -> Box<dyn EventSource> {
        Box::new(ListSource(items.into()))
    }

    #[tokio::test]
    async fn test_run_reopens_gate_when_finished() {
        let gate = BackpressureGate::new();
        let (router, mut audio, _text) = Router::new("s", gate.clone());

        router
            .run(source(vec![
                Ok(InboundEvent::AudioDelta(b"A".to_vec())),
                Ok(InboundEvent::BackpressureWarning),
                Ok(InboundEvent::ResponseDone),
            ]))
            .await;

        assert!(gate.is_open());
        assert_eq!(
            drain(&mut audio),
            vec![Routed::Item(b"A".to_vec()), Routed::End(StreamEnd::Completed)]
        );
    }

    #[tokio::test]
    async fn test_run_reopens_gate_on_disconnect() {
        let gate = BackpressureGate::new();
        let (router, mut audio, _text) = Router::new("s", gate.clone());

        router
            .run(source(vec![Ok(InboundEvent::BackpressureWarning)]))
            .await;

        assert!(gate.is_open());
        assert_eq!(drain(&mut audio), vec![Routed::End(StreamEnd::Disconnected)]);
    }

    #[tokio::test]
    async fn test_run_classifies_read_failures() {
        let (router, mut audio, _text) = Router::new("s", BackpressureGate::new());
        router
            .run(source(vec![Err(ParrotError::Decode("invalid audio delta".into()))]))
            .await;
        assert_eq!(
            drain(&mut audio),
            vec![Routed::End(StreamEnd::Failed {
                kind: "decode".into(),
                message: "invalid audio delta".into(),
            })]
        );

        let (router, mut audio, _text) = Router::new("s", BackpressureGate::new());
        router
            .run(source(vec![Err(ParrotError::Connection("reset".into()))]))
            .await;
        match drain(&mut audio).as_slice() {
            [Routed::End(StreamEnd::Failed { kind, .. })] => assert_eq!(kind, "transport"),
            other => panic!("expected transport failure, got {other:?}"),
        }
    }
}
