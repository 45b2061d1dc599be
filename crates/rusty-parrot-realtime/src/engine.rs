//! Session protocol engine: single-shot and streaming translation over one
//! realtime connection per request.

use std::pin::{Pin, pin};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use rusty_parrot_core::config::{InputStyle, RealtimeConfig, TurnDetectionConfig};
use rusty_parrot_core::{ParrotError, Result, ValidationError};
use rusty_parrot_media::pcm::validate_pcm;

use crate::protocol::{
    AUDIO_FORMAT_PCM16, ClientEvent, InboundEvent, SessionConfig, TranscriptionSettings,
};
use crate::router::{AudioQueue, BackpressureGate, Routed, Router, StreamEnd, TextQueue};
use crate::session::{Session, SessionState};
use crate::transport::{ConnectRequest, Connector};
use crate::ws::WsConnector;

/// Connection and session parameters resolved from configuration.
#[derive(Clone)]
pub struct EngineSettings {
    pub endpoint_url: String,
    pub api_key: Option<String>,
    pub beta: String,
    pub temperature: f64,
    pub max_response_output_tokens: u32,
    pub transcription_model: Option<String>,
    pub turn_detection: Option<TurnDetectionConfig>,
    /// Single-shot ceiling, measured from the start of the read loop.
    pub response_timeout: Duration,
    /// Overall ceiling for streaming sessions. `None` leaves them unbounded.
    pub stream_deadline: Option<Duration>,
    pub output_buffer: usize,
    pub input_style: InputStyle,
}

impl EngineSettings {
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            endpoint_url: config.endpoint_url(),
            api_key: config.resolve_api_key(),
            beta: config.beta.clone(),
            temperature: config.temperature,
            max_response_output_tokens: config.max_response_output_tokens,
            transcription_model: Some(config.transcription_model.clone())
                .filter(|m| !m.is_empty()),
            turn_detection: Some(config.turn_detection.clone()),
            response_timeout: config.response_timeout(),
            stream_deadline: config.stream_deadline(),
            output_buffer: config.output_buffer,
            input_style: config.input_style,
        }
    }

    fn connect_request(&self) -> ConnectRequest {
        ConnectRequest {
            url: self.endpoint_url.clone(),
            api_key: self.api_key.clone(),
            beta: self.beta.clone(),
        }
    }

    fn session_config(&self, profile: &SessionProfile) -> SessionConfig {
        SessionConfig {
            modalities: vec!["text".into(), "audio".into()],
            instructions: profile.instructions.clone(),
            voice: profile.voice.clone(),
            input_audio_format: AUDIO_FORMAT_PCM16.into(),
            output_audio_format: AUDIO_FORMAT_PCM16.into(),
            input_audio_transcription: self
                .transcription_model
                .clone()
                .map(|model| TranscriptionSettings { model }),
            turn_detection: self.turn_detection.clone(),
            temperature: self.temperature,
            max_response_output_tokens: self.max_response_output_tokens,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&RealtimeConfig::default())
    }
}

/// Per-request voice and instruction payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionProfile {
    pub voice: String,
    pub instructions: String,
}

pub struct SessionEngine {
    connector: Arc<dyn Connector>,
    settings: EngineSettings,
}

impl SessionEngine {
    pub fn new(connector: Arc<dyn Connector>, settings: EngineSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    /// Engine backed by the WebSocket transport.
    pub fn websocket(settings: EngineSettings) -> Self {
        Self::new(Arc::new(WsConnector), settings)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Translate a complete PCM buffer and return the complete translated audio.
    ///
    /// The connection is closed before this returns, whatever the outcome.
    pub async fn translate_single_shot(
        &self,
        profile: &SessionProfile,
        pcm: &[u8],
    ) -> Result<Vec<u8>> {
        validate_pcm(pcm)?;

        let mut session = Session::new();
        let started = Instant::now();
        info!(
            session_id = %session.id(),
            voice = %profile.voice,
            input_bytes = pcm.len(),
            "Starting single-shot translation"
        );

        let result = self.run_single_shot(&mut session, profile, pcm).await;
        session.teardown().await;

        match &result {
            Ok(audio) => info!(
                session_id = %session.id(),
                output_bytes = audio.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Single-shot translation complete"
            ),
            Err(e) => warn!(session_id = %session.id(), error = %e, "Single-shot translation failed"),
        }
        result
    }

    async fn run_single_shot(
        &self,
        session: &mut Session,
        profile: &SessionProfile,
        pcm: &[u8],
    ) -> Result<Vec<u8>> {
        self.open(session, profile).await?;

        match self.settings.input_style {
            InputStyle::Buffer => {
                let sink = session.sink_mut()?;
                sink.send(&ClientEvent::append_audio(pcm)).await?;
                sink.send(&ClientEvent::InputAudioBufferCommit).await?;
            }
            InputStyle::Item => {
                session
                    .sink_mut()?
                    .send(&ClientEvent::user_audio_item(pcm))
                    .await?;
            }
        }
        session.transition(SessionState::Committed)?;
        session.sink_mut()?.send(&ClientEvent::ResponseCreate).await?;
        session.transition(SessionState::AwaitingCompletion)?;

        let session_id = session.id().to_string();
        let limit = self.settings.response_timeout;
        let deadline = tokio::time::Instant::now() + limit;
        let source = session.source_mut()?;
        let mut audio = Vec::new();

        loop {
            let next = tokio::time::timeout_at(deadline, source.next_event())
                .await
                .map_err(|_| ParrotError::Timeout(limit))?;
            let Some(event) = next else {
                debug!(session_id = %session_id, "Connection closed by remote");
                break;
            };

            let event = match event {
                Err(ParrotError::Decode(message)) => {
                    return Err(ParrotError::Protocol {
                        kind: "decode".into(),
                        message,
                    });
                }
                other => other?,
            };
            match event {
                InboundEvent::AudioDelta(bytes) => audio.extend_from_slice(&bytes),
                InboundEvent::AudioDone | InboundEvent::ResponseDone => break,
                InboundEvent::Error { kind, message } => {
                    return Err(ParrotError::Protocol { kind, message });
                }
                InboundEvent::TextDelta(_) | InboundEvent::TextDone => {}
                InboundEvent::BackpressureWarning | InboundEvent::SessionIdle => {
                    debug!(session_id = %session_id, "Flow control ignored after upload");
                }
                event @ (InboundEvent::SessionCreated
                | InboundEvent::SessionUpdated
                | InboundEvent::Other { .. }) => {
                    debug!(session_id = %session_id, event = event.name(), "Event");
                }
            }
        }

        if audio.is_empty() {
            return Err(ParrotError::EmptyResponse);
        }
        session.transition(SessionState::Completed)?;
        Ok(audio)
    }

    /// Translate a lazy sequence of PCM chunks, yielding translated audio as it
    /// arrives.
    ///
    /// The connection is opened and configured before this returns. Uploading
    /// and routing then run in the background; dropping the returned stream
    /// cancels them and releases the connection.
    pub async fn translate_streaming<S>(
        &self,
        profile: &SessionProfile,
        input: S,
    ) -> Result<TranslationStream>
    where
        S: Stream<Item = Vec<u8>> + Send + 'static,
    {
        let mut session = Session::new();
        info!(session_id = %session.id(), voice = %profile.voice, "Starting streaming translation");

        if let Err(e) = self.open(&mut session, profile).await {
            session.teardown().await;
            return Err(e);
        }
        let Some(source) = session.take_source() else {
            session.teardown().await;
            return Err(ParrotError::Connection("session has no inbound stream".into()));
        };

        let session_id = session.id().to_string();
        let gate = BackpressureGate::new();
        let (router, audio_rx, text_rx) = Router::new(session_id.clone(), gate.clone());
        let router_task = tokio::spawn(router.run(source));

        let (out_tx, out_rx) = mpsc::channel(self.settings.output_buffer.max(1));
        let cancel = CancellationToken::new();

        let driver = StreamDriver {
            session,
            gate,
            audio_rx,
            out_tx,
            deadline: self.settings.stream_deadline,
            cancel: cancel.clone(),
        };
        tokio::spawn(async move {
            driver.run(input).await;
            router_task.abort();
        });

        Ok(TranslationStream {
            session_id,
            inner: ReceiverStream::new(out_rx),
            transcript: Some(text_rx),
            _cancel_on_drop: cancel.drop_guard(),
        })
    }

    async fn open(&self, session: &mut Session, profile: &SessionProfile) -> Result<()> {
        session.transition(SessionState::Connecting)?;
        let connection = self
            .connector
            .connect(&self.settings.connect_request())
            .await?;
        session.attach(connection);

        session.transition(SessionState::Configuring)?;
        let update = ClientEvent::SessionUpdate {
            session: self.settings.session_config(profile),
        };
        session.sink_mut()?.send(&update).await?;
        info!(session_id = %session.id(), voice = %profile.voice, "Session configured");
        Ok(())
    }
}

/// Background half of a streaming session.
struct StreamDriver {
    session: Session,
    gate: BackpressureGate,
    audio_rx: AudioQueue,
    out_tx: mpsc::Sender<Result<Vec<u8>>>,
    deadline: Option<Duration>,
    cancel: CancellationToken,
}

impl StreamDriver {
    async fn run<S>(mut self, input: S)
    where
        S: Stream<Item = Vec<u8>> + Send + 'static,
    {
        let session_id = self.session.id().to_string();
        let cancel = self.cancel.clone();
        let deadline = self.deadline;

        let outcome = {
            let work = Self::drive(
                &mut self.session,
                &self.gate,
                &mut self.audio_rx,
                &self.out_tx,
                input,
            );
            tokio::select! {
                _ = cancel.cancelled() => None,
                _ = self.out_tx.closed() => None,
                result = with_deadline(deadline, work) => Some(result),
            }
        };

        self.session.teardown().await;

        match outcome {
            Some(Ok(bytes)) => {
                info!(session_id = %session_id, output_bytes = bytes, "Streaming translation complete");
            }
            Some(Err(e)) => {
                warn!(session_id = %session_id, error = %e, "Streaming translation failed");
                let _ = self.out_tx.send(Err(e)).await;
            }
            None => info!(session_id = %session_id, "Streaming translation cancelled by caller"),
        }
    }

    /// Upload and forward concurrently. Returns the number of audio bytes forwarded.
    async fn drive<S>(
        session: &mut Session,
        gate: &BackpressureGate,
        audio_rx: &mut AudioQueue,
        out_tx: &mpsc::Sender<Result<Vec<u8>>>,
        input: S,
    ) -> Result<usize>
    where
        S: Stream<Item = Vec<u8>> + Send + 'static,
    {
        let session_id = session.id().to_string();
        let (_, forwarded) = tokio::try_join!(
            upload(session, gate, input),
            forward(&session_id, audio_rx, out_tx),
        )?;
        session.transition(SessionState::Completed)?;
        Ok(forwarded)
    }
}

/// Send every input chunk behind the backpressure gate, then commit and
/// request a response.
async fn upload<S>(session: &mut Session, gate: &BackpressureGate, input: S) -> Result<()>
where
    S: Stream<Item = Vec<u8>>,
{
    session.transition(SessionState::Streaming)?;
    let mut input = pin!(input);
    let mut sent_bytes = 0usize;
    let mut chunks = 0u64;

    while let Some(chunk) = input.next().await {
        if chunk.is_empty() {
            continue;
        }
        if !gate.is_open() {
            debug!(session_id = %session.id(), "Upload paused by backpressure");
        }
        gate.wait_open().await;
        session
            .sink_mut()?
            .send(&ClientEvent::append_audio(&chunk))
            .await?;

        sent_bytes += chunk.len();
        chunks += 1;
        if chunks == 1 || chunks % 50 == 0 {
            debug!(session_id = %session.id(), chunks, sent_bytes, "Uploading audio");
        }
    }

    if sent_bytes == 0 {
        return Err(ValidationError::NoAudioProvided.into());
    }

    session
        .sink_mut()?
        .send(&ClientEvent::InputAudioBufferCommit)
        .await?;
    session.transition(SessionState::Committed)?;
    session.sink_mut()?.send(&ClientEvent::ResponseCreate).await?;
    session.transition(SessionState::AwaitingCompletion)?;
    debug!(session_id = %session.id(), chunks, sent_bytes, "Input committed");
    Ok(())
}

/// Move routed audio to the caller until the sentinel arrives.
async fn forward(
    session_id: &str,
    audio_rx: &mut AudioQueue,
    out_tx: &mpsc::Sender<Result<Vec<u8>>>,
) -> Result<usize> {
    let mut forwarded = 0usize;
    loop {
        match audio_rx.recv().await {
            Some(Routed::Item(bytes)) => {
                forwarded += bytes.len();
                if out_tx.send(Ok(bytes)).await.is_err() {
                    // Caller stopped listening; the driver's select handles teardown.
                    std::future::pending::<()>().await;
                }
            }
            Some(Routed::End(StreamEnd::Completed)) => break,
            Some(Routed::End(StreamEnd::Failed { kind, message })) => {
                return Err(ParrotError::Protocol { kind, message });
            }
            Some(Routed::End(StreamEnd::Disconnected)) | None => {
                if forwarded == 0 {
                    return Err(ParrotError::Connection(
                        "connection closed before any audio was received".into(),
                    ));
                }
                warn!(session_id, forwarded, "Connection closed before audio completion");
                break;
            }
        }
    }

    if forwarded == 0 {
        return Err(ParrotError::EmptyResponse);
    }
    Ok(forwarded)
}

async fn with_deadline<F>(deadline: Option<Duration>, work: F) -> Result<usize>
where
    F: std::future::Future<Output = Result<usize>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .unwrap_or(Err(ParrotError::Timeout(limit))),
        None => work.await,
    }
}

/// Progressive output of a streaming translation.
///
/// Yields translated PCM chunks in arrival order. A failure is yielded as the
/// final item; chunks already yielded stay valid.
pub struct TranslationStream {
    session_id: String,
    inner: ReceiverStream<Result<Vec<u8>>>,
    transcript: Option<TextQueue>,
    _cancel_on_drop: DropGuard,
}

impl TranslationStream {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Transcript fragments of the translated speech. Available once.
    pub fn take_transcript(&mut self) -> Option<TextQueue> {
        self.transcript.take()
    }

    /// Drain the stream into one buffer, stopping at the first error.
    pub async fn collect_audio(mut self) -> Result<Vec<u8>> {
        let mut audio = Vec::new();
        while let Some(chunk) = self.next().await {
            audio.extend_from_slice(&chunk?);
        }
        Ok(audio)
    }
}

impl Stream for TranslationStream {
    type Item = Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Concatenate the text items of a transcript queue up to its sentinel.
pub async fn collect_transcript(mut queue: TextQueue) -> String {
    let mut text = String::new();
    while let Some(Routed::Item(fragment)) = queue.recv().await {
        text.push_str(&fragment);
    }
    text
}
