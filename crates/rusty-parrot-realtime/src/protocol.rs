//! Realtime wire protocol.
//!
//! Outbound messages are a serde-tagged [`ClientEvent`]. Inbound messages are
//! decoded into the closed [`InboundEvent`] type; unknown `type` tags are kept
//! as [`InboundEvent::Other`] rather than rejected.

use base64::Engine;
use serde::{Deserialize, Serialize};

use rusty_parrot_core::config::TurnDetectionConfig;
use rusty_parrot_core::{ParrotError, Result};

/// PCM16 format identifier used for both directions.
pub const AUDIO_FORMAT_PCM16: &str = "pcm16";

// ── Outbound ───────────────────────────────────────────────────────

/// Client → server message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    #[serde(rename = "response.create")]
    ResponseCreate,

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
}

impl ClientEvent {
    /// `input_audio_buffer.append` with the PCM payload base64-encoded.
    pub fn append_audio(pcm: &[u8]) -> Self {
        Self::InputAudioBufferAppend {
            audio: base64::engine::general_purpose::STANDARD.encode(pcm),
        }
    }

    /// A user message wrapping the whole PCM payload as one `input_audio` part.
    pub fn user_audio_item(pcm: &[u8]) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem {
                kind: "message".into(),
                role: "user".into(),
                content: vec![ContentPart::InputAudio {
                    audio: base64::engine::general_purpose::STANDARD.encode(pcm),
                }],
            },
        }
    }

    /// Wire name of the event, as sent in the `type` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            Self::InputAudioBufferCommit => "input_audio_buffer.commit",
            Self::ResponseCreate => "response.create",
            Self::ConversationItemCreate { .. } => "conversation.item.create",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Flat session configuration carried by `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfig {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetectionConfig>,
    pub temperature: f64,
    pub max_response_output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptionSettings {
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputAudio { audio: String },
    InputText { text: String },
}

// ── Inbound ────────────────────────────────────────────────────────

/// Server → client event, decoded from one protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    SessionCreated,
    SessionUpdated,
    /// Decoded PCM16 bytes from `response.audio.delta`.
    AudioDelta(Vec<u8>),
    AudioDone,
    ResponseDone,
    /// Text or audio-transcript fragment.
    TextDelta(String),
    TextDone,
    Error { kind: String, message: String },
    /// A `warning` that asks the client to stop sending.
    BackpressureWarning,
    /// The server drained its input; sending may resume.
    SessionIdle,
    Other { kind: String, raw: serde_json::Value },
}

impl InboundEvent {
    /// Decode one JSON text message.
    pub fn decode(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ParrotError::Decode(format!("invalid server event JSON: {e}")))?;

        let kind = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ParrotError::Decode("server event has no 'type' field".into()))?
            .to_string();

        if kind == "warning" {
            return Ok(if is_backpressure_warning(&value) {
                Self::BackpressureWarning
            } else {
                Self::Other { kind, raw: value }
            });
        }

        if !KNOWN_SERVER_EVENTS.contains(&kind.as_str()) {
            return Ok(Self::Other { kind, raw: value });
        }

        let message: ServerMessage = serde_json::from_value(value)
            .map_err(|e| ParrotError::Decode(format!("malformed '{kind}' event: {e}")))?;

        Ok(match message {
            ServerMessage::SessionCreated => Self::SessionCreated,
            ServerMessage::SessionUpdated => Self::SessionUpdated,
            ServerMessage::AudioDelta { delta } => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(delta.as_bytes())
                    .map_err(|e| ParrotError::Decode(format!("invalid audio delta: {e}")))?;
                Self::AudioDelta(bytes)
            }
            ServerMessage::AudioDone => Self::AudioDone,
            ServerMessage::ResponseDone => Self::ResponseDone,
            ServerMessage::TextDelta { delta } | ServerMessage::TranscriptDelta { delta } => {
                Self::TextDelta(delta)
            }
            ServerMessage::TextDone | ServerMessage::TranscriptDone => Self::TextDone,
            ServerMessage::Error { error, message } => Self::Error {
                kind: error
                    .kind
                    .or(error.code)
                    .unwrap_or_else(|| "unknown".into()),
                message: error
                    .message
                    .or(message)
                    .unwrap_or_else(|| "Unknown error".into()),
            },
            ServerMessage::SessionIdle => Self::SessionIdle,
        })
    }

    /// Short name for logging.
    pub fn name(&self) -> &str {
        match self {
            Self::SessionCreated => "session.created",
            Self::SessionUpdated => "session.updated",
            Self::AudioDelta(_) => "response.audio.delta",
            Self::AudioDone => "response.audio.done",
            Self::ResponseDone => "response.done",
            Self::TextDelta(_) => "response.text.delta",
            Self::TextDone => "response.text.done",
            Self::Error { .. } => "error",
            Self::BackpressureWarning => "warning",
            Self::SessionIdle => "session.idle",
            Self::Other { kind, .. } => kind,
        }
    }
}

const KNOWN_SERVER_EVENTS: &[&str] = &[
    "session.created",
    "session.updated",
    "response.audio.delta",
    "response.audio.done",
    "response.done",
    "response.text.delta",
    "response.text.done",
    "response.audio_transcript.delta",
    "response.audio_transcript.done",
    "error",
    "session.idle",
];

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ServerMessage {
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "session.updated")]
    SessionUpdated,
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },
    #[serde(rename = "response.audio.done")]
    AudioDone,
    #[serde(rename = "response.done")]
    ResponseDone,
    #[serde(rename = "response.text.delta")]
    TextDelta { delta: String },
    #[serde(rename = "response.text.done")]
    TextDone,
    #[serde(rename = "response.audio_transcript.delta")]
    TranscriptDelta { delta: String },
    #[serde(rename = "response.audio_transcript.done")]
    TranscriptDone,
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ErrorBody,
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(rename = "session.idle")]
    SessionIdle,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// A warning signals backpressure through `"backpressure": true` or a nested
/// `warning.code` / `warning.type` of `"backpressure"`.
fn is_backpressure_warning(value: &serde_json::Value) -> bool {
    if value.get("backpressure").and_then(|v| v.as_bool()) == Some(true) {
        return true;
    }
    value
        .get("warning")
        .map(|w| {
            ["code", "type"]
                .iter()
                .any(|field| w.get(field).and_then(|v| v.as_str()) == Some("backpressure"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_session() -> SessionConfig {
        SessionConfig {
            modalities: vec!["text".into(), "audio".into()],
            instructions: "Translate to French".into(),
            voice: "alloy".into(),
            input_audio_format: AUDIO_FORMAT_PCM16.into(),
            output_audio_format: AUDIO_FORMAT_PCM16.into(),
            input_audio_transcription: Some(TranscriptionSettings {
                model: "whisper-1".into(),
            }),
            turn_detection: Some(TurnDetectionConfig::default()),
            temperature: 0.6,
            max_response_output_tokens: 4096,
        }
    }

    #[test]
    fn test_session_update_shape() {
        let event = ClientEvent::SessionUpdate {
            session: sample_session(),
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["voice"], "alloy");
        assert_eq!(value["session"]["input_audio_format"], "pcm16");
        assert_eq!(value["session"]["output_audio_format"], "pcm16");
        assert_eq!(value["session"]["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(value["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(value["session"]["turn_detection"]["create_response"], false);
        assert_eq!(value["session"]["max_response_output_tokens"], 4096);
        assert_eq!(value["session"]["modalities"], json!(["text", "audio"]));
    }

    #[test]
    fn test_append_audio_is_base64() {
        let event = ClientEvent::append_audio(b"chunk1");
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "input_audio_buffer.append");
        assert_eq!(value["audio"], "Y2h1bmsx");
    }

    #[test]
    fn test_unit_events_serialize_with_type_only() {
        assert_eq!(
            ClientEvent::InputAudioBufferCommit.to_json().unwrap(),
            r#"{"type":"input_audio_buffer.commit"}"#
        );
        assert_eq!(
            ClientEvent::ResponseCreate.to_json().unwrap(),
            r#"{"type":"response.create"}"#
        );
    }

    #[test]
    fn test_user_audio_item_shape() {
        let event = ClientEvent::user_audio_item(&[1, 2, 3]);
        assert_eq!(event.name(), "conversation.item.create");
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["item"]["type"], "message");
        assert_eq!(value["item"]["role"], "user");
        assert_eq!(value["item"]["content"][0]["type"], "input_audio");
        assert_eq!(value["item"]["content"][0]["audio"], "AQID");
    }

    #[test]
    fn test_decode_audio_delta() {
        let b64 = base64::engine::general_purpose::STANDARD.encode([10u8, 20, 30]);
        let json = format!(r#"{{"type": "response.audio.delta", "delta": "{b64}", "item_id": "x"}}"#);
        assert_eq!(
            InboundEvent::decode(&json).unwrap(),
            InboundEvent::AudioDelta(vec![10, 20, 30])
        );
    }

    #[test]
    fn test_decode_lifecycle_events() {
        let cases = [
            (r#"{"type": "session.created", "session": {}}"#, InboundEvent::SessionCreated),
            (r#"{"type": "session.updated", "session": {}}"#, InboundEvent::SessionUpdated),
            (r#"{"type": "response.audio.done"}"#, InboundEvent::AudioDone),
            (r#"{"type": "response.done", "response": {"status": "completed"}}"#, InboundEvent::ResponseDone),
            (r#"{"type": "response.text.done", "text": "salut"}"#, InboundEvent::TextDone),
            (r#"{"type": "session.idle"}"#, InboundEvent::SessionIdle),
        ];
        for (json, expected) in cases {
            assert_eq!(InboundEvent::decode(json).unwrap(), expected, "{json}");
        }
    }

    #[test]
    fn test_decode_text_and_transcript_deltas() {
        let text = InboundEvent::decode(r#"{"type": "response.text.delta", "delta": "Bon"}"#).unwrap();
        assert_eq!(text, InboundEvent::TextDelta("Bon".into()));

        let transcript =
            InboundEvent::decode(r#"{"type": "response.audio_transcript.delta", "delta": "jour"}"#)
                .unwrap();
        assert_eq!(transcript, InboundEvent::TextDelta("jour".into()));

        let done = InboundEvent::decode(r#"{"type": "response.audio_transcript.done"}"#).unwrap();
        assert_eq!(done, InboundEvent::TextDone);
    }

    #[test]
    fn test_decode_error_event() {
        let json = r#"{"type": "error", "error": {"type": "rate_limit_error", "message": "Rate limit exceeded"}}"#;
        assert_eq!(
            InboundEvent::decode(json).unwrap(),
            InboundEvent::Error {
                kind: "rate_limit_error".into(),
                message: "Rate limit exceeded".into()
            }
        );

        let bare = InboundEvent::decode(r#"{"type": "error", "error": {}}"#).unwrap();
        assert_eq!(
            bare,
            InboundEvent::Error {
                kind: "unknown".into(),
                message: "Unknown error".into()
            }
        );

        let top_level =
            InboundEvent::decode(r#"{"type": "error", "message": "Rate limit exceeded"}"#).unwrap();
        assert_eq!(
            top_level,
            InboundEvent::Error {
                kind: "unknown".into(),
                message: "Rate limit exceeded".into()
            }
        );
    }

    #[test]
    fn test_decode_warnings() {
        let flagged = InboundEvent::decode(r#"{"type": "warning", "backpressure": true}"#).unwrap();
        assert_eq!(flagged, InboundEvent::BackpressureWarning);

        let nested = InboundEvent::decode(
            r#"{"type": "warning", "warning": {"code": "backpressure", "message": "slow down"}}"#,
        )
        .unwrap();
        assert_eq!(nested, InboundEvent::BackpressureWarning);

        let plain =
            InboundEvent::decode(r#"{"type": "warning", "warning": {"message": "deprecated"}}"#)
                .unwrap();
        assert!(matches!(plain, InboundEvent::Other { ref kind, .. } if kind == "warning"));
    }

    #[test]
    fn test_decode_unknown_event_is_other() {
        let event =
            InboundEvent::decode(r#"{"type": "input_audio_buffer.speech_started", "audio_start_ms": 5}"#)
                .unwrap();
        match event {
            InboundEvent::Other { kind, raw } => {
                assert_eq!(kind, "input_audio_buffer.speech_started");
                assert_eq!(raw["audio_start_ms"], 5);
            }
            other => panic!("expected Other, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_messages() {
        assert!(matches!(InboundEvent::decode("not json"), Err(ParrotError::Decode(_))));
        assert!(matches!(InboundEvent::decode(r#"{"delta": "x"}"#), Err(ParrotError::Decode(_))));
        assert!(matches!(
            InboundEvent::decode(r#"{"type": "response.audio.delta"}"#),
            Err(ParrotError::Decode(_))
        ));
        assert!(matches!(
            InboundEvent::decode(r#"{"type": "response.audio.delta", "delta": "!!notbase64"}"#),
            Err(ParrotError::Decode(_))
        ));
    }
}
