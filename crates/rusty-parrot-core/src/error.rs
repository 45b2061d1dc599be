use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParrotError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote error ({kind}): {message}")]
    Protocol { kind: String, message: String },

    #[error("Translation timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("Translation returned no audio")]
    EmptyResponse,

    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Input rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("audio is empty")]
    EmptyAudio,

    #[error("audio is too short ({duration_ms} ms, minimum {min_ms} ms)")]
    TooShort { duration_ms: u64, min_ms: u64 },

    #[error("no audio was provided to the stream")]
    NoAudioProvided,

    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    #[error("unknown voice '{0}'")]
    UnknownVoice(String),

    #[error("text is empty")]
    EmptyText,
}

/// Coarse classification used at the collaborator boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Validation,
    Protocol,
    Timeout,
    EmptyResponse,
    Internal,
}

impl ParrotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::EmptyResponse => ErrorKind::EmptyResponse,
            _ => ErrorKind::Internal,
        }
    }

    /// Short user-facing message: "no audio", "too short" or a service failure.
    pub fn user_summary(&self) -> String {
        match self {
            Self::Validation(ValidationError::EmptyAudio | ValidationError::NoAudioProvided) => {
                "Please record or upload audio first".into()
            }
            Self::Validation(ValidationError::TooShort { duration_ms, min_ms }) => {
                format!("Audio too short ({duration_ms} ms); record at least {min_ms} ms")
            }
            Self::Validation(other) => format!("Invalid input: {other}"),
            Self::EmptyResponse => "The service returned no translated audio".into(),
            other => format!("Translation failed: {other}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParrotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_keeps_message() {
        let err = ParrotError::Protocol {
            kind: "rate_limit_error".into(),
            message: "Rate limit exceeded".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().ends_with("Rate limit exceeded"));
    }

    #[test]
    fn test_too_short_names_duration() {
        let err: ParrotError = ValidationError::TooShort {
            duration_ms: 42,
            min_ms: 100,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("42 ms"));
        assert!(err.user_summary().contains("too short"));
    }

    #[test]
    fn test_user_summary_distinguishes_failures() {
        let no_audio: ParrotError = ValidationError::EmptyAudio.into();
        assert!(no_audio.user_summary().contains("record or upload"));

        let service = ParrotError::Connection("refused".into());
        assert!(service.user_summary().starts_with("Translation failed"));

        assert_eq!(ParrotError::EmptyResponse.kind(), ErrorKind::EmptyResponse);
        assert_eq!(
            ParrotError::Config("x".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = ParrotError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Translation timed out after 30s");
    }
}
