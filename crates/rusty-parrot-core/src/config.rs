//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{Catalog, VoiceMode};

/// Top-level Rusty Parrot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub text: TextConfig,

    #[serde(default)]
    pub defaults: TranslationDefaults,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// --- Realtime speech-to-speech endpoint ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Base endpoint, e.g. `wss://api.openai.com/v1`. Falls back to `OPENAI_API_BASE`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_realtime_path")]
    pub path: String,

    #[serde(default = "default_realtime_model")]
    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,

    /// Value of the beta-feature header sent on connect.
    #[serde(default = "default_beta")]
    pub beta: String,

    #[serde(default = "default_realtime_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_output_tokens")]
    pub max_response_output_tokens: u32,

    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    #[serde(default)]
    pub turn_detection: TurnDetectionConfig,

    /// Single-shot wall-clock ceiling.
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,

    /// Optional overall deadline for streaming sessions. Unset means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_deadline_secs: Option<u64>,

    #[serde(default = "default_chunk_duration_ms")]
    pub chunk_duration_ms: u64,

    /// Capacity of the progressive output channel handed to streaming callers.
    #[serde(default = "default_output_buffer")]
    pub output_buffer: usize,

    #[serde(default)]
    pub input_style: InputStyle,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            path: default_realtime_path(),
            model: default_realtime_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            beta: default_beta(),
            temperature: default_realtime_temperature(),
            max_response_output_tokens: default_max_output_tokens(),
            transcription_model: default_transcription_model(),
            turn_detection: TurnDetectionConfig::default(),
            response_timeout_secs: default_response_timeout_secs(),
            stream_deadline_secs: None,
            chunk_duration_ms: default_chunk_duration_ms(),
            output_buffer: default_output_buffer(),
            input_style: InputStyle::default(),
        }
    }
}

impl RealtimeConfig {
    /// Resolve the API key: check `api_key` field first, then `api_key_env` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }

    pub fn resolve_base_url(&self) -> String {
        self.base_url
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| std::env::var("OPENAI_API_BASE").ok().filter(|u| !u.is_empty()))
            .unwrap_or_else(|| DEFAULT_REALTIME_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Full connection URL: base + path + model query.
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/{}?model={}",
            self.resolve_base_url(),
            self.path.trim_start_matches('/'),
            self.model
        )
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn stream_deadline(&self) -> Option<Duration> {
        self.stream_deadline_secs.map(Duration::from_secs)
    }

    pub fn chunk_duration(&self) -> Duration {
        Duration::from_millis(self.chunk_duration_ms)
    }
}

/// Server-side voice activity detection parameters sent in `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetectionConfig {
    #[serde(rename = "type", default = "default_turn_detection_type")]
    pub kind: String,
    #[serde(default = "default_vad_threshold")]
    pub threshold: f64,
    #[serde(default = "default_prefix_padding_ms")]
    pub prefix_padding_ms: u32,
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u32,
    /// Whether the server starts a response on its own when speech stops.
    #[serde(default)]
    pub create_response: bool,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        Self {
            kind: default_turn_detection_type(),
            threshold: default_vad_threshold(),
            prefix_padding_ms: default_prefix_padding_ms(),
            silence_duration_ms: default_silence_duration_ms(),
            create_response: false,
        }
    }
}

/// How input audio is handed to the remote conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputStyle {
    /// `input_audio_buffer.append` followed by `input_audio_buffer.commit`.
    #[default]
    Buffer,
    /// One explicit `conversation.item.create` user message carrying the audio.
    Item,
}

const DEFAULT_REALTIME_BASE_URL: &str = "wss://api.openai.com/v1";

fn default_realtime_path() -> String {
    "/realtime".into()
}

fn default_realtime_model() -> String {
    "gpt-realtime".into()
}

fn default_api_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".into())
}

fn default_beta() -> String {
    "realtime=v1".into()
}

fn default_realtime_temperature() -> f64 {
    0.6
}

fn default_max_output_tokens() -> u32 {
    4096
}

fn default_transcription_model() -> String {
    "whisper-1".into()
}

fn default_turn_detection_type() -> String {
    "server_vad".into()
}

fn default_vad_threshold() -> f64 {
    0.5
}

fn default_prefix_padding_ms() -> u32 {
    300
}

fn default_silence_duration_ms() -> u32 {
    500
}

fn default_response_timeout_secs() -> u64 {
    30
}

fn default_chunk_duration_ms() -> u64 {
    100
}

fn default_output_buffer() -> usize {
    64
}

// --- Request/response text translation ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextConfig {
    #[serde(default = "default_text_base_url")]
    pub base_url: String,

    #[serde(default = "default_text_model")]
    pub model: String,

    /// Separate key for the text endpoint; falls back to the realtime key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default = "default_text_temperature")]
    pub temperature: f64,

    #[serde(default = "default_text_max_tokens")]
    pub max_tokens: u32,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            base_url: default_text_base_url(),
            model: default_text_model(),
            api_key: None,
            api_key_env: None,
            temperature: default_text_temperature(),
            max_tokens: default_text_max_tokens(),
        }
    }
}

impl TextConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

fn default_text_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_text_model() -> String {
    "gpt-4o-mini".into()
}

fn default_text_temperature() -> f64 {
    0.3
}

fn default_text_max_tokens() -> u32 {
    1024
}

// --- Per-request defaults ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationDefaults {
    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default)]
    pub voice_mode: VoiceMode,

    #[serde(default = "default_target_language")]
    pub target_language: String,
}

impl Default for TranslationDefaults {
    fn default() -> Self {
        Self {
            voice: default_voice(),
            voice_mode: VoiceMode::default(),
            target_language: default_target_language(),
        }
    }
}

fn default_voice() -> String {
    "alloy".into()
}

fn default_target_language() -> String {
    "fr".into()
}

// --- Logging ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "rusty_parrot_realtime=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Whether a key looks like an OpenAI secret key (`sk-` prefix, longer than 20 chars).
pub fn looks_like_api_key(key: &str) -> bool {
    key.starts_with("sk-") && key.len() > 20
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| {
            warn!(var = var_name, "Config references an unset environment variable");
            String::new()
        })
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::ParrotError::Io)?;

        // Substitute ${ENV_VAR} references before parsing
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::ParrotError::Config(e.to_string()))?;

        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Key for the text endpoint: its own key if configured, else the realtime key.
    pub fn text_api_key(&self) -> Option<String> {
        self.text
            .resolve_api_key()
            .or_else(|| self.realtime.resolve_api_key())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        match self.realtime.resolve_api_key() {
            None => warnings.push(
                "No realtime API key configured (set realtime.api_key or OPENAI_API_KEY)"
                    .to_string(),
            ),
            Some(key) if !looks_like_api_key(&key) => {
                warnings.push("Realtime API key appears to be invalid".to_string())
            }
            Some(_) => {}
        }

        let temperature = self.realtime.temperature;
        if !(0.0..=2.0).contains(&temperature) {
            errors.push(format!(
                "realtime.temperature must be within 0.0..=2.0, got {temperature}"
            ));
        }

        if self.realtime.chunk_duration_ms == 0 {
            errors.push("realtime.chunk_duration_ms cannot be 0".to_string());
        }

        if self.realtime.response_timeout_secs == 0 {
            errors.push("realtime.response_timeout_secs cannot be 0".to_string());
        }

        if self.realtime.output_buffer == 0 {
            errors.push("realtime.output_buffer cannot be 0".to_string());
        }

        let catalog = Catalog::builtin();
        if catalog.voice(&self.defaults.voice).is_none() {
            errors.push(format!("Unknown default voice '{}'", self.defaults.voice));
        }
        if !catalog.is_known_language(&self.defaults.target_language) {
            warnings.push(format!(
                "Default target language '{}' is not in the catalog",
                self.defaults.target_language
            ));
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for Rusty Parrot data: `~/.rusty_parrot/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rusty_parrot")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, distinct variable name
        unsafe { std::env::set_var("TEST_RP_KEY", "sk-test-123") };
        let input = r#"{"key": "${TEST_RP_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains("sk-test-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_RP_KEY") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_RP_TEST}"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains(r#""""#));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.realtime.model, "gpt-realtime");
        assert_eq!(config.realtime.response_timeout(), Duration::from_secs(30));
        assert_eq!(config.realtime.chunk_duration(), Duration::from_millis(100));
        assert!(config.realtime.stream_deadline().is_none());
        assert_eq!(config.realtime.input_style, InputStyle::Buffer);
        assert_eq!(config.defaults.voice, "alloy");
        assert_eq!(config.defaults.voice_mode, VoiceMode::Preserve);
        assert_eq!(config.defaults.target_language, "fr");
    }

    #[test]
    fn test_endpoint_url() {
        let config = RealtimeConfig {
            base_url: Some("wss://api.test.com/v1/".into()),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint_url(),
            "wss://api.test.com/v1/realtime?model=gpt-realtime"
        );
    }

    #[test]
    fn test_realtime_resolve_api_key() {
        // SAFETY: test-only, distinct variable name
        unsafe { std::env::set_var("TEST_RP_API_KEY", "from-env") };
        let mut realtime = RealtimeConfig {
            api_key_env: Some("TEST_RP_API_KEY".into()),
            ..Default::default()
        };
        assert_eq!(realtime.resolve_api_key(), Some("from-env".into()));

        // Direct key takes priority
        realtime.api_key = Some("direct-key".into());
        assert_eq!(realtime.resolve_api_key(), Some("direct-key".into()));
        unsafe { std::env::remove_var("TEST_RP_API_KEY") };
    }

    #[test]
    fn test_text_key_falls_back_to_realtime() {
        let config = Config {
            realtime: RealtimeConfig {
                api_key: Some("sk-realtime-key-abcdefghijk".into()),
                api_key_env: None,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            config.text_api_key().as_deref(),
            Some("sk-realtime-key-abcdefghijk")
        );
    }

    #[test]
    fn test_partial_json5_fills_defaults() {
        let raw = r#"{
            // comments are fine in json5
            realtime: { model: "gpt-realtime-mini", input_style: "item", stream_deadline_secs: 120 },
            defaults: { voice: "nova", voice_mode: "enhanced" },
        }"#;
        let config: Config = json5::from_str(raw).unwrap();
        assert_eq!(config.realtime.model, "gpt-realtime-mini");
        assert_eq!(config.realtime.input_style, InputStyle::Item);
        assert_eq!(config.realtime.stream_deadline(), Some(Duration::from_secs(120)));
        assert_eq!(config.realtime.temperature, 0.6);
        assert_eq!(config.realtime.turn_detection.kind, "server_vad");
        assert_eq!(config.defaults.voice, "nova");
        assert_eq!(config.defaults.voice_mode, VoiceMode::Enhanced);
        assert_eq!(config.defaults.target_language, "fr");
    }

    #[test]
    fn test_unknown_voice_mode_loads_as_neutral() {
        let config: Config = json5::from_str(r#"{ defaults: { voice_mode: "loud" } }"#).unwrap();
        assert_eq!(config.defaults.voice_mode, VoiceMode::Neutral);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ defaults: { voice_mode: "Preserve" } }"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.defaults.voice_mode, VoiceMode::Preserve);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.realtime.max_response_output_tokens, 4096);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.defaults.voice = "shimmer".into();
        config.realtime.chunk_duration_ms = 40;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.defaults.voice, "shimmer");
        assert_eq!(loaded.realtime.chunk_duration_ms, 40);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ realtime: [").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(crate::error::ParrotError::Config(_))
        ));
    }

    #[test]
    fn test_validate_flags_bad_values() {
        let mut config = Config::default();
        config.realtime.api_key = Some("not-a-key".into());
        config.realtime.temperature = 3.5;
        config.realtime.chunk_duration_ms = 0;
        config.defaults.voice = "robot".into();
        config.defaults.target_language = "xx".into();

        let (warnings, errors) = config.validate();
        assert!(warnings.iter().any(|w| w.contains("appears to be invalid")));
        assert!(warnings.iter().any(|w| w.contains("'xx'")));
        assert!(errors.iter().any(|e| e.contains("temperature")));
        assert!(errors.iter().any(|e| e.contains("chunk_duration_ms")));
        assert!(errors.iter().any(|e| e.contains("robot")));
    }

    #[test]
    fn test_looks_like_api_key() {
        assert!(looks_like_api_key("sk-test-key-for-testing-1234567890abcdef"));
        assert!(!looks_like_api_key("sk-short"));
        assert!(!looks_like_api_key("pk-test-key-for-testing-1234567890"));
    }

    #[test]
    fn test_logging_config_defaults() {
        let json_str = r#"{ "logging": {} }"#;
        let config: Config = json5::from_str(json_str).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert_eq!(logging.output, "stderr");
        assert!(logging.filters.is_empty());
    }
}
