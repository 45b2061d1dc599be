//! Translation facade: the single entry point callers use.

use std::sync::Arc;

use futures::Stream;
use tracing::info;

use rusty_parrot_core::config::{Config, TranslationDefaults};
use rusty_parrot_core::{Catalog, LanguagePair, Result, ValidationError, VoiceMode};
use rusty_parrot_media::Chunker;
use rusty_parrot_media::pcm::validate_pcm;
use rusty_parrot_realtime::{
    Connector, EngineSettings, SessionEngine, SessionProfile, TranslationStream,
};

use crate::instructions::build_instructions;
use crate::text::{TextClient, TextTranslation};

/// Owns the catalogs, the per-request voice settings, and both transports
/// (realtime speech and request/response text).
pub struct Translator {
    catalog: Catalog,
    engine: SessionEngine,
    text: TextClient,
    chunker: Chunker,
    voice: String,
    voice_mode: VoiceMode,
    target_language: String,
}

impl Translator {
    /// Build from explicit parts. The default voice must exist in the catalog.
    pub fn new(
        engine: SessionEngine,
        text: TextClient,
        chunker: Chunker,
        defaults: &TranslationDefaults,
    ) -> Result<Self> {
        let mut translator = Self {
            catalog: Catalog::builtin(),
            engine,
            text,
            chunker,
            voice: String::new(),
            voice_mode: defaults.voice_mode,
            target_language: String::new(),
        };
        translator.configure(&defaults.voice, defaults.voice_mode, &defaults.target_language)?;
        Ok(translator)
    }

    /// WebSocket-backed translator built from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_connector_config(config, None)
    }

    /// Same as [`Translator::from_config`] but over a caller-supplied transport.
    pub fn with_connector(config: &Config, connector: Arc<dyn Connector>) -> Result<Self> {
        Self::with_connector_config(config, Some(connector))
    }

    fn with_connector_config(config: &Config, connector: Option<Arc<dyn Connector>>) -> Result<Self> {
        let settings = EngineSettings::from_config(&config.realtime);
        let engine = match connector {
            Some(connector) => SessionEngine::new(connector, settings),
            None => SessionEngine::websocket(settings),
        };
        let text = TextClient::new(&config.text, config.text_api_key());
        let chunker = Chunker::new(config.realtime.chunk_duration());
        Self::new(engine, text, chunker, &config.defaults)
    }

    /// Select voice, voice mode and target language for subsequent requests.
    pub fn configure(&mut self, voice: &str, mode: VoiceMode, target_language: &str) -> Result<()> {
        if self.catalog.voice(voice).is_none() {
            return Err(ValidationError::UnknownVoice(voice.to_string()).into());
        }
        self.voice = voice.to_string();
        self.voice_mode = mode;
        self.target_language = target_language.trim().to_ascii_lowercase();
        info!(
            voice = %self.voice,
            mode = %self.voice_mode,
            target = %self.target_language,
            "Translator configured"
        );
        Ok(())
    }

    /// Point the target language at a preset pair, resolved by label.
    pub fn select_language_pair(&mut self, label: &str) -> LanguagePair {
        let pair = self.catalog.language_pair(label);
        self.target_language = pair.target.to_string();
        pair
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn voice_mode(&self) -> VoiceMode {
        self.voice_mode
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    pub fn chunker(&self) -> Chunker {
        self.chunker
    }

    /// Instruction text for the current configuration.
    pub fn instructions(&self) -> String {
        build_instructions(&self.catalog, self.voice_mode, &self.target_language)
    }

    fn profile(&self) -> SessionProfile {
        SessionProfile {
            voice: self.voice.clone(),
            instructions: self.instructions(),
        }
    }

    /// Translate a complete 24 kHz mono PCM16 buffer.
    pub async fn translate_single_shot(&self, pcm: &[u8]) -> Result<Vec<u8>> {
        self.engine.translate_single_shot(&self.profile(), pcm).await
    }

    /// Translate a caller-paced sequence of PCM chunks.
    pub async fn translate_streaming<S>(&self, input: S) -> Result<TranslationStream>
    where
        S: Stream<Item = Vec<u8>> + Send + 'static,
    {
        self.engine.translate_streaming(&self.profile(), input).await
    }

    /// Validate a complete buffer, then stream it at real-time pace.
    pub async fn translate_pcm_streaming(&self, pcm: Vec<u8>) -> Result<TranslationStream> {
        validate_pcm(&pcm)?;
        let chunks = self.chunker.paced(pcm);
        self.engine.translate_streaming(&self.profile(), chunks).await
    }

    /// Request/response text translation. `source` may be `"auto"`.
    pub async fn translate_text(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<TextTranslation> {
        self.text.translate(&self.catalog, text, source, target).await
    }
}
