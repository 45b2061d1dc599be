//! Request/response text translation over the chat-completions API.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use rusty_parrot_core::catalog::AUTO_DETECT;
use rusty_parrot_core::config::TextConfig;
use rusty_parrot_core::{Catalog, LanguageInfo, ParrotError, Result, ValidationError};

/// A translated text plus the languages it went between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextTranslation {
    pub text: String,
    /// Detected or requested source code.
    pub source: String,
    pub target: String,
}

impl TextTranslation {
    pub fn source_info(&self, catalog: &Catalog) -> LanguageInfo {
        catalog.language_info(&self.source)
    }

    pub fn target_info(&self, catalog: &Catalog) -> LanguageInfo {
        catalog.language_info(&self.target)
    }
}

pub struct TextClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    max_tokens: u32,
    client: reqwest::Client,
}

impl TextClient {
    pub fn new(config: &TextConfig, api_key: Option<String>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: reqwest::Client::new(),
        }
    }

    pub async fn translate(
        &self,
        catalog: &Catalog,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<TextTranslation> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ParrotError::Config("no API key configured for text translation".into()))?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt(catalog, source, target),
                },
                ChatMessage {
                    role: "user",
                    content: text.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(model = %self.model, source, target, chars = text.len(), "Requesting text translation");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ParrotError::Http(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ParrotError::Http(format!("API error {status}: {body}")));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| ParrotError::Http(format!("invalid response body: {e}")))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let (detected, translated) = parse_reply(&content, source, target);
        if translated.is_empty() {
            return Err(ParrotError::EmptyResponse);
        }
        Ok(TextTranslation {
            text: translated,
            source: detected,
            target: target.to_string(),
        })
    }
}

fn system_prompt(catalog: &Catalog, source: &str, target: &str) -> String {
    let target_name = catalog.language_name(target);
    let source_line = if source == AUTO_DETECT {
        "Detect the language of the user's text.".to_string()
    } else {
        format!("The user's text is written in {}.", catalog.language_name(source))
    };
    format!(
        "You are a professional translator. {source_line} \
         Translate it into {target_name}, keeping tone and meaning.\n\
         Reply with exactly two lines:\n\
         1. the ISO 639-1 code of the source language\n\
         2. the translated text\n\
         Do not add anything else."
    )
}

/// Split a two-line reply into `(source_code, text)`.
///
/// Replies that don't start with a language code line are taken whole as the
/// translation, with a best-guess source.
pub fn parse_reply(reply: &str, source: &str, target: &str) -> (String, String) {
    let reply = reply.trim();
    if let Some((first, rest)) = reply.split_once('\n') {
        let code = first.trim().trim_end_matches(['.', ':']).to_ascii_lowercase();
        let rest = rest.trim();
        if is_language_code(&code) && !rest.is_empty() {
            return (code, rest.to_string());
        }
    }

    let guess = if source != AUTO_DETECT {
        source.to_string()
    } else if target == "en" {
        "fr".to_string()
    } else {
        "en".to_string()
    };
    warn!(guess = %guess, "Reply missing language line, using whole reply as translation");
    (guess, reply.to_string())
}

fn is_language_code(candidate: &str) -> bool {
    (2..=3).contains(&candidate.len()) && candidate.chars().all(|c| c.is_ascii_lowercase())
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}
