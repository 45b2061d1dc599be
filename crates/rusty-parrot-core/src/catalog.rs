//! Static voice, language, and voice-mode catalogs.
//!
//! The tables are compiled in and never mutated, so a [`Catalog`] can be
//! shared across concurrent sessions without locking.

use serde::{Deserialize, Serialize};

/// A selectable output voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoiceInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// Display metadata for a language code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    pub code: String,
    pub name: String,
    pub flag: String,
}

/// How much of the speaker's vocal identity the output should retain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum VoiceMode {
    #[default]
    Preserve,
    Enhanced,
    Neutral,
}

impl From<String> for VoiceMode {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl VoiceMode {
    pub const ALL: [VoiceMode; 3] = [Self::Preserve, Self::Neutral, Self::Enhanced];

    /// Parse a mode string. Anything unrecognised falls back to neutral.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "preserve" => Self::Preserve,
            "enhanced" => Self::Enhanced,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preserve => "preserve",
            Self::Enhanced => "enhanced",
            Self::Neutral => "neutral",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Preserve => "Preserve original speaker voice and nuances",
            Self::Neutral => "Use selected voice without preservation",
            Self::Enhanced => "Enhance voice while preserving characteristics",
        }
    }
}

impl std::fmt::Display for VoiceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source → target language preset, as offered to end users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LanguagePair {
    pub label: &'static str,
    pub source: &'static str,
    pub target: &'static str,
}

impl LanguagePair {
    /// The pair running in the opposite direction. Auto-detect pairs flip
    /// their target instead, since "auto" cannot be a target.
    pub fn swap(&self) -> LanguagePair {
        let wanted = if self.source == AUTO_DETECT {
            let flipped_target = if self.target == "en" { "fr" } else { "en" };
            (AUTO_DETECT, flipped_target)
        } else {
            (self.target, self.source)
        };
        LANGUAGE_PAIRS
            .iter()
            .copied()
            .find(|p| (p.source, p.target) == wanted)
            .unwrap_or(*self)
    }
}

/// Source code meaning "detect the spoken language".
pub const AUTO_DETECT: &str = "auto";

const UNKNOWN_FLAG: &str = "🌐";

static VOICES: &[VoiceInfo] = &[
    VoiceInfo { id: "alloy", name: "Alloy", description: "Neutral, clear" },
    VoiceInfo { id: "echo", name: "Echo", description: "Deep, resonant" },
    VoiceInfo { id: "fable", name: "Fable", description: "Warm, expressive" },
    VoiceInfo { id: "onyx", name: "Onyx", description: "Strong, confident" },
    VoiceInfo { id: "nova", name: "Nova", description: "Bright, energetic" },
    VoiceInfo { id: "shimmer", name: "Shimmer", description: "Soft, gentle" },
    VoiceInfo { id: "cedar", name: "Cedar", description: "Natural, grounded" },
    VoiceInfo { id: "marin", name: "Marin", description: "Coastal, fresh" },
];

// (code, name, flag)
static LANGUAGES: &[(&str, &str, &str)] = &[
    ("en", "English", "🇺🇸"),
    ("fr", "French", "🇫🇷"),
];

static LANGUAGE_PAIRS: &[LanguagePair] = &[
    LanguagePair { label: "English → French", source: "en", target: "fr" },
    LanguagePair { label: "French → English", source: "fr", target: "en" },
    LanguagePair { label: "Auto-detect → English", source: AUTO_DETECT, target: "en" },
    LanguagePair { label: "Auto-detect → French", source: AUTO_DETECT, target: "fr" },
];

/// Read-only view over the built-in catalogs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Catalog;

impl Catalog {
    pub fn builtin() -> Self {
        Self
    }

    pub fn voices(&self) -> &'static [VoiceInfo] {
        VOICES
    }

    pub fn voice(&self, id: &str) -> Option<&'static VoiceInfo> {
        VOICES.iter().find(|v| v.id == id)
    }

    pub fn voice_modes(&self) -> [VoiceMode; 3] {
        VoiceMode::ALL
    }

    pub fn languages(&self) -> Vec<LanguageInfo> {
        LANGUAGES
            .iter()
            .map(|(code, name, flag)| LanguageInfo {
                code: (*code).into(),
                name: (*name).into(),
                flag: (*flag).into(),
            })
            .collect()
    }

    pub fn is_known_language(&self, code: &str) -> bool {
        LANGUAGES.iter().any(|(c, _, _)| *c == code)
    }

    /// Display info for a code. Unknown codes echo the raw code with a globe flag.
    pub fn language_info(&self, code: &str) -> LanguageInfo {
        match LANGUAGES.iter().find(|(c, _, _)| *c == code) {
            Some((code, name, flag)) => LanguageInfo {
                code: (*code).into(),
                name: (*name).into(),
                flag: (*flag).into(),
            },
            None => LanguageInfo {
                code: code.into(),
                name: code.into(),
                flag: UNKNOWN_FLAG.into(),
            },
        }
    }

    /// Name used inside model instructions: unknown codes are title-cased.
    pub fn language_name(&self, code: &str) -> String {
        LANGUAGES
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, name, _)| (*name).to_string())
            .unwrap_or_else(|| title_case(code))
    }

    pub fn language_pairs(&self) -> &'static [LanguagePair] {
        LANGUAGE_PAIRS
    }

    /// Resolve a pair by its label, defaulting to English → French.
    pub fn language_pair(&self, label: &str) -> LanguagePair {
        LANGUAGE_PAIRS
            .iter()
            .copied()
            .find(|p| p.label == label)
            .unwrap_or(LANGUAGE_PAIRS[0])
    }
}

/// Uppercase the first letter of each word, lowercase the rest.
fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut at_word_start = true;
    for ch in raw.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}
