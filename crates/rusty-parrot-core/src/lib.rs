//! Core types, config, errors, and catalogs for Rusty Parrot.

pub mod catalog;
pub mod config;
pub mod error;

pub use catalog::{Catalog, LanguageInfo, LanguagePair, VoiceInfo, VoiceMode};
pub use error::{ErrorKind, ParrotError, Result, ValidationError};
