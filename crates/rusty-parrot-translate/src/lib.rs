//! Translation facade for Rusty Parrot.
//!
//! [`Translator`] wraps the realtime session engine with voice, language and
//! instruction handling, and adds a plain request/response text translation.

pub mod instructions;
pub mod text;
pub mod translator;

pub use instructions::build_instructions;
pub use text::{TextClient, TextTranslation};
pub use translator::Translator;
