//! Media plumbing — PCM conversion, WAV container, streaming chunker.
//!
//! Everything here works on the fixed internal representation: mono,
//! 24 kHz, signed 16-bit little-endian samples.

pub mod chunker;
pub mod pcm;
pub mod wav;

pub use chunker::Chunker;
pub use pcm::{BYTES_PER_SAMPLE, MIN_AUDIO_MS, SAMPLE_RATE};
