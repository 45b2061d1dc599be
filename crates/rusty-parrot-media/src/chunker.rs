//! Frame chunker — splits a PCM buffer into fixed-duration chunks paced at
//! real-time speed, so a streaming upload behaves like a live microphone.

use std::time::Duration;

use futures::Stream;

use crate::pcm::{BYTES_PER_SAMPLE, SAMPLE_RATE};

/// Splits PCM16 audio into `chunk_duration`-sized pieces.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_duration: Duration,
    sample_rate: u32,
}

impl Chunker {
    pub fn new(chunk_duration: Duration) -> Self {
        Self::with_sample_rate(chunk_duration, SAMPLE_RATE)
    }

    pub fn with_sample_rate(chunk_duration: Duration, sample_rate: u32) -> Self {
        Self {
            chunk_duration,
            sample_rate,
        }
    }

    pub fn chunk_duration(&self) -> Duration {
        self.chunk_duration
    }

    /// `sample_rate * chunk_duration * 2` bytes, never less than one sample.
    pub fn chunk_size_bytes(&self) -> usize {
        let samples =
            (self.sample_rate as u128 * self.chunk_duration.as_micros() / 1_000_000) as usize;
        samples.max(1) * BYTES_PER_SAMPLE
    }

    /// Unpaced view of the chunks. The last one may be shorter.
    pub fn split<'a>(&self, pcm: &'a [u8]) -> std::slice::Chunks<'a, u8> {
        pcm.chunks(self.chunk_size_bytes())
    }

    /// Lazy chunk stream that sleeps `chunk_duration` between successive chunks.
    ///
    /// Each call starts a fresh pass over the buffer; the stream holds no state
    /// beyond its offset.
    pub fn paced(&self, pcm: Vec<u8>) -> impl Stream<Item = Vec<u8>> + Send + 'static {
        let size = self.chunk_size_bytes();
        let pace = self.chunk_duration;

        futures::stream::unfold((pcm, 0usize), move |(pcm, offset)| async move {
            if offset >= pcm.len() {
                return None;
            }
            if offset > 0 {
                tokio::time::sleep(pace).await;
            }
            let end = (offset + size).min(pcm.len());
            let chunk = pcm[offset..end].to_vec();
            Some((chunk, (pcm, end)))
        })
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
