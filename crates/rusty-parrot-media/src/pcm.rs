//! Raw PCM16 conversions.

use rusty_parrot_core::ValidationError;

/// Sample rate shared by input and output audio.
pub const SAMPLE_RATE: u32 = 24_000;

/// Signed 16-bit samples.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Shortest input accepted for translation.
pub const MIN_AUDIO_MS: u64 = 100;

/// Decode little-endian PCM16 bytes into samples. A trailing odd byte is dropped.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Encode samples as little-endian PCM16 bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Normalize PCM16 bytes to `[-1.0, 1.0)` floats.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes_to_samples(bytes)
        .into_iter()
        .map(|s| s as f32 / 32768.0)
        .collect()
}

/// Scale floats back to PCM16 bytes, clamping out-of-range input.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

/// Average interleaved channels down to mono.
pub fn downmix(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Linear-interpolation resample.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let target_len =
        ((samples.len() as u64 * to_rate as u64) / from_rate as u64).max(1) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;

    (0..target_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = pos - idx as f64;
            let value = samples[idx] as f64 * (1.0 - frac) + samples[next] as f64 * frac;
            value.round() as i16
        })
        .collect()
}

/// Duration of a PCM16 buffer at the given rate, in milliseconds.
pub fn duration_ms(byte_len: usize, sample_rate: u32) -> u64 {
    let samples = (byte_len / BYTES_PER_SAMPLE) as u64;
    samples * 1000 / sample_rate as u64
}

/// Byte length of `ms` milliseconds of audio at the given rate.
pub fn bytes_for_ms(ms: u64, sample_rate: u32) -> usize {
    (sample_rate as u64 * ms / 1000) as usize * BYTES_PER_SAMPLE
}

/// Reject buffers that are empty, misaligned, or shorter than [`MIN_AUDIO_MS`].
pub fn validate_pcm(bytes: &[u8]) -> Result<(), ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::EmptyAudio);
    }
    if bytes.len() % BYTES_PER_SAMPLE != 0 {
        return Err(ValidationError::MalformedAudio(format!(
            "{} bytes is not a whole number of 16-bit samples",
            bytes.len()
        )));
    }
    let duration_ms = duration_ms(bytes.len(), SAMPLE_RATE);
    if duration_ms < MIN_AUDIO_MS {
        return Err(ValidationError::TooShort {
            duration_ms,
            min_ms: MIN_AUDIO_MS,
        });
    }
    Ok(())
}
